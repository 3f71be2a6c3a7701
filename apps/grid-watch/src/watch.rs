use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use grid_model::viewport::{DEFAULT_COLUMN_BUFFER, DEFAULT_ROW_BUFFER};
use grid_model::{ColumnTable, GridState, Redraw, Viewport};
use live_link::{
    CancellationToken, Debouncer, Notice, NoticeKind, RegistrationOptions, RouteContext,
    SubscriptionSession, UpdateHandler,
};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::source::{FetchRequest, GridPayload, RowSource};

/// Quiet period after the last scroll before the window is refetched.
pub const SCROLL_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    pub viewport_height: usize,
    pub viewport_width: u32,
    pub row_height: usize,
    pub collapse_level: Option<u16>,
}

impl From<&AppConfig> for WatchSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            viewport_height: config.viewport_height,
            viewport_width: config.viewport_width,
            row_height: config.row_height,
            collapse_level: config.collapse_level,
        }
    }
}

#[derive(Debug)]
struct WatchedGrid {
    state: GridState,
    scroll_top: usize,
    scroll_left: u32,
    refresh: Debouncer,
}

/// Keeps one [`GridState`] per subscribed resource in step with the server.
pub struct GridWatcher {
    source: Arc<dyn RowSource>,
    settings: WatchSettings,
    grids: HashMap<String, WatchedGrid>,
    refresh: Option<mpsc::UnboundedSender<Notice>>,
}

impl GridWatcher {
    pub fn new(source: Arc<dyn RowSource>, settings: WatchSettings) -> Self {
        Self {
            source,
            settings,
            grids: HashMap::new(),
            refresh: None,
        }
    }

    pub fn track(&mut self, url: impl Into<String>) {
        self.grids.entry(url.into()).or_insert_with(|| WatchedGrid {
            state: GridState::new(ColumnTable::default()),
            scroll_top: 0,
            scroll_left: 0,
            refresh: Debouncer::new(SCROLL_DEBOUNCE),
        });
    }

    pub fn grid(&self, url: &str) -> Option<&GridState> {
        self.grids.get(url).map(|grid| &grid.state)
    }

    /// Register every tracked url as a recurring subscription that forwards
    /// notices into `notices`. Scroll refreshes are queued on the same channel.
    pub fn subscribe(
        &mut self,
        session: &SubscriptionSession,
        route: &RouteContext,
        notices: mpsc::UnboundedSender<Notice>,
    ) {
        for url in self.grids.keys() {
            session.register(
                url.clone(),
                RegistrationOptions::recurring(route.clone()),
                forward(notices.clone()),
            );
        }
        self.refresh = Some(notices);
    }

    /// Move the on-screen window of `url`'s grid. Once subscribed, the rows
    /// under the new window are refetched after [`SCROLL_DEBOUNCE`] of quiet.
    pub fn scroll(&mut self, url: &str, scroll_top: usize, scroll_left: u32) -> Result<Redraw, AppError> {
        let settings = self.settings;
        let grid = self
            .grids
            .get_mut(url)
            .ok_or_else(|| AppError::UnknownUrl(url.to_string()))?;
        grid.scroll_top = scroll_top;
        grid.scroll_left = scroll_left;
        let viewport = viewport_for(&settings, grid);
        let redraw = grid.state.set_viewport(viewport);

        if let Some(notices) = &self.refresh {
            let notices = notices.clone();
            let notice = Notice {
                url: url.to_string(),
                kind: NoticeKind::Update,
            };
            grid.refresh.schedule(move || async move {
                // watcher already stopped
                let _ = notices.send(notice);
            });
        }
        Ok(redraw)
    }

    /// Refresh the grid behind `notice`. A reset drops everything and
    /// refetches a snapshot; an update fetches the rows under the viewport.
    pub async fn handle(&mut self, notice: &Notice) -> Result<Redraw, AppError> {
        let settings = self.settings;
        let grid = self
            .grids
            .get_mut(&notice.url)
            .ok_or_else(|| AppError::UnknownUrl(notice.url.clone()))?;
        if notice.is_reset() {
            grid.state.reset();
        }
        let request = if grid.state.is_awaiting_snapshot() {
            FetchRequest::Snapshot
        } else {
            FetchRequest::Window {
                viewport: grid.state.viewport(),
                cols: grid.state.columns().visible_columns(
                    grid.scroll_left,
                    settings.viewport_width,
                    DEFAULT_COLUMN_BUFFER,
                ),
            }
        };
        trace!(url = %notice.url, ?request, "fetching");
        let payload = self.source.fetch(&notice.url, &request).await?;
        apply(&settings, grid, payload)
    }

    /// Drain `notices` until cancelled or every sender is gone.
    pub async fn run(
        mut self,
        mut notices: mpsc::UnboundedReceiver<Notice>,
        cancel: CancellationToken,
    ) -> Self {
        loop {
            let notice = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                notice = notices.recv() => match notice {
                    Some(notice) => notice,
                    None => break,
                },
            };
            match self.handle(&notice).await {
                Ok(redraw) => self.log_redraw(&notice.url, &redraw),
                Err(err) => warn!(url = %notice.url, error = %err, "grid refresh failed"),
            }
        }
        debug!(grids = self.grids.len(), "watcher stopped");
        self
    }

    fn log_redraw(&self, url: &str, redraw: &Redraw) {
        let Some(grid) = self.grids.get(url) else {
            return;
        };
        match redraw {
            Redraw::Nothing => trace!(%url, "nothing to redraw"),
            Redraw::Rows(rows) => info!(%url, ?rows, "redraw rows"),
            Redraw::All => {
                let window = grid.state.window();
                info!(
                    %url,
                    top = window.viewport.top,
                    bottom = window.viewport.bottom,
                    visible = window.total_visible,
                    rows = grid.state.model().len(),
                    "redraw grid"
                );
            }
        }
    }
}

fn forward(notices: mpsc::UnboundedSender<Notice>) -> impl UpdateHandler {
    move |notice: &Notice| -> Result<(), String> {
        notices
            .send(notice.clone())
            .map_err(|_| "grid watcher has stopped".to_string())
    }
}

fn viewport_for(settings: &WatchSettings, grid: &WatchedGrid) -> Viewport {
    Viewport::from_scroll(
        grid.scroll_top,
        settings.row_height,
        settings.viewport_height,
        grid.state.model().visible_count(),
        DEFAULT_ROW_BUFFER,
    )
}

fn apply(
    settings: &WatchSettings,
    grid: &mut WatchedGrid,
    payload: GridPayload,
) -> Result<Redraw, AppError> {
    let redraw = match payload {
        GridPayload::Snapshot {
            fixed,
            scroll,
            rows,
        } => {
            if !fixed.is_empty() || !scroll.is_empty() {
                *grid.state.columns_mut() = ColumnTable::new(fixed, scroll)?;
            }
            grid.state.replace(rows)?;
            if let Some(level) = settings.collapse_level {
                grid.state.collapse_from_level(level);
            }
            Redraw::All
        }
        GridPayload::Patch { rows } => grid.state.merge(rows)?,
        GridPayload::Cells { rows, cols, cells } => {
            grid.state.merge_viewport_data(&rows, &cols, cells)?
        }
    };
    // the row buffer depends on how many rows are visible
    let viewport = viewport_for(settings, grid);
    if grid.state.set_viewport(viewport) == Redraw::All {
        return Ok(Redraw::All);
    }
    Ok(redraw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use grid_model::{Column, Row, RowPatch};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedSource {
        replies: Mutex<VecDeque<GridPayload>>,
        requests: Mutex<Vec<(String, FetchRequest)>>,
    }

    impl ScriptedSource {
        fn reply(&self, payload: GridPayload) {
            self.replies.lock().unwrap().push_back(payload);
        }

        fn requests(&self) -> Vec<(String, FetchRequest)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RowSource for ScriptedSource {
        async fn fetch(&self, url: &str, request: &FetchRequest) -> Result<GridPayload, AppError> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), request.clone()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::UnknownUrl(url.to_string()))
        }
    }

    const SETTINGS: WatchSettings = WatchSettings {
        viewport_height: 210,
        viewport_width: 400,
        row_height: 21,
        collapse_level: None,
    };

    fn snapshot() -> GridPayload {
        GridPayload::Snapshot {
            fixed: vec![Column::new("name", 150)],
            scroll: vec![Column::new("pv", 80), Column::new("delta", 80)],
            rows: vec![
                Row::root("book"),
                Row::child("deal-1", "book", 1).with_field("pv", json!(10)),
                Row::child("deal-2", "book", 1).with_field("pv", json!(20)),
            ],
        }
    }

    fn notice(url: &str, kind: NoticeKind) -> Notice {
        Notice {
            url: url.to_string(),
            kind,
        }
    }

    fn watcher(source: Arc<ScriptedSource>, settings: WatchSettings) -> GridWatcher {
        let mut watcher = GridWatcher::new(source, settings);
        watcher.track("risk");
        watcher
    }

    #[tokio::test]
    async fn first_update_loads_snapshot_then_fetches_window() {
        let source = Arc::new(ScriptedSource::default());
        let mut watcher = watcher(source.clone(), SETTINGS);
        source.reply(snapshot());
        source.reply(GridPayload::Patch {
            rows: vec![RowPatch::new("deal-2").set("pv", json!(25))],
        });

        let first = watcher.handle(&notice("risk", NoticeKind::Update)).await.unwrap();
        assert_eq!(first, Redraw::All);
        assert_eq!(watcher.grid("risk").unwrap().viewport(), Viewport::new(0, 3));

        let second = watcher.handle(&notice("risk", NoticeKind::Update)).await.unwrap();
        assert_eq!(second, Redraw::Rows(vec!["deal-2".to_string()]));

        let requests = source.requests();
        assert_eq!(requests[0].1, FetchRequest::Snapshot);
        assert_eq!(
            requests[1].1,
            FetchRequest::Window {
                viewport: Viewport::new(0, 3),
                cols: vec![0, 1, 2],
            }
        );
    }

    #[tokio::test]
    async fn reset_refetches_snapshot_and_applies_collapse_level() {
        let source = Arc::new(ScriptedSource::default());
        let settings = WatchSettings {
            collapse_level: Some(0),
            ..SETTINGS
        };
        let mut watcher = watcher(source.clone(), settings);
        source.reply(snapshot());
        watcher.handle(&notice("risk", NoticeKind::Update)).await.unwrap();
        let grid = watcher.grid("risk").unwrap();
        assert_eq!(grid.model().visible_ids(), vec!["book"]);

        source.reply(snapshot());
        let redraw = watcher.handle(&notice("risk", NoticeKind::Reset)).await.unwrap();
        assert_eq!(redraw, Redraw::All);
        assert_eq!(source.requests()[1].1, FetchRequest::Snapshot);
        assert!(!watcher.grid("risk").unwrap().is_awaiting_snapshot());
    }

    #[tokio::test]
    async fn failed_snapshot_keeps_grid_waiting() {
        let source = Arc::new(ScriptedSource::default());
        let mut watcher = watcher(source.clone(), SETTINGS);
        source.reply(GridPayload::Patch {
            rows: vec![RowPatch::new("x")],
        });
        let err = watcher
            .handle(&notice("risk", NoticeKind::Update))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Grid(_)));
        assert!(watcher.grid("risk").unwrap().is_awaiting_snapshot());

        let err = watcher
            .handle(&notice("other", NoticeKind::Update))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownUrl(url) if url == "other"));
    }

    #[tokio::test]
    async fn scrolling_moves_the_buffered_window() {
        let source = Arc::new(ScriptedSource::default());
        let mut watcher = watcher(source.clone(), SETTINGS);
        let rows = (0..100).map(|i| Row::root(format!("r{i}"))).collect();
        source.reply(GridPayload::Snapshot {
            fixed: Vec::new(),
            scroll: Vec::new(),
            rows,
        });
        watcher.handle(&notice("risk", NoticeKind::Update)).await.unwrap();
        assert_eq!(watcher.grid("risk").unwrap().viewport(), Viewport::new(0, 20));

        let redraw = watcher.scroll("risk", 21 * 50, 0).unwrap();
        assert_eq!(redraw, Redraw::All);
        assert_eq!(watcher.grid("risk").unwrap().viewport(), Viewport::new(40, 70));
    }

    #[tokio::test(start_paused = true)]
    async fn scroll_burst_refreshes_once() {
        let (transport, _server) = live_link::MemoryTransport::new();
        let session =
            SubscriptionSession::new(live_link::LinkConfig::default(), Arc::new(transport));
        let mut watcher = watcher(Arc::new(ScriptedSource::default()), SETTINGS);
        let (tx, mut rx) = mpsc::unbounded_channel();
        watcher.subscribe(&session, &RouteContext::default(), tx);

        for top in [0, 21, 42, 63] {
            watcher.scroll("risk", top, 0).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(rx.try_recv().is_err(), "still inside the quiet period");

        tokio::time::sleep(SCROLL_DEBOUNCE).await;
        assert_eq!(rx.try_recv().unwrap(), notice("risk", NoticeKind::Update));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn notices_flow_from_the_link_into_the_grid() {
        let (transport, server) = live_link::MemoryTransport::new();
        let session =
            SubscriptionSession::new(live_link::LinkConfig::default(), Arc::new(transport));
        let route = RouteContext::new("risk");
        session.navigate(route.clone());

        let source = Arc::new(ScriptedSource::default());
        source.reply(snapshot());
        let mut watcher = watcher(source.clone(), SETTINGS);
        let (tx, rx) = mpsc::unbounded_channel();
        watcher.subscribe(&session, &route, tx);
        assert!(session.is_registered("risk"));

        let cancel = CancellationToken::new();
        let link = session.spawn(cancel.clone());
        let task = tokio::spawn(watcher.run(rx, cancel.clone()));

        server.wait_for_polls(1).await;
        server.push_urls(&["risk"]);
        server.wait_for_polls(2).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        cancel.cancel();
        link.await.unwrap();
        let watcher = task.await.unwrap();
        let grid = watcher.grid("risk").unwrap();
        assert_eq!(grid.model().len(), 3);
        assert!(session.is_registered("risk"), "recurring registrations survive delivery");
        assert_eq!(source.requests().len(), 1);
    }
}
