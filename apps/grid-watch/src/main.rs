mod config;
mod error;
mod source;
mod telemetry;
mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use live_link::{CancellationToken, LinkEvent, RouteContext, SubscriptionSession};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use config::AppConfig;
use source::HttpRowSource;
use telemetry::logging::{self, LogConfig, LogLevel};
use watch::{GridWatcher, WatchSettings};

#[derive(Parser, Debug)]
#[command(name = "grid-watch", about = "Follow live grid resources and log what would redraw")]
struct Cli {
    /// Live-update server root, e.g. http://host:8080/jax/
    #[arg(long, env = "LIVE_LINK_BASE_URL")]
    server: Option<String>,

    /// Row data root; defaults to the server root.
    #[arg(long)]
    data_url: Option<String>,

    /// Resource to follow. Repeat for several grids.
    #[arg(long = "url", short = 'u')]
    urls: Vec<String>,

    /// Page name recorded on every registration.
    #[arg(long)]
    page: Option<String>,

    #[arg(long)]
    collapse_level: Option<u16>,

    /// Initial vertical scroll offset in pixels.
    #[arg(long, default_value_t = 0)]
    scroll_top: usize,

    #[arg(long, default_value_t = 0)]
    scroll_left: u32,

    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    #[arg(long, help = "Write logs to a file instead of stderr")]
    log_file: Option<PathBuf>,

    #[arg(long, help = "Print link metrics on exit")]
    metrics: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stop server-side refresh of a view.
    Pause { view_id: String },
    /// Restart server-side refresh of a view.
    Resume { view_id: String },
}

impl Cli {
    fn apply(self, config: &mut AppConfig) -> (Option<Command>, (usize, u32)) {
        if let Some(server) = self.server {
            if config.data_base_url == config.link.base_url {
                config.data_base_url = server.clone();
            }
            config.link.base_url = server;
        }
        if let Some(data_url) = self.data_url {
            config.data_base_url = data_url;
        }
        if !self.urls.is_empty() {
            config.urls = self.urls;
        }
        if let Some(page) = self.page {
            config.page = page;
        }
        if self.collapse_level.is_some() {
            config.collapse_level = self.collapse_level;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file;
        }
        config.dump_metrics |= self.metrics;
        (self.command, (self.scroll_top, self.scroll_left))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mut config = AppConfig::from_env();
    let (command, scroll) = Cli::parse().apply(&mut config);

    logging::init(&LogConfig {
        level: config.log_level,
        file: config.log_file.clone(),
    })?;

    let session =
        SubscriptionSession::over_http(config.link.clone()).context("building http transport")?;

    match command {
        Some(Command::Pause { view_id }) => {
            session.pause_view(&view_id).await?;
            info!(%view_id, "view paused");
        }
        Some(Command::Resume { view_id }) => {
            session.resume_view(&view_id).await?;
            info!(%view_id, "view resumed");
        }
        None => follow(&config, session, scroll).await?,
    }

    if config.dump_metrics {
        print!("{}", String::from_utf8_lossy(&live_link::metrics::gather()));
    }
    Ok(())
}

async fn follow(
    config: &AppConfig,
    session: SubscriptionSession,
    (scroll_top, scroll_left): (usize, u32),
) -> anyhow::Result<()> {
    if config.urls.is_empty() {
        anyhow::bail!("nothing to watch; pass --url or set GRID_WATCH_URLS");
    }

    let http = reqwest::Client::builder()
        .timeout(config.link.request_timeout)
        .build()?;
    let source = HttpRowSource::new(http, &config.data_base_url)?;
    let mut watcher = GridWatcher::new(Arc::new(source), WatchSettings::from(config));
    for url in &config.urls {
        watcher.track(url.clone());
    }

    let route = RouteContext::new(config.page.clone());
    session.navigate(route.clone());
    let (tx, rx) = mpsc::unbounded_channel();
    watcher.subscribe(&session, &route, tx);
    // positions each grid and queues its first load
    for url in &config.urls {
        watcher.scroll(url, scroll_top, scroll_left)?;
    }

    let cancel = CancellationToken::new();
    let events = tokio::spawn(log_events(session.subscribe_events(), cancel.clone()));
    let link = session.spawn(cancel.clone());
    let grids = tokio::spawn(watcher.run(rx, cancel.clone()));

    info!(
        server = %config.link.base_url,
        data = %config.data_base_url,
        urls = ?config.urls,
        "watching"
    );
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();

    link.await?;
    let watcher = grids.await?;
    events.await?;
    for url in &config.urls {
        if let Some(grid) = watcher.grid(url) {
            info!(
                %url,
                rows = grid.model().len(),
                visible = grid.model().visible_count(),
                stale = grid.is_awaiting_snapshot(),
                "final state"
            );
        }
    }
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<LinkEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(LinkEvent::Connected { client_id }) => info!(%client_id, "connected"),
            Ok(LinkEvent::Disconnected) => warn!("connection lost; retrying"),
            Ok(LinkEvent::Reconnected { client_id }) => info!(%client_id, "reconnected"),
            Ok(LinkEvent::Reset { delivered, expired }) => {
                info!(delivered, expired, "subscriptions reset")
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event log fell behind")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
