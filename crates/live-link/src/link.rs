use std::collections::HashSet;
use std::sync::Arc;

use live_proto::{ClientId, RequestId, UpdateEntry, ViewControl};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::correlator::{Correlator, PendingReply};
use crate::error::{LinkResult, TransportError};
use crate::events::{LinkEvent, LinkStatus};
use crate::metrics;
use crate::registry::{Delivery, RegistrationOptions, Registry, UpdateHandler};
use crate::route::{RouteContext, RouteState};
use crate::session::{HandshakeOutcome, SessionState};
use crate::transport::{HttpTransport, LiveTransport};

/// Counts from dispatching one poll batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub resolved: usize,
    pub delivered: usize,
    pub failed: usize,
    pub unmatched: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub delivered: usize,
    pub failed: usize,
    pub expired: usize,
}

enum ListenExit {
    Cancelled,
    Failed,
}

struct Inner {
    config: LinkConfig,
    transport: Arc<dyn LiveTransport>,
    registry: Mutex<Registry>,
    correlator: Mutex<Correlator>,
    session: Mutex<SessionState>,
    route: RouteState,
    paused_views: Mutex<HashSet<String>>,
    events: broadcast::Sender<LinkEvent>,
    status: watch::Sender<LinkStatus>,
    registrations_changed: Notify,
}

/// One live-data connection together with everything scoped to it: the
/// registrations, the pending requests and the session identity.
///
/// Cheap to clone. Drive it with [`SubscriptionSession::run`] (or
/// [`SubscriptionSession::spawn`]) from exactly one task.
#[derive(Clone)]
pub struct SubscriptionSession {
    inner: Arc<Inner>,
}

impl SubscriptionSession {
    pub fn new(config: LinkConfig, transport: Arc<dyn LiveTransport>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (status, _) = watch::channel(LinkStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                registry: Mutex::new(Registry::new()),
                correlator: Mutex::new(Correlator::new()),
                session: Mutex::new(SessionState::new()),
                route: RouteState::default(),
                paused_views: Mutex::new(HashSet::new()),
                events,
                status,
                registrations_changed: Notify::new(),
            }),
        }
    }

    /// Session over [`HttpTransport`] built from `config`.
    pub fn over_http(config: LinkConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.inner.session.lock().client_id.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.inner.status.subscribe()
    }

    /// Store `handler` for `url`, replacing any earlier one. Returns `true` on replace.
    pub fn register<H>(&self, url: impl Into<String>, options: RegistrationOptions, handler: H) -> bool
    where
        H: UpdateHandler + 'static,
    {
        let url = url.into();
        let (replaced, dirty) = {
            let mut registry = self.inner.registry.lock();
            let replaced = registry.register(url.clone(), options, Arc::new(handler));
            (replaced, registry.is_dirty())
        };
        debug!(target = "live.link", %url, replaced, "registered");
        if dirty {
            self.inner.registrations_changed.notify_one();
        }
        replaced
    }

    pub fn unregister(&self, url: &str) -> bool {
        let removed = self.inner.registry.lock().unregister(url).is_some();
        if removed {
            debug!(target = "live.link", %url, "unregistered");
            self.inner.registrations_changed.notify_one();
        }
        removed
    }

    pub fn is_registered(&self, url: &str) -> bool {
        self.inner.registry.lock().contains(url)
    }

    pub fn registered_urls(&self) -> Vec<String> {
        self.inner.registry.lock().urls()
    }

    /// Fresh id for a request whose completion arrives on the update channel.
    pub fn next_request_id(&self) -> RequestId {
        Uuid::new_v4().to_string()
    }

    /// Await the update entry carrying `id`.
    pub fn submit(&self, id: impl Into<RequestId>) -> LinkResult<PendingReply> {
        let mut correlator = self.inner.correlator.lock();
        let reply = correlator.submit(id)?;
        metrics::PENDING_REQUESTS.set(correlator.len() as i64);
        Ok(reply)
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.lock().len()
    }

    pub fn route(&self) -> RouteContext {
        self.inner.route.current()
    }

    pub fn navigate(&self, route: RouteContext) {
        debug!(target = "live.link", page = %route.page, "navigate");
        self.inner.route.navigate(route);
    }

    /// Drop registrations whose route expired under the current one.
    pub fn clean(&self) -> Vec<String> {
        let current = self.inner.route.current();
        let expired = self.inner.registry.lock().prune_expired(&current);
        if !expired.is_empty() {
            debug!(target = "live.link", count = expired.len(), "dropped expired registrations");
            self.inner.registrations_changed.notify_one();
        }
        expired
    }

    pub async fn pause_view(&self, view_id: &str) -> Result<(), TransportError> {
        self.inner
            .transport
            .set_view_state(&ViewControl::pause(view_id))
            .await?;
        self.inner.paused_views.lock().insert(view_id.to_string());
        info!(target = "live.link", %view_id, "view paused");
        self.refresh_status();
        Ok(())
    }

    pub async fn resume_view(&self, view_id: &str) -> Result<(), TransportError> {
        self.inner
            .transport
            .set_view_state(&ViewControl::resume(view_id))
            .await?;
        self.inner.paused_views.lock().remove(view_id);
        info!(target = "live.link", %view_id, "view resumed");
        self.refresh_status();
        Ok(())
    }

    /// Route one poll batch, in server order. Correlated entries only ever
    /// reach the correlator. Each url fires at most once per batch.
    pub fn dispatch(&self, updates: Vec<UpdateEntry>) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut seen = HashSet::new();
        let mut deliveries: Vec<Delivery> = Vec::new();
        {
            let mut registry = self.inner.registry.lock();
            if self.inner.config.expire_on_dispatch {
                let current = self.inner.route.current();
                report.expired = registry.prune_expired(&current).len();
            }
            let mut correlator = self.inner.correlator.lock();
            for entry in updates {
                match entry {
                    UpdateEntry::Correlated { id, message } => {
                        if correlator.resolve(&id, message) {
                            metrics::DISPATCHED.with_label_values(&["correlated"]).inc();
                            report.resolved += 1;
                        } else {
                            debug!(target = "live.link", request_id = %id, "no pending request for id");
                            metrics::DISPATCHED.with_label_values(&["unmatched"]).inc();
                            report.unmatched += 1;
                        }
                    }
                    UpdateEntry::Url(url) => {
                        if !seen.insert(url.clone()) {
                            continue;
                        }
                        match registry.take_for_update(&url) {
                            Some(delivery) => deliveries.push(delivery),
                            None => {
                                debug!(target = "live.link", %url, "no registration for url");
                                metrics::DISPATCHED.with_label_values(&["unmatched"]).inc();
                                report.unmatched += 1;
                            }
                        }
                    }
                }
            }
            metrics::PENDING_REQUESTS.set(correlator.len() as i64);
        }

        for delivery in deliveries {
            metrics::DISPATCHED.with_label_values(&["url"]).inc();
            match delivery.invoke() {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(
                        target = "live.link",
                        url = %delivery.notice.url,
                        error = %err,
                        "update handler failed"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Drop expired registrations silently, then tell every remaining one
    /// that its state must be refetched.
    pub fn deliver_reset(&self) -> ResetReport {
        let current = self.inner.route.current();
        let (expired, deliveries) = {
            let mut registry = self.inner.registry.lock();
            let expired = registry.prune_expired(&current);
            (expired, registry.take_reset_deliveries())
        };
        let mut report = ResetReport {
            expired: expired.len(),
            ..ResetReport::default()
        };
        for delivery in deliveries {
            metrics::DISPATCHED.with_label_values(&["reset"]).inc();
            match delivery.invoke() {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(
                        target = "live.link",
                        url = %delivery.notice.url,
                        error = %err,
                        "reset handler failed"
                    );
                    report.failed += 1;
                }
            }
        }
        info!(
            target = "live.link",
            delivered = report.delivered,
            expired = report.expired,
            "reset delivered"
        );
        self.emit(LinkEvent::Reset {
            delivered: report.delivered + report.failed,
            expired: report.expired,
        });
        report
    }

    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.run(cancel).await })
    }

    /// Handshake, poll and recover until `cancel` fires. On exit every pending
    /// request has been rejected, later submissions are refused and the client
    /// id is cleared.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(target = "live.link", "long-poll loop starting");
        self.inner.correlator.lock().reopen();
        loop {
            let Some(client_id) = self.connect(&cancel).await else {
                break;
            };
            match self.listen(&client_id, &cancel).await {
                ListenExit::Cancelled => break,
                ListenExit::Failed => {
                    if !self.backoff(&cancel).await {
                        break;
                    }
                }
            }
        }
        self.teardown();
        info!(target = "live.link", "long-poll loop stopped");
    }

    async fn connect(&self, cancel: &CancellationToken) -> Option<ClientId> {
        loop {
            self.inner.session.lock().begin_handshake();
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return None,
                res = self.inner.transport.handshake() => res,
            };
            match attempt {
                Ok(client_id) => {
                    self.on_handshake(client_id.clone());
                    return Some(client_id);
                }
                Err(err) => {
                    metrics::HANDSHAKE_FAILURES.inc();
                    warn!(target = "live.link", error = %err, "handshake failed");
                    self.on_transport_failure();
                    if !self.backoff(cancel).await {
                        return None;
                    }
                }
            }
        }
    }

    fn on_handshake(&self, client_id: ClientId) {
        let outcome = self
            .inner
            .session
            .lock()
            .handshake_succeeded(client_id.clone());
        // a new client id starts with an empty server-side url set
        self.inner.registry.lock().mark_dirty();
        self.refresh_status();
        match outcome {
            HandshakeOutcome::FirstConnect => {
                info!(target = "live.link", client_id = %client_id, "connected");
                self.emit(LinkEvent::Connected { client_id });
            }
            HandshakeOutcome::Resubscribe => {
                metrics::RECONNECTS.inc();
                info!(target = "live.link", client_id = %client_id, "reconnected");
                self.emit(LinkEvent::Reconnected { client_id });
                self.deliver_reset();
            }
        }
    }

    async fn listen(&self, client_id: &str, cancel: &CancellationToken) -> ListenExit {
        loop {
            if let Err(exit) = self.sync_registrations(client_id, cancel).await {
                return exit;
            }

            // a registration change is synced beside the outstanding poll, never
            // by dropping it: the server may already have handed it a batch
            let mut poll = self.inner.transport.poll(client_id);
            let polled = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return ListenExit::Cancelled,
                    res = &mut poll => break res,
                    _ = self.inner.registrations_changed.notified() => {
                        if let Err(exit) = self.sync_registrations(client_id, cancel).await {
                            return exit;
                        }
                    }
                }
            };

            match polled {
                Ok(data) if data.updates.is_empty() => {
                    metrics::POLLS.with_label_values(&["empty"]).inc();
                }
                Ok(data) => {
                    metrics::POLLS.with_label_values(&["updates"]).inc();
                    let report = self.dispatch(data.updates);
                    debug!(
                        target = "live.link",
                        resolved = report.resolved,
                        delivered = report.delivered,
                        failed = report.failed,
                        unmatched = report.unmatched,
                        "dispatched poll batch"
                    );
                }
                Err(err) if err.is_timeout() => {
                    metrics::POLLS.with_label_values(&["timeout"]).inc();
                    debug!(target = "live.link", client_id = %client_id, "poll timed out; re-polling");
                }
                Err(err) => {
                    metrics::POLLS.with_label_values(&["error"]).inc();
                    warn!(target = "live.link", client_id = %client_id, error = %err, "poll failed");
                    self.on_transport_failure();
                    return ListenExit::Failed;
                }
            }
        }
    }

    /// Push the url set to the server if it changed since the last push.
    async fn sync_registrations(
        &self,
        client_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ListenExit> {
        let Some(urls) = self.take_dirty_urls() else {
            return Ok(());
        };
        let synced = tokio::select! {
            _ = cancel.cancelled() => return Err(ListenExit::Cancelled),
            res = self.inner.transport.sync_registrations(client_id, &urls) => res,
        };
        if let Err(err) = synced {
            self.inner.registry.lock().mark_dirty();
            warn!(target = "live.link", client_id = %client_id, error = %err, "registration sync failed");
            self.on_transport_failure();
            return Err(ListenExit::Failed);
        }
        debug!(target = "live.link", client_id = %client_id, count = urls.len(), "registrations synced");
        Ok(())
    }

    fn take_dirty_urls(&self) -> Option<Vec<String>> {
        self.inner.registry.lock().take_dirty()
    }

    async fn backoff(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.inner.config.retry_interval) => true,
        }
    }

    fn on_transport_failure(&self) {
        let first = self.inner.session.lock().mark_disconnected();
        self.reject_pending();
        self.refresh_status();
        if first {
            info!(target = "live.link", "disconnected");
            self.emit(LinkEvent::Disconnected);
        }
    }

    /// Requests submitted after this fail immediately until `run` starts again.
    fn teardown(&self) {
        self.inner.session.lock().mark_disconnected();
        let rejected = self.inner.correlator.lock().close();
        metrics::PENDING_REQUESTS.set(0);
        if rejected > 0 {
            debug!(target = "live.link", rejected, "rejected pending requests");
        }
        self.refresh_status();
    }

    fn reject_pending(&self) {
        let rejected = self.inner.correlator.lock().reject_all();
        metrics::PENDING_REQUESTS.set(0);
        if rejected > 0 {
            debug!(target = "live.link", rejected, "rejected pending requests");
        }
    }

    fn refresh_status(&self) {
        let connected = self.inner.session.lock().is_connected();
        let paused = self.inner.paused_views.lock().len();
        self.inner
            .status
            .send_replace(LinkStatus::derive(connected, paused));
    }

    fn emit(&self, event: LinkEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }
}
