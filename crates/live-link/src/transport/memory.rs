use std::sync::Arc;

use async_trait::async_trait;
use live_proto::{ClientId, PollData, UpdateEntry, ViewControl};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use super::LiveTransport;
use crate::error::TransportError;

/// What the next outstanding poll resolves with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    Updates(Vec<UpdateEntry>),
    Fail(String),
    Timeout,
}

#[derive(Default)]
struct Record {
    issued_ids: u64,
    handshakes: usize,
    handshake_failures: usize,
    synced: Vec<(ClientId, Vec<String>)>,
    controls: Vec<ViewControl>,
}

struct Shared {
    record: Mutex<Record>,
    polls: watch::Sender<usize>,
}

/// In-process transport driven by a [`MemoryServer`] handle.
///
/// Polls block until the server pushes a step. Once the server handle is
/// dropped, polls never complete.
pub struct MemoryTransport {
    shared: Arc<Shared>,
    steps: tokio::sync::Mutex<mpsc::UnboundedReceiver<PollStep>>,
}

/// Test-side handle scripting a [`MemoryTransport`] and inspecting what it saw.
#[derive(Clone)]
pub struct MemoryServer {
    shared: Arc<Shared>,
    steps: mpsc::UnboundedSender<PollStep>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (polls, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            record: Mutex::new(Record::default()),
            polls,
        });
        let transport = Self {
            shared: shared.clone(),
            steps: tokio::sync::Mutex::new(rx),
        };
        (transport, MemoryServer { shared, steps: tx })
    }
}

impl MemoryServer {
    pub fn push(&self, step: PollStep) {
        // receiver lives as long as the transport
        let _ = self.steps.send(step);
    }

    pub fn push_updates(&self, entries: Vec<UpdateEntry>) {
        self.push(PollStep::Updates(entries));
    }

    pub fn push_urls(&self, urls: &[&str]) {
        self.push_updates(urls.iter().map(|url| UpdateEntry::url(*url)).collect());
    }

    pub fn fail_next_poll(&self, reason: impl Into<String>) {
        self.push(PollStep::Fail(reason.into()));
    }

    pub fn time_out_next_poll(&self) {
        self.push(PollStep::Timeout);
    }

    /// Make the next `count` handshakes fail.
    pub fn fail_handshakes(&self, count: usize) {
        self.shared.record.lock().handshake_failures += count;
    }

    pub fn handshake_count(&self) -> usize {
        self.shared.record.lock().handshakes
    }

    pub fn poll_count(&self) -> usize {
        *self.shared.polls.borrow()
    }

    /// Wait until at least `count` polls have been issued.
    pub async fn wait_for_polls(&self, count: usize) {
        let mut rx = self.shared.polls.subscribe();
        // sender is owned by `self.shared`, so this cannot fail
        let _ = rx.wait_for(|issued| *issued >= count).await;
    }

    pub fn synced(&self) -> Vec<(ClientId, Vec<String>)> {
        self.shared.record.lock().synced.clone()
    }

    pub fn last_synced_urls(&self) -> Option<Vec<String>> {
        self.shared
            .record
            .lock()
            .synced
            .last()
            .map(|(_, urls)| urls.clone())
    }

    pub fn view_controls(&self) -> Vec<ViewControl> {
        self.shared.record.lock().controls.clone()
    }
}

#[async_trait]
impl LiveTransport for MemoryTransport {
    async fn handshake(&self) -> Result<ClientId, TransportError> {
        let mut record = self.shared.record.lock();
        record.handshakes += 1;
        if record.handshake_failures > 0 {
            record.handshake_failures -= 1;
            return Err(TransportError::Other("handshake refused".into()));
        }
        record.issued_ids += 1;
        Ok(format!("client-{}", record.issued_ids))
    }

    async fn poll(&self, _client_id: &str) -> Result<PollData, TransportError> {
        let mut steps = self.steps.lock().await;
        self.shared.polls.send_modify(|issued| *issued += 1);
        match steps.recv().await {
            Some(PollStep::Updates(updates)) => Ok(PollData { updates }),
            Some(PollStep::Fail(reason)) => Err(TransportError::Other(reason)),
            Some(PollStep::Timeout) => Err(TransportError::Timeout),
            None => std::future::pending().await,
        }
    }

    async fn sync_registrations(
        &self,
        client_id: &str,
        urls: &[String],
    ) -> Result<(), TransportError> {
        self.shared
            .record
            .lock()
            .synced
            .push((client_id.to_string(), urls.to_vec()));
        Ok(())
    }

    async fn set_view_state(&self, control: &ViewControl) -> Result<(), TransportError> {
        self.shared.record.lock().controls.push(control.clone());
        Ok(())
    }
}
