use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use live_proto::RequestId;
use tokio::sync::oneshot;

use crate::error::{LinkError, LinkResult};

/// Outcome handed to a caller whose request id came back on the update channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: RequestId,
    pub message: Option<String>,
    pub waited: Duration,
}

struct PendingRequest {
    sender: oneshot::Sender<LinkResult<Completion>>,
    submitted_at: Instant,
}

/// Future returned by [`Correlator::submit`].
///
/// Resolves once with either the completion or a disconnect error. Dropping it
/// early leaves the entry in place; the resolution is discarded when it arrives.
#[derive(Debug)]
pub struct PendingReply {
    id: RequestId,
    rx: oneshot::Receiver<LinkResult<Completion>>,
}

impl PendingReply {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for PendingReply {
    type Output = LinkResult<Completion>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // sender dropped without resolving; only happens if the correlator itself went away
            Poll::Ready(Err(_)) => Poll::Ready(Err(LinkError::Disconnected)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Pending requests keyed by the id the server echoes back.
///
/// Once closed, new submissions fail with [`LinkError::Disconnected`] until
/// the correlator is reopened.
#[derive(Default)]
pub struct Correlator {
    pending: HashMap<RequestId, PendingRequest>,
    closed: bool,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, id: impl Into<RequestId>) -> LinkResult<PendingReply> {
        let id = id.into();
        if self.closed {
            return Err(LinkError::Disconnected);
        }
        if self.pending.contains_key(&id) {
            return Err(LinkError::DuplicateRequest(id));
        }
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            PendingRequest {
                sender: tx,
                submitted_at: Instant::now(),
            },
        );
        Ok(PendingReply { id, rx })
    }

    /// Resolve and remove the entry for `id`. Returns `false` for unknown ids.
    pub fn resolve(&mut self, id: &str, message: Option<String>) -> bool {
        let Some(entry) = self.pending.remove(id) else {
            return false;
        };
        let completion = Completion {
            id: id.to_string(),
            message,
            waited: entry.submitted_at.elapsed(),
        };
        // receiver may be gone; the entry is resolved either way
        let _ = entry.sender.send(Ok(completion));
        true
    }

    /// Reject every outstanding entry with [`LinkError::Disconnected`].
    pub fn reject_all(&mut self) -> usize {
        let drained: Vec<_> = self.pending.drain().collect();
        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.sender.send(Err(LinkError::Disconnected));
        }
        count
    }

    /// Reject everything outstanding and refuse further submissions.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        self.reject_all()
    }

    pub fn reopen(&mut self) {
        self.closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_matching_id_once() {
        let mut correlator = Correlator::new();
        let reply = correlator.submit("req-1").unwrap();
        assert_eq!(reply.id(), "req-1");

        assert!(correlator.resolve("req-1", Some("done".into())));
        assert!(!correlator.resolve("req-1", None));
        assert!(correlator.is_empty());

        let completion = reply.await.expect("completed");
        assert_eq!(completion.id, "req-1");
        assert_eq!(completion.message.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn duplicate_id_is_refused() {
        let mut correlator = Correlator::new();
        let _reply = correlator.submit("req-1").unwrap();
        assert_eq!(
            correlator.submit("req-1").unwrap_err(),
            LinkError::DuplicateRequest("req-1".into())
        );
        assert_eq!(correlator.len(), 1);
    }

    #[tokio::test]
    async fn reject_all_leaves_nothing_behind() {
        let mut correlator = Correlator::new();
        let first = correlator.submit("a").unwrap();
        let second = correlator.submit("b").unwrap();

        assert_eq!(correlator.reject_all(), 2);
        assert!(correlator.is_empty());
        assert_eq!(first.await, Err(LinkError::Disconnected));
        assert_eq!(second.await, Err(LinkError::Disconnected));
        assert!(!correlator.resolve("a", None));
    }

    #[tokio::test]
    async fn closed_correlator_refuses_submissions() {
        let mut correlator = Correlator::new();
        let waiting = correlator.submit("a").unwrap();
        assert_eq!(correlator.close(), 1);
        assert_eq!(waiting.await, Err(LinkError::Disconnected));
        assert_eq!(correlator.submit("b").unwrap_err(), LinkError::Disconnected);
        assert!(correlator.is_empty());

        correlator.reopen();
        assert!(correlator.submit("b").is_ok());
    }

    #[tokio::test]
    async fn dropped_reply_still_clears_entry() {
        let mut correlator = Correlator::new();
        drop(correlator.submit("gone").unwrap());
        assert!(correlator.contains("gone"));
        assert!(correlator.resolve("gone", None));
        assert!(!correlator.contains("gone"));
    }
}
