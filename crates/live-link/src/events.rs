use live_proto::ClientId;
use serde::Serialize;

/// Connection transitions broadcast to UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    Connected { client_id: ClientId },
    Disconnected,
    Reconnected { client_id: ClientId },
    /// Reset notices went out after a resubscribe.
    Reset { delivered: usize, expired: usize },
}

/// Value behind the persistent status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Live,
    Paused,
    #[default]
    Disconnected,
}

impl LinkStatus {
    pub(crate) fn derive(connected: bool, paused_views: usize) -> Self {
        if !connected {
            LinkStatus::Disconnected
        } else if paused_views > 0 {
            LinkStatus::Paused
        } else {
            LinkStatus::Live
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_prefers_disconnected_over_paused() {
        assert_eq!(LinkStatus::derive(false, 2), LinkStatus::Disconnected);
        assert_eq!(LinkStatus::derive(true, 1), LinkStatus::Paused);
        assert_eq!(LinkStatus::derive(true, 0), LinkStatus::Live);
    }

    #[test]
    fn events_serialize_with_tag() {
        let value = serde_json::to_value(LinkEvent::Reconnected {
            client_id: "c-9".into(),
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"event": "reconnected", "client_id": "c-9"})
        );
    }
}
