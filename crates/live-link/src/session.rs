use live_proto::ClientId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Disconnected,
    Handshaking,
    Listening,
}

/// Connection identity and the transition bookkeeping of the long-poll loop.
///
/// `has_listened` remembers whether any session reached `Listening`, which
/// turns the next successful handshake into a resubscribe. `disconnect_reported`
/// keeps repeated failures within one outage from re-announcing the disconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub client_id: Option<ClientId>,
    pub phase: Phase,
    pub has_listened: bool,
    pub disconnect_reported: bool,
}

/// What the loop should announce after a successful handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    FirstConnect,
    Resubscribe,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Listening && self.client_id.is_some()
    }

    pub fn begin_handshake(&mut self) {
        self.client_id = None;
        self.phase = Phase::Handshaking;
    }

    pub fn handshake_succeeded(&mut self, client_id: ClientId) -> HandshakeOutcome {
        let outcome = if self.has_listened {
            HandshakeOutcome::Resubscribe
        } else {
            HandshakeOutcome::FirstConnect
        };
        self.client_id = Some(client_id);
        self.phase = Phase::Listening;
        self.has_listened = true;
        self.disconnect_reported = false;
        outcome
    }

    /// Drop the client id. Returns `true` only for the first failure of an outage.
    pub fn mark_disconnected(&mut self) -> bool {
        self.client_id = None;
        self.phase = Phase::Disconnected;
        if self.disconnect_reported {
            false
        } else {
            self.disconnect_reported = true;
            true
        }
    }
}
