use async_trait::async_trait;
use live_proto::{ClientId, PollData, ViewControl};

use crate::error::TransportError;

pub mod http;
pub mod memory;

pub use http::HttpTransport;
pub use memory::{MemoryServer, MemoryTransport};

/// The four calls the long-poll loop makes against a live-data server.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Obtain a fresh client id.
    async fn handshake(&self) -> Result<ClientId, TransportError>;

    /// Block until the server has updates for `client_id`, or the request times out.
    async fn poll(&self, client_id: &str) -> Result<PollData, TransportError>;

    /// Replace the server-side url set for `client_id`.
    async fn sync_registrations(
        &self,
        client_id: &str,
        urls: &[String],
    ) -> Result<(), TransportError>;

    async fn set_view_state(&self, control: &ViewControl) -> Result<(), TransportError>;
}
