//! Long-poll subscription client for live analytics data.
//!
//! A [`SubscriptionSession`] owns the server-issued client id, the url
//! registrations and the requests waiting on a correlation id. Its
//! [`run`](SubscriptionSession::run) loop handshakes, polls, dispatches and
//! recovers from transport loss, announcing `Disconnected`/`Reconnected`
//! transitions and a one-time reset to every surviving registration.

pub mod config;
pub mod correlator;
pub mod debounce;
pub mod error;
pub mod events;
pub mod link;
pub mod metrics;
pub mod registry;
pub mod route;
pub mod session;
pub mod transport;

pub use config::LinkConfig;
pub use correlator::{Completion, Correlator, PendingReply};
pub use debounce::Debouncer;
pub use error::{LinkError, LinkResult, TransportError};
pub use events::{LinkEvent, LinkStatus};
pub use link::{DispatchReport, ResetReport, SubscriptionSession};
pub use registry::{Notice, NoticeKind, RegistrationOptions, SubscriptionMode, UpdateHandler};
pub use route::RouteContext;
pub use transport::{HttpTransport, LiveTransport, MemoryServer, MemoryTransport};

pub use tokio_util::sync::CancellationToken;
