use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/jax/";
pub const DEFAULT_RETRY_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Settings for a [`crate::SubscriptionSession`] and its HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Root that every endpoint path is joined onto.
    pub base_url: String,
    pub handshake_path: String,
    pub poll_path: String,
    pub registrations_path: String,
    pub view_control_path: String,
    /// Fixed delay before retrying a failed handshake or poll.
    pub retry_interval: Duration,
    /// Per-request timeout; a long poll that exceeds it is simply re-issued.
    pub request_timeout: Duration,
    /// Also drop registrations with an expired route on every normal dispatch,
    /// not only when a reset is delivered.
    pub expire_on_dispatch: bool,
    pub event_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            handshake_path: "handshake".to_string(),
            poll_path: "updates".to_string(),
            registrations_path: "registrations".to_string(),
            view_control_path: "views/control".to_string(),
            retry_interval: Duration::from_millis(DEFAULT_RETRY_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            expire_on_dispatch: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl LinkConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = env::var("LIVE_LINK_BASE_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.base_url);
        let retry_interval = env::var("LIVE_LINK_RETRY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_interval);
        let request_timeout = env::var("LIVE_LINK_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);
        let expire_on_dispatch = env::var("LIVE_LINK_EXPIRE_ON_DISPATCH")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(defaults.expire_on_dispatch);
        let event_capacity = env::var("LIVE_LINK_EVENT_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &usize| *v > 0)
            .unwrap_or(defaults.event_capacity);
        Self {
            base_url,
            retry_interval,
            request_timeout,
            expire_on_dispatch,
            event_capacity,
            ..defaults
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }
}
