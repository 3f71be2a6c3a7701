use live_proto::ProtoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Protocol(#[from] ProtoError),
    #[error("request timed out")]
    Timeout,
    #[error("transport closed")]
    Closed,
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// A client-side read timeout on a long poll is routine, not a lost connection.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout => true,
            TransportError::Http(err) => err.is_timeout(),
            _ => false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("live session disconnected before the request completed")]
    Disconnected,
    #[error("request id {0} is already pending")]
    DuplicateRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<TransportError> for LinkError {
    fn from(value: TransportError) -> Self {
        LinkError::Transport(value.to_string())
    }
}

pub type LinkResult<T> = Result<T, LinkError>;
