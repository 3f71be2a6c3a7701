use grid_model::GridError;
use live_proto::ProtoError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid data url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Protocol(#[from] ProtoError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("not watching {0}")]
    UnknownUrl(String),
}
