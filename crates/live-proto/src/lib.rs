//! Wire types for the live-data endpoints.
//!
//! Kept in a dedicated crate so a server or a test double can speak the same
//! envelope format without pulling in the polling runtime.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ClientId = String;
pub type RequestId = String;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    #[error("server reported error: {0}")]
    Server(String),
    #[error("response envelope carried no data")]
    MissingData,
}

/// `{error, message?, data?}` wrapper shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            error: false,
            message: None,
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Collapse the envelope into the payload or a [`ProtoError`].
    pub fn into_result(self) -> Result<T, ProtoError> {
        if self.error {
            return Err(ProtoError::Server(
                self.message
                    .unwrap_or_else(|| "unspecified server error".to_string()),
            ));
        }
        self.data.ok_or(ProtoError::MissingData)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeData {
    #[serde(rename = "clientId", alias = "client_id")]
    pub client_id: ClientId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollData {
    #[serde(default)]
    pub updates: Vec<UpdateEntry>,
}

/// One element of a poll response.
///
/// A bare string names a subscribed resource url. An object carries the
/// correlation id of an earlier request; its arrival is the completion signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum UpdateEntry {
    Url(String),
    Correlated {
        id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl UpdateEntry {
    pub fn url(url: impl Into<String>) -> Self {
        UpdateEntry::Url(url.into())
    }

    pub fn correlated(id: impl Into<String>, message: Option<String>) -> Self {
        UpdateEntry::Correlated {
            id: id.into(),
            message,
        }
    }
}

/// Full set of urls the client currently wants notifications for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrationSync {
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ViewState {
    Pause,
    Resume,
}

/// Side-channel request asking the server to stop or restart computing a view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewControl {
    pub view_id: String,
    pub state: ViewState,
}

impl ViewControl {
    pub fn pause(view_id: impl Into<String>) -> Self {
        Self {
            view_id: view_id.into(),
            state: ViewState::Pause,
        }
    }

    pub fn resume(view_id: impl Into<String>) -> Self {
        Self {
            view_id: view_id.into(),
            state: ViewState::Resume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_update_batch() {
        let body = br#"{"error":false,"data":{"updates":["/portfolios/1",{"id":"req-7","message":"done"},{"id":"req-8"}]}}"#;
        let envelope: Envelope<PollData> = Envelope::from_slice(body).expect("valid envelope");
        let data = envelope.into_result().expect("success");
        assert_eq!(
            data.updates,
            vec![
                UpdateEntry::url("/portfolios/1"),
                UpdateEntry::correlated("req-7", Some("done".into())),
                UpdateEntry::correlated("req-8", None),
            ]
        );
    }

    #[test]
    fn error_envelope_surfaces_message() {
        let body = br#"{"error":true,"message":"unknown client"}"#;
        let envelope: Envelope<PollData> = Envelope::from_slice(body).expect("valid envelope");
        assert_eq!(
            envelope.into_result(),
            Err(ProtoError::Server("unknown client".into()))
        );
    }

    #[test]
    fn success_without_data_is_rejected() {
        let envelope: Envelope<HandshakeData> =
            Envelope::from_slice(br#"{"error":false}"#).expect("valid envelope");
        assert_eq!(envelope.into_result(), Err(ProtoError::MissingData));
    }

    #[test]
    fn handshake_accepts_both_id_spellings() {
        let camel: HandshakeData = serde_json::from_str(r#"{"clientId":"c-1"}"#).unwrap();
        let snake: HandshakeData = serde_json::from_str(r#"{"client_id":"c-1"}"#).unwrap();
        assert_eq!(camel, snake);
    }

    #[test]
    fn view_control_uses_lowercase_state() {
        let value = serde_json::to_value(ViewControl::pause("view-3")).unwrap();
        assert_eq!(value, serde_json::json!({"view_id": "view-3", "state": "pause"}));
    }

    #[test]
    fn empty_poll_defaults_to_no_updates() {
        let data: PollData = serde_json::from_str("{}").unwrap();
        assert!(data.updates.is_empty());
    }
}
