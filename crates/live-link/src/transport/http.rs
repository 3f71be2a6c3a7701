use async_trait::async_trait;
use live_proto::{
    ClientId, Envelope, HandshakeData, PollData, ProtoError, RegistrationSync, ViewControl,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use super::LiveTransport;
use crate::config::LinkConfig;
use crate::error::TransportError;

/// reqwest-backed transport speaking the JSON envelope endpoints.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: Client,
    base_url: Url,
    handshake_path: String,
    poll_path: String,
    registrations_path: String,
    view_control_path: String,
}

impl HttpTransport {
    pub fn new(config: &LinkConfig) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Self::with_client(http, config)
    }

    pub fn with_client(http: Client, config: &LinkConfig) -> Result<Self, TransportError> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            http,
            base_url: Url::parse(&base)?,
            handshake_path: config.handshake_path.clone(),
            poll_path: config.poll_path.clone(),
            registrations_path: config.registrations_path.clone(),
            view_control_path: config.view_control_path.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// `{path}/{client_id}` with the id percent-encoded as one segment.
    fn scoped_endpoint(&self, path: &str, client_id: &str) -> Result<Url, TransportError> {
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|_| TransportError::Other("endpoint url cannot carry a path".into()))?
            .pop_if_empty()
            .push(client_id);
        Ok(url)
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Http(err)
    }
}

async fn checked_body(res: Response) -> Result<Vec<u8>, TransportError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(TransportError::UnexpectedStatus { status, body });
    }
    Ok(res.bytes().await.map_err(classify)?.to_vec())
}

async fn read_data<T: DeserializeOwned>(res: Response) -> Result<T, TransportError> {
    let body = checked_body(res).await?;
    let envelope: Envelope<T> = Envelope::from_slice(&body)?;
    Ok(envelope.into_result()?)
}

/// For endpoints whose `data` carries nothing the client needs.
async fn read_ack(res: Response) -> Result<(), TransportError> {
    let body = checked_body(res).await?;
    let envelope: Envelope<serde_json::Value> = Envelope::from_slice(&body)?;
    if envelope.error {
        return Err(ProtoError::Server(
            envelope
                .message
                .unwrap_or_else(|| "unspecified server error".to_string()),
        )
        .into());
    }
    Ok(())
}

#[async_trait]
impl LiveTransport for HttpTransport {
    async fn handshake(&self) -> Result<ClientId, TransportError> {
        let url = self.endpoint(&self.handshake_path)?;
        debug!(target = "live.http", %url, "handshake");
        let res = self.http.post(url).send().await.map_err(classify)?;
        let data: HandshakeData = read_data(res).await?;
        Ok(data.client_id)
    }

    async fn poll(&self, client_id: &str) -> Result<PollData, TransportError> {
        let url = self.scoped_endpoint(&self.poll_path, client_id)?;
        trace!(target = "live.http", %url, "poll");
        let res = self.http.get(url).send().await.map_err(classify)?;
        read_data(res).await
    }

    async fn sync_registrations(
        &self,
        client_id: &str,
        urls: &[String],
    ) -> Result<(), TransportError> {
        let url = self.scoped_endpoint(&self.registrations_path, client_id)?;
        debug!(target = "live.http", %url, count = urls.len(), "sync registrations");
        let body = RegistrationSync {
            urls: urls.to_vec(),
        };
        let res = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(classify)?;
        read_ack(res).await
    }

    async fn set_view_state(&self, control: &ViewControl) -> Result<(), TransportError> {
        let url = self.endpoint(&self.view_control_path)?;
        debug!(target = "live.http", %url, view_id = %control.view_id, state = ?control.state, "view control");
        let res = self
            .http
            .post(url)
            .json(control)
            .send()
            .await
            .map_err(classify)?;
        read_ack(res).await
    }
}
