use async_trait::async_trait;
use grid_model::{CellValue, Column, Row, RowId, RowPatch, Viewport};
use live_proto::Envelope;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::trace;
use url::Url;

use crate::error::AppError;

/// Body of a row-data response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridPayload {
    /// Every row. Column lists are optional; empty keeps the current layout.
    Snapshot {
        #[serde(default)]
        fixed: Vec<Column>,
        #[serde(default)]
        scroll: Vec<Column>,
        rows: Vec<Row>,
    },
    Patch {
        rows: Vec<RowPatch>,
    },
    /// Row-major cell block for the requested window.
    Cells {
        rows: Vec<RowId>,
        cols: Vec<usize>,
        cells: Vec<CellValue>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Snapshot,
    Window { viewport: Viewport, cols: Vec<usize> },
}

#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch(&self, url: &str, request: &FetchRequest) -> Result<GridPayload, AppError>;
}

/// Fetches `{base}/{resource}` and decodes the JSON envelope.
#[derive(Clone, Debug)]
pub struct HttpRowSource {
    http: Client,
    base_url: Url,
}

impl HttpRowSource {
    pub fn new(http: Client, base_url: &str) -> Result<Self, AppError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            http,
            base_url: Url::parse(&base)?,
        })
    }

    pub fn resource_url(&self, resource: &str, request: &FetchRequest) -> Result<Url, AppError> {
        let mut url = self.base_url.join(resource.trim_start_matches('/'))?;
        match request {
            FetchRequest::Snapshot => {
                url.query_pairs_mut().append_pair("snapshot", "1");
            }
            FetchRequest::Window { viewport, cols } => {
                let cols = cols
                    .iter()
                    .map(|col| col.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                url.query_pairs_mut()
                    .append_pair("top", &viewport.top.to_string())
                    .append_pair("bottom", &viewport.bottom.to_string())
                    .append_pair("cols", &cols);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl RowSource for HttpRowSource {
    async fn fetch(&self, resource: &str, request: &FetchRequest) -> Result<GridPayload, AppError> {
        let url = self.resource_url(resource, request)?;
        trace!(%url, "fetch rows");
        let res = self.http.get(url.clone()).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(AppError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = res.bytes().await?;
        decode_payload(&body)
    }
}

fn decode_payload(body: &[u8]) -> Result<GridPayload, AppError> {
    let envelope: Envelope<GridPayload> = Envelope::from_slice(body)?;
    Ok(envelope.into_result()?)
}
