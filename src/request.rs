use async_trait::async_trait;
use reqwest::Client;

use crate::{info_time, Error, Result};

/// Contiguous candidate object IDs `[low, high)` submitted in one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub low: u64,
    pub high: u64,
}

impl QueryWindow {
    pub fn new(low: u64, chunk_size: u64) -> Result<Self> {
        let high = low.checked_add(chunk_size).ok_or(Error::IdOverflow(low))?;
        Ok(Self { low, high })
    }

    /// Largest ID actually requested.
    pub fn range_max(&self) -> u64 {
        self.high.saturating_sub(1)
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> {
        self.low..self.high
    }

    /// Comma separated ID list, the form `objectIds` expects.
    pub fn to_id_list(&self) -> String {
        self.ids()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// One query against a FeatureServer layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub where_clause: Option<String>,
    /// `None` asks for every record matching `where_clause`.
    pub window: Option<QueryWindow>,
    /// Value of the `f` parameter, e.g. `pjson`.
    pub format_code: String,
}

impl QueryRequest {
    /// Form fields in the order they are sent. Absent values are left out.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(4);
        if let Some(where_clause) = &self.where_clause {
            fields.push(("where", where_clause.clone()));
        }
        if let Some(window) = &self.window {
            fields.push(("objectIds", window.to_id_list()));
        }
        fields.push(("outFields", "*".to_string()));
        fields.push(("f", self.format_code.clone()));
        fields
    }
}

/// Anything that can answer a feature query with a raw response body.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<u8>>;
}

/// `FeatureSource` backed by a FeatureServer `query` endpoint.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeatureSource for HttpSource {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<u8>> {
        let res = self
            .client
            .post(&self.url)
            .form(&request.form_fields())
            .send()
            .await?;
        request_check(&self.url, request, res.status());

        let body = res.error_for_status()?.bytes().await?;
        Ok(body.to_vec())
    }
}

/// Logs what was sent and what came back, so a run can be traced request by request.
fn request_check(url: &str, request: &QueryRequest, status: reqwest::StatusCode) {
    let ids = match &request.window {
        Some(w) => format!("objectIds {}..={}", w.low, w.range_max()),
        None => "objectIds <all>".to_string(),
    };
    info_time!(
        "URL: {} | where: {} | {} | f: {} | Status: {}",
        url,
        request.where_clause.as_deref().unwrap_or("<none>"),
        ids,
        request.format_code,
        status
    );
}
