use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, Result};
use logscope_types::{FilterCriteria, RawLog};

/// Default timeout for backend requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Historical query contract of the log backend
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Fetch the most recent `limit` entries (initial population)
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<RawLog>>;

    /// Fetch entries matching the criteria, at most `limit` of them
    async fn query(&self, criteria: &FilterCriteria, limit: usize) -> Result<Vec<RawLog>>;
}

/// Backend client speaking `GET /logs`
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    logs_url: Url,
}

impl HttpBackend {
    /// Create a client for the given base endpoint (e.g. `http://localhost:3000`)
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self> {
        let logs_url = endpoint_url(endpoint, "logs")?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, logs_url })
    }

    /// The resolved `/logs` URL
    pub fn logs_url(&self) -> &Url {
        &self.logs_url
    }

    async fn get_logs(&self, params: &[(&str, String)]) -> Result<Vec<RawLog>> {
        debug!(url = %self.logs_url, ?params, "fetching logs");

        let response = self
            .client
            .get(self.logs_url.clone())
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let value: Value = serde_json::from_slice(&body)?;
        parse_entries(value)
    }
}

#[async_trait]
impl LogBackend for HttpBackend {
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<RawLog>> {
        self.get_logs(&[("limit", limit.to_string())]).await
    }

    async fn query(&self, criteria: &FilterCriteria, limit: usize) -> Result<Vec<RawLog>> {
        self.get_logs(&query_params(criteria, limit)).await
    }
}

/// Build query-string parameters for a search; absent criteria are omitted
pub fn query_params(criteria: &FilterCriteria, limit: usize) -> Vec<(&'static str, String)> {
    let mut params = Vec::with_capacity(4);
    if let Some(start) = criteria.start_time {
        params.push(("startTime", start.to_rfc3339_opts(SecondsFormat::Millis, true)));
    }
    if let Some(end) = criteria.end_time {
        params.push(("endTime", end.to_rfc3339_opts(SecondsFormat::Millis, true)));
    }
    if let Some(query) = criteria.query() {
        params.push(("query", query.to_string()));
    }
    params.push(("limit", limit.to_string()));
    params
}

/// Turn a response body into raw entries, rejecting anything but an array
pub fn parse_entries(value: Value) -> Result<Vec<RawLog>> {
    match value {
        Value::Array(items) => Ok(items.into_iter().map(RawLog::from).collect()),
        other => {
            let kind = json_kind(&other);
            warn!(kind, "unexpected response format from backend");
            Err(ClientError::UnexpectedShape(kind))
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Resolve `path` relative to the endpoint, keeping any base path
pub(crate) fn endpoint_url(endpoint: &str, path: &str) -> Result<Url> {
    let mut base = Url::parse(endpoint)?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path)?)
}
