//! HTTP implementation of [`Transport`] on top of `reqwest`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{env, time::Duration};
use tracing::{debug, instrument, warn};

use torm_core::{
    document::{Document, ID_FIELD},
    error::{TormError, TormResult},
    query::Query,
    transport::{HealthStatus, Transport, TransportBuilder},
};

use crate::wire::{
    CountResponse, DataRequest, DataResponse, DocumentsResponse, ErrorResponse, KeyWriteResponse,
    SuccessResponse, ValueRequest, ValueResponse, WireBody,
};

/// Server address used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";
/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable holding the server address.
pub const URL_ENV: &str = "TORM_URL";
/// Environment variable holding the per-request timeout in whole seconds.
pub const TIMEOUT_ENV: &str = "TORM_TIMEOUT_SECS";

/// A [`Transport`] talking to a ToonStore server over HTTP.
///
/// Every call is a single request bounded by the configured timeout. Transport failures and
/// non-success statuses become [`TormError::Gateway`]; a 404 from the single-document and key
/// endpoints becomes `None`.
///
/// # Example
///
/// ```ignore
/// use torm_http::HttpTransport;
/// use torm_core::transport::TransportBuilder;
///
/// let transport = HttpTransport::builder()
///     .base_url("http://localhost:3001")
///     .timeout(Duration::from_secs(2))
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Creates a builder with the default address, timeout and user agent.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    /// Returns the server address requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the URL of an endpoint from unescaped path segments.
    fn endpoint(&self, segments: &[&str]) -> TormResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TormError::Initialization(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> TormResult<Response> {
        request
            .send()
            .await
            .map_err(|err| TormError::gateway(operation, err))
    }

    /// Decodes a success body, or turns any other status into a gateway error.
    async fn decode<R>(&self, operation: &str, response: Response) -> TormResult<R>
    where
        R: DeserializeOwned + WireBody,
    {
        let status = response.status();

        if !status.is_success() {
            let cause = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| status.to_string());
            warn!(operation, status = status.as_u16(), %cause, "request rejected");

            return Err(TormError::gateway_status(operation, status.as_u16(), cause));
        }

        let body: R = response
            .json()
            .await
            .map_err(|err| TormError::gateway_status(operation, status.as_u16(), err))?;

        match body.error() {
            Some(cause) => Err(TormError::gateway_status(operation, status.as_u16(), cause)),
            None => Ok(body),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, data))]
    async fn create_document(&self, collection: &str, data: Document) -> TormResult<Document> {
        let url = self.endpoint(&["api", collection])?;
        let response = self
            .send("create", self.client.post(url).json(&DataRequest { data: &data }))
            .await?;
        let body: DataResponse = self.decode("create", response).await?;

        let mut stored = body.data;
        if let Some(id) = body.id {
            stored.entry(ID_FIELD).or_insert(Value::String(id));
        }

        debug!(id = ?stored.get(ID_FIELD), "document created");
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn find_documents(&self, collection: &str) -> TormResult<Vec<Document>> {
        let url = self.endpoint(&["api", collection])?;
        let response = self.send("find", self.client.get(url)).await?;
        let body: DocumentsResponse = self.decode("find", response).await?;

        Ok(body.documents)
    }

    #[instrument(skip(self))]
    async fn find_document(&self, collection: &str, id: &str) -> TormResult<Option<Document>> {
        let url = self.endpoint(&["api", collection, id])?;
        let response = self.send("find_by_id", self.client.get(url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("document not found");
            return Ok(None);
        }

        Ok(Some(self.decode("find_by_id", response).await?))
    }

    #[instrument(skip(self, query), fields(filters = query.filters.len()))]
    async fn query_documents(&self, collection: &str, query: &Query) -> TormResult<Vec<Document>> {
        let url = self.endpoint(&["api", collection, "query"])?;
        let response = self.send("query", self.client.post(url).json(query)).await?;
        let body: DocumentsResponse = self.decode("query", response).await?;

        debug!(returned = body.documents.len(), "query answered");
        Ok(body.documents)
    }

    #[instrument(skip(self, data))]
    async fn update_document(&self, collection: &str, id: &str, data: Document) -> TormResult<Document> {
        let url = self.endpoint(&["api", collection, id])?;
        let response = self
            .send("update", self.client.put(url).json(&DataRequest { data: &data }))
            .await?;
        let body: DataResponse = self.decode("update", response).await?;

        Ok(body.data)
    }

    #[instrument(skip(self))]
    async fn delete_document(&self, collection: &str, id: &str) -> TormResult<bool> {
        let url = self.endpoint(&["api", collection, id])?;
        let response = self.send("delete", self.client.delete(url)).await?;
        let body: SuccessResponse = self.decode("delete", response).await?;

        Ok(body.success)
    }

    #[instrument(skip(self))]
    async fn count_documents(&self, collection: &str) -> TormResult<u64> {
        let url = self.endpoint(&["api", collection, "count"])?;
        let response = self.send("count", self.client.get(url)).await?;
        let body: CountResponse = self.decode("count", response).await?;

        Ok(body.count)
    }

    #[instrument(skip(self))]
    async fn get_key(&self, key: &str) -> TormResult<Option<String>> {
        let url = self.endpoint(&["api", "keys", key])?;
        let response = self.send("get_key", self.client.get(url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: ValueResponse = self.decode("get_key", response).await?;
        Ok(body.value)
    }

    #[instrument(skip(self, value))]
    async fn set_key(&self, key: &str, value: String) -> TormResult<()> {
        let url = self.endpoint(&["api", "keys", key])?;
        let response = self
            .send("set_key", self.client.put(url).json(&ValueRequest { value: &value }))
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(());
        }

        self.decode::<KeyWriteResponse>("set_key", response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn health(&self) -> TormResult<HealthStatus> {
        let url = self.endpoint(&["health"])?;
        let response = self.send("health", self.client.get(url)).await?;
        let status = response.status();

        let body: HealthStatus = response
            .json()
            .await
            .map_err(|err| TormError::gateway_status("health", status.as_u16(), err))?;

        if !status.is_success() {
            return Err(TormError::gateway_status("health", status.as_u16(), body.status));
        }

        Ok(body)
    }

    #[instrument(skip(self))]
    async fn info(&self) -> TormResult<Value> {
        let response = self.send("info", self.client.get(self.base_url.clone())).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(TormError::gateway_status("info", status.as_u16(), status));
        }

        response
            .json()
            .await
            .map_err(|err| TormError::gateway_status("info", status.as_u16(), err))
    }
}

/// Builder for [`HttpTransport`] instances.
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: String,
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("torm/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpTransportBuilder {
    /// Starts from `TORM_URL` and `TORM_TIMEOUT_SECS`, falling back to the defaults.
    pub fn from_env() -> Self {
        let mut builder = Self::default();

        if let Ok(url) = env::var(URL_ENV) {
            builder = builder.base_url(url);
        }

        if let Ok(raw) = env::var(TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => builder = builder.timeout(Duration::from_secs(secs)),
                Err(err) => warn!(value = %raw, error = %err, "ignoring invalid {TIMEOUT_ENV}"),
            }
        }

        builder
    }

    /// Sets the server address, e.g. `http://localhost:3001`.
    ///
    /// A trailing slash is ignored; a path prefix is kept in front of every endpoint.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the `User-Agent` header sent with every request.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait]
impl TransportBuilder for HttpTransportBuilder {
    type Transport = HttpTransport;

    async fn build(self) -> TormResult<Self::Transport> {
        let base_url = Url::parse(self.base_url.trim_end_matches('/'))
            .map_err(|err| TormError::Initialization(format!("invalid base URL '{}': {err}", self.base_url)))?;

        if base_url.cannot_be_a_base() {
            return Err(TormError::Initialization(format!("{base_url} cannot be a base URL")));
        }

        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .build()
            .map_err(|err| TormError::Initialization(err.to_string()))?;

        Ok(HttpTransport { client, base_url })
    }
}
