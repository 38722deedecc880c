use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::config::ApiConfig;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Invalid response body: {0}")]
    Decode(String),
}

/// Method used for a permission preflight probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    /// `OPTIONS` against a collection path.
    Options,
    /// `GET` against a single-item path.
    Get,
}

/// Normalized probe result: whatever shape the transport reported its
/// headers in, callers only ever see the `Allow` value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResponse {
    pub allow: Option<String>,
}

impl ProbeResponse {
    pub fn new(allow: Option<String>) -> Self {
        Self { allow }
    }

    /// Whether the `Allow` list contains the HTTP verb (case-insensitive).
    pub fn allows(&self, verb: &str) -> bool {
        self.allow
            .as_deref()
            .map(|allow| {
                allow
                    .split(',')
                    .any(|method| method.trim().eq_ignore_ascii_case(verb))
            })
            .unwrap_or(false)
    }
}

/// Trait for talking to the REST API backing the entities store.
pub trait ApiClient: Send + Sync + 'static {
    /// GET a JSON body from a path-and-query relative to the API base.
    fn get_json(
        &self,
        path_and_query: &str,
    ) -> impl Future<Output = Result<Value, ApiError>> + Send;

    /// Issue a permission preflight and report the `Allow` header.
    fn probe(
        &self,
        method: ProbeMethod,
        path: &str,
    ) -> impl Future<Output = Result<ProbeResponse, ApiError>> + Send;
}

/// reqwest-backed API client.
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

impl ApiClient for HttpApiClient {
    async fn get_json(&self, path_and_query: &str) -> Result<Value, ApiError> {
        let response = self
            .request(reqwest::Method::GET, path_and_query)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn probe(&self, method: ProbeMethod, path: &str) -> Result<ProbeResponse, ApiError> {
        let method = match method {
            ProbeMethod::Options => reqwest::Method::OPTIONS,
            ProbeMethod::Get => reqwest::Method::GET,
        };
        let response = self
            .request(method, path)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        let allow = response
            .headers()
            .get(reqwest::header::ALLOW)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(ProbeResponse::new(allow))
    }
}
