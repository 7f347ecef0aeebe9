//! The bare HTTP hop: no credential handling, no retries.

use std::time::Duration;

use reqwest::{header, Client};
use serde_json::Value;
use tracing::debug;

use super::{ApiError, ApiRequest};
use crate::config::Config;

/// Shared HTTP transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub(crate) struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub(crate) fn new(config: &Config) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Dispatch a request exactly as described and decode its JSON body.
    pub(crate) async fn send(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let url = self.url(request.path());
        debug!(
            method = %request.method(),
            path = request.path(),
            authenticated = request.bearer().is_some(),
            retried = request.is_retried(),
            "Dispatching request"
        );

        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .headers(request.headers().clone());
        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = Self::check_response(builder.send().await?).await?;
        Self::decode(response).await
    }

    /// Form-encoded POST, used by the password login endpoint.
    pub(crate) async fn send_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Value, ApiError> {
        debug!(method = "POST", path = path, "Dispatching form request");
        let response = self.client.post(self.url(path)).form(form).send().await?;
        let response = Self::check_response(response).await?;
        Self::decode(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Request rejected");
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Empty bodies (204, or a bare 200) decode as `null`.
    async fn decode(response: reqwest::Response) -> Result<Value, ApiError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Body is not JSON: {}", e)))
    }
}
