//! HTTP backend abstraction for the presentation API.
//!
//! The backend performs exactly one request and reports what came back.
//! Status classification and retries live in the client's request
//! executor, so a backend never retries on its own.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lessondeck_core::ApiError;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use url::Url;

use crate::config::ClientConfig;

// ============================================================================
// Request / Response
// ============================================================================

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub const fn new(method: Method, url: Url, timeout: Duration) -> Self {
        Self {
            method,
            url,
            body: None,
            timeout,
        }
    }

    #[must_use]
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Whatever the server answered, success or not.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// `Retry-After` in seconds, when present and numeric.
    pub retry_after: Option<u64>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Translate a non-success response into the error taxonomy.
    pub fn to_error(&self) -> ApiError {
        ApiError::from_response(self.status, &self.body, self.retry_after)
    }
}

// ============================================================================
// HTTP Backend Trait
// ============================================================================

/// Trait for HTTP backends.
///
/// This abstraction allows for dependency injection of HTTP clients,
/// making it easy to test code that depends on HTTP requests.
/// Transport failures (no response at all) come back as `Err`; every
/// response, including 4xx/5xx, comes back as `Ok`.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

// ============================================================================
// Reqwest Backend
// ============================================================================

/// Production HTTP backend using reqwest.
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    /// Create a new reqwest backend with the given configuration.
    ///
    /// Proxies are bypassed when the API lives on a loopback address.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout);
        if is_loopback(&config.api_base_url) {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn is_loopback(base_url: &str) -> bool {
    let Ok(url) = Url::parse(base_url) else {
        return false;
    };
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_matches(|c| c == '[' || c == ']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

/// Map a reqwest failure (no usable response) into the taxonomy.
pub(crate) fn map_transport_error(error: &reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::timeout(format!("request timed out: {error}"))
    } else if error.is_decode() || error.is_body() {
        ApiError::internal(format!("failed to read response: {error}"))
    } else {
        ApiError::network(format!("request failed: {error}"))
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(request.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| map_transport_error(&e))?;
        let status = response.status().as_u16();
        let headers = response.headers();
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.bytes().await.map_err(|e| map_transport_error(&e))?;

        Ok(HttpResponse {
            status,
            retry_after,
            content_type,
            body,
        })
    }
}

// ============================================================================
// Fake Backend for Testing
// ============================================================================
