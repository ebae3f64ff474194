//! Typed client for the presentation API.
//!
//! Every request goes through [`PresentationApiClient::execute`], which
//! translates failures into [`ApiError`] and applies the operation's
//! [`RetryPolicy`]. Nothing else in the crate retries a request.

mod exports;
mod jobs;

use std::sync::Arc;

use lessondeck_core::ApiError;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::endpoints::parse_base_url;
use crate::http::{HttpBackend, HttpRequest, HttpResponse, ReqwestBackend};
use crate::retry::RetryPolicy;

pub use exports::ExportStatusSource;
pub use jobs::PollOptions;

// ============================================================================
// Client
// ============================================================================

/// Client for the presentation API.
///
/// Generic over the HTTP backend so tests can inject canned responses.
/// Production code uses the default `ReqwestBackend`. Cloning is cheap and
/// clones share the backend.
pub struct PresentationApiClient<B: HttpBackend = ReqwestBackend> {
    pub(crate) backend: Arc<B>,
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) base_url: Url,
}

impl<B: HttpBackend> Clone for PresentationApiClient<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: Arc::clone(&self.config),
            base_url: self.base_url.clone(),
        }
    }
}

impl PresentationApiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let backend = ReqwestBackend::new(&config)?;
        Self::with_backend(config, backend)
    }
}

impl<B: HttpBackend> PresentationApiClient<B> {
    /// Create a client with a custom backend.
    pub fn with_backend(config: ClientConfig, backend: B) -> Result<Self, ApiError> {
        let base_url = parse_base_url(&config.api_base_url)?;
        Ok(Self {
            backend: Arc::new(backend),
            config: Arc::new(config),
            base_url,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> HttpRequest {
        HttpRequest::new(method, url, self.config.timeout)
    }

    /// Send a request, retrying per `policy`.
    ///
    /// Only errors with `retry_recommended` are retried. A `Retry-After`
    /// hint replaces the computed delay.
    pub(crate) async fn execute(
        &self,
        request: &HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse, ApiError> {
        let mut retry = 0;
        loop {
            let error = match self.backend.send(request).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => response.to_error(),
                Err(error) => error,
            };

            if !error.retry_recommended || retry >= policy.max_retries {
                debug!(
                    method = %request.method,
                    url = %request.url,
                    code = ?error.code,
                    "request failed"
                );
                return Err(error);
            }

            retry += 1;
            let delay = policy.delay_for(retry, error.retry_after_seconds);
            warn!(
                method = %request.method,
                url = %request.url,
                attempt = retry,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error.technical_message,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Execute and decode a JSON body.
    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &HttpRequest,
        policy: RetryPolicy,
    ) -> Result<T, ApiError> {
        let response = self.execute(request, policy).await?;
        decode_json(&response, &request.url)
    }
}

pub(crate) fn decode_json<T: DeserializeOwned>(
    response: &HttpResponse,
    url: &Url,
) -> Result<T, ApiError> {
    serde_json::from_slice(&response.body).map_err(|e| {
        ApiError::internal(format!("invalid response from {url}: {e}"))
            .not_retryable()
    })
}
