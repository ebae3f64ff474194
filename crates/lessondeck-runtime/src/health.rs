//! HTTP health checks against the managed backend.
//!
//! Intentionally minimal: no policy, just probes.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tracing::{debug, info};

/// Outcome of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthProbe {
    /// `GET /health` returned 200.
    Healthy,
    /// The server answered with another status.
    BadStatus(u16),
    /// No answer (refused, reset, timed out).
    Unreachable(String),
}

impl HealthProbe {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl std::fmt::Display for HealthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::BadStatus(status) => write!(f, "health endpoint returned {status}"),
            Self::Unreachable(reason) => write!(f, "unreachable: {reason}"),
        }
    }
}

/// HTTP client for loopback probes (system proxies bypassed).
pub fn local_client() -> reqwest::Result<Client> {
    Client::builder().no_proxy().build()
}

/// URL of the health endpoint for `port`.
pub fn health_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}/health")
}

/// Check HTTP health of a server at the given port.
pub async fn check_http_health(client: &Client, port: u16, timeout: Duration) -> HealthProbe {
    match client.get(health_url(port)).timeout(timeout).send().await {
        Ok(response) if response.status() == StatusCode::OK => HealthProbe::Healthy,
        Ok(response) => HealthProbe::BadStatus(response.status().as_u16()),
        Err(e) if e.is_timeout() => HealthProbe::Unreachable("health check timeout".to_string()),
        Err(e) => HealthProbe::Unreachable(e.to_string()),
    }
}

/// Wait for the health endpoint to return 200.
///
/// Sleeps `interval` before each of at most `attempts` probes. Returns the
/// last probe on failure.
pub async fn wait_for_http_health(
    client: &Client,
    port: u16,
    attempts: u32,
    interval: Duration,
    timeout: Duration,
) -> Result<(), HealthProbe> {
    info!(url = %health_url(port), attempts, "Waiting for backend to become healthy");

    let mut last = HealthProbe::Unreachable("no health check attempted".to_string());
    for attempt in 1..=attempts {
        sleep(interval).await;
        last = check_http_health(client, port, timeout).await;
        if last.is_healthy() {
            info!(port, attempt, "Backend is ready");
            return Ok(());
        }
        debug!(port, attempt, probe = %last, "Backend not ready yet");
    }
    Err(last)
}

/// Ask the backend to shut itself down via `POST /api/shutdown`.
///
/// Best effort: returns whether the request was acknowledged.
pub async fn request_shutdown(client: &Client, port: u16, timeout: Duration) -> bool {
    let url = format!("http://127.0.0.1:{port}/api/shutdown");
    match client.post(&url).timeout(timeout).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            debug!(port, status = %response.status(), "Shutdown request rejected");
            false
        }
        Err(e) => {
            debug!(port, error = %e, "Shutdown request failed");
            false
        }
    }
}
