//! Public configuration for the presentation API and progress clients.
//!
//! Both configs follow the same builder pattern: start from `new()` (or
//! `from_settings`) and override individual values with `with_*` methods.

use std::time::Duration;

use lessondeck_core::Settings;

use crate::retry::RetryPolicies;

/// Configuration for [`PresentationApiClient`](crate::PresentationApiClient).
///
/// # Example
///
/// ```
/// use lessondeck_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_api_base_url("http://127.0.0.1:8123/api")
///     .with_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API, including the `/api` prefix.
    pub(crate) api_base_url: String,
    /// Base URL of the socket server (`ws://` or `wss://`).
    pub(crate) ws_base_url: String,
    /// Identifier the socket endpoints are parameterized by.
    pub(crate) user_id: String,
    /// User agent string for HTTP requests
    pub(crate) user_agent: String,
    /// Per-request timeout
    pub(crate) timeout: Duration,
    /// TCP connect timeout
    pub(crate) connect_timeout: Duration,
    /// Retry policy for each operation
    pub(crate) retry: RetryPolicies,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ClientConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from application settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_base_url: settings.effective_api_base_url(),
            ws_base_url: settings.effective_ws_base_url(),
            user_id: settings.effective_user_id(),
            user_agent: concat!("lessondeck-client/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(settings.effective_request_timeout_secs()),
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicies::default(),
        }
    }

    /// Set the REST API base URL.
    ///
    /// Defaults to `http://127.0.0.1:8000/api`.
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the socket base URL.
    ///
    /// Defaults to the API base URL with a `ws` scheme and without `/api`.
    #[must_use]
    pub fn with_ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the per-request timeout.
    ///
    /// Defaults to 30 seconds.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Replace the per-operation retry policies.
    #[must_use]
    pub const fn with_retry_policies(mut self, retry: RetryPolicies) -> Self {
        self.retry = retry;
        self
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn ws_base_url(&self) -> &str {
        &self.ws_base_url
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub const fn retry_policies(&self) -> &RetryPolicies {
        &self.retry
    }

    /// Socket endpoint for job progress: `{ws}/ws/progress/{user_id}`.
    #[must_use]
    pub fn progress_socket_url(&self) -> String {
        format!("{}/ws/progress/{}", self.ws_base_url, self.user_id)
    }

    /// Socket endpoint for export progress: `{ws}/ws/exports/{user_id}`.
    #[must_use]
    pub fn export_socket_url(&self) -> String {
        format!("{}/ws/exports/{}", self.ws_base_url, self.user_id)
    }
}

/// Configuration for the progress subscription clients.
#[derive(Debug, Clone)]
pub struct ProgressClientConfig {
    /// Interval between status polls while a subscription is polling.
    pub(crate) poll_interval: Duration,
    /// How long to wait for the socket handshake.
    pub(crate) connect_timeout: Duration,
    /// Reconnect attempt `n` waits `reconnect_base_delay * n`.
    pub(crate) reconnect_base_delay: Duration,
    /// Attempts before affected subscriptions are pinned to polling.
    pub(crate) max_reconnect_attempts: u32,
    /// Interval between `ping` messages on an open socket.
    pub(crate) heartbeat_interval: Duration,
    /// Consecutive failed polls before a subscription gives up.
    pub(crate) max_poll_failures: u32,
}

impl Default for ProgressClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
            reconnect_base_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(30),
            max_poll_failures: 5,
        }
    }
}

impl ProgressClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with the poll interval taken from settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::default()
            .with_poll_interval(Duration::from_millis(settings.effective_poll_interval_ms()))
    }

    /// Set the polling interval.
    ///
    /// Defaults to 2 seconds. Zero is raised to 1 ms.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reconnect base delay.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub const fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    /// Set the number of reconnect attempts.
    ///
    /// Defaults to 5. Zero disables reconnection.
    #[must_use]
    pub const fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the heartbeat interval.
    ///
    /// Defaults to 30 seconds. Zero is raised to 1 ms.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the consecutive poll failure ceiling.
    ///
    /// Defaults to 5. Zero is raised to 1.
    #[must_use]
    pub fn with_max_poll_failures(mut self, failures: u32) -> Self {
        self.max_poll_failures = failures.max(1);
        self
    }

    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub(crate) fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.reconnect_base_delay.saturating_mul(attempt.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessondeck_core::DEFAULT_API_BASE_URL;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::new();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.ws_base_url, "ws://127.0.0.1:8000");
        assert_eq!(config.user_id, "local");
        assert!(config.user_agent.contains("lessondeck-client"));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry.generate.max_retries, 1);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClientConfig::new()
            .with_api_base_url("https://decks.example.com/api/")
            .with_ws_base_url("wss://decks.example.com/")
            .with_user_id("teacher-7")
            .with_timeout(Duration::from_secs(60));

        assert_eq!(config.api_base_url(), "https://decks.example.com/api");
        assert_eq!(
            config.progress_socket_url(),
            "wss://decks.example.com/ws/progress/teacher-7"
        );
        assert_eq!(
            config.export_socket_url(),
            "wss://decks.example.com/ws/exports/teacher-7"
        );
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            api_base_url: Some("https://remote.example/api".to_string()),
            user_id: Some("u1".to_string()),
            request_timeout_secs: Some(12),
            poll_interval_ms: Some(500),
            ..Default::default()
        };
        let config = ClientConfig::from_settings(&settings);
        assert_eq!(config.ws_base_url(), "wss://remote.example");
        assert_eq!(config.user_id(), "u1");
        assert_eq!(config.timeout, Duration::from_secs(12));

        let progress = ProgressClientConfig::from_settings(&settings);
        assert_eq!(progress.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_progress_defaults_and_reconnect_delay() {
        let config = ProgressClientConfig::new();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect_delay(1), Duration::from_secs(1));
        assert_eq!(config.reconnect_delay(3), Duration::from_secs(3));

        let clamped = ProgressClientConfig::new()
            .with_poll_interval(Duration::ZERO)
            .with_max_poll_failures(0);
        assert_eq!(clamped.poll_interval, Duration::from_millis(1));
        assert_eq!(clamped.max_poll_failures, 1);
    }
}
