//! Settings domain types and validation.
//!
//! Pure data: loading from the environment goes through [`Settings::from_lookup`]
//! so callers decide where values come from.

use serde::{Deserialize, Serialize};

/// Default base URL of the presentation API.
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// First port tried for the managed backend.
pub const DEFAULT_PORT_RANGE_START: u16 = 8000;

/// Last port tried for the managed backend.
pub const DEFAULT_PORT_RANGE_END: u16 = 9000;

/// Default polling interval for progress fallback.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Default per-request timeout for API calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Consecutive health failures before the backend is restarted.
pub const DEFAULT_HEALTH_FAILURE_THRESHOLD: u32 = 2;

/// Default user id for the progress socket path.
pub const DEFAULT_USER_ID: &str = "local";

/// Environment variable prefix read by [`Settings::from_lookup`].
pub const ENV_PREFIX: &str = "LESSONDECK_";

/// Application settings structure.
///
/// All fields are optional to support partial updates and graceful defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the presentation API (e.g. `http://127.0.0.1:8000/api`).
    pub api_base_url: Option<String>,

    /// Base URL of the progress socket. Derived from `api_base_url` when unset.
    pub ws_base_url: Option<String>,

    /// User id used in the progress socket path.
    pub user_id: Option<String>,

    /// Program launched as the managed backend.
    pub backend_program: Option<String>,

    /// Extra arguments for the managed backend.
    pub backend_args: Option<Vec<String>>,

    /// Working directory of the managed backend.
    pub backend_working_dir: Option<String>,

    /// First port of the backend allocation range.
    pub port_range_start: Option<u16>,

    /// Last port (inclusive) of the backend allocation range.
    pub port_range_end: Option<u16>,

    /// Progress polling interval in milliseconds.
    pub poll_interval_ms: Option<u64>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,

    /// Consecutive health check failures that trigger a restart.
    pub health_failure_threshold: Option<u32>,
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            api_base_url: Some(DEFAULT_API_BASE_URL.to_string()),
            ws_base_url: None,
            user_id: Some(DEFAULT_USER_ID.to_string()),
            backend_program: None,
            backend_args: None,
            backend_working_dir: None,
            port_range_start: Some(DEFAULT_PORT_RANGE_START),
            port_range_end: Some(DEFAULT_PORT_RANGE_END),
            poll_interval_ms: Some(DEFAULT_POLL_INTERVAL_MS),
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            health_failure_threshold: Some(DEFAULT_HEALTH_FAILURE_THRESHOLD),
        }
    }

    /// Get the effective API base URL, without a trailing slash.
    #[must_use]
    pub fn effective_api_base_url(&self) -> String {
        self.api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }

    /// Get the effective socket base URL.
    ///
    /// When unset, derived from the API URL: scheme `http` becomes `ws`,
    /// `https` becomes `wss`, and a trailing `/api` segment is dropped.
    #[must_use]
    pub fn effective_ws_base_url(&self) -> String {
        if let Some(url) = &self.ws_base_url {
            return url.trim_end_matches('/').to_string();
        }
        derive_ws_base_url(&self.effective_api_base_url())
    }

    #[must_use]
    pub fn effective_user_id(&self) -> String {
        self.user_id
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string())
    }

    /// Get the effective port range (with default fallback).
    #[must_use]
    pub const fn effective_port_range(&self) -> (u16, u16) {
        let start = match self.port_range_start {
            Some(port) => port,
            None => DEFAULT_PORT_RANGE_START,
        };
        let end = match self.port_range_end {
            Some(port) => port,
            None => DEFAULT_PORT_RANGE_END,
        };
        (start, end)
    }

    #[must_use]
    pub const fn effective_poll_interval_ms(&self) -> u64 {
        match self.poll_interval_ms {
            Some(ms) => ms,
            None => DEFAULT_POLL_INTERVAL_MS,
        }
    }

    #[must_use]
    pub const fn effective_request_timeout_secs(&self) -> u64 {
        match self.request_timeout_secs {
            Some(secs) => secs,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub const fn effective_health_failure_threshold(&self) -> u32 {
        match self.health_failure_threshold {
            Some(n) => n,
            None => DEFAULT_HEALTH_FAILURE_THRESHOLD,
        }
    }

    /// Merge another settings into this one, only updating fields that are Some.
    pub fn merge(&mut self, other: &SettingsUpdate) {
        if let Some(ref url) = other.api_base_url {
            self.api_base_url.clone_from(url);
        }
        if let Some(ref url) = other.ws_base_url {
            self.ws_base_url.clone_from(url);
        }
        if let Some(ref user) = other.user_id {
            self.user_id.clone_from(user);
        }
        if let Some(ref program) = other.backend_program {
            self.backend_program.clone_from(program);
        }
        if let Some(ref args) = other.backend_args {
            self.backend_args.clone_from(args);
        }
        if let Some(ref dir) = other.backend_working_dir {
            self.backend_working_dir.clone_from(dir);
        }
        if let Some(port) = other.port_range_start {
            self.port_range_start = port;
        }
        if let Some(port) = other.port_range_end {
            self.port_range_end = port;
        }
        if let Some(ms) = other.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(secs) = other.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(n) = other.health_failure_threshold {
            self.health_failure_threshold = n;
        }
    }

    /// Build a partial update from `LESSONDECK_*` keys.
    ///
    /// `lookup` receives the full key (e.g. `LESSONDECK_API_URL`). Keys that
    /// are absent leave the field untouched; empty values are treated as
    /// absent.
    pub fn update_from_lookup<F>(lookup: F) -> Result<SettingsUpdate, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let key = format!("{ENV_PREFIX}{suffix}");
            lookup(&key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        };

        let mut update = SettingsUpdate::default();
        if let Some((_, v)) = get("API_URL") {
            update.api_base_url = Some(Some(v));
        }
        if let Some((_, v)) = get("WS_URL") {
            update.ws_base_url = Some(Some(v));
        }
        if let Some((_, v)) = get("USER_ID") {
            update.user_id = Some(Some(v));
        }
        if let Some((_, v)) = get("BACKEND_PROGRAM") {
            update.backend_program = Some(Some(v));
        }
        if let Some((_, v)) = get("BACKEND_ARGS") {
            update.backend_args = Some(Some(v.split_whitespace().map(str::to_string).collect()));
        }
        if let Some((_, v)) = get("BACKEND_DIR") {
            update.backend_working_dir = Some(Some(v));
        }
        if let Some((key, v)) = get("PORT_RANGE_START") {
            update.port_range_start = Some(Some(parse_value(&key, &v)?));
        }
        if let Some((key, v)) = get("PORT_RANGE_END") {
            update.port_range_end = Some(Some(parse_value(&key, &v)?));
        }
        if let Some((key, v)) = get("POLL_INTERVAL_MS") {
            update.poll_interval_ms = Some(Some(parse_value(&key, &v)?));
        }
        if let Some((key, v)) = get("REQUEST_TIMEOUT_SECS") {
            update.request_timeout_secs = Some(Some(parse_value(&key, &v)?));
        }
        if let Some((key, v)) = get("HEALTH_FAILURE_THRESHOLD") {
            update.health_failure_threshold = Some(Some(parse_value(&key, &v)?));
        }
        Ok(update)
    }

    /// Defaults overlaid with `LESSONDECK_*` values from `lookup`, validated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::with_defaults();
        settings.merge(&Self::update_from_lookup(lookup)?);
        validate_settings(&settings)?;
        Ok(settings)
    }

    /// [`Settings::from_lookup`] over the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn derive_ws_base_url(api_base_url: &str) -> String {
    let (scheme, rest) = match api_base_url.split_once("://") {
        Some(("https", rest)) => ("wss", rest),
        Some((_, rest)) => ("ws", rest),
        None => ("ws", api_base_url),
    };
    let rest = rest.strip_suffix("/api").unwrap_or(rest);
    format!("{scheme}://{rest}")
}

/// Partial settings update.
///
/// Each field is `Option<Option<T>>`:
/// - `None` = don't change this field
/// - `Some(None)` = set field to None/null
/// - `Some(Some(value))` = set field to value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub api_base_url: Option<Option<String>>,
    pub ws_base_url: Option<Option<String>>,
    pub user_id: Option<Option<String>>,
    pub backend_program: Option<Option<String>>,
    pub backend_args: Option<Option<Vec<String>>>,
    pub backend_working_dir: Option<Option<String>>,
    pub port_range_start: Option<Option<u16>>,
    pub port_range_end: Option<Option<u16>>,
    pub poll_interval_ms: Option<Option<u64>>,
    pub request_timeout_secs: Option<Option<u64>>,
    pub health_failure_threshold: Option<Option<u32>>,
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Port should be >= 1024 (privileged ports require root), got {0}")]
    InvalidPort(u16),

    #[error("Port range start {start} is greater than end {end}")]
    InvalidPortRange { start: u16, end: u16 },

    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },

    #[error("Health failure threshold must be at least 1")]
    InvalidThreshold,

    #[error("{field} must start with one of {expected}, got '{url}'")]
    InvalidUrl {
        field: &'static str,
        expected: &'static str,
        url: String,
    },

    #[error("User id cannot be empty")]
    EmptyUserId,

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    // Validate port range
    for port in [settings.port_range_start, settings.port_range_end]
        .into_iter()
        .flatten()
    {
        if port < 1024 {
            return Err(SettingsError::InvalidPort(port));
        }
    }
    let (start, end) = settings.effective_port_range();
    if start > end {
        return Err(SettingsError::InvalidPortRange { start, end });
    }

    // Validate intervals
    if settings.poll_interval_ms == Some(0) {
        return Err(SettingsError::ZeroInterval {
            field: "poll_interval_ms",
        });
    }
    if settings.request_timeout_secs == Some(0) {
        return Err(SettingsError::ZeroInterval {
            field: "request_timeout_secs",
        });
    }
    if settings.health_failure_threshold == Some(0) {
        return Err(SettingsError::InvalidThreshold);
    }

    // Validate URLs
    if let Some(url) = &settings.api_base_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        return Err(SettingsError::InvalidUrl {
            field: "api_base_url",
            expected: "http:// or https://",
            url: url.clone(),
        });
    }
    if let Some(url) = &settings.ws_base_url
        && !(url.starts_with("ws://") || url.starts_with("wss://"))
    {
        return Err(SettingsError::InvalidUrl {
            field: "ws_base_url",
            expected: "ws:// or wss://",
            url: url.clone(),
        });
    }

    if settings
        .user_id
        .as_ref()
        .is_some_and(|u| u.trim().is_empty())
    {
        return Err(SettingsError::EmptyUserId);
    }

    Ok(())
}
