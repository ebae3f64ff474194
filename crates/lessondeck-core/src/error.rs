//! Structured error taxonomy for the presentation API.
//!
//! Transport and HTTP failures are translated into [`ApiError`] before they
//! reach UI code. The error is serializable so adapters can forward it
//! verbatim (CLI output, IPC payloads, logs).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of failure, independent of the transport that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No response from the server (connection refused, DNS, reset).
    Network,
    /// Rejected input (4xx other than the specific codes below).
    Validation,
    /// 404.
    NotFound,
    /// 401 / 403.
    Permission,
    /// 408, polling exhaustion, startup ceiling.
    Timeout,
    /// 409, e.g. a job is already running.
    Conflict,
    /// 429.
    RateLimited,
    /// 5xx other than 507.
    Server,
    /// 507.
    Storage,
    /// Anything we could not classify.
    Internal,
}

impl ErrorCode {
    /// Classify an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Permission,
            404 => Self::NotFound,
            408 => Self::Timeout,
            409 => Self::Conflict,
            429 => Self::RateLimited,
            507 => Self::Storage,
            400..=499 => Self::Validation,
            500..=599 => Self::Server,
            _ => Self::Internal,
        }
    }

    /// Parse the `error_code` string some server responses carry.
    ///
    /// Accepts both the bare names (`NOT_FOUND`) and the `_ERROR` suffixed
    /// variants (`NETWORK_ERROR`).
    #[must_use]
    pub fn from_server_code(code: &str) -> Option<Self> {
        let upper = code.trim().to_ascii_uppercase();
        let bare = upper.strip_suffix("_ERROR").unwrap_or(&upper);
        match bare {
            "NETWORK" | "CONNECTION" => Some(Self::Network),
            "VALIDATION" | "INVALID_INPUT" | "BAD_REQUEST" => Some(Self::Validation),
            "NOT_FOUND" => Some(Self::NotFound),
            "PERMISSION" | "PERMISSION_DENIED" | "FORBIDDEN" | "UNAUTHORIZED" => {
                Some(Self::Permission)
            }
            "TIMEOUT" => Some(Self::Timeout),
            "CONFLICT" | "JOB_ALREADY_RUNNING" => Some(Self::Conflict),
            "RATE_LIMITED" | "RATE_LIMIT" => Some(Self::RateLimited),
            "SERVER" | "SERVICE_UNAVAILABLE" => Some(Self::Server),
            "STORAGE" | "INSUFFICIENT_STORAGE" => Some(Self::Storage),
            "INTERNAL" => Some(Self::Internal),
            _ => None,
        }
    }

    /// Whether an automatic retry is sensible for this kind of failure.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimited | Self::Server
        )
    }

    /// Whether the user should be pointed at support rather than a retry.
    #[must_use]
    pub const fn needs_escalation(self) -> bool {
        matches!(self, Self::Storage | Self::Internal | Self::Permission)
    }

    /// Default message shown to the user.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Network => "Unable to reach the presentation service. Check your connection.",
            Self::Validation => "The request was not accepted. Check the input and try again.",
            Self::NotFound => "The requested item could not be found.",
            Self::Permission => "You do not have permission to perform this action.",
            Self::Timeout => "The operation took too long to complete.",
            Self::Conflict => "This item is already being processed.",
            Self::RateLimited => "Too many requests. Please wait a moment and try again.",
            Self::Server => "The presentation service ran into a problem.",
            Self::Storage => "The server is out of storage space.",
            Self::Internal => "An unexpected error occurred.",
        }
    }

    /// Recovery actions offered for this kind of failure.
    #[must_use]
    pub fn default_recovery_actions(self) -> Vec<RecoveryAction> {
        match self {
            Self::Network | Self::Timeout | Self::RateLimited | Self::Server => {
                vec![RecoveryAction::Retry]
            }
            Self::Permission | Self::Storage => vec![RecoveryAction::ContactSupport],
            Self::Internal => vec![RecoveryAction::Retry, RecoveryAction::ContactSupport],
            Self::Validation | Self::NotFound | Self::Conflict => Vec::new(),
        }
    }
}

/// Action a UI can offer next to an error banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Repeat the same request.
    Retry,
    /// Repeat a generation with LLM polishing disabled.
    RetryWithoutAi,
    /// Export in a different format.
    AlternateFormat,
    /// Escalate to a human.
    ContactSupport,
}

/// Structured error handed to UI code.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{user_message} ({technical_message})")]
pub struct ApiError {
    /// Kind of failure.
    pub code: ErrorCode,
    /// Message suitable for display.
    pub user_message: String,
    /// Message suitable for logs and bug reports.
    pub technical_message: String,
    /// Whether retrying the same request may succeed.
    pub retry_recommended: bool,
    /// Server-provided back-off hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    /// Whether the failure should be reported to support.
    pub escalation_required: bool,
    /// Actions to offer the user.
    #[serde(default)]
    pub recovery_actions: Vec<RecoveryAction>,
}

impl ApiError {
    /// Create an error with the defaults for `code`.
    pub fn new(code: ErrorCode, technical_message: impl Into<String>) -> Self {
        Self {
            code,
            user_message: code.user_message().to_string(),
            technical_message: technical_message.into(),
            retry_recommended: code.is_retryable(),
            retry_after_seconds: None,
            escalation_required: code.needs_escalation(),
            recovery_actions: code.default_recovery_actions(),
        }
    }

    /// Connectivity failure (no response).
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message)
    }

    /// Timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Rejected input.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    /// Unclassified failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Translate a non-success HTTP response.
    ///
    /// The status picks the base classification. A structured body
    /// (`{error_code, message, user_message, retry_recommended, retry_after}`,
    /// optionally nested under `detail`) refines it. A `Retry-After` header
    /// wins over a body hint.
    #[must_use]
    pub fn from_response(status: u16, body: &[u8], retry_after_header: Option<u64>) -> Self {
        let parsed = ServerErrorBody::parse(body);
        let code = parsed
            .error_code
            .as_deref()
            .and_then(ErrorCode::from_server_code)
            .unwrap_or_else(|| ErrorCode::from_status(status));

        let technical = parsed.message.clone().unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            if text.is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {}", truncate(text, 300))
            }
        });

        let mut error = Self::new(code, technical);
        if let Some(user_message) = parsed.user_message {
            error.user_message = user_message;
        }
        if let Some(retry) = parsed.retry_recommended {
            error.retry_recommended = retry;
        }
        if let Some(escalate) = parsed.escalation_required {
            error.escalation_required = escalate;
        }
        error.retry_after_seconds = retry_after_header.or(parsed.retry_after);
        error
    }

    /// Override the user-facing message.
    #[must_use]
    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    /// Add a recovery action if not already present.
    #[must_use]
    pub fn with_recovery_action(mut self, action: RecoveryAction) -> Self {
        if !self.recovery_actions.contains(&action) {
            self.recovery_actions.push(action);
        }
        self
    }

    /// Mark the error as non-retryable.
    #[must_use]
    pub fn not_retryable(mut self) -> Self {
        self.retry_recommended = false;
        self
    }

    /// Text for a fatal dialog: user message followed by the technical detail.
    #[must_use]
    pub fn display_with_details(&self) -> String {
        format!("{}\n\nDetails: {}", self.user_message, self.technical_message)
    }
}

/// Error body shapes the server is known to produce.
#[derive(Debug, Default, Deserialize)]
struct ServerErrorBody {
    #[serde(default, alias = "code")]
    error_code: Option<String>,
    #[serde(default, alias = "error", alias = "technical_message")]
    message: Option<String>,
    #[serde(default)]
    user_message: Option<String>,
    #[serde(default)]
    retry_recommended: Option<bool>,
    #[serde(default, alias = "retry_after_seconds")]
    retry_after: Option<u64>,
    #[serde(default)]
    escalation_required: Option<bool>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

impl ServerErrorBody {
    fn parse(body: &[u8]) -> Self {
        let Ok(mut parsed) = serde_json::from_slice::<Self>(body) else {
            return Self::default();
        };

        // FastAPI wraps errors in `detail`, either a string or the structured body.
        match parsed.detail.take() {
            Some(serde_json::Value::String(text)) if parsed.message.is_none() => {
                parsed.message = Some(text);
            }
            Some(value @ serde_json::Value::Object(_)) => {
                if let Ok(inner) = serde_json::from_value::<Self>(value) {
                    parsed.error_code = parsed.error_code.or(inner.error_code);
                    parsed.message = parsed.message.or(inner.message);
                    parsed.user_message = parsed.user_message.or(inner.user_message);
                    parsed.retry_recommended = parsed.retry_recommended.or(inner.retry_recommended);
                    parsed.retry_after = parsed.retry_after.or(inner.retry_after);
                    parsed.escalation_required =
                        parsed.escalation_required.or(inner.escalation_required);
                }
            }
            _ => {}
        }
        parsed
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
