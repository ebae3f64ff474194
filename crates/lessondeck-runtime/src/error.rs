//! Supervisor error types.

use std::io;

use lessondeck_core::{ApiError, ErrorCode};

/// Error from supervisor operations.
///
/// Only `start()` and `restart()` fail; `stop()` logs and proceeds.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// Another `start()` is in flight.
    #[error("Backend is already starting")]
    AlreadyStarting,

    /// Every port in the range is taken.
    #[error("No available port in range {start}-{end}")]
    NoPortAvailable { start: u16, end: u16 },

    /// The OS refused to spawn the program.
    #[error("Failed to spawn backend '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The health endpoint never returned 200.
    #[error("Backend did not become healthy on port {port} after {attempts} attempts ({last})")]
    StartTimeout { port: u16, attempts: u32, last: String },

    /// The process died before it became healthy.
    #[error("Backend exited during startup on port {port}")]
    ExitedDuringStartup {
        port: u16,
        /// Last lines of backend output, oldest first.
        recent_output: Vec<String>,
    },

    /// `stop()` was called before the process became healthy.
    #[error("Backend start on port {port} was cancelled by a stop request")]
    StartCancelled { port: u16 },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    /// Whether calling `start()` again later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyStarting
                | Self::NoPortAvailable { .. }
                | Self::StartTimeout { .. }
                | Self::StartCancelled { .. }
        )
    }
}

impl From<&SupervisorError> for ApiError {
    fn from(error: &SupervisorError) -> Self {
        let code = match error {
            SupervisorError::StartTimeout { .. } => ErrorCode::Timeout,
            SupervisorError::AlreadyStarting | SupervisorError::StartCancelled { .. } => {
                ErrorCode::Conflict
            }
            _ => ErrorCode::Internal,
        };
        let api = Self::new(code, error.to_string())
            .with_user_message("The local presentation service could not be started.");
        if error.is_retryable() {
            api
        } else {
            api.not_retryable()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_translation() {
        let timeout = SupervisorError::StartTimeout {
            port: 8001,
            attempts: 30,
            last: "unreachable: connection refused".to_string(),
        };
        let api = ApiError::from(&timeout);
        assert_eq!(api.code, ErrorCode::Timeout);
        assert!(api.retry_recommended);
        assert!(api.technical_message.contains("8001"));

        let exited = SupervisorError::ExitedDuringStartup {
            port: 8002,
            recent_output: vec!["ImportError: no module named fastapi".to_string()],
        };
        let api = ApiError::from(&exited);
        assert_eq!(api.code, ErrorCode::Internal);
        assert!(!api.retry_recommended);
        assert!(api.escalation_required);
    }
}
