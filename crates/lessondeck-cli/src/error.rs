//! CLI-specific error types and mappings.
//!
//! Maps the library errors onto process exit codes and the message shown
//! to the user.

use lessondeck_core::{ApiError, ErrorCode, JobFailure, SettingsError};
use lessondeck_runtime::SupervisorError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// The presentation API refused or failed a request.
    #[error("{}", .0.display_with_details())]
    Api(ApiError),

    /// A job or export ended unsuccessfully.
    #[error("{}", describe_failure(.0))]
    Job(JobFailure),

    /// Argument parsing error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The local backend could not be started.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Stopped with Ctrl-C before the job finished.
    #[error("Interrupted")]
    Interrupted,
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 0: Success
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Api(error) => match error.code {
                ErrorCode::Validation => 65,                   // EX_DATAERR
                ErrorCode::NotFound => 66,                     // EX_NOINPUT
                ErrorCode::Network | ErrorCode::Timeout => 69, // EX_UNAVAILABLE
                ErrorCode::Permission => 77,                   // EX_NOPERM
                _ => 1,
            },
            Self::Job(_) => 1,
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Io(_) => 74,       // EX_IOERR
            Self::Config(_) => 78,   // EX_CONFIG
            Self::Backend(_) => 71,  // EX_OSERR
            Self::Interrupted => 130,
        }
    }
}

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

impl From<JobFailure> for CliError {
    fn from(failure: JobFailure) -> Self {
        Self::Job(failure)
    }
}

impl From<SupervisorError> for CliError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::ExitedDuringStartup {
                port,
                recent_output,
            } if !recent_output.is_empty() => Self::Backend(format!(
                "backend exited during startup on port {port}; last output:\n{}",
                recent_output.join("\n")
            )),
            other => Self::Backend(other.to_string()),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

fn describe_failure(failure: &JobFailure) -> String {
    let outcome = if failure.is_cancelled() { "Cancelled" } else { "Failed" };
    format!("{outcome} {}: {}", failure.job_id, failure.message)
}

/// Exit code for an error returned from a handler.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>().map_or(1, CliError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Arguments("x".into()).exit_code(), 2);
        assert_eq!(CliError::Config("x".into()).exit_code(), 78);
        assert_eq!(CliError::Api(ApiError::network("down")).exit_code(), 69);
        assert_eq!(
            CliError::from(SupervisorError::NoPortAvailable { start: 8000, end: 8001 }).exit_code(),
            71
        );
    }

    #[test]
    fn test_job_failure_message() {
        let failed = CliError::from(JobFailure::failed("job-1", "renderer crashed"));
        assert_eq!(failed.to_string(), "Failed job-1: renderer crashed");
        let cancelled = CliError::from(JobFailure::cancelled("job-2", None));
        assert!(cancelled.to_string().starts_with("Cancelled job-2"));
    }

    #[test]
    fn test_exit_code_through_anyhow() {
        let err = anyhow::Error::from(CliError::Io("disk".into()));
        assert_eq!(exit_code_for(&err), 74);
        assert_eq!(exit_code_for(&anyhow::anyhow!("plain")), 1);
    }
}
