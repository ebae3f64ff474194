//! Port definitions (trait abstractions) for external systems.
//!
//! These traits are the seams between the progress-subscription machinery
//! and the things it talks to:
//!
//! - [`ProgressListener`] - receives updates for one subscription (UI, CLI, tests)
//! - [`StatusSource`] - fetches a job's current status for the polling transport
//!
//! Implementations live in the client crate (HTTP status sources, channel
//! listeners) and in adapters.

use async_trait::async_trait;

use crate::error::ApiError;
use crate::progress::{JobProgress, JobStatus, ProgressUpdate};

/// Terminal failure of a subscribed job.
///
/// Delivered through [`ProgressListener::on_error`] for failed and cancelled
/// jobs, and when polling gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub job_id: String,
    /// `Failed` or `Cancelled`.
    pub status: JobStatus,
    pub message: String,
    /// Server-provided error code, if any.
    pub error_code: Option<String>,
    /// Set when the failure came from the API client rather than the job.
    pub api_error: Option<ApiError>,
}

impl JobFailure {
    /// Failure reported by the job itself.
    pub fn failed(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            message: message.into(),
            error_code: None,
            api_error: None,
        }
    }

    /// The job was cancelled.
    pub fn cancelled(job_id: impl Into<String>, message: Option<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Cancelled,
            message: message.unwrap_or_else(|| "Job was cancelled".to_string()),
            error_code: None,
            api_error: None,
        }
    }

    /// The subscription could not keep track of the job.
    pub fn from_api_error(job_id: impl Into<String>, error: ApiError) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            message: error.user_message.clone(),
            error_code: None,
            api_error: Some(error),
        }
    }

    #[must_use]
    pub fn with_error_code(mut self, code: Option<String>) -> Self {
        self.error_code = code;
        self
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.status, JobStatus::Cancelled)
    }
}

/// Callbacks for one job subscription.
///
/// Callbacks run on the task that received the update and must not block.
/// `on_complete` and `on_error` fire at most once per subscription, and
/// nothing fires after the subscription ends.
pub trait ProgressListener: Send + Sync {
    /// Every update, terminal ones included, with the folded snapshot.
    fn on_progress(&self, update: &ProgressUpdate, progress: &JobProgress);

    /// The job completed successfully.
    fn on_complete(&self, _update: &ProgressUpdate, _progress: &JobProgress) {}

    /// The job failed or was cancelled, or tracking it failed.
    fn on_error(&self, _failure: &JobFailure) {}

    /// The live socket connection came up (`true`) or went away (`false`).
    fn on_connection_change(&self, _connected: bool) {}
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl ProgressListener for NoopListener {
    fn on_progress(&self, _update: &ProgressUpdate, _progress: &JobProgress) {
        // Intentionally do nothing
    }
}

/// Source of status snapshots for the polling transport.
///
/// The returned update must have the same shape a socket message for the
/// same state would have.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the current status of `job_id` as a progress update.
    async fn fetch_update(&self, job_id: &str) -> Result<ProgressUpdate, ApiError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::ErrorCode;
    use crate::progress::UpdateKind;

    struct FixedSource(JobStatus);

    #[async_trait]
    impl StatusSource for FixedSource {
        async fn fetch_update(&self, job_id: &str) -> Result<ProgressUpdate, ApiError> {
            if job_id.is_empty() {
                return Err(ApiError::validation("empty job id"));
            }
            Ok(ProgressUpdate::now(
                job_id,
                UpdateKind::JobStatus {
                    status: self.0,
                    progress: 50.0,
                    message: None,
                },
            ))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ProgressListener for Recorder {
        fn on_progress(&self, update: &ProgressUpdate, _progress: &JobProgress) {
            self.0.lock().unwrap().push(update.kind_name().to_string());
        }
    }

    #[tokio::test]
    async fn test_status_source_is_object_safe() {
        let source: Box<dyn StatusSource> = Box::new(FixedSource(JobStatus::Running));
        let update = source.fetch_update("job-1").await.unwrap();
        assert_eq!(update.job_id, "job-1");
        assert_eq!(update.implied_status(), Some(JobStatus::Running));

        let err = source.fetch_update("").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[test]
    fn test_default_callbacks_are_optional() {
        let recorder = Recorder::default();
        let update = ProgressUpdate::now(
            "job-1",
            UpdateKind::JobError {
                error_message: "boom".to_string(),
                error_code: None,
            },
        );
        let snapshot = JobProgress::new("job-1");
        recorder.on_progress(&update, &snapshot);
        recorder.on_error(&JobFailure::failed("job-1", "boom"));
        recorder.on_connection_change(true);
        assert_eq!(*recorder.0.lock().unwrap(), vec!["job_error".to_string()]);

        NoopListener.on_progress(&update, &snapshot);
    }

    #[test]
    fn test_failure_constructors() {
        let cancelled = JobFailure::cancelled("job-2", None);
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.message, "Job was cancelled");

        let api = JobFailure::from_api_error("job-3", ApiError::timeout("polling gave up"));
        assert_eq!(api.status, JobStatus::Failed);
        assert!(api.api_error.is_some());
        assert_eq!(api.message, ErrorCode::Timeout.user_message());
    }
}
