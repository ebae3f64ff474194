//! Progress update union shared by the socket and polling transports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::JobStatus;

/// One progress update for a job.
///
/// Serialized flat: `{"type": "progress", "job_id": ..., "timestamp": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Job (or export) identifier.
    pub job_id: String,
    /// When the server produced the update (or when it was received, if
    /// the server did not say).
    pub timestamp: DateTime<Utc>,
    /// What happened.
    #[serde(flatten)]
    pub kind: UpdateKind,
}

/// Discriminated union of update kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateKind {
    /// Overall progress moved.
    Progress {
        /// Overall percent, 0-100.
        progress: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_step: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        estimated_time_remaining: Option<f64>,
    },
    /// A pipeline step finished.
    StepComplete {
        step: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Overall percent after the step, when the server reports it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
    },
    /// A pipeline step failed. The job may still continue.
    StepError {
        step: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        error_message: String,
    },
    /// The job finished successfully.
    JobComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        presentation_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The job failed.
    JobError {
        error_message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
    /// Status snapshot (initial state after subscribing, cancellation).
    JobStatus {
        status: JobStatus,
        #[serde(default)]
        progress: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ProgressUpdate {
    /// Create an update stamped with the current time.
    pub fn now(job_id: impl Into<String>, kind: UpdateKind) -> Self {
        Self {
            job_id: job_id.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Wire name of the update kind.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self.kind {
            UpdateKind::Progress { .. } => "progress",
            UpdateKind::StepComplete { .. } => "step_complete",
            UpdateKind::StepError { .. } => "step_error",
            UpdateKind::JobComplete { .. } => "job_complete",
            UpdateKind::JobError { .. } => "job_error",
            UpdateKind::JobStatus { .. } => "job_status",
        }
    }

    /// The job status this update implies, if it implies one.
    #[must_use]
    pub const fn implied_status(&self) -> Option<JobStatus> {
        match &self.kind {
            UpdateKind::Progress { .. } | UpdateKind::StepComplete { .. } => {
                Some(JobStatus::Running)
            }
            UpdateKind::StepError { .. } => None,
            UpdateKind::JobComplete { .. } => Some(JobStatus::Completed),
            UpdateKind::JobError { .. } => Some(JobStatus::Failed),
            UpdateKind::JobStatus { status, .. } => Some(*status),
        }
    }

    /// Whether this is the last update the job will produce.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        match self.implied_status() {
            Some(status) => status.is_terminal(),
            None => false,
        }
    }

    /// Whether the terminal outcome is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.kind, UpdateKind::JobComplete { .. })
            || matches!(
                self.kind,
                UpdateKind::JobStatus {
                    status: JobStatus::Completed,
                    ..
                }
            )
    }
}
