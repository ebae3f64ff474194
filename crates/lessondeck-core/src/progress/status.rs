//! Job and step status enums.

use serde::{Deserialize, Serialize};

/// Server-side status of a job (generation or export).
///
/// Export endpoints report `queued`/`processing`; those are accepted as
/// aliases so both job families share one terminal-state set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "queued")]
    Pending,
    #[serde(alias = "processing", alias = "in_progress")]
    Running,
    #[serde(alias = "succeeded", alias = "done")]
    Completed,
    #[serde(alias = "error")]
    Failed,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl JobStatus {
    /// Whether no further updates are expected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one pipeline step inside a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed | Self::Skipped => 2,
        }
    }

    /// Whether the step has finished one way or another.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Step statuses only move forward: `pending -> running -> terminal`.
    ///
    /// Repeating the current status is allowed; switching between two
    /// terminal statuses is not.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return self as u8 == next as u8;
        }
        next.rank() >= self.rank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_job_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_export_status_aliases() {
        let queued: JobStatus = serde_json::from_str("\"queued\"").unwrap();
        let processing: JobStatus = serde_json::from_str("\"processing\"").unwrap();
        let canceled: JobStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(queued, JobStatus::Pending);
        assert_eq!(processing, JobStatus::Running);
        assert_eq!(canceled, JobStatus::Cancelled);
        assert_eq!(serde_json::to_string(&JobStatus::Cancelled).unwrap(), "\"cancelled\"");
    }

    #[test]
    fn test_step_transitions_are_monotonic() {
        use StepStatus::{Completed, Failed, Pending, Running, Skipped};

        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Completed));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Completed));

        assert!(!Running.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Skipped.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Pending));
    }
}
