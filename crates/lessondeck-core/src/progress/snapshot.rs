//! Aggregated job progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::status::{JobStatus, StepStatus};
use super::update::{ProgressUpdate, UpdateKind};

/// Progress of a single pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    /// Step identifier (e.g. `outline`, `slides`, `llm_polish`).
    pub step: String,
    /// Display name.
    pub name: String,
    pub status: StepStatus,
    pub progress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StepProgress {
    fn new(step: &str, name: Option<&str>) -> Self {
        Self {
            step: step.to_string(),
            name: name.unwrap_or(step).to_string(),
            status: StepStatus::Pending,
            progress_percent: 0.0,
            error_message: None,
        }
    }
}

/// Folded progress of one job, as seen by the client.
///
/// Invariants maintained by [`JobProgress::apply`]:
/// - step statuses only move forward (see [`StepStatus::can_transition_to`])
/// - `overall_progress_percent` stays within 0-100 and never decreases
///   unless the job has failed
/// - a completed job reports 100%
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub job_id: String,
    pub status: JobStatus,
    pub overall_progress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub steps: Vec<StepProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl JobProgress {
    /// Empty progress for a freshly subscribed job.
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Pending,
            overall_progress_percent: 0.0,
            current_step: None,
            steps: Vec::new(),
            estimated_time_remaining_seconds: None,
            message: None,
            last_updated: Utc::now(),
        }
    }

    /// Fold one update into the snapshot.
    pub fn apply(&mut self, update: &ProgressUpdate) {
        match &update.kind {
            UpdateKind::Progress {
                progress,
                current_step,
                step_name,
                message,
                estimated_time_remaining,
            } => {
                self.advance_status(JobStatus::Running);
                self.set_overall(*progress);
                if let Some(step) = current_step {
                    self.current_step = Some(step.clone());
                    self.transition_step(step, step_name.as_deref(), StepStatus::Running);
                }
                if message.is_some() {
                    self.message.clone_from(message);
                }
                self.estimated_time_remaining_seconds = *estimated_time_remaining;
            }
            UpdateKind::StepComplete {
                step,
                name,
                progress,
            } => {
                self.advance_status(JobStatus::Running);
                if self.transition_step(step, name.as_deref(), StepStatus::Completed)
                    && let Some(entry) = self.step_mut(step)
                {
                    entry.progress_percent = 100.0;
                }
                if let Some(progress) = progress {
                    self.set_overall(*progress);
                }
            }
            UpdateKind::StepError {
                step,
                name,
                error_message,
            } => {
                if self.transition_step(step, name.as_deref(), StepStatus::Failed)
                    && let Some(entry) = self.step_mut(step)
                {
                    entry.error_message = Some(error_message.clone());
                }
            }
            UpdateKind::JobComplete { message, .. } => {
                self.advance_status(JobStatus::Completed);
                self.overall_progress_percent = 100.0;
                self.estimated_time_remaining_seconds = Some(0.0);
                if message.is_some() {
                    self.message.clone_from(message);
                }
            }
            UpdateKind::JobError { error_message, .. } => {
                self.advance_status(JobStatus::Failed);
                self.message = Some(error_message.clone());
            }
            UpdateKind::JobStatus {
                status,
                progress,
                message,
            } => {
                self.advance_status(*status);
                if self.status == JobStatus::Completed {
                    self.overall_progress_percent = 100.0;
                } else {
                    self.set_overall(*progress);
                }
                if message.is_some() {
                    self.message.clone_from(message);
                }
            }
        }
        self.last_updated = update.timestamp;
    }

    /// Status is terminal.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Look up a step by identifier.
    #[must_use]
    pub fn step(&self, step: &str) -> Option<&StepProgress> {
        self.steps.iter().find(|s| s.step == step)
    }

    fn step_mut(&mut self, step: &str) -> Option<&mut StepProgress> {
        self.steps.iter_mut().find(|s| s.step == step)
    }

    /// Once terminal, the job status is frozen.
    fn advance_status(&mut self, next: JobStatus) {
        if self.status.is_terminal() {
            if self.status != next {
                debug!(
                    job_id = %self.job_id,
                    from = %self.status,
                    to = %next,
                    "Ignoring status change after terminal state"
                );
            }
            return;
        }
        if self.status == JobStatus::Running && next == JobStatus::Pending {
            return;
        }
        self.status = next;
    }

    fn set_overall(&mut self, value: f64) {
        let value = if value.is_finite() {
            value.clamp(0.0, 100.0)
        } else {
            0.0
        };
        if self.status == JobStatus::Failed || value >= self.overall_progress_percent {
            self.overall_progress_percent = value;
        }
    }

    /// Move a step forward, creating it on first sight.
    ///
    /// Returns `false` if the transition would regress the step.
    fn transition_step(&mut self, step: &str, name: Option<&str>, next: StepStatus) -> bool {
        if self.step(step).is_none() {
            self.steps.push(StepProgress::new(step, name));
        }
        let Some(entry) = self.step_mut(step) else {
            return false;
        };
        if !entry.status.can_transition_to(next) {
            debug!(step = %step, from = ?entry.status, to = ?next, "Ignoring step regression");
            return false;
        }
        entry.status = next;
        if let Some(name) = name {
            entry.name = name.to_string();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(value: f64, step: Option<&str>) -> ProgressUpdate {
        ProgressUpdate::now(
            "job-1",
            UpdateKind::Progress {
                progress: value,
                current_step: step.map(str::to_string),
                step_name: None,
                message: None,
                estimated_time_remaining: Some(12.0),
            },
        )
    }

    #[test]
    fn test_overall_progress_never_decreases() {
        let mut job = JobProgress::new("job-1");
        job.apply(&progress(40.0, None));
        job.apply(&progress(25.0, None));
        assert!((job.overall_progress_percent - 40.0).abs() < f64::EPSILON);
        job.apply(&progress(55.0, None));
        assert!((job.overall_progress_percent - 55.0).abs() < f64::EPSILON);
        assert_eq!(job.status, JobStatus::Running);
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut job = JobProgress::new("job-1");
        job.apply(&progress(250.0, None));
        assert!((job.overall_progress_percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_step_status_is_monotonic() {
        let mut job = JobProgress::new("job-1");
        job.apply(&progress(10.0, Some("outline")));
        job.apply(&ProgressUpdate::now(
            "job-1",
            UpdateKind::StepComplete {
                step: "outline".to_string(),
                name: Some("Outline".to_string()),
                progress: Some(30.0),
            },
        ));
        // A late progress message naming the same step must not reopen it.
        job.apply(&progress(35.0, Some("outline")));

        let step = job.step("outline").unwrap();
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.name, "Outline");
        assert!((step.progress_percent - 100.0).abs() < f64::EPSILON);
        assert!((job.overall_progress_percent - 35.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_step_error_records_message() {
        let mut job = JobProgress::new("job-1");
        job.apply(&ProgressUpdate::now(
            "job-1",
            UpdateKind::StepError {
                step: "llm_polish".to_string(),
                name: None,
                error_message: "model timeout".to_string(),
            },
        ));
        let step = job.step("llm_polish").unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error_message.as_deref(), Some("model timeout"));
        assert!(!job.is_finished());
    }

    #[test]
    fn test_completion_sets_full_progress() {
        let mut job = JobProgress::new("job-1");
        job.apply(&progress(80.0, None));
        job.apply(&ProgressUpdate::now(
            "job-1",
            UpdateKind::JobComplete {
                presentation_id: Some("p-1".to_string()),
                result: None,
                message: None,
            },
        ));
        assert!(job.is_finished());
        assert_eq!(job.status, JobStatus::Completed);
        assert!((job.overall_progress_percent - 100.0).abs() < f64::EPSILON);

        // Terminal status is frozen.
        job.apply(&progress(10.0, None));
        assert_eq!(job.status, JobStatus::Completed);
        assert!((job.overall_progress_percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_job_may_report_lower_progress() {
        let mut job = JobProgress::new("job-1");
        job.apply(&progress(60.0, None));
        job.apply(&ProgressUpdate::now(
            "job-1",
            UpdateKind::JobError {
                error_message: "render failed".to_string(),
                error_code: None,
            },
        ));
        job.apply(&ProgressUpdate::now(
            "job-1",
            UpdateKind::JobStatus {
                status: JobStatus::Failed,
                progress: 0.0,
                message: None,
            },
        ));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.overall_progress_percent.abs() < f64::EPSILON);
        assert_eq!(job.message.as_deref(), Some("render failed"));
    }
}
