//! Job status and export result formatting.

use std::path::Path;

use lessondeck_core::{ExportFormat, ExportPayload, JobProgress, JobStatusResponse, StepStatus};

/// Short marker for a step status, padded for column alignment.
pub const fn step_marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "[ ]",
        StepStatus::Running => "[~]",
        StepStatus::Completed => "[x]",
        StepStatus::Failed => "[!]",
        StepStatus::Skipped => "[-]",
    }
}

/// What the job is doing right now, for a one-line display.
///
/// Prefers the display name of the current step, then the step id, then
/// the last server message, then the bare status.
pub fn describe_step(progress: &JobProgress) -> String {
    if let Some(step) = &progress.current_step {
        return progress
            .step(step)
            .map_or_else(|| step.clone(), |entry| entry.name.clone());
    }
    progress
        .message
        .clone()
        .unwrap_or_else(|| progress.status.to_string())
}

/// Multi-line report for `lessondeck status`.
pub fn format_job_status(job_id: &str, status: &JobStatusResponse) -> Vec<String> {
    let mut lines = vec![format!(
        "Job {job_id}: {} ({:.0}%)",
        status.status, status.progress
    )];

    if let Some(step) = &status.current_step {
        lines.push(format!("  Step:         {step}"));
    }
    if let Some(message) = &status.message {
        lines.push(format!("  Message:      {message}"));
    }
    if let Some(error) = &status.error_message {
        match &status.error_code {
            Some(code) => lines.push(format!("  Error:        {error} [{code}]")),
            None => lines.push(format!("  Error:        {error}")),
        }
    }
    if let Some(presentation_id) = &status.presentation_id {
        lines.push(format!("  Presentation: {presentation_id}"));
    }
    if let Some(eta) = status.estimated_time_remaining
        && !status.status.is_terminal()
    {
        lines.push(format!("  Remaining:    ~{eta:.0}s"));
    }

    if !status.steps.is_empty() {
        lines.push("  Steps:".to_string());
        for step in &status.steps {
            let name = step.name.as_deref().unwrap_or(&step.step);
            let mut line = format!("    {} {name}", step_marker(step.status));
            if let Some(progress) = step.progress
                && step.status == StepStatus::Running
            {
                line.push_str(&format!(" ({progress:.0}%)"));
            }
            if let Some(error) = &step.error_message {
                line.push_str(&format!(" - {error}"));
            }
            lines.push(line);
        }
    }

    lines
}

/// Confirmation line after an export was written to disk.
pub fn format_export_saved(
    path: &Path,
    payload: &ExportPayload,
    requested: ExportFormat,
) -> String {
    let size = payload.bytes.len();
    if payload.is_fallback_for(requested) {
        format!(
            "Saved {} ({size} bytes, {} unavailable, exported as {})",
            path.display(),
            requested,
            payload.format
        )
    } else {
        format!("Saved {} ({size} bytes)", path.display())
    }
}
