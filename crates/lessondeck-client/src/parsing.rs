//! Translation of polled status responses into progress updates.
//!
//! A polled status must produce the same [`ProgressUpdate`] a socket
//! message for the same server state would, so listeners cannot tell the
//! transports apart.

use chrono::Utc;
use lessondeck_core::{
    ExportFormat, ExportStatusResponse, JobStatus, JobStatusResponse, ProgressUpdate, UpdateKind,
};
use serde_json::json;

/// Translate `GET /presentations/jobs/{id}` into an update.
pub fn job_status_to_update(job_id: &str, response: &JobStatusResponse) -> ProgressUpdate {
    let progress = normalize_percent(response.progress);
    let kind = match response.status {
        JobStatus::Completed => UpdateKind::JobComplete {
            presentation_id: response.presentation_id.clone(),
            result: None,
            message: response.message.clone(),
        },
        JobStatus::Failed => UpdateKind::JobError {
            error_message: failure_message(
                response.error_message.as_deref(),
                response.message.as_deref(),
            ),
            error_code: response.error_code.clone(),
        },
        JobStatus::Running => {
            let step_name = response.current_step.as_deref().and_then(|current| {
                response
                    .steps
                    .iter()
                    .find(|s| s.step == current)
                    .and_then(|s| s.name.clone())
            });
            UpdateKind::Progress {
                progress,
                current_step: response.current_step.clone(),
                step_name,
                message: response.message.clone(),
                estimated_time_remaining: response.estimated_time_remaining,
            }
        }
        status @ (JobStatus::Pending | JobStatus::Cancelled) => UpdateKind::JobStatus {
            status,
            progress,
            message: response.message.clone(),
        },
    };

    ProgressUpdate {
        job_id: job_id.to_string(),
        timestamp: response.updated_at.unwrap_or_else(Utc::now),
        kind,
    }
}

/// Translate `GET /presentations/exports/{id}/status` into an update.
///
/// A completed export carries its download location in `result`.
pub fn export_status_to_update(export_id: &str, response: &ExportStatusResponse) -> ProgressUpdate {
    let progress = normalize_percent(response.progress);
    let kind = match response.status {
        JobStatus::Completed => UpdateKind::JobComplete {
            presentation_id: None,
            result: Some(json!({
                "download_url": response.download_url,
                "format": response.format,
            })),
            message: response.message.clone(),
        },
        JobStatus::Failed => UpdateKind::JobError {
            error_message: failure_message(
                response.error_message.as_deref(),
                response.message.as_deref(),
            ),
            error_code: None,
        },
        JobStatus::Running => UpdateKind::Progress {
            progress,
            current_step: None,
            step_name: None,
            message: response.message.clone(),
            estimated_time_remaining: None,
        },
        status @ (JobStatus::Pending | JobStatus::Cancelled) => UpdateKind::JobStatus {
            status,
            progress,
            message: response.message.clone(),
        },
    };

    ProgressUpdate::now(export_id, kind)
}

/// Clamp a percentage into 0-100; non-finite values become 0.
pub fn normalize_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn failure_message(error_message: Option<&str>, message: Option<&str>) -> String {
    error_message
        .or(message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or("Job failed")
        .to_string()
}

/// Guess the export format from a `Content-Type` header.
pub fn format_from_content_type(content_type: &str) -> Option<ExportFormat> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "application/json" => Some(ExportFormat::Json),
        "text/markdown" | "text/x-markdown" => Some(ExportFormat::Markdown),
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            Some(ExportFormat::Pptx)
        }
        "application/pdf" => Some(ExportFormat::Pdf),
        _ => None,
    }
}
