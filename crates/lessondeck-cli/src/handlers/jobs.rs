//! Job handlers: status, watch, cancel, retry.

use std::sync::Arc;

use lessondeck_client::ChannelListener;
use lessondeck_core::JobFailure;
use tracing::info;

use super::follow::{Finished, follow};
use crate::bootstrap::AppContext;
use crate::error::CliError;
use crate::presentation::format_job_status;

/// Print the current status of a job.
pub async fn status(ctx: &AppContext, job_id: &str) -> Result<(), CliError> {
    let status = ctx.api().get_job_status(job_id).await?;
    for line in format_job_status(job_id, &status) {
        println!("{line}");
    }
    Ok(())
}

/// Follow a job until it finishes.
pub async fn watch(ctx: &AppContext, job_id: &str) -> Result<(), CliError> {
    let finished = watch_job(ctx, job_id).await?;
    let presentation_id = presentation_id(ctx, job_id, &finished).await?;
    println!("Presentation ready: {presentation_id}");
    Ok(())
}

pub async fn cancel(ctx: &AppContext, job_id: &str) -> Result<(), CliError> {
    ctx.api().cancel_job(job_id).await?;
    println!("Cancellation requested for job {job_id}");
    Ok(())
}

/// Retry a failed job, optionally following the new attempt.
pub async fn retry(ctx: &AppContext, job_id: &str, follow_new: bool) -> Result<(), CliError> {
    let response = ctx.api().retry_job(job_id).await?;
    info!(job_id, new_job_id = %response.job_id, "job retried");
    println!("Retry queued as job {}", response.job_id);
    if follow_new {
        watch(ctx, &response.job_id).await?;
    }
    Ok(())
}

/// Subscribe to a job and render its progress until it ends.
pub(crate) async fn watch_job(ctx: &AppContext, job_id: &str) -> Result<Finished, CliError> {
    let progress = ctx.job_progress();
    let (listener, mut events) = ChannelListener::new();
    progress.subscribe(job_id, Arc::new(listener)).await;

    let result = follow(job_id, &mut events).await;
    progress.unsubscribe(job_id);
    result
}

/// The presentation a completed job produced.
///
/// Pushed completions usually carry it; otherwise the job status has it.
pub(crate) async fn presentation_id(
    ctx: &AppContext,
    job_id: &str,
    finished: &Finished,
) -> Result<String, CliError> {
    if let Some(id) = finished.presentation_id() {
        return Ok(id.to_string());
    }
    ctx.api()
        .get_job_status(job_id)
        .await?
        .presentation_id
        .ok_or_else(|| {
            JobFailure::failed(job_id, "job completed without reporting a presentation").into()
        })
}
