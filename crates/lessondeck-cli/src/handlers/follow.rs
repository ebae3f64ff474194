//! Drive a progress display from subscription events.

use lessondeck_client::SubscriptionEvent;
use lessondeck_core::{JobFailure, JobProgress, ProgressUpdate, UpdateKind};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::error::CliError;
use crate::presentation::JobProgressPrinter;

/// Terminal success of a followed job.
#[derive(Debug)]
pub(crate) struct Finished {
    pub update: ProgressUpdate,
    pub progress: JobProgress,
}

impl Finished {
    /// Presentation produced by a completed generation job, if reported.
    pub fn presentation_id(&self) -> Option<&str> {
        match &self.update.kind {
            UpdateKind::JobComplete {
                presentation_id, ..
            } => presentation_id.as_deref(),
            _ => None,
        }
    }
}

/// Render events until the subscription reaches a terminal state.
///
/// Ctrl-C stops following; the caller still owns the subscription and is
/// expected to unsubscribe.
pub(crate) async fn follow(
    label: &str,
    events: &mut UnboundedReceiver<SubscriptionEvent>,
) -> Result<Finished, CliError> {
    let mut printer = JobProgressPrinter::new(label);

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                printer.abandon("stopped following (the job keeps running on the server)");
                return Err(CliError::Interrupted);
            }
        };

        let Some(event) = event else {
            printer.abandon("progress updates ended");
            let failure = JobFailure::failed(label, "progress subscription ended unexpectedly");
            return Err(failure.into());
        };

        match event {
            SubscriptionEvent::Connection(connected) => {
                debug!(label, connected, "progress transport changed");
                printer.connection(connected);
            }
            SubscriptionEvent::Progress { progress, .. } => printer.update(&progress),
            SubscriptionEvent::Completed { update, progress } => {
                printer.update(&progress);
                printer.finish("done");
                return Ok(Finished { update, progress });
            }
            SubscriptionEvent::Failed(failure) => {
                printer.abandon(if failure.is_cancelled() {
                    "cancelled"
                } else {
                    "failed"
                });
                return Err(failure.into());
            }
        }
    }
}
