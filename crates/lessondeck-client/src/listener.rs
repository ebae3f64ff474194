//! Channel-backed [`ProgressListener`].
//!
//! Turns listener callbacks into a stream of [`SubscriptionEvent`]s so a
//! caller can `await` progress instead of implementing the trait.

use lessondeck_core::{JobFailure, JobProgress, ProgressListener, ProgressUpdate};
use tokio::sync::mpsc;

/// One listener callback, as a value.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    Progress {
        update: ProgressUpdate,
        progress: JobProgress,
    },
    Completed {
        update: ProgressUpdate,
        progress: JobProgress,
    },
    Failed(JobFailure),
    Connection(bool),
}

impl SubscriptionEvent {
    /// Whether this is the last event of the subscription.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed(_))
    }
}

/// Forwards every callback into an unbounded channel.
///
/// Sends never block; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SubscriptionEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SubscriptionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SubscriptionEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressListener for ChannelListener {
    fn on_progress(&self, update: &ProgressUpdate, progress: &JobProgress) {
        self.send(SubscriptionEvent::Progress {
            update: update.clone(),
            progress: progress.clone(),
        });
    }

    fn on_complete(&self, update: &ProgressUpdate, progress: &JobProgress) {
        self.send(SubscriptionEvent::Completed {
            update: update.clone(),
            progress: progress.clone(),
        });
    }

    fn on_error(&self, failure: &JobFailure) {
        self.send(SubscriptionEvent::Failed(failure.clone()));
    }

    fn on_connection_change(&self, connected: bool) {
        self.send(SubscriptionEvent::Connection(connected));
    }
}
