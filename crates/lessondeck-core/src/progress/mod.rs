//! Job progress domain.
//!
//! - [`ProgressUpdate`] is what a transport delivers (socket message or a
//!   translated poll result). Both transports produce the same shape.
//! - [`JobProgress`] is the aggregate a subscription maintains by folding
//!   updates; listeners receive a snapshot of it with every update.

mod snapshot;
mod status;
mod update;

pub use snapshot::{JobProgress, StepProgress};
pub use status::{JobStatus, StepStatus};
pub use update::{ProgressUpdate, UpdateKind};
