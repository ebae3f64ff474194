//! Shared CLI presentation utilities.
//!
//! Format-only helpers for terminal output. Nothing here talks to the
//! API or decides what a status means.

pub mod progress;
pub mod status;

pub use progress::JobProgressPrinter;
pub use status::{describe_step, format_export_saved, format_job_status, step_marker};
