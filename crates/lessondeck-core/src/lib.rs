//! Core domain types and port definitions for lessondeck.
//!
//! This crate has no I/O of its own. It defines:
//!
//! - [`progress`] - job progress snapshots and the update union delivered to listeners
//! - [`presentation`] - request/response types for the presentation API
//! - [`error`] - the structured API error taxonomy
//! - [`events`] - backend process lifecycle events
//! - [`ports`] - trait seams implemented by the runtime and client crates
//! - [`settings`] - application settings and validation

#![deny(unused_crate_dependencies)]

pub mod error;
pub mod events;
pub mod ports;
pub mod presentation;
pub mod progress;
pub mod settings;

// Re-export commonly used types for convenience
pub use error::{ApiError, ErrorCode, RecoveryAction};
pub use events::{BackendEvent, BackendPhase, BackendStateInfo, BackendStatus};
pub use ports::{JobFailure, NoopListener, ProgressListener, StatusSource};
pub use presentation::{
    ExportFormat, ExportJobResponse, ExportPayload, ExportRequest, ExportStatusResponse,
    GenerateRequest, GenerateResponse, JobStatusResponse, Presentation, Priority, StepStatusDto,
};
pub use progress::{
    JobProgress, JobStatus, ProgressUpdate, StepProgress, StepStatus, UpdateKind,
};
pub use settings::{
    DEFAULT_API_BASE_URL, DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START, Settings,
    SettingsError, SettingsUpdate, validate_settings,
};

#[cfg(test)]
use tokio as _;
