//! Remote-side clients for lessondeck.
//!
//! - [`PresentationApiClient`] - typed HTTP calls for generation, jobs and
//!   exports, with structured errors and per-operation retry policies
//! - [`ProgressSubscriptionClient`] - per-job progress over a shared socket,
//!   falling back to polling with reconnects and heartbeats
//! - [`ExportProgressClient`] - the same for progress-tracked exports
//! - [`ChannelListener`] - turns listener callbacks into an event stream

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

mod client;
mod config;
mod endpoints;
mod http;
mod listener;
mod parsing;
mod progress;
mod retry;

// ============================================================================
// Public API
// ============================================================================

// API client
pub use client::{ExportStatusSource, PollOptions, PresentationApiClient};
pub use http::{HttpBackend, HttpRequest, HttpResponse, ReqwestBackend};

// Configuration
pub use config::{ClientConfig, ProgressClientConfig};
pub use retry::{RetryPolicies, RetryPolicy};

// Progress
pub use listener::{ChannelListener, SubscriptionEvent};
pub use progress::{
    ClientMessage, ExportProgressClient, ProgressSubscriptionClient, ServerMessage, SocketError,
};

// Silence unused dev-dependency warnings
#[cfg(test)]
use axum as _;
