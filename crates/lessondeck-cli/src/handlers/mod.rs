//! Command handlers.
//!
//! Handlers follow the canonical pattern:
//! - Signature: `pub async fn execute(ctx: &AppContext, ...) -> Result<(), CliError>`
//! - Thin wrappers that:
//!   1. Turn CLI arguments into request types
//!   2. Call the presentation API or a progress client from the context
//!   3. Format output for the terminal
//!
//! `serve` is the exception: it owns a supervisor and takes settings
//! instead of a context.

pub mod export;
mod follow;
pub mod generate;
pub mod jobs;
pub mod serve;
