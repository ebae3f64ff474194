//! Command-line front end for lessondeck.
//!
//! The binary parses arguments with [`Cli`], composes an [`AppContext`]
//! through [`bootstrap`], and hands it to the [`handlers`].

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used by the binary only.
use dirs as _;
use dotenvy as _;
use tracing_appender as _;
use tracing_subscriber as _;

// Integration tests only.
#[cfg(test)]
use axum as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

// Re-export primary types for convenient access
pub use bootstrap::{AppContext, CliConfig, bootstrap};
pub use commands::Commands;
pub use error::{CliError, exit_code_for};
pub use parser::Cli;
