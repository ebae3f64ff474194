//! Main CLI parser and top-level argument handling.

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for generating and exporting lesson presentations.
#[derive(Parser)]
#[command(name = "lessondeck")]
#[command(about = "Generate, track and export lesson presentations")]
#[command(version)]
pub struct Cli {
    /// Presentation API base URL (e.g. http://127.0.0.1:8000/api)
    #[arg(long = "api-url", global = true, env = "LESSONDECK_API_URL")]
    pub api_url: Option<String>,

    /// Start and supervise the local backend for this invocation
    #[arg(long = "local-backend", global = true)]
    pub local_backend: bool,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
