//! Subcommands.

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};
use lessondeck_core::{ExportFormat, Priority};

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the local backend under supervision until Ctrl-C
    Serve {
        /// Backend program (defaults to LESSONDECK_BACKEND_PROGRAM)
        #[arg(long)]
        program: Option<String>,
        /// Extra arguments for the backend program
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Generate a presentation for a lesson and follow its progress
    Generate {
        /// Lesson identifier
        lesson_id: String,
        /// Presentation style
        #[arg(long)]
        style: Option<String>,
        /// Skip the AI polish pass
        #[arg(long)]
        no_polish: bool,
        /// Queue priority
        #[arg(long, value_enum, default_value_t = PriorityArg::Normal)]
        priority: PriorityArg,
        /// Server-side timeout in seconds
        #[arg(long)]
        timeout: Option<u32>,
        /// Return after the job is queued instead of following it
        #[arg(long)]
        detach: bool,
        /// Export the finished presentation in this format
        #[arg(long, value_enum)]
        export: Option<FormatArg>,
        /// Where to write the export (defaults to <presentation>.<ext>)
        #[arg(short, long, requires = "export")]
        output: Option<PathBuf>,
    },

    /// Show the current status of a job
    Status {
        /// Job identifier
        job_id: String,
    },

    /// Follow a job until it finishes
    Watch {
        /// Job identifier
        job_id: String,
    },

    /// Ask the server to cancel a job
    Cancel {
        /// Job identifier
        job_id: String,
    },

    /// Ask the server to run a failed job again
    Retry {
        /// Job identifier
        job_id: String,
        /// Follow the retried job
        #[arg(long)]
        watch: bool,
    },

    /// Export a presentation to a file
    Export {
        /// Presentation identifier
        presentation_id: String,
        /// Requested format
        #[arg(short, long, value_enum, default_value_t = FormatArg::Pptx)]
        format: FormatArg,
        /// Formats to try, in order, if the requested one fails
        #[arg(long, value_enum)]
        fallback: Vec<FormatArg>,
        /// Run as a tracked export job with live progress
        #[arg(long, conflicts_with = "fallback")]
        track: bool,
        /// Output file (defaults to <presentation>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Export format as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Markdown,
    Pptx,
    Pdf,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => Self::Json,
            FormatArg::Markdown => Self::Markdown,
            FormatArg::Pptx => Self::Pptx,
            FormatArg::Pdf => Self::Pdf,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => Self::Low,
            PriorityArg::Normal => Self::Normal,
            PriorityArg::High => Self::High,
        }
    }
}
