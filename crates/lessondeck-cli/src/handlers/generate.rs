//! Generate command handler.

use std::path::PathBuf;

use lessondeck_core::{ExportFormat, GenerateRequest, Priority};

use super::export;
use super::jobs::{presentation_id, watch_job};
use crate::bootstrap::AppContext;
use crate::error::CliError;

/// Arguments of `lessondeck generate`.
#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub lesson_id: String,
    pub style: Option<String>,
    pub polish: bool,
    pub priority: Priority,
    pub timeout_seconds: Option<u32>,
    pub detach: bool,
    pub export: Option<ExportFormat>,
    pub output: Option<PathBuf>,
}

impl GenerateArgs {
    pub fn request(&self) -> GenerateRequest {
        let mut request = GenerateRequest::new(&self.lesson_id)
            .with_llm_polish(self.polish)
            .with_priority(self.priority);
        if let Some(style) = &self.style {
            request = request.with_style(style);
        }
        if let Some(seconds) = self.timeout_seconds {
            request = request.with_timeout_seconds(seconds);
        }
        request
    }
}

/// Queue a generation job, follow it, and optionally export the result.
pub async fn execute(ctx: &AppContext, args: GenerateArgs) -> Result<(), CliError> {
    let response = ctx.api().generate_presentation(&args.request()).await?;
    println!("Queued job {} for lesson {}", response.job_id, args.lesson_id);
    if args.detach {
        println!("Follow it with: lessondeck watch {}", response.job_id);
        return Ok(());
    }

    let finished = watch_job(ctx, &response.job_id).await?;
    let presentation = presentation_id(ctx, &response.job_id, &finished).await?;
    println!("Presentation ready: {presentation}");

    if let Some(format) = args.export {
        export::download(ctx, &presentation, format, &[], args.output).await?;
    }
    Ok(())
}
