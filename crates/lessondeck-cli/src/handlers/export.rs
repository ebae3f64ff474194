//! Export command handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lessondeck_client::ChannelListener;
use lessondeck_core::{ExportFormat, ExportPayload, ExportRequest};
use tracing::{debug, info};

use super::follow::follow;
use crate::bootstrap::AppContext;
use crate::error::CliError;
use crate::presentation::format_export_saved;

/// Arguments of `lessondeck export`.
#[derive(Debug, Clone)]
pub struct ExportArgs {
    pub presentation_id: String,
    pub format: ExportFormat,
    pub fallbacks: Vec<ExportFormat>,
    pub track: bool,
    pub output: Option<PathBuf>,
}

pub async fn execute(ctx: &AppContext, args: ExportArgs) -> Result<(), CliError> {
    if args.track {
        tracked(ctx, &args.presentation_id, args.format, args.output).await
    } else {
        download(
            ctx,
            &args.presentation_id,
            args.format,
            &args.fallbacks,
            args.output,
        )
        .await
    }
}

/// Direct export, trying `fallbacks` in order when `format` fails.
pub async fn download(
    ctx: &AppContext,
    presentation_id: &str,
    format: ExportFormat,
    fallbacks: &[ExportFormat],
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let payload = ctx
        .api()
        .export_presentation(presentation_id, format, fallbacks)
        .await?;
    save(presentation_id, &payload, format, output)
}

/// Progress-tracked export job.
async fn tracked(
    ctx: &AppContext,
    presentation_id: &str,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let exports = ctx.exports();
    let (listener, mut events) = ChannelListener::new();
    let response = exports
        .start_export(presentation_id, &ExportRequest::new(format), Arc::new(listener))
        .await?;
    let export_id = response.export_id;
    println!("Export {export_id} started ({format})");

    let followed = follow(&export_id, &mut events).await;
    exports.unsubscribe(&export_id);
    followed?;

    let payload = exports.download_export(&export_id).await?;
    save(presentation_id, &payload, format, output)
}

fn save(
    presentation_id: &str,
    payload: &ExportPayload,
    requested: ExportFormat,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let path = output.unwrap_or_else(|| default_output_path(presentation_id, payload.format));
    write_payload(&path, payload)?;
    info!(
        presentation_id,
        path = %path.display(),
        format = %payload.format,
        bytes = payload.bytes.len(),
        "export saved"
    );
    println!("{}", format_export_saved(&path, payload, requested));
    Ok(())
}

fn write_payload(path: &Path, payload: &ExportPayload) -> Result<(), CliError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    debug!(path = %path.display(), "writing export");
    std::fs::write(path, &payload.bytes)?;
    Ok(())
}

/// `<presentation>.<ext>` in the current directory.
///
/// Path separators in the id are replaced so the file always lands in
/// the current directory.
pub fn default_output_path(presentation_id: &str, format: ExportFormat) -> PathBuf {
    let stem: String = presentation_id
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    PathBuf::from(format!("{stem}.{}", format.extension()))
}
