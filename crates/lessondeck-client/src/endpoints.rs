//! URL construction helpers for the presentation API.
//!
//! Pure functions over the configured base URL. Identifiers are pushed as
//! path segments, so they are percent-encoded.

use lessondeck_core::{ApiError, ExportFormat};
use url::Url;

/// Parse and check the configured API base URL.
pub fn parse_base_url(base: &str) -> Result<Url, ApiError> {
    let url = Url::parse(base)
        .map_err(|e| ApiError::validation(format!("invalid API base URL '{base}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ApiError::validation(format!(
            "API base URL must be http(s): {base}"
        )));
    }
    Ok(url)
}

/// Append path segments to the base URL.
fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

pub fn generate_url(base: &Url) -> Url {
    join(base, &["presentations", "generate"])
}

/// `GET`/`DELETE {api}/presentations/jobs/{job_id}`.
pub fn job_url(base: &Url, job_id: &str) -> Url {
    join(base, &["presentations", "jobs", job_id])
}

pub fn job_retry_url(base: &Url, job_id: &str) -> Url {
    join(base, &["presentations", "jobs", job_id, "retry"])
}

pub fn presentation_url(base: &Url, presentation_id: &str) -> Url {
    join(base, &["presentations", presentation_id])
}

/// `GET {api}/presentations/{id}/export?format=...` (direct download) or,
/// without a query, the progress-tracked `POST` endpoint.
pub fn export_url(base: &Url, presentation_id: &str, format: Option<ExportFormat>) -> Url {
    let mut url = join(base, &["presentations", presentation_id, "export"]);
    if let Some(format) = format {
        url.query_pairs_mut().append_pair("format", format.as_str());
    }
    url
}

/// `{api}/presentations/exports/{export_id}/{action}`.
pub fn export_job_url(base: &Url, export_id: &str, action: &str) -> Url {
    join(base, &["presentations", "exports", export_id, action])
}
