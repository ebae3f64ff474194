//! Presentations and exports.

use async_trait::async_trait;
use lessondeck_core::{
    ApiError, ErrorCode, ExportFormat, ExportJobResponse, ExportPayload, ExportRequest,
    ExportStatusResponse, Presentation, ProgressUpdate, StatusSource,
};
use reqwest::Method;
use tracing::{info, warn};

use super::PresentationApiClient;
use crate::endpoints::{export_job_url, export_url, presentation_url};
use crate::http::{HttpBackend, HttpResponse};
use crate::parsing::{export_status_to_update, format_from_content_type};

/// Whether another format might succeed where this error happened.
///
/// Failures that would repeat for every format (missing presentation,
/// permissions, connectivity, throttling) skip the fallbacks.
const fn is_format_specific(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::Validation
            | ErrorCode::Server
            | ErrorCode::Storage
            | ErrorCode::Timeout
            | ErrorCode::Internal
    )
}

fn payload(response: HttpResponse, requested: ExportFormat) -> ExportPayload {
    let format = response
        .content_type
        .as_deref()
        .and_then(format_from_content_type)
        .unwrap_or(requested);
    ExportPayload {
        format,
        bytes: response.body.to_vec(),
        content_type: response.content_type,
    }
}

impl<B: HttpBackend> PresentationApiClient<B> {
    pub async fn get_presentation(&self, presentation_id: &str) -> Result<Presentation, ApiError> {
        let http = self.request(Method::GET, presentation_url(&self.base_url, presentation_id));
        self.execute_json(&http, self.config.retry.presentation).await
    }

    /// Download a presentation in one format, without fallbacks.
    pub async fn fetch_export(
        &self,
        presentation_id: &str,
        format: ExportFormat,
    ) -> Result<ExportPayload, ApiError> {
        let http = self.request(
            Method::GET,
            export_url(&self.base_url, presentation_id, Some(format)),
        );
        let response = self.execute(&http, self.config.retry.export).await?;
        Ok(ExportPayload {
            format,
            bytes: response.body.to_vec(),
            content_type: response.content_type,
        })
    }

    /// Download a presentation, trying `fallback_formats` in order if the
    /// requested format fails.
    ///
    /// A fallback success is not an error; the payload carries the format
    /// that worked. When every format fails the error of the requested
    /// format is returned.
    pub async fn export_presentation(
        &self,
        presentation_id: &str,
        format: ExportFormat,
        fallback_formats: &[ExportFormat],
    ) -> Result<ExportPayload, ApiError> {
        let original = match self.fetch_export(presentation_id, format).await {
            Ok(payload) => return Ok(payload),
            Err(error) => error,
        };

        if !is_format_specific(original.code) {
            return Err(original);
        }

        for &fallback in fallback_formats.iter().filter(|&&f| f != format) {
            warn!(
                presentation_id,
                requested = %format,
                fallback = %fallback,
                error = %original.technical_message,
                "export failed, trying fallback format"
            );
            match self.fetch_export(presentation_id, fallback).await {
                Ok(payload) => {
                    info!(
                        presentation_id,
                        format = %fallback,
                        "export succeeded with fallback format"
                    );
                    return Ok(payload);
                }
                Err(error) => {
                    warn!(
                        presentation_id,
                        format = %fallback,
                        code = ?error.code,
                        "fallback export failed"
                    );
                }
            }
        }

        Err(original)
    }

    /// Start a progress-tracked export job.
    pub async fn start_export_job(
        &self,
        presentation_id: &str,
        request: &ExportRequest,
    ) -> Result<ExportJobResponse, ApiError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ApiError::validation(format!("unserializable request: {e}")))?;
        let http = self
            .request(Method::POST, export_url(&self.base_url, presentation_id, None))
            .with_json(body);
        self.execute_json(&http, self.config.retry.export_job).await
    }

    pub async fn get_export_status(
        &self,
        export_id: &str,
    ) -> Result<ExportStatusResponse, ApiError> {
        let http = self.request(Method::GET, export_job_url(&self.base_url, export_id, "status"));
        self.execute_json(&http, self.config.retry.export_status).await
    }

    pub async fn cancel_export(&self, export_id: &str) -> Result<(), ApiError> {
        let http = self.request(
            Method::DELETE,
            export_job_url(&self.base_url, export_id, "cancel"),
        );
        self.execute(&http, self.config.retry.export_job).await?;
        Ok(())
    }

    pub async fn retry_export(&self, export_id: &str) -> Result<ExportJobResponse, ApiError> {
        let http = self.request(Method::POST, export_job_url(&self.base_url, export_id, "retry"));
        let mut response: ExportJobResponse =
            self.execute_json(&http, self.config.retry.export_job).await?;
        if response.export_id.is_empty() {
            response.export_id = export_id.to_string();
        }
        Ok(response)
    }

    /// Fetch a finished export artifact.
    ///
    /// The format is read from the response `Content-Type`, falling back to
    /// `expected`.
    pub async fn download_export(
        &self,
        export_id: &str,
        expected: ExportFormat,
    ) -> Result<ExportPayload, ApiError> {
        let http = self.request(Method::GET, export_job_url(&self.base_url, export_id, "download"));
        let response = self.execute(&http, self.config.retry.download).await?;
        Ok(payload(response, expected))
    }
}

/// [`StatusSource`] backed by the export status endpoint.
pub struct ExportStatusSource<B: HttpBackend> {
    api: PresentationApiClient<B>,
}

impl<B: HttpBackend> ExportStatusSource<B> {
    pub const fn new(api: PresentationApiClient<B>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<B: HttpBackend + 'static> StatusSource for ExportStatusSource<B> {
    async fn fetch_update(&self, export_id: &str) -> Result<ProgressUpdate, ApiError> {
        let status = self.api.get_export_status(export_id).await?;
        Ok(export_status_to_update(export_id, &status))
    }
}
