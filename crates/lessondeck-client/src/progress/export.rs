//! Progress-tracked exports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use lessondeck_core::{
    ApiError, ExportFormat, ExportJobResponse, ExportPayload, ExportRequest, ProgressListener,
};
use tracing::{debug, info};

use super::client::ProgressSubscriptionClient;
use crate::client::{ExportStatusSource, PresentationApiClient};
use crate::config::ProgressClientConfig;
use crate::http::{HttpBackend, ReqwestBackend};

/// Starts export jobs and follows them to completion.
///
/// Export progress travels on its own socket (`/ws/exports/{user}`) and
/// falls back to polling the export status endpoint, with the same
/// reconnect behaviour as job progress.
pub struct ExportProgressClient<B: HttpBackend = ReqwestBackend> {
    api: PresentationApiClient<B>,
    progress: ProgressSubscriptionClient,
    /// Requested format per export, until it is downloaded or cancelled.
    formats: Mutex<HashMap<String, ExportFormat>>,
}

impl<B: HttpBackend + 'static> ExportProgressClient<B> {
    pub fn new(api: PresentationApiClient<B>, config: ProgressClientConfig) -> Self {
        let socket_url = api.config().export_socket_url();
        let source = Arc::new(ExportStatusSource::new(api.clone()));
        Self {
            progress: ProgressSubscriptionClient::new(config, socket_url, source),
            api,
            formats: Mutex::new(HashMap::new()),
        }
    }

    /// Start an export of `presentation_id` and subscribe `listener` to it.
    ///
    /// Returns the server's response; its `export_id` identifies the job
    /// in every other call.
    pub async fn start_export(
        &self,
        presentation_id: &str,
        request: &ExportRequest,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<ExportJobResponse, ApiError> {
        let response = self.api.start_export_job(presentation_id, request).await?;
        info!(
            presentation_id,
            export_id = %response.export_id,
            format = %request.format,
            "export started"
        );
        if let Some(url) = &response.websocket_url {
            debug!(export_id = %response.export_id, url = %url, "server suggested export socket");
        }

        self.remember(&response.export_id, request.format);
        self.progress.subscribe(response.export_id.clone(), listener).await;
        Ok(response)
    }

    /// Cancel an export on the server and stop tracking it.
    ///
    /// Tracking stops even when the server call fails.
    pub async fn cancel_export(&self, export_id: &str) -> Result<(), ApiError> {
        self.progress.unsubscribe(export_id);
        self.forget(export_id);
        self.api.cancel_export(export_id).await
    }

    /// Retry a failed export and track the new attempt with `listener`.
    pub async fn retry_export(
        &self,
        export_id: &str,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<ExportJobResponse, ApiError> {
        let response = self.api.retry_export(export_id).await?;
        if response.export_id != export_id
            && let Some(format) = self.forget(export_id)
        {
            self.remember(&response.export_id, format);
        }
        self.progress.subscribe(response.export_id.clone(), listener).await;
        Ok(response)
    }

    /// Download a finished export.
    pub async fn download_export(&self, export_id: &str) -> Result<ExportPayload, ApiError> {
        let expected = self.requested_format(export_id).unwrap_or(ExportFormat::Json);
        let payload = self.api.download_export(export_id, expected).await?;
        self.forget(export_id);
        Ok(payload)
    }

    /// Stop tracking an export without cancelling it.
    pub fn unsubscribe(&self, export_id: &str) -> bool {
        self.progress.unsubscribe(export_id)
    }

    pub fn is_tracking(&self, export_id: &str) -> bool {
        self.progress.is_subscribed(export_id)
    }

    pub const fn progress(&self) -> &ProgressSubscriptionClient {
        &self.progress
    }

    fn remember(&self, export_id: &str, format: ExportFormat) {
        self.formats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(export_id.to_string(), format);
    }

    /// Format requested for an export that is not yet downloaded.
    pub fn requested_format(&self, export_id: &str) -> Option<ExportFormat> {
        self.formats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(export_id)
            .copied()
    }

    fn forget(&self, export_id: &str) -> Option<ExportFormat> {
        self.formats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(export_id)
    }
}

impl<B: HttpBackend> Drop for ExportProgressClient<B> {
    fn drop(&mut self) {
        self.progress.unsubscribe_all();
    }
}
