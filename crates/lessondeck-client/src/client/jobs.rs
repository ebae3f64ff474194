//! Generation jobs: create, inspect, cancel, retry, poll.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lessondeck_core::{
    ApiError, GenerateRequest, GenerateResponse, JobStatusResponse, ProgressUpdate, StatusSource,
};
use reqwest::Method;
use tracing::debug;

use super::PresentationApiClient;
use crate::endpoints::{generate_url, job_retry_url, job_url};
use crate::http::HttpBackend;
use crate::parsing::job_status_to_update;

/// Callback invoked with every polled status.
pub type PollCallback = Arc<dyn Fn(&JobStatusResponse) + Send + Sync>;

/// Options for [`PresentationApiClient::poll_job_status`].
#[derive(Clone)]
pub struct PollOptions {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub on_progress: Option<PollCallback>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_attempts: 120,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            on_progress: None,
        }
    }
}

impl PollOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the backoff bounds. `max_delay` is raised to `initial_delay`
    /// if it is smaller.
    #[must_use]
    pub fn with_delays(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay.max(initial_delay);
        self
    }

    #[must_use]
    pub fn on_progress(
        mut self,
        callback: impl Fn(&JobStatusResponse) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for PollOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollOptions")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl<B: HttpBackend> PresentationApiClient<B> {
    /// Start generating a presentation. Does not wait for the job.
    pub async fn generate_presentation(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ApiError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ApiError::validation(format!("unserializable request: {e}")))?;
        let http = self
            .request(Method::POST, generate_url(&self.base_url))
            .with_json(body);
        let response: GenerateResponse = self
            .execute_json(&http, self.config.retry.generate)
            .await?;
        debug!(job_id = %response.job_id, lesson_id = %request.lesson_id, "generation job created");
        Ok(response)
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError> {
        let http = self.request(Method::GET, job_url(&self.base_url, job_id));
        self.execute_json(&http, self.config.retry.job_status).await
    }

    /// Request server-side cancellation. Local subscriptions are untouched.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
        let http = self.request(Method::DELETE, job_url(&self.base_url, job_id));
        self.execute(&http, self.config.retry.cancel_job).await?;
        Ok(())
    }

    /// Ask the server to run a failed or cancelled job again.
    pub async fn retry_job(&self, job_id: &str) -> Result<GenerateResponse, ApiError> {
        let http = self.request(Method::POST, job_retry_url(&self.base_url, job_id));
        self.execute_json(&http, self.config.retry.retry_job).await
    }

    /// Poll a job until it reaches a terminal status.
    ///
    /// The first poll happens immediately. The delay between polls starts at
    /// `initial_delay` and doubles up to `max_delay`. Running out of
    /// attempts is a `Timeout` error.
    pub async fn poll_job_status(
        &self,
        job_id: &str,
        options: &PollOptions,
    ) -> Result<JobStatusResponse, ApiError> {
        let attempts = options.max_attempts.max(1);
        let mut delay = options.initial_delay;

        for attempt in 1..=attempts {
            let status = self.get_job_status(job_id).await?;
            debug!(
                job_id,
                attempt,
                status = %status.status,
                progress = status.progress,
                "polled job"
            );
            if let Some(callback) = &options.on_progress {
                callback(&status);
            }
            if status.status.is_terminal() {
                return Ok(status);
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2).min(options.max_delay);
            }
        }

        Err(ApiError::timeout(format!(
            "job {job_id} did not finish after {attempts} status checks"
        )))
    }
}

#[async_trait]
impl<B: HttpBackend + 'static> StatusSource for PresentationApiClient<B> {
    async fn fetch_update(&self, job_id: &str) -> Result<ProgressUpdate, ApiError> {
        let status = self.get_job_status(job_id).await?;
        Ok(job_status_to_update(job_id, &status))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::client::tests::client;
    use crate::http::testing::{CannedResponse, FakeBackend};
    use lessondeck_core::{ErrorCode, JobStatus, UpdateKind};
    use serde_json::json;

    #[tokio::test]
    async fn test_generate_presentation() {
        let backend = FakeBackend::new().with_response(
            Method::POST,
            "presentations/generate",
            CannedResponse::json(202, json!({"job_id": "job-1", "status": "pending", "message": "Queued"})),
        );
        let api = client(backend.clone());

        let request = GenerateRequest::new("lesson-42")
            .with_llm_polish(true)
            .with_timeout_seconds(30);
        let response = tokio_test::assert_ok!(api.generate_presentation(&request).await);
        assert_eq!(response.job_id, "job-1");
        assert_eq!(response.status, JobStatus::Pending);
        assert_eq!(backend.count(&Method::POST, "presentations/generate"), 1);
    }

    #[tokio::test]
    async fn test_conflict_is_not_retried() {
        let backend = FakeBackend::new().with_response(
            Method::POST,
            "presentations/generate",
            CannedResponse::json(409, json!({"error_code": "JOB_ALREADY_RUNNING", "message": "lesson busy"})),
        );
        let api = client(backend.clone());

        let err = tokio_test::assert_err!(
            api.generate_presentation(&GenerateRequest::new("lesson-42"))
                .await
        );
        assert_eq!(err.code, ErrorCode::Conflict);
        assert_eq!(backend.count(&Method::POST, "presentations/generate"), 1);
    }

    #[tokio::test]
    async fn test_cancel_and_retry_endpoints() {
        let backend = FakeBackend::new()
            .with_response(
                Method::DELETE,
                "jobs/job-1",
                CannedResponse::json(200, json!({"message": "cancelled"})),
            )
            .with_response(
                Method::POST,
                "jobs/job-1/retry",
                CannedResponse::json(200, json!({"job_id": "job-1", "status": "pending"})),
            );
        let api = client(backend.clone());

        tokio_test::assert_ok!(api.cancel_job("job-1").await);
        let retried = tokio_test::assert_ok!(api.retry_job("job-1").await);
        assert_eq!(retried.job_id, "job-1");

        let requests = backend.requests();
        assert_eq!(requests[0].0, Method::DELETE);
        assert!(requests[1].1.ends_with("/presentations/jobs/job-1/retry"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_complete_with_non_decreasing_progress() {
        let backend = FakeBackend::new().with_responses(
            Method::GET,
            "jobs/job-1",
            vec![
                CannedResponse::json(200, json!({"status": "pending", "progress": 0})),
                CannedResponse::json(200, json!({"status": "running", "progress": 25, "current_step": "outline"})),
                CannedResponse::json(200, json!({"status": "running", "progress": 70, "current_step": "slides"})),
                CannedResponse::json(200, json!({"status": "completed", "progress": 100, "presentation_id": "pres-1"})),
            ],
        );
        let api = client(backend);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let options = PollOptions::new()
            .with_delays(Duration::from_millis(100), Duration::from_millis(300))
            .on_progress(move |status| recorder.lock().unwrap().push(status.progress));

        let started = tokio::time::Instant::now();
        let last = api.poll_job_status("job-1", &options).await.unwrap();
        assert_eq!(last.status, JobStatus::Completed);
        assert_eq!(last.presentation_id.as_deref(), Some("pres-1"));

        let progress = seen.lock().unwrap().clone();
        assert_eq!(progress, vec![0.0, 25.0, 70.0, 100.0]);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        // 100 + 200 + 300 (capped)
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(600));
        assert!(elapsed < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_exhaustion_is_timeout() {
        let backend = FakeBackend::new().with_response(
            Method::GET,
            "jobs/job-1",
            CannedResponse::json(200, json!({"status": "running", "progress": 10})),
        );
        let api = client(backend.clone());

        let options = PollOptions::new()
            .with_max_attempts(3)
            .with_delays(Duration::from_millis(50), Duration::from_millis(50));
        let err = api.poll_job_status("job-1", &options).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert_eq!(backend.count(&Method::GET, "jobs/job-1"), 3);
    }

    #[tokio::test]
    async fn test_status_source_translation() {
        let backend = FakeBackend::new().with_response(
            Method::GET,
            "jobs/job-7",
            CannedResponse::json(200, json!({"status": "completed", "presentation_id": "pres-7"})),
        );
        let source: Arc<dyn StatusSource> = Arc::new(client(backend));

        let update = source.fetch_update("job-7").await.unwrap();
        assert_eq!(update.job_id, "job-7");
        assert!(matches!(
            update.kind,
            UpdateKind::JobComplete { presentation_id: Some(ref id), .. } if id == "pres-7"
        ));
    }
}
