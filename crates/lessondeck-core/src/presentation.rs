//! Request and response types of the presentation API.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::progress::{JobStatus, StepStatus};

/// Scheduling priority of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Body of `POST /presentations/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub lesson_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub use_llm_polish: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl GenerateRequest {
    /// Request with LLM polishing on and default priority.
    pub fn new(lesson_id: impl Into<String>) -> Self {
        Self {
            lesson_id: lesson_id.into(),
            style: None,
            use_llm_polish: true,
            timeout_seconds: None,
            priority: Priority::Normal,
            max_retries: None,
        }
    }

    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    #[must_use]
    pub const fn with_llm_polish(mut self, enabled: bool) -> Self {
        self.use_llm_polish = enabled;
        self
    }

    #[must_use]
    pub const fn with_timeout_seconds(mut self, seconds: u32) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

/// Response of `POST /presentations/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub message: Option<String>,
}

/// Per-step entry of a job status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStatusDto {
    #[serde(alias = "step_id", alias = "id")]
    pub step: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: StepStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Response of `GET /presentations/jobs/{job_id}`.
///
/// Also used for export status, whose `export_id`/`download_url` fields
/// are ignored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "error")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepStatusDto>,
    #[serde(default)]
    pub estimated_time_remaining: Option<f64>,
    #[serde(default)]
    pub presentation_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Export artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
    Pptx,
    Pdf,
}

impl ExportFormat {
    /// Query-string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Pptx => "pptx",
            Self::Pdf => "pdf",
        }
    }

    /// File extension for saved artifacts.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Pptx => "pptx",
            Self::Pdf => "pdf",
        }
    }

    /// Formats to try when this one fails, most faithful first.
    #[must_use]
    pub fn default_fallbacks(self) -> Vec<Self> {
        match self {
            Self::Pptx => vec![Self::Pdf, Self::Markdown],
            Self::Pdf => vec![Self::Markdown],
            Self::Markdown => vec![Self::Json],
            Self::Json => Vec::new(),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "pptx" => Ok(Self::Pptx),
            "pdf" => Ok(Self::Pdf),
            other => Err(format!("unknown export format '{other}'")),
        }
    }
}

/// Body of the progress-tracked `POST /presentations/{id}/export`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub format: ExportFormat,
    #[serde(default)]
    pub include_speaker_notes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

impl ExportRequest {
    #[must_use]
    pub const fn new(format: ExportFormat) -> Self {
        Self {
            format,
            include_speaker_notes: false,
            theme: None,
        }
    }
}

/// Response of the progress-tracked export request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJobResponse {
    pub export_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub websocket_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /exports/{export_id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportStatusResponse {
    #[serde(default)]
    pub export_id: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "error")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub format: Option<ExportFormat>,
}

/// Downloaded export artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPayload {
    /// Format that actually succeeded (may be a fallback).
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl ExportPayload {
    /// Whether a fallback format was used instead of `requested`.
    #[must_use]
    pub fn is_fallback_for(&self, requested: ExportFormat) -> bool {
        self.format != requested
    }
}

/// A generated presentation.
///
/// Slides are kept as raw JSON; their schema belongs to the view layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    #[serde(alias = "presentation_id")]
    pub id: String,
    #[serde(default)]
    pub lesson_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slides: Vec<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}
