//! Handlers against an in-process fake of the presentation API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use lessondeck_cli::handlers::export::{self, ExportArgs};
use lessondeck_cli::handlers::{generate, jobs};
use lessondeck_cli::{AppContext, CliConfig, CliError, bootstrap};
use lessondeck_core::{ExportFormat, Priority, Settings, SettingsUpdate};
use serde_json::json;

#[derive(Default)]
struct Remote {
    status_calls: AtomicUsize,
    export_status_calls: AtomicUsize,
}

async fn generate_job() -> Response {
    (
        StatusCode::ACCEPTED,
        axum::Json(json!({"job_id": "job-1", "status": "pending"})),
    )
        .into_response()
}

/// `job-1` runs once, then completes; `missing` does not exist.
async fn job_status(State(remote): State<Arc<Remote>>, Path(id): Path<String>) -> Response {
    if id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            axum::Json(json!({"error_code": "JOB_NOT_FOUND", "message": "no such job"})),
        )
            .into_response();
    }
    let call = remote.status_calls.fetch_add(1, Ordering::SeqCst);
    let body = if call == 0 {
        json!({"status": "running", "progress": 40.0, "current_step": "render_slides"})
    } else {
        json!({"status": "completed", "progress": 100.0, "presentation_id": "pres-1"})
    };
    axum::Json(body).into_response()
}

/// PPTX rendering is broken; everything else works.
async fn direct_export(
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    match query.get("format").map(String::as_str).unwrap_or_default() {
        "pptx" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({"error_code": "EXPORT_FAILED", "message": "renderer down"})),
        )
            .into_response(),
        "markdown" => (
            [(header::CONTENT_TYPE, "text/markdown")],
            format!("# {id}\n"),
        )
            .into_response(),
        _ => (
            [(header::CONTENT_TYPE, "application/json")],
            format!(r#"{{"id":"{id}"}}"#),
        )
            .into_response(),
    }
}

async fn start_export() -> Response {
    axum::Json(json!({"export_id": "exp-1", "status": "pending"})).into_response()
}

async fn export_status(State(remote): State<Arc<Remote>>) -> Response {
    let call = remote.export_status_calls.fetch_add(1, Ordering::SeqCst);
    let body = if call == 0 {
        json!({"export_id": "exp-1", "status": "running", "progress": 50.0})
    } else {
        json!({"export_id": "exp-1", "status": "completed", "progress": 100.0})
    };
    axum::Json(body).into_response()
}

async fn download() -> Response {
    ([(header::CONTENT_TYPE, "application/pdf")], "%PDF-1.7").into_response()
}

async fn start() -> (SocketAddr, Arc<Remote>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let remote = Arc::new(Remote::default());
    let app = Router::new()
        .route("/api/presentations/generate", post(generate_job))
        .route("/api/presentations/jobs/:id", get(job_status))
        .route(
            "/api/presentations/:id/export",
            get(direct_export).post(start_export),
        )
        .route("/api/presentations/exports/:id/status", get(export_status))
        .route("/api/presentations/exports/:id/download", get(download))
        .with_state(Arc::clone(&remote));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, remote)
}

/// Context pointed at the fake; no socket routes exist, so progress
/// falls back to fast polling.
async fn context(addr: SocketAddr) -> AppContext {
    let mut settings = Settings::with_defaults();
    settings.merge(&SettingsUpdate {
        poll_interval_ms: Some(Some(30)),
        ..SettingsUpdate::default()
    });
    let config =
        CliConfig::from_settings(settings).with_api_url(Some(format!("http://{addr}/api")));
    bootstrap(config).await.unwrap()
}

#[tokio::test]
async fn status_of_missing_job_maps_to_not_found_exit_code() {
    let (addr, _remote) = start().await;
    let ctx = context(addr).await;

    let err = jobs::status(&ctx, "missing").await.unwrap_err();
    assert!(matches!(err, CliError::Api(_)));
    assert_eq!(err.exit_code(), 66);
}

#[tokio::test]
async fn generate_follows_job_and_exports_result() {
    let (addr, remote) = start().await;
    let ctx = context(addr).await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("deck.md");

    let args = generate::GenerateArgs {
        lesson_id: "lesson-1".to_string(),
        style: None,
        polish: true,
        priority: Priority::Normal,
        timeout_seconds: None,
        detach: false,
        export: Some(ExportFormat::Markdown),
        output: Some(output.clone()),
    };
    generate::execute(&ctx, args).await.unwrap();

    assert!(remote.status_calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "# pres-1\n");
}

#[tokio::test]
async fn export_uses_fallback_format() {
    let (addr, _remote) = start().await;
    let ctx = context(addr).await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("deck.out");

    let args = ExportArgs {
        presentation_id: "pres-1".to_string(),
        format: ExportFormat::Pptx,
        fallbacks: vec![ExportFormat::Markdown],
        track: false,
        output: Some(output.clone()),
    };
    export::execute(&ctx, args).await.unwrap();
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "# pres-1\n");
}

#[tokio::test]
async fn export_without_fallbacks_fails() {
    let (addr, _remote) = start().await;
    let ctx = context(addr).await;
    let dir = tempfile::tempdir().unwrap();

    let args = ExportArgs {
        presentation_id: "pres-1".to_string(),
        format: ExportFormat::Pptx,
        fallbacks: Vec::new(),
        track: false,
        output: Some(dir.path().join("deck.pptx")),
    };
    let err = export::execute(&ctx, args).await.unwrap_err();
    assert!(matches!(err, CliError::Api(_)));
    assert!(!dir.path().join("deck.pptx").exists());
}

#[tokio::test]
async fn tracked_export_is_polled_then_downloaded() {
    let (addr, remote) = start().await;
    let ctx = context(addr).await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("deck.pdf");

    let args = ExportArgs {
        presentation_id: "pres-1".to_string(),
        format: ExportFormat::Pdf,
        fallbacks: Vec::new(),
        track: true,
        output: Some(output.clone()),
    };
    export::execute(&ctx, args).await.unwrap();

    assert!(remote.export_status_calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.7");
}
