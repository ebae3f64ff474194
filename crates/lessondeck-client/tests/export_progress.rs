//! Progress-tracked exports against an in-process API.

mod common;

use std::sync::Arc;

use common::{FakeRemote, eventually, next_connection, terminal_event};
use lessondeck_client::{
    ChannelListener, ExportProgressClient, PresentationApiClient, SubscriptionEvent,
};
use lessondeck_core::{ExportFormat, ExportRequest, UpdateKind};
use serde_json::json;

fn setup(remote: &FakeRemote) -> ExportProgressClient {
    let api = PresentationApiClient::new(remote.client_config()).unwrap();
    ExportProgressClient::new(api, FakeRemote::progress_config())
}

#[tokio::test]
async fn export_is_polled_to_completion_and_downloaded() {
    let remote = FakeRemote::start().await;
    remote.script(
        "exp-1",
        vec![
            json!({"export_id": "exp-1", "status": "queued"}),
            json!({"export_id": "exp-1", "status": "processing", "progress": 50}),
            json!({
                "export_id": "exp-1",
                "status": "completed",
                "progress": 100,
                "download_url": "/api/presentations/exports/exp-1/download",
                "format": "pdf",
            }),
        ],
    );
    let exports = setup(&remote);
    let (listener, mut rx) = ChannelListener::new();

    let started = tokio_test::assert_ok!(
        exports
            .start_export("pres-1", &ExportRequest::new(ExportFormat::Pdf), Arc::new(listener))
            .await
    );
    assert_eq!(started.export_id, "exp-1");
    assert_eq!(remote.requests("POST pres-1/export"), 1);
    assert!(!next_connection(&mut rx).await);

    match terminal_event(&mut rx).await {
        SubscriptionEvent::Completed { update, .. } => {
            let UpdateKind::JobComplete { result: Some(result), .. } = update.kind else {
                panic!("expected a completion result");
            };
            assert_eq!(result["download_url"], "/api/presentations/exports/exp-1/download");
            assert_eq!(result["format"], "pdf");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(!exports.is_tracking("exp-1"));
    assert_eq!(exports.requested_format("exp-1"), Some(ExportFormat::Pdf));

    let artifact = tokio_test::assert_ok!(exports.download_export("exp-1").await);
    assert_eq!(artifact.format, ExportFormat::Pdf);
    assert_eq!(artifact.bytes, b"%PDF-1.7");
    assert_eq!(exports.requested_format("exp-1"), None);
}

#[tokio::test]
async fn export_progress_uses_the_export_socket() {
    let remote = FakeRemote::start().await;
    remote.enable_sockets(true);
    let exports = setup(&remote);
    let (listener, mut rx) = ChannelListener::new();

    exports
        .start_export("pres-1", &ExportRequest::new(ExportFormat::Pptx), Arc::new(listener))
        .await
        .unwrap();
    assert!(next_connection(&mut rx).await);
    eventually("subscribe_job", || remote.frames("subscribe_job", Some("exp-1")) == 1).await;

    remote.push(json!({"type": "progress", "job_id": "exp-1", "progress": 60}));
    remote.push(json!({"type": "job_error", "job_id": "exp-1", "error_message": "font missing"}));

    match terminal_event(&mut rx).await {
        SubscriptionEvent::Failed(failure) => {
            assert_eq!(failure.job_id, "exp-1");
            assert_eq!(failure.message, "font missing");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(remote.requests("exports/exp-1/status"), 0);
}

#[tokio::test]
async fn cancel_stops_tracking_and_retry_resubscribes() {
    let remote = FakeRemote::start().await;
    remote.enable_sockets(true);
    let exports = setup(&remote);
    let (listener, mut rx) = ChannelListener::new();

    exports
        .start_export("pres-1", &ExportRequest::new(ExportFormat::Markdown), Arc::new(listener))
        .await
        .unwrap();
    assert!(next_connection(&mut rx).await);
    eventually("subscribe_job", || remote.frames("subscribe_job", Some("exp-1")) == 1).await;

    assert_eq!(exports.requested_format("exp-1"), Some(ExportFormat::Markdown));
    tokio_test::assert_ok!(exports.cancel_export("exp-1").await);
    assert!(!exports.is_tracking("exp-1"));
    assert_eq!(exports.requested_format("exp-1"), None);
    assert_eq!(remote.requests("DELETE exports/exp-1/cancel"), 1);
    eventually("unsubscribe_job", || remote.frames("unsubscribe_job", Some("exp-1")) == 1).await;
    while rx.try_recv().is_ok() {}

    let (listener, mut retried_rx) = ChannelListener::new();
    let retried = exports.retry_export("exp-1", Arc::new(listener)).await.unwrap();
    assert_eq!(retried.export_id, "exp-1");
    assert!(next_connection(&mut retried_rx).await);
    eventually("resubscribe", || remote.frames("subscribe_job", Some("exp-1")) == 2).await;

    remote.push(json!({"type": "job_complete", "job_id": "exp-1"}));
    assert!(matches!(terminal_event(&mut retried_rx).await, SubscriptionEvent::Completed { .. }));
    assert!(rx.try_recv().is_err(), "cancelled listener was called");

    let artifact = exports.download_export("exp-1").await.unwrap();
    // The server's content type wins over the remembered format.
    assert_eq!(artifact.format, ExportFormat::Pdf);
}
