//! Progress subscriptions against an in-process API with a real socket.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeRemote, eventually, next_connection, next_event, terminal_event};
use lessondeck_client::{
    ChannelListener, PresentationApiClient, ProgressSubscriptionClient, SubscriptionEvent,
};
use lessondeck_core::{JobStatus, UpdateKind};
use serde_json::json;

fn setup(remote: &FakeRemote) -> ProgressSubscriptionClient {
    let api = PresentationApiClient::new(remote.client_config()).unwrap();
    ProgressSubscriptionClient::for_jobs(&api, FakeRemote::progress_config())
}

#[tokio::test]
async fn falls_back_to_polling_when_socket_is_unavailable() {
    let remote = FakeRemote::start().await;
    remote.script(
        "job-1",
        vec![
            json!({"status": "pending", "progress": 0}),
            json!({"status": "running", "progress": 15, "current_step": "outline"}),
            json!({"status": "running", "progress": 55, "current_step": "slides"}),
            json!({"status": "completed", "progress": 100, "presentation_id": "pres-1"}),
        ],
    );
    let client = setup(&remote);
    let (listener, mut rx) = ChannelListener::new();

    client.subscribe("job-1", Arc::new(listener)).await;
    assert!(matches!(next_event(&mut rx).await, SubscriptionEvent::Connection(false)));

    let mut seen = Vec::new();
    let completed = loop {
        match next_event(&mut rx).await {
            SubscriptionEvent::Progress { progress, .. } => {
                seen.push(progress.overall_progress_percent);
            }
            SubscriptionEvent::Completed { update, progress } => break (update, progress),
            other => panic!("unexpected event {other:?}"),
        }
    };

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {seen:?}");
    let (update, progress) = completed;
    assert!(matches!(
        update.kind,
        UpdateKind::JobComplete { presentation_id: Some(ref id), .. } if id == "pres-1"
    ));
    assert_eq!(progress.status, JobStatus::Completed);
    assert!(!client.is_subscribed("job-1"));
    assert_eq!(remote.connections(), 0);

    let polls = remote.requests("jobs/job-1");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(remote.requests("jobs/job-1"), polls, "polling continued after completion");
}

#[tokio::test]
async fn socket_updates_reach_the_listener() {
    let remote = FakeRemote::start().await;
    remote.enable_sockets(true);
    let client = setup(&remote);
    let (listener, mut rx) = ChannelListener::new();

    client.subscribe("job-2", Arc::new(listener)).await;
    assert!(matches!(next_event(&mut rx).await, SubscriptionEvent::Connection(true)));
    eventually("subscribe_job", || remote.frames("subscribe_job", Some("job-2")) == 1).await;

    remote.push(json!({"type": "progress", "job_id": "job-2", "progress": 40, "current_step": "slides"}));
    remote.push(json!({"type": "step_complete", "job_id": "job-2", "step": "slides", "progress": 80}));
    remote.push(json!({"type": "job_complete", "job_id": "job-2", "presentation_id": "pres-2"}));

    match next_event(&mut rx).await {
        SubscriptionEvent::Progress { progress, .. } => {
            assert!((progress.overall_progress_percent - 40.0).abs() < f64::EPSILON);
            assert_eq!(progress.current_step.as_deref(), Some("slides"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    match terminal_event(&mut rx).await {
        SubscriptionEvent::Completed { progress, .. } => {
            assert!((progress.overall_progress_percent - 100.0).abs() < f64::EPSILON);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Nothing was polled while the socket was healthy.
    assert_eq!(remote.requests("jobs/job-2"), 0);
    assert!(!client.is_subscribed("job-2"));
}

#[tokio::test]
async fn no_delivery_after_unsubscribe() {
    let remote = FakeRemote::start().await;
    remote.enable_sockets(true);
    let client = setup(&remote);
    let (gone, mut gone_rx) = ChannelListener::new();
    let (kept, mut kept_rx) = ChannelListener::new();

    client.subscribe("job-a", Arc::new(gone)).await;
    client.subscribe("job-b", Arc::new(kept)).await;
    assert!(next_connection(&mut gone_rx).await);
    assert!(next_connection(&mut kept_rx).await);
    eventually("both subscriptions", || remote.frames("subscribe_job", None) == 2).await;
    assert_eq!(remote.connections(), 1, "subscriptions must share one socket");

    assert!(client.unsubscribe("job-a"));
    eventually("unsubscribe_job", || remote.frames("unsubscribe_job", Some("job-a")) == 1).await;

    remote.push(json!({"type": "progress", "job_id": "job-a", "progress": 90}));
    remote.push(json!({"type": "job_complete", "job_id": "job-a"}));
    remote.push(json!({"type": "progress", "job_id": "job-b", "progress": 30}));

    assert!(matches!(next_event(&mut kept_rx).await, SubscriptionEvent::Progress { .. }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(gone_rx.try_recv().is_err(), "unsubscribed listener was called");
    assert_eq!(client.active_subscriptions(), 1);
}

#[tokio::test]
async fn reconnects_after_unexpected_close() {
    let remote = FakeRemote::start().await;
    remote.enable_sockets(true);
    remote.script("job-3", vec![json!({"status": "running", "progress": 35})]);
    let client = setup(&remote);
    let (listener, mut rx) = ChannelListener::new();

    client.subscribe("job-3", Arc::new(listener)).await;
    assert!(next_connection(&mut rx).await);
    eventually("first subscribe_job", || remote.frames("subscribe_job", Some("job-3")) == 1).await;

    remote.close_sockets();
    assert!(!next_connection(&mut rx).await);
    assert!(next_connection(&mut rx).await);
    eventually("resubscribe", || remote.frames("subscribe_job", Some("job-3")) == 2).await;
    assert_eq!(remote.connections(), 2);
    // The gap was bridged by polling.
    assert!(remote.requests("jobs/job-3") >= 1);

    remote.push(json!({"type": "job_complete", "job_id": "job-3", "presentation_id": "pres-3"}));
    assert!(matches!(terminal_event(&mut rx).await, SubscriptionEvent::Completed { .. }));
}

#[tokio::test]
async fn stays_on_polling_after_reconnect_ceiling() {
    let remote = FakeRemote::start().await;
    remote.enable_sockets(true);
    remote.script(
        "job-4",
        vec![
            json!({"status": "running", "progress": 20}),
            json!({"status": "running", "progress": 20}),
            json!({"status": "running", "progress": 20}),
            json!({"status": "running", "progress": 20}),
            json!({"status": "running", "progress": 20}),
            json!({"status": "running", "progress": 20}),
            json!({"status": "running", "progress": 20}),
            json!({"status": "running", "progress": 20}),
            json!({"status": "failed", "error_message": "renderer crashed", "error_code": "SERVER_ERROR"}),
        ],
    );
    let api = PresentationApiClient::new(remote.client_config()).unwrap();
    let config = FakeRemote::progress_config()
        .with_reconnect_base_delay(Duration::from_millis(20))
        .with_max_reconnect_attempts(2);
    let client = ProgressSubscriptionClient::for_jobs(&api, config);
    let (listener, mut rx) = ChannelListener::new();

    client.subscribe("job-4", Arc::new(listener)).await;
    assert!(next_connection(&mut rx).await);
    eventually("subscribe_job", || remote.frames("subscribe_job", Some("job-4")) == 1).await;

    remote.enable_sockets(false);
    remote.close_sockets();
    assert!(!next_connection(&mut rx).await);

    match terminal_event(&mut rx).await {
        SubscriptionEvent::Failed(failure) => {
            assert_eq!(failure.message, "renderer crashed");
            assert_eq!(failure.error_code.as_deref(), Some("SERVER_ERROR"));
            assert!(!failure.is_cancelled());
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(remote.connections(), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn polled_and_pushed_updates_have_the_same_shape() {
    let remote = FakeRemote::start().await;
    remote.script(
        "job-5",
        vec![json!({"status": "completed", "progress": 100, "presentation_id": "pres-5"})],
    );
    let client = setup(&remote);
    let (listener, mut rx) = ChannelListener::new();

    client.subscribe("job-5", Arc::new(listener)).await;
    let SubscriptionEvent::Completed { update: polled, .. } = terminal_event(&mut rx).await else {
        panic!("expected completion");
    };

    remote.enable_sockets(true);
    let (listener, mut rx) = ChannelListener::new();
    client.subscribe("job-5", Arc::new(listener)).await;
    assert!(next_connection(&mut rx).await);
    eventually("subscribe_job", || remote.frames("subscribe_job", Some("job-5")) == 1).await;
    remote.push(json!({"type": "job_complete", "job_id": "job-5", "presentation_id": "pres-5"}));
    let SubscriptionEvent::Completed { update: pushed, .. } = terminal_event(&mut rx).await else {
        panic!("expected completion");
    };

    assert_eq!(polled.job_id, pushed.job_id);
    assert_eq!(polled.kind, pushed.kind);
}

fn heartbeat_client(remote: &FakeRemote) -> ProgressSubscriptionClient {
    let api = PresentationApiClient::new(remote.client_config()).unwrap();
    let config = FakeRemote::progress_config().with_heartbeat_interval(Duration::from_millis(30));
    ProgressSubscriptionClient::for_jobs(&api, config)
}

/// Pings seen so far, once the count has stopped moving.
async fn settled_pings(remote: &FakeRemote) -> usize {
    tokio::time::sleep(Duration::from_millis(100)).await;
    remote.frames("ping", None)
}

#[tokio::test]
async fn heartbeat_runs_while_subscribed() {
    let remote = FakeRemote::start().await;
    remote.enable_sockets(true);
    let client = heartbeat_client(&remote);
    let (listener, mut rx) = ChannelListener::new();

    client.subscribe("job-6", Arc::new(listener)).await;
    assert!(next_connection(&mut rx).await);
    eventually("heartbeats", || remote.frames("ping", None) >= 3).await;

    // The last subscription ending closes the socket and its heartbeat.
    assert!(client.unsubscribe("job-6"));
    eventually("unsubscribe_job", || remote.frames("unsubscribe_job", Some("job-6")) == 1).await;
    let pings = settled_pings(&remote).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(remote.frames("ping", None), pings, "heartbeat outlived the last subscription");
}

#[tokio::test]
async fn heartbeat_stops_when_connection_drops() {
    let remote = FakeRemote::start().await;
    remote.enable_sockets(true);
    remote.script("job-7", vec![json!({"status": "running", "progress": 10})]);
    let client = heartbeat_client(&remote);
    let (listener, mut rx) = ChannelListener::new();

    client.subscribe("job-7", Arc::new(listener)).await;
    assert!(next_connection(&mut rx).await);
    eventually("heartbeats", || remote.frames("ping", None) >= 2).await;

    remote.enable_sockets(false);
    remote.close_sockets();
    assert!(!next_connection(&mut rx).await);
    let pings = settled_pings(&remote).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(remote.frames("ping", None), pings, "heartbeat outlived the connection");

    // Still followed, now by polling.
    assert!(client.is_subscribed("job-7"));
    eventually("status polls", || remote.requests("jobs/job-7") >= 1).await;
    client.unsubscribe("job-7");
}
