//! In-process fake of the presentation API and its progress sockets.

// Each test binary uses a different subset.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use futures_util::{SinkExt, StreamExt};
use lessondeck_client::{ClientConfig, ProgressClientConfig, SubscriptionEvent};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};

/// Something the test wants every open socket to do.
#[derive(Debug, Clone)]
pub enum Push {
    Text(String),
    Close,
}

#[derive(Default)]
struct Scripts {
    /// Status bodies per job or export id; the last one repeats.
    statuses: HashMap<String, VecDeque<Value>>,
}

pub struct FakeRemote {
    pub addr: SocketAddr,
    sockets_enabled: AtomicBool,
    connections: AtomicUsize,
    frames: Mutex<Vec<Value>>,
    requests: Mutex<Vec<String>>,
    scripts: Mutex<Scripts>,
    push: broadcast::Sender<Push>,
}

impl FakeRemote {
    pub async fn start() -> Arc<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (push, _) = broadcast::channel(64);
        let remote = Arc::new(Self {
            addr,
            sockets_enabled: AtomicBool::new(false),
            connections: AtomicUsize::new(0),
            frames: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            scripts: Mutex::new(Scripts::default()),
            push,
        });

        let app = Router::new()
            .route("/api/presentations/jobs/:id", get(job_status))
            .route("/api/presentations/:id/export", post(start_export))
            .route("/api/presentations/exports/:id/status", get(export_status))
            .route("/api/presentations/exports/:id/cancel", delete(cancel_export))
            .route("/api/presentations/exports/:id/retry", post(retry_export))
            .route("/api/presentations/exports/:id/download", get(download_export))
            .route("/ws/progress/:user", get(socket))
            .route("/ws/exports/:user", get(socket))
            .with_state(Arc::clone(&remote));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        remote
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_api_base_url(format!("http://{}/api", self.addr))
            .with_ws_base_url(format!("ws://{}", self.addr))
            .with_user_id("tester")
    }

    pub fn progress_config() -> ProgressClientConfig {
        ProgressClientConfig::new()
            .with_poll_interval(Duration::from_millis(40))
            .with_connect_timeout(Duration::from_secs(1))
            .with_reconnect_base_delay(Duration::from_millis(100))
    }

    pub fn enable_sockets(&self, enabled: bool) {
        self.sockets_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn script(&self, id: &str, statuses: Vec<Value>) {
        self.scripts
            .lock()
            .unwrap()
            .statuses
            .insert(id.to_string(), statuses.into());
    }

    pub fn push(&self, message: Value) {
        let _ = self.push.send(Push::Text(message.to_string()));
    }

    pub fn close_sockets(&self) {
        let _ = self.push.send(Push::Close);
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Client frames of the given `type`, optionally for one job.
    pub fn frames(&self, kind: &str, job_id: Option<&str>) -> usize {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f["type"] == kind)
            .filter(|f| job_id.is_none_or(|id| f["job_id"] == id))
            .count()
    }

    pub fn requests(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.contains(fragment))
            .count()
    }

    fn record(&self, request: String) {
        self.requests.lock().unwrap().push(request);
    }

    fn next_status(&self, id: &str) -> Option<Value> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.statuses.get_mut(id)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, axum::Json(json!({"detail": "Not Found"}))).into_response()
}

async fn job_status(State(remote): State<Arc<FakeRemote>>, Path(id): Path<String>) -> Response {
    remote.record(format!("GET jobs/{id}"));
    remote
        .next_status(&id)
        .map_or_else(not_found, |body| axum::Json(body).into_response())
}

async fn start_export(State(remote): State<Arc<FakeRemote>>, Path(id): Path<String>) -> Response {
    remote.record(format!("POST {id}/export"));
    (
        StatusCode::ACCEPTED,
        axum::Json(json!({
            "export_id": "exp-1",
            "status": "queued",
            "websocket_url": "/ws/exports/tester",
        })),
    )
        .into_response()
}

async fn export_status(State(remote): State<Arc<FakeRemote>>, Path(id): Path<String>) -> Response {
    remote.record(format!("GET exports/{id}/status"));
    remote
        .next_status(&id)
        .map_or_else(not_found, |body| axum::Json(body).into_response())
}

async fn cancel_export(State(remote): State<Arc<FakeRemote>>, Path(id): Path<String>) -> Response {
    remote.record(format!("DELETE exports/{id}/cancel"));
    axum::Json(json!({"message": "cancelled"})).into_response()
}

async fn retry_export(State(remote): State<Arc<FakeRemote>>, Path(id): Path<String>) -> Response {
    remote.record(format!("POST exports/{id}/retry"));
    axum::Json(json!({"export_id": id, "status": "queued"})).into_response()
}

async fn download_export(
    State(remote): State<Arc<FakeRemote>>,
    Path(id): Path<String>,
) -> Response {
    remote.record(format!("GET exports/{id}/download"));
    ([(header::CONTENT_TYPE, "application/pdf")], b"%PDF-1.7".to_vec()).into_response()
}

async fn socket(
    ws: WebSocketUpgrade,
    State(remote): State<Arc<FakeRemote>>,
    Path(_user): Path<String>,
) -> Response {
    if !remote.sockets_enabled.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| serve_socket(socket, remote))
}

async fn serve_socket(socket: WebSocket, remote: Arc<FakeRemote>) {
    remote.connections.fetch_add(1, Ordering::SeqCst);
    let mut pushes = remote.push.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            push = pushes.recv() => match push {
                Ok(Push::Text(text)) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Push::Close) | Err(_) => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(&text) {
                        remote.frames.lock().unwrap().push(value);
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Wait until `condition` holds, panicking after five seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<SubscriptionEvent>) -> SubscriptionEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a subscription event")
        .expect("listener dropped")
}

/// Skip events until a connection change arrives.
pub async fn next_connection(rx: &mut mpsc::UnboundedReceiver<SubscriptionEvent>) -> bool {
    loop {
        if let SubscriptionEvent::Connection(connected) = next_event(rx).await {
            return connected;
        }
    }
}

/// Skip events until the terminal one.
pub async fn terminal_event(
    rx: &mut mpsc::UnboundedReceiver<SubscriptionEvent>,
) -> SubscriptionEvent {
    loop {
        let event = next_event(rx).await;
        if event.is_terminal() {
            return event;
        }
    }
}
