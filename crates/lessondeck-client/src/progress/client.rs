//! Per-job progress subscriptions.
//!
//! All subscriptions of a client share one socket. A subscription is
//! always on exactly one [`Transport`]:
//!
//! - `Socket`: the server pushes updates after `subscribe_job`.
//! - `Polling`: a task fetches the job status every `poll_interval` and
//!   translates it into the same update shape.
//!
//! When the socket drops unexpectedly every socket subscription moves to
//! polling and a reconnect task starts (attempt `n` waits
//! `reconnect_base_delay * n`). On success they move back; once the
//! attempts run out the affected subscriptions stay on polling for good.
//! The socket is closed when the last subscription ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lessondeck_core::{
    ApiError, JobFailure, JobProgress, JobStatus, ProgressListener, ProgressUpdate, StatusSource,
    UpdateKind,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::messages::{ClientMessage, ServerMessage};
use crate::client::PresentationApiClient;
use crate::config::ProgressClientConfig;
use crate::http::HttpBackend;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why the socket could not be opened.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("socket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("socket handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("socket closed during setup")]
    ClosedEarly,
}

// ============================================================================
// State
// ============================================================================

struct SocketHandle {
    id: u64,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    cancel: CancellationToken,
}

enum SocketState {
    Closed,
    Open(SocketHandle),
    /// Holds the token of the reconnect task.
    Reconnecting(CancellationToken),
}

struct PollHandle {
    id: u64,
    cancel: CancellationToken,
}

/// Transport currently feeding a subscription.
enum Transport {
    Socket,
    Polling(PollHandle),
}

impl Transport {
    fn stop(&self) {
        if let Self::Polling(poll) = self {
            poll.cancel.cancel();
        }
    }
}

/// Which task produced an update.
#[derive(Debug, Clone, Copy)]
enum Origin {
    Socket(u64),
    Poll(u64),
}

struct Subscription {
    listener: Arc<dyn ProgressListener>,
    progress: JobProgress,
    transport: Transport,
    pinned_to_polling: bool,
    /// Set by `unsubscribe`; checked before every callback.
    closed: Arc<AtomicBool>,
}

impl Subscription {
    fn accepts(&self, origin: Origin, open_socket: Option<u64>) -> bool {
        match (origin, &self.transport) {
            (Origin::Socket(id), Transport::Socket) => open_socket == Some(id),
            (Origin::Poll(id), Transport::Polling(poll)) => poll.id == id,
            _ => false,
        }
    }

    fn notifier(&self) -> Notifier {
        Notifier {
            listener: Arc::clone(&self.listener),
            closed: Arc::clone(&self.closed),
        }
    }
}

struct ClientState {
    subscriptions: HashMap<String, Subscription>,
    socket: SocketState,
}

impl ClientState {
    const fn open_socket(&self) -> Option<u64> {
        match &self.socket {
            SocketState::Open(handle) => Some(handle.id),
            _ => None,
        }
    }

    fn send(&self, message: ClientMessage) {
        if let SocketState::Open(handle) = &self.socket {
            let _ = handle.outbound.send(message);
        }
    }

    /// Close the socket (or stop reconnecting) once nobody needs it.
    fn release_socket_if_idle(&mut self) {
        if !self.subscriptions.is_empty() {
            return;
        }
        match std::mem::replace(&mut self.socket, SocketState::Closed) {
            SocketState::Open(handle) => {
                debug!(socket = handle.id, "closing idle progress socket");
                handle.cancel.cancel();
            }
            SocketState::Reconnecting(token) => token.cancel(),
            SocketState::Closed => {}
        }
    }
}

/// Listener handle used outside the state lock.
struct Notifier {
    listener: Arc<dyn ProgressListener>,
    closed: Arc<AtomicBool>,
}

impl Notifier {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn connection(&self, connected: bool) {
        if !self.is_closed() {
            self.listener.on_connection_change(connected);
        }
    }

    fn update(&self, update: &ProgressUpdate, snapshot: &JobProgress) {
        if self.is_closed() {
            return;
        }
        self.listener.on_progress(update, snapshot);
        if !update.is_terminal() || self.is_closed() {
            return;
        }
        if update.is_success() {
            self.listener.on_complete(update, snapshot);
        } else if let Some(failure) = failure_from_update(update) {
            self.listener.on_error(&failure);
        }
    }

    fn failure(&self, failure: &JobFailure) {
        if !self.is_closed() {
            self.listener.on_error(failure);
        }
    }
}

fn failure_from_update(update: &ProgressUpdate) -> Option<JobFailure> {
    let job_id = update.job_id.as_str();
    match &update.kind {
        UpdateKind::JobError {
            error_message,
            error_code,
        } => Some(
            JobFailure::failed(job_id, error_message.clone()).with_error_code(error_code.clone()),
        ),
        UpdateKind::JobStatus {
            status: JobStatus::Failed,
            message,
            ..
        } => Some(JobFailure::failed(
            job_id,
            message.clone().unwrap_or_else(|| "Job failed".to_string()),
        )),
        UpdateKind::JobStatus {
            status: JobStatus::Cancelled,
            message,
            ..
        } => Some(JobFailure::cancelled(job_id, message.clone())),
        _ => None,
    }
}

// ============================================================================
// Client
// ============================================================================

/// Delivers job progress to listeners over a shared socket, falling back
/// to polling a [`StatusSource`].
///
/// Cloning is cheap; clones share subscriptions and the socket.
#[derive(Clone)]
pub struct ProgressSubscriptionClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ProgressClientConfig,
    socket_url: String,
    source: Arc<dyn StatusSource>,
    state: Mutex<ClientState>,
    /// Serializes handshakes so concurrent subscribes open one socket.
    connect_lock: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl ProgressSubscriptionClient {
    /// Create a client for the socket at `socket_url`, polling `source`
    /// when the socket is unavailable.
    pub fn new(
        config: ProgressClientConfig,
        socket_url: impl Into<String>,
        source: Arc<dyn StatusSource>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                socket_url: socket_url.into(),
                source,
                state: Mutex::new(ClientState {
                    subscriptions: HashMap::new(),
                    socket: SocketState::Closed,
                }),
                connect_lock: tokio::sync::Mutex::new(()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Track generation jobs of `api`'s user, polling the job status
    /// endpoint as the fallback.
    pub fn for_jobs<B: HttpBackend + 'static>(
        api: &PresentationApiClient<B>,
        config: ProgressClientConfig,
    ) -> Self {
        Self::new(config, api.config().progress_socket_url(), Arc::new(api.clone()))
    }

    /// Start delivering updates for `job_id` to `listener`.
    ///
    /// Reuses the open socket, or tries to open one within the connect
    /// timeout; otherwise the subscription polls. Either way the listener
    /// first hears `on_connection_change` with the transport in use.
    /// An existing subscription for the same job is replaced.
    pub async fn subscribe(&self, job_id: impl Into<String>, listener: Arc<dyn ProgressListener>) {
        let job_id = job_id.into();
        self.inner.ensure_socket().await;

        let (notifier, pending_poll) = {
            let mut state = self.inner.lock();
            let (transport, pending_poll) = if state.open_socket().is_some() {
                state.send(ClientMessage::SubscribeJob {
                    job_id: job_id.clone(),
                });
                (Transport::Socket, None)
            } else {
                let (handle, pending) = self.inner.new_poll(&job_id);
                (Transport::Polling(handle), Some(pending))
            };
            let subscription = Subscription {
                listener,
                progress: JobProgress::new(job_id.clone()),
                transport,
                pinned_to_polling: false,
                closed: Arc::new(AtomicBool::new(false)),
            };
            let notifier = subscription.notifier();
            if let Some(previous) = state.subscriptions.insert(job_id.clone(), subscription) {
                previous.closed.store(true, Ordering::Release);
                previous.transport.stop();
            }
            debug!(job_id = %job_id, socket = pending_poll.is_none(), "subscribed to job progress");
            (notifier, pending_poll)
        };

        notifier.connection(pending_poll.is_none());
        if let Some(pending) = pending_poll {
            self.inner.spawn_poll(pending);
        }
    }

    /// Stop delivering updates for `job_id`.
    ///
    /// Takes effect immediately: no callback fires for the job afterwards.
    /// The server is told best-effort and the socket closes when this was
    /// the last subscription. Returns whether a subscription existed.
    pub fn unsubscribe(&self, job_id: &str) -> bool {
        let mut state = self.inner.lock();
        let Some(subscription) = state.subscriptions.remove(job_id) else {
            return false;
        };
        subscription.closed.store(true, Ordering::Release);
        match &subscription.transport {
            Transport::Socket => state.send(ClientMessage::UnsubscribeJob {
                job_id: job_id.to_string(),
            }),
            Transport::Polling(poll) => poll.cancel.cancel(),
        }
        state.release_socket_if_idle();
        debug!(job_id, "unsubscribed from job progress");
        true
    }

    /// End every subscription and close the socket.
    pub fn unsubscribe_all(&self) {
        let job_ids: Vec<String> = self.inner.lock().subscriptions.keys().cloned().collect();
        for job_id in job_ids {
            self.unsubscribe(&job_id);
        }
    }

    pub fn is_subscribed(&self, job_id: &str) -> bool {
        self.inner.lock().subscriptions.contains_key(job_id)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    /// Latest folded snapshot for a live subscription.
    pub fn snapshot(&self, job_id: &str) -> Option<JobProgress> {
        self.inner
            .lock()
            .subscriptions
            .get(job_id)
            .map(|s| s.progress.clone())
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Socket lifecycle
    // ------------------------------------------------------------------

    /// Open the shared socket unless it is open or being reconnected.
    async fn ensure_socket(self: &Arc<Self>) {
        let _guard = self.connect_lock.lock().await;
        if !matches!(self.lock().socket, SocketState::Closed) {
            return;
        }

        match self.connect().await {
            Ok(handle) => {
                let mut state = self.lock();
                if handle.outbound.is_closed() || !matches!(state.socket, SocketState::Closed) {
                    handle.cancel.cancel();
                } else {
                    info!(socket = handle.id, url = %self.socket_url, "progress socket connected");
                    state.socket = SocketState::Open(handle);
                }
            }
            Err(error) => {
                debug!(
                    url = %self.socket_url,
                    %error,
                    "progress socket unavailable, polling instead"
                );
            }
        }
    }

    async fn connect(self: &Arc<Self>) -> Result<SocketHandle, SocketError> {
        let timeout = self.config.connect_timeout;
        let (socket, _) = tokio::time::timeout(timeout, connect_async(self.socket_url.as_str()))
            .await
            .map_err(|_| SocketError::Timeout(timeout))??;

        let id = self.next_id();
        let (outbound, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(drive_socket(
            Arc::downgrade(self),
            id,
            socket,
            rx,
            cancel.clone(),
            self.config.heartbeat_interval,
        ));
        Ok(SocketHandle {
            id,
            outbound,
            cancel,
        })
    }

    /// The socket `socket_id` ended without being asked to.
    fn on_socket_lost(self: &Arc<Self>, socket_id: u64) {
        let notifiers = {
            let mut state = self.lock();
            if state.open_socket() != Some(socket_id) {
                return;
            }
            if state.subscriptions.is_empty() {
                state.socket = SocketState::Closed;
                return;
            }

            let token = CancellationToken::new();
            state.socket = SocketState::Reconnecting(token.clone());
            tokio::spawn(reconnect(Arc::downgrade(self), token, self.config.clone()));

            let mut moved = Vec::new();
            for (job_id, subscription) in &mut state.subscriptions {
                if matches!(subscription.transport, Transport::Socket) {
                    let (handle, pending) = self.new_poll(job_id);
                    subscription.transport = Transport::Polling(handle);
                    moved.push((subscription.notifier(), pending));
                }
            }
            moved
        };

        warn!(
            socket = socket_id,
            moved = notifiers.len(),
            "progress socket closed unexpectedly, polling while reconnecting"
        );
        for (notifier, pending) in notifiers {
            notifier.connection(false);
            self.spawn_poll(pending);
        }
    }

    /// Install a reconnected socket. Returns false if it is already dead.
    fn on_reconnected(
        &self,
        cancel: &CancellationToken,
        handle: SocketHandle,
        attempt: u32,
    ) -> bool {
        let notifiers = {
            let mut state = self.lock();
            if cancel.is_cancelled() || !matches!(state.socket, SocketState::Reconnecting(_)) {
                handle.cancel.cancel();
                return true;
            }
            if handle.outbound.is_closed() {
                return false;
            }

            let outbound = handle.outbound.clone();
            let socket_id = handle.id;
            state.socket = SocketState::Open(handle);

            let mut notifiers = Vec::new();
            for (job_id, subscription) in &mut state.subscriptions {
                if subscription.pinned_to_polling {
                    continue;
                }
                subscription.transport.stop();
                subscription.transport = Transport::Socket;
                let _ = outbound.send(ClientMessage::SubscribeJob {
                    job_id: job_id.clone(),
                });
                notifiers.push(subscription.notifier());
            }
            info!(
                socket = socket_id,
                attempt,
                resumed = notifiers.len(),
                "progress socket reconnected"
            );
            notifiers
        };

        for notifier in notifiers {
            notifier.connection(true);
        }
        true
    }

    /// Reconnect attempts ran out; pin everyone still polling.
    fn give_up_reconnecting(&self, cancel: &CancellationToken) {
        let mut state = self.lock();
        if cancel.is_cancelled() || !matches!(state.socket, SocketState::Reconnecting(_)) {
            return;
        }
        state.socket = SocketState::Closed;
        for subscription in state.subscriptions.values_mut() {
            subscription.pinned_to_polling = true;
        }
        warn!(
            attempts = self.config.max_reconnect_attempts,
            pinned = state.subscriptions.len(),
            "progress socket reconnect failed, staying on polling"
        );
    }

    fn handle_frame(self: &Arc<Self>, socket_id: u64, text: &str) {
        match ServerMessage::parse(text) {
            Ok(ServerMessage::Update(update)) => {
                let job_id = update.job_id.clone();
                self.deliver(&job_id, Origin::Socket(socket_id), update);
            }
            Ok(ServerMessage::SubscriptionResult {
                job_id: Some(job_id),
                success: false,
                message,
            }) => {
                warn!(
                    job_id = %job_id,
                    message = ?message,
                    "socket subscription rejected, polling instead"
                );
                self.move_to_polling(&job_id);
            }
            Ok(ServerMessage::Error { message }) => {
                warn!(socket = socket_id, %message, "progress socket error");
            }
            Ok(other) => trace!(socket = socket_id, message = ?other, "progress socket message"),
            Err(error) => debug!(socket = socket_id, %error, "ignoring malformed progress frame"),
        }
    }

    fn move_to_polling(self: &Arc<Self>, job_id: &str) {
        let (notifier, pending) = {
            let mut state = self.lock();
            let Some(subscription) = state.subscriptions.get_mut(job_id) else {
                return;
            };
            if !matches!(subscription.transport, Transport::Socket) {
                return;
            }
            let (handle, pending) = self.new_poll(job_id);
            subscription.transport = Transport::Polling(handle);
            subscription.pinned_to_polling = true;
            (subscription.notifier(), pending)
        };
        notifier.connection(false);
        self.spawn_poll(pending);
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    /// Fold `update` into its subscription and notify the listener.
    ///
    /// Returns whether `origin` should keep producing updates for the job.
    fn deliver(&self, job_id: &str, origin: Origin, update: ProgressUpdate) -> bool {
        let (notifier, snapshot) = {
            let mut state = self.lock();
            let open_socket = state.open_socket();
            let Some(subscription) = state.subscriptions.get_mut(job_id) else {
                trace!(job_id, ?origin, "dropping update for unknown subscription");
                return false;
            };
            if !subscription.accepts(origin, open_socket) {
                trace!(job_id, ?origin, "dropping update from inactive transport");
                return false;
            }

            subscription.progress.apply(&update);
            let snapshot = subscription.progress.clone();
            let notifier = subscription.notifier();

            if update.is_terminal() {
                if let Some(finished) = state.subscriptions.remove(job_id) {
                    finished.transport.stop();
                    if matches!(finished.transport, Transport::Socket) {
                        state.send(ClientMessage::UnsubscribeJob {
                            job_id: job_id.to_string(),
                        });
                    }
                }
                state.release_socket_if_idle();
                debug!(job_id, kind = update.kind_name(), "job reached a terminal state");
            }
            (notifier, snapshot)
        };

        notifier.update(&update, &snapshot);
        !update.is_terminal()
    }

    /// End a polling subscription that can no longer reach its job.
    fn fail(&self, job_id: &str, origin: Origin, error: ApiError) {
        let notifier = {
            let mut state = self.lock();
            let open_socket = state.open_socket();
            let accepted = state
                .subscriptions
                .get(job_id)
                .is_some_and(|s| s.accepts(origin, open_socket));
            if !accepted {
                return;
            }
            let Some(subscription) = state.subscriptions.remove(job_id) else {
                return;
            };
            state.release_socket_if_idle();
            subscription.notifier()
        };

        warn!(
            job_id,
            code = ?error.code,
            error = %error.technical_message,
            "giving up on job progress"
        );
        notifier.failure(&JobFailure::from_api_error(job_id, error));
    }

    // ------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------

    /// Allocate a poll transport. The task starts with [`Self::spawn_poll`]
    /// once the listener has been told about the switch.
    fn new_poll(&self, job_id: &str) -> (PollHandle, PendingPoll) {
        let id = self.next_id();
        let cancel = CancellationToken::new();
        let pending = PendingPoll {
            job_id: job_id.to_string(),
            id,
            cancel: cancel.clone(),
        };
        (PollHandle { id, cancel }, pending)
    }

    fn spawn_poll(self: &Arc<Self>, pending: PendingPoll) {
        tokio::spawn(poll_job(
            Arc::downgrade(self),
            Arc::clone(&self.source),
            pending,
            self.config.poll_interval,
            self.config.max_poll_failures,
        ));
    }
}

/// A poll task that has a handle but is not running yet.
struct PendingPoll {
    job_id: String,
    id: u64,
    cancel: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for subscription in state.subscriptions.values() {
            subscription.transport.stop();
        }
        match &state.socket {
            SocketState::Open(handle) => handle.cancel.cancel(),
            SocketState::Reconnecting(token) => token.cancel(),
            SocketState::Closed => {}
        }
    }
}

// ============================================================================
// Background tasks
// ============================================================================

/// Own one socket connection until it ends or is cancelled.
async fn drive_socket(
    inner: Weak<Inner>,
    id: u64,
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    cancel: CancellationToken,
    heartbeat: Duration,
) {
    let (mut sink, mut stream) = socket.split();
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let requested = loop {
        tokio::select! {
            // Queued messages go out before a close request is honoured.
            biased;

            Some(message) = outbound.recv() => {
                if let Err(error) = sink.send(Message::text(message.to_json())).await {
                    debug!(socket = id, %error, "progress socket send failed");
                    break false;
                }
            }
            () = cancel.cancelled() => break true,
            _ = ticker.tick() => {
                trace!(socket = id, "progress socket heartbeat");
                if sink.send(Message::text(ClientMessage::Ping.to_json())).await.is_err() {
                    break false;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Some(inner) = inner.upgrade() else { break true };
                    inner.handle_frame(id, &text);
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(socket = id, ?frame, "progress socket closed by server");
                    break false;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(socket = id, %error, "progress socket read failed");
                    break false;
                }
                None => break false,
            },
        }
    };

    // A reconnect check looks at whether this receiver is gone.
    drop(outbound);

    if requested {
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    } else if let Some(inner) = inner.upgrade() {
        inner.on_socket_lost(id);
    }
}

async fn reconnect(inner: Weak<Inner>, cancel: CancellationToken, config: ProgressClientConfig) {
    for attempt in 1..=config.max_reconnect_attempts {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(config.reconnect_delay(attempt)) => {}
        }
        let Some(strong) = inner.upgrade() else { return };

        let result = tokio::select! {
            () = cancel.cancelled() => return,
            result = strong.connect() => result,
        };
        match result {
            Ok(handle) => {
                if strong.on_reconnected(&cancel, handle, attempt) {
                    return;
                }
                debug!(attempt, "reconnected socket closed immediately");
            }
            Err(error) => debug!(attempt, %error, "progress socket reconnect attempt failed"),
        }
    }

    if let Some(strong) = inner.upgrade() {
        strong.give_up_reconnecting(&cancel);
    }
}

async fn poll_job(
    inner: Weak<Inner>,
    source: Arc<dyn StatusSource>,
    pending: PendingPoll,
    period: Duration,
    max_failures: u32,
) {
    let PendingPoll { job_id, id, cancel } = pending;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures = 0u32;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let result = tokio::select! {
            () = cancel.cancelled() => return,
            result = source.fetch_update(&job_id) => result,
        };
        let Some(inner) = inner.upgrade() else { return };

        match result {
            Ok(update) => {
                failures = 0;
                if !inner.deliver(&job_id, Origin::Poll(id), update) {
                    return;
                }
            }
            Err(error) => {
                failures += 1;
                if !error.retry_recommended || failures >= max_failures {
                    inner.fail(&job_id, Origin::Poll(id), error);
                    return;
                }
                debug!(job_id = %job_id, failures, code = ?error.code, "job status poll failed");
            }
        }
    }
}
