//! Supervisor for the local backend process.
//!
//! The supervisor owns the backend state internally, using
//! `tokio::sync::Mutex` for async-safe access. Adapters (CLI, desktop shell)
//! call methods on it without storing process handles themselves.
//!
//! Each spawned process gets:
//! - an exit watcher task that owns the `Child` and either observes an
//!   unexpected exit or runs the termination sequence when asked to
//! - a health monitor task (once healthy) that restarts the process after
//!   a streak of failed checks
//!
//! Both are tied to a per-process generation number so a late event from an
//! old process never touches the state of its replacement.
//!
//! `start()` and `stop()` serialize on a lifecycle lock, so at most one
//! process is alive at any time. A `stop()` that arrives while a start is
//! still waiting for health cancels that start instead of queueing behind it.

use std::io;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::StreamExt;
use lessondeck_core::{BackendEvent, BackendPhase, BackendStateInfo, BackendStatus};
use reqwest::Client;
use tokio::process::Child;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::health::{local_client, request_shutdown, wait_for_http_health};
use crate::health_monitor::BackendHealthMonitor;
use crate::process::{
    BackendLauncher, CommandLauncher, EventBroadcaster, LogBuffer, allocate_port, forward_output,
    shutdown_child,
};

/// Output lines attached to startup errors.
const RECENT_OUTPUT_LINES: usize = 20;

/// Scope guard that clears the starting flag on drop.
///
/// Only one guard can exist at a time; a second `start()` is rejected
/// rather than queued.
struct StartingGuard<'a> {
    starting: &'a AtomicBool,
}

impl<'a> StartingGuard<'a> {
    fn try_acquire(starting: &'a AtomicBool) -> Option<Self> {
        starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { starting })
    }
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        self.starting.store(false, Ordering::SeqCst);
    }
}

/// Handle to a spawned process.
struct ProcessHandle {
    generation: u64,
    /// Stops the health monitor.
    monitor_cancel: CancellationToken,
    /// Cancelled by the exit watcher once the process is gone.
    exited: CancellationToken,
    /// Asks the exit watcher to run SIGTERM → SIGKILL.
    terminate: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<()>,
}

#[derive(Default)]
struct SupervisorState {
    phase: BackendPhase,
    port: Option<u16>,
    pid: Option<u32>,
    process: Option<ProcessHandle>,
    /// Cancelled by `stop()` to abort a start that is not yet running.
    pending_launch: Option<CancellationToken>,
}

impl SupervisorState {
    const fn status(&self) -> BackendStatus {
        BackendStatus {
            phase: self.phase,
            running: matches!(self.phase, BackendPhase::Running),
            port: self.port,
            pid: self.pid,
        }
    }

    fn info(&self) -> BackendStateInfo {
        BackendStateInfo::new(self.phase, self.port, self.pid)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.process
            .as_ref()
            .is_some_and(|p| p.generation == generation)
    }

    fn clear(&mut self) -> Option<ProcessHandle> {
        self.phase = BackendPhase::Stopped;
        self.port = None;
        self.pid = None;
        self.pending_launch = None;
        self.process.take()
    }
}

struct Inner {
    config: SupervisorConfig,
    launcher: Arc<dyn BackendLauncher>,
    http: Client,
    state: Mutex<SupervisorState>,
    /// Held across a whole launch or a whole stop.
    lifecycle: Mutex<()>,
    starting: AtomicBool,
    generation: AtomicU64,
    events: EventBroadcaster,
    output: LogBuffer,
}

/// Supervisor for the single local backend process.
///
/// Cheap to clone; clones share the same process. Dropping the last clone
/// terminates the process.
///
/// # Example
///
/// ```ignore
/// let supervisor = BackendSupervisor::new(SupervisorConfig::new("lessondeck-server"))?;
/// let port = supervisor.start().await?;
/// println!("Status: {:?}", supervisor.status().await);
/// supervisor.stop().await;
/// ```
#[derive(Clone)]
pub struct BackendSupervisor {
    inner: Arc<Inner>,
}

impl BackendSupervisor {
    /// Create a supervisor that spawns `config.program` as an OS process.
    pub fn new(config: SupervisorConfig) -> Result<Self, SupervisorError> {
        Self::with_launcher(config, Arc::new(CommandLauncher))
    }

    /// Create a supervisor with a custom launcher.
    pub fn with_launcher(
        config: SupervisorConfig,
        launcher: Arc<dyn BackendLauncher>,
    ) -> Result<Self, SupervisorError> {
        let http = local_client()
            .map_err(|e| SupervisorError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                launcher,
                http,
                state: Mutex::new(SupervisorState::default()),
                lifecycle: Mutex::new(()),
                starting: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                events: EventBroadcaster::new(),
                output: LogBuffer::new(),
            }),
        })
    }

    /// Start the backend and return its port.
    ///
    /// Returns the current port if the backend is already running. Fails
    /// with [`SupervisorError::AlreadyStarting`] while another start is in
    /// flight, and waits for a stop in progress to finish before spawning.
    /// On any startup failure the process is torn down before the error is
    /// returned.
    pub async fn start(&self) -> Result<u16, SupervisorError> {
        if let Some(port) = self.live_port().await {
            debug!(port, "Backend already running");
            return Ok(port);
        }

        let Some(_guard) = StartingGuard::try_acquire(&self.inner.starting) else {
            return Err(SupervisorError::AlreadyStarting);
        };
        let _lifecycle = self.inner.lifecycle.lock().await;

        // A start may have completed between the check and the guard.
        if let Some(port) = self.live_port().await {
            return Ok(port);
        }

        match self.inner.launch().await {
            Ok(port) => Ok(port),
            Err(e) => {
                if matches!(e, SupervisorError::StartCancelled { .. }) {
                    info!("Backend start cancelled, tearing down");
                } else {
                    warn!(error = %e, "Backend failed to start, tearing down");
                }
                self.inner.stop_process().await;
                Err(e)
            }
        }
    }

    /// Stop the backend.
    ///
    /// `POST /api/shutdown`, then a grace period, then SIGTERM, then SIGKILL.
    /// Never fails; calling it with nothing running is a no-op. A start
    /// still waiting for health is cancelled and fails with
    /// [`SupervisorError::StartCancelled`].
    pub async fn stop(&self) {
        {
            let state = self.inner.state.lock().await;
            if let Some(pending) = &state.pending_launch {
                debug!("Cancelling pending backend start");
                pending.cancel();
            }
        }
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.stop_process().await;
    }

    /// Stop, then start.
    pub async fn restart(&self) -> Result<u16, SupervisorError> {
        info!("Restarting backend");
        self.stop().await;
        self.start().await
    }

    /// Current state. Never blocks on process I/O.
    pub async fn status(&self) -> BackendStatus {
        self.inner.state.lock().await.status()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<BackendEvent> {
        self.inner.events.subscribe()
    }

    /// Recent output of the current (or last) backend process.
    pub fn recent_output(&self, lines: usize) -> Vec<String> {
        self.inner.output.tail(lines)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    async fn live_port(&self) -> Option<u16> {
        let state = self.inner.state.lock().await;
        match (state.phase, &state.process) {
            (BackendPhase::Running, Some(_)) => state.port,
            _ => None,
        }
    }

    /// Restart requested by the health monitor of process `generation`.
    async fn restart_unhealthy(&self, generation: u64, reason: String) {
        let info = {
            let state = self.inner.state.lock().await;
            if !state.is_current(generation) || state.phase != BackendPhase::Running {
                debug!(generation, "Process already replaced, skipping restart");
                return;
            }
            state.info()
        };
        self.inner.events.broadcast(BackendEvent::Restarting {
            state: info,
            reason,
        });
        match self.restart().await {
            Ok(port) => info!(port, "Backend restarted after failed health checks"),
            Err(e) => error!(error = %e, "Backend restart failed"),
        }
    }
}

impl Inner {
    /// Caller holds the lifecycle lock.
    async fn launch(self: &Arc<Self>) -> Result<u16, SupervisorError> {
        let (start, end) = self.config.port_range;
        let port =
            allocate_port(start, end).ok_or(SupervisorError::NoPortAvailable { start, end })?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.output.clear();

        let cancel = CancellationToken::new();
        let info = {
            let mut state = self.state.lock().await;
            state.phase = BackendPhase::Starting;
            state.port = Some(port);
            state.pid = None;
            state.pending_launch = Some(cancel.clone());
            state.info()
        };
        info!(port, generation, program = %self.config.program, "Starting backend");
        self.events.broadcast(BackendEvent::Starting(info));

        let spec = self.config.launch_spec(port);
        let mut child =
            self.launcher
                .launch(&spec)
                .map_err(|source| SupervisorError::SpawnFailed {
                    program: spec.program.clone(),
                    source,
                })?;
        let pid = child.id();
        forward_output(&mut child, port, &self.output);

        let exited = CancellationToken::new();
        {
            // Registered under the lock so the watcher cannot report an exit
            // for a process the state does not know yet.
            let mut state = self.state.lock().await;
            let (terminate_tx, terminate_rx) = oneshot::channel();
            let watcher = tokio::spawn(watch_process(
                Arc::downgrade(self),
                child,
                generation,
                terminate_rx,
                exited.clone(),
                self.config.kill_grace,
            ));
            state.pid = pid;
            state.process = Some(ProcessHandle {
                generation,
                monitor_cancel: CancellationToken::new(),
                exited: exited.clone(),
                terminate: Some(terminate_tx),
                watcher,
            });
        }

        let health = tokio::select! {
            result = wait_for_http_health(
                &self.http,
                port,
                self.config.startup_attempts,
                self.config.startup_interval,
                self.config.startup_check_timeout,
            ) => result,
            () = exited.cancelled() => {
                return Err(self.exited_during_startup(port));
            }
            () = cancel.cancelled() => {
                return Err(SupervisorError::StartCancelled { port });
            }
        };
        if let Err(last) = health {
            return Err(SupervisorError::StartTimeout {
                port,
                attempts: self.config.startup_attempts,
                last: last.to_string(),
            });
        }

        let (info, monitor_cancel) = {
            let mut state = self.state.lock().await;
            let Some(handle) = state.process.as_ref().filter(|p| p.generation == generation)
            else {
                return Err(self.exited_during_startup(port));
            };
            if cancel.is_cancelled() {
                return Err(SupervisorError::StartCancelled { port });
            }
            let monitor_cancel = handle.monitor_cancel.clone();
            state.phase = BackendPhase::Running;
            state.pending_launch = None;
            (state.info(), monitor_cancel)
        };
        info!(port, ?pid, "Backend is running");
        self.events.broadcast(BackendEvent::Running(info));

        self.spawn_monitor(port, generation, monitor_cancel);
        Ok(port)
    }

    /// Tear down the current process. Caller holds the lifecycle lock.
    async fn stop_process(&self) {
        let (handle, port, info) = {
            let mut state = self.state.lock().await;
            let Some(handle) = state.process.take() else {
                // A start that failed before a process existed.
                if state.phase == BackendPhase::Starting {
                    state.clear();
                }
                return;
            };
            state.phase = BackendPhase::Stopping;
            (handle, state.port, state.info())
        };

        let pid = info.pid;
        info!(?port, ?pid, "Stopping backend");
        self.events.broadcast(BackendEvent::Stopping(info));
        handle.monitor_cancel.cancel();

        self.shutdown_process(handle, port).await;

        self.state.lock().await.clear();
        info!(?port, "Backend stopped");
        let info = BackendStateInfo::new(BackendPhase::Stopped, port, pid);
        self.events.broadcast(BackendEvent::Stopped(info));
    }

    fn exited_during_startup(&self, port: u16) -> SupervisorError {
        SupervisorError::ExitedDuringStartup {
            port,
            recent_output: self.output.tail(RECENT_OUTPUT_LINES),
        }
    }

    fn spawn_monitor(self: &Arc<Self>, port: u16, generation: u64, cancel: CancellationToken) {
        let monitor = BackendHealthMonitor::new(
            self.http.clone(),
            port,
            self.config.monitor_interval,
            self.config.monitor_timeout,
            cancel.clone(),
        );
        let threshold = self.config.failure_threshold;
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut samples = std::pin::pin!(monitor.monitor());
            while let Some(sample) = samples.next().await {
                if sample.consecutive_failures < threshold {
                    continue;
                }
                // One restart per process: this monitor is done.
                cancel.cancel();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let reason = format!(
                    "{} consecutive health check failures ({})",
                    sample.consecutive_failures, sample.probe
                );
                warn!(port, %reason, "Backend unhealthy, restarting");
                let supervisor = BackendSupervisor { inner };
                // Detached: the restart stops this process and must not be
                // cancelled along with its monitor.
                tokio::spawn(async move {
                    supervisor.restart_unhealthy(generation, reason).await;
                });
                break;
            }
            debug!(port, generation, "Health monitor task exiting");
        });
    }

    /// Exit watcher callback for a process that exited on its own.
    async fn on_unexpected_exit(&self, generation: u64, status: io::Result<ExitStatus>) {
        let info = {
            let mut state = self.state.lock().await;
            if !state.is_current(generation) {
                // Exit during a requested stop.
                return;
            }
            let info = BackendStateInfo::new(BackendPhase::Stopped, state.port, state.pid);
            if let Some(handle) = state.clear() {
                handle.monitor_cancel.cancel();
            }
            info
        };

        match status {
            Ok(status) => {
                warn!(port = ?info.port, pid = ?info.pid, %status, "Backend exited unexpectedly");
            }
            Err(e) => {
                error!(
                    port = ?info.port,
                    pid = ?info.pid,
                    error = %e,
                    "Lost track of backend process"
                );
            }
        }
        self.events.broadcast(BackendEvent::Crashed(info));
    }

    async fn shutdown_process(&self, mut handle: ProcessHandle, port: Option<u16>) {
        if let Some(port) = port
            && !handle.exited.is_cancelled()
            && request_shutdown(&self.http, port, self.config.shutdown_request_timeout).await
        {
            debug!(port, "Shutdown request acknowledged");
            if timeout(self.config.shutdown_grace, handle.exited.cancelled())
                .await
                .is_ok()
            {
                debug!(port, "Backend exited after shutdown request");
            }
        }

        if !handle.exited.is_cancelled()
            && let Some(terminate) = handle.terminate.take()
        {
            let _ = terminate.send(());
        }

        if let Err(e) = handle.watcher.await {
            warn!(error = %e, "Exit watcher task failed");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.state.get_mut().process.as_mut() {
            handle.monitor_cancel.cancel();
            if let Some(terminate) = handle.terminate.take() {
                let _ = terminate.send(());
            }
        }
    }
}

/// Owns the child until it exits or termination is requested.
async fn watch_process(
    inner: Weak<Inner>,
    mut child: Child,
    generation: u64,
    terminate: oneshot::Receiver<()>,
    exited: CancellationToken,
    kill_grace: Duration,
) {
    let pid = child.id();
    tokio::select! {
        status = child.wait() => {
            exited.cancel();
            if let Some(inner) = inner.upgrade() {
                inner.on_unexpected_exit(generation, status).await;
            }
        }
        Ok(()) = terminate => {
            match shutdown_child(&mut child, kill_grace).await {
                Ok(status) => debug!(?pid, %status, "Backend terminated"),
                Err(e) => warn!(?pid, error = %e, "Failed to terminate backend"),
            }
            exited.cancel();
        }
    }
}
