//! Backend process lifecycle events.
//!
//! The supervisor broadcasts these so a shell (tray, status bar, CLI) can
//! follow the managed backend without polling `status()`.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of the managed backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPhase {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl BackendPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for BackendPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the supervisor state.
///
/// `running` is true only when `phase` is `Running`; `port` and `pid` are
/// set whenever a process exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackendStatus {
    pub phase: BackendPhase,
    pub running: bool,
    pub port: Option<u16>,
    pub pid: Option<u32>,
}

impl BackendStatus {
    /// Nothing is running.
    #[must_use]
    pub const fn stopped() -> Self {
        Self {
            phase: BackendPhase::Stopped,
            running: false,
            port: None,
            pid: None,
        }
    }

    /// Base URL of the managed backend, when one is running.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        match (self.running, self.port) {
            (true, Some(port)) => Some(format!("http://127.0.0.1:{port}")),
            _ => None,
        }
    }
}

/// Snapshot carried by lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStateInfo {
    pub phase: BackendPhase,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    /// Unix milliseconds.
    pub updated_at: u64,
}

impl BackendStateInfo {
    pub fn new(phase: BackendPhase, port: Option<u16>, pid: Option<u32>) -> Self {
        let updated_at = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        Self {
            phase,
            port,
            pid,
            updated_at,
        }
    }
}

/// Lifecycle event emitted by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendEvent {
    /// A start was requested and a port allocated.
    Starting(BackendStateInfo),
    /// Health check passed.
    Running(BackendStateInfo),
    /// Shutdown in progress.
    Stopping(BackendStateInfo),
    /// Process gone after a requested stop.
    Stopped(BackendStateInfo),
    /// Process exited without being asked to.
    Crashed(BackendStateInfo),
    /// Health monitor gave up on the process and is restarting it.
    Restarting {
        #[serde(flatten)]
        state: BackendStateInfo,
        reason: String,
    },
}

impl BackendEvent {
    /// State snapshot carried by the event.
    #[must_use]
    pub const fn state(&self) -> &BackendStateInfo {
        match self {
            Self::Starting(state)
            | Self::Running(state)
            | Self::Stopping(state)
            | Self::Stopped(state)
            | Self::Crashed(state)
            | Self::Restarting { state, .. } => state,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Starting(_) => "starting",
            Self::Running(_) => "running",
            Self::Stopping(_) => "stopping",
            Self::Stopped(_) => "stopped",
            Self::Crashed(_) => "crashed",
            Self::Restarting { .. } => "restarting",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_base_url() {
        assert_eq!(BackendStatus::stopped().base_url(), None);
        let status = BackendStatus {
            phase: BackendPhase::Running,
            running: true,
            port: Some(8123),
            pid: Some(42),
        };
        assert_eq!(status.base_url().as_deref(), Some("http://127.0.0.1:8123"));
    }

    #[test]
    fn test_event_serialization() {
        let event = BackendEvent::Running(BackendStateInfo::new(
            BackendPhase::Running,
            Some(8001),
            Some(7),
        ));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "running");
        assert_eq!(json["phase"], "running");
        assert_eq!(json["port"], 8001);

        let restarting = BackendEvent::Restarting {
            state: BackendStateInfo::new(BackendPhase::Running, Some(8001), Some(7)),
            reason: "2 consecutive health check failures".to_string(),
        };
        let json = serde_json::to_value(&restarting).unwrap();
        assert_eq!(json["type"], "restarting");
        assert_eq!(json["port"], 8001);
        assert_eq!(restarting.name(), "restarting");
        assert_eq!(restarting.state().pid, Some(7));
    }
}
