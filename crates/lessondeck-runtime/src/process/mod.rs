//! Process-level building blocks for the backend supervisor.
//!
//! - `launcher` - spawning (`BackendLauncher`, `CommandLauncher`)
//! - `ports` - free port search on 127.0.0.1
//! - `logs` - stdout/stderr forwarding and the recent-output buffer
//! - `shutdown` - SIGTERM → SIGKILL escalation
//! - `broadcaster` - lifecycle event fan-out

mod broadcaster;
mod launcher;
mod logs;
mod ports;
pub mod shutdown;

pub use broadcaster::EventBroadcaster;
pub use launcher::{BackendLauncher, CommandLauncher, LaunchSpec};
pub use logs::{LogBuffer, forward_output};
pub use ports::{allocate_port, is_port_available};
pub use shutdown::shutdown_child;
