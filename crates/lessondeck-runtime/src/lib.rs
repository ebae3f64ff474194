//! Process runtime for lessondeck.
//!
//! Supervises the single local backend server: port allocation, spawning,
//! startup health polling, graceful shutdown and steady-state health
//! monitoring with automatic restart.
//!
//! ```ignore
//! use lessondeck_runtime::{BackendSupervisor, SupervisorConfig};
//!
//! let supervisor = BackendSupervisor::new(SupervisorConfig::new("lessondeck-server"))?;
//! let port = supervisor.start().await?;
//! // ...
//! supervisor.stop().await;
//! ```

#![deny(unsafe_code)]

mod config;
mod error;
pub mod health;
pub mod health_monitor;
pub mod process;
mod supervisor;

pub use config::{DEFAULT_MODE_ENV, DEFAULT_MODE_FLAG, SupervisorConfig};
pub use error::SupervisorError;
pub use health::{HealthProbe, check_http_health, wait_for_http_health};
pub use health_monitor::{BackendHealthMonitor, HealthSample};
pub use process::{BackendLauncher, CommandLauncher, EventBroadcaster, LaunchSpec};
pub use supervisor::BackendSupervisor;
