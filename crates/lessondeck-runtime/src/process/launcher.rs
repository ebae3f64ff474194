//! Spawning the backend process.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

/// Everything needed to spawn one backend process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    /// Full argument list, `--port=<N>` and the mode flag included.
    pub args: Vec<String>,
    /// Variables added on top of the inherited environment.
    pub envs: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    /// Port the process is expected to listen on.
    pub port: u16,
}

/// Spawns backend processes.
///
/// The supervisor only sees the returned [`Child`]; tests substitute a
/// launcher that serves the health endpoint in-process.
pub trait BackendLauncher: Send + Sync {
    /// Spawn the process described by `spec`.
    ///
    /// Stdout and stderr should be piped so output can be forwarded to logs.
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Child>;
}

/// Launches the configured program as an OS process.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

impl BackendLauncher for CommandLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Child> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        debug!(program = %spec.program, args = ?spec.args, port = spec.port, "Spawning backend");
        cmd.spawn()
    }
}
