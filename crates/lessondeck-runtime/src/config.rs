//! Configuration for the backend supervisor.

use std::path::PathBuf;
use std::time::Duration;

use lessondeck_core::Settings;

use crate::process::LaunchSpec;

/// Command-line flag telling the backend it runs under a supervisor.
pub const DEFAULT_MODE_FLAG: &str = "--managed";

/// Environment variable telling the backend it runs under a supervisor.
pub const DEFAULT_MODE_ENV: (&str, &str) = ("LESSONDECK_MANAGED", "1");

/// Configuration for [`BackendSupervisor`](crate::BackendSupervisor).
///
/// Use the builder methods to customize; the defaults match a desktop
/// deployment (30 startup checks one second apart, health checks every
/// 30 seconds, restart after two consecutive failures).
///
/// # Example
///
/// ```
/// use lessondeck_runtime::SupervisorConfig;
/// use std::time::Duration;
///
/// let config = SupervisorConfig::new("python3")
///     .with_args(["-m", "lessondeck_server"])
///     .with_port_range(8100, 8199)
///     .with_monitor_interval(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub(crate) program: String,
    pub(crate) args: Vec<String>,
    pub(crate) envs: Vec<(String, String)>,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) port_range: (u16, u16),
    pub(crate) mode_flag: Option<String>,
    pub(crate) mode_env: Option<(String, String)>,
    pub(crate) startup_attempts: u32,
    pub(crate) startup_interval: Duration,
    pub(crate) startup_check_timeout: Duration,
    pub(crate) shutdown_request_timeout: Duration,
    pub(crate) shutdown_grace: Duration,
    pub(crate) kill_grace: Duration,
    pub(crate) monitor_interval: Duration,
    pub(crate) monitor_timeout: Duration,
    pub(crate) failure_threshold: u32,
}

impl SupervisorConfig {
    /// Configuration launching `program` with default timings.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            working_dir: None,
            port_range: (
                lessondeck_core::DEFAULT_PORT_RANGE_START,
                lessondeck_core::DEFAULT_PORT_RANGE_END,
            ),
            mode_flag: Some(DEFAULT_MODE_FLAG.to_string()),
            mode_env: Some((DEFAULT_MODE_ENV.0.to_string(), DEFAULT_MODE_ENV.1.to_string())),
            startup_attempts: 30,
            startup_interval: Duration::from_secs(1),
            startup_check_timeout: Duration::from_secs(2),
            shutdown_request_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(5),
            kill_grace: Duration::from_secs(5),
            monitor_interval: Duration::from_secs(30),
            monitor_timeout: Duration::from_secs(5),
            failure_threshold: lessondeck_core::settings::DEFAULT_HEALTH_FAILURE_THRESHOLD,
        }
    }

    /// Build from application settings.
    ///
    /// Returns `None` when no backend program is configured.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        let program = settings.backend_program.clone()?;
        let (start, end) = settings.effective_port_range();
        let mut config = Self::new(program)
            .with_port_range(start, end)
            .with_failure_threshold(settings.effective_health_failure_threshold());
        if let Some(args) = &settings.backend_args {
            config = config.with_args(args.iter().cloned());
        }
        if let Some(dir) = &settings.backend_working_dir {
            config = config.with_working_dir(dir);
        }
        Some(config)
    }

    /// Replace the program arguments (the port and mode flag are appended).
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable for the child (the parent environment
    /// is inherited).
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Inclusive port range searched on 127.0.0.1.
    #[must_use]
    pub const fn with_port_range(mut self, start: u16, end: u16) -> Self {
        self.port_range = (start, end);
        self
    }

    /// Override or disable (`None`) the managed-mode flag.
    #[must_use]
    pub fn with_mode_flag(mut self, flag: Option<String>) -> Self {
        self.mode_flag = flag;
        self
    }

    /// Override or disable (`None`) the managed-mode environment variable.
    #[must_use]
    pub fn with_mode_env(mut self, env: Option<(String, String)>) -> Self {
        self.mode_env = env;
        self
    }

    /// Number of startup health checks before giving up.
    #[must_use]
    pub const fn with_startup_attempts(mut self, attempts: u32) -> Self {
        self.startup_attempts = attempts;
        self
    }

    /// Spacing of startup health checks.
    #[must_use]
    pub const fn with_startup_interval(mut self, interval: Duration) -> Self {
        self.startup_interval = interval;
        self
    }

    /// Per-request timeout of startup health checks.
    #[must_use]
    pub const fn with_startup_check_timeout(mut self, timeout: Duration) -> Self {
        self.startup_check_timeout = timeout;
        self
    }

    /// Timeout of the `POST /api/shutdown` request.
    #[must_use]
    pub const fn with_shutdown_request_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_request_timeout = timeout;
        self
    }

    /// How long to wait for a voluntary exit after the shutdown request.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// How long to wait after SIGTERM before SIGKILL.
    #[must_use]
    pub const fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Spacing of steady-state health checks.
    #[must_use]
    pub const fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Per-request timeout of steady-state health checks.
    #[must_use]
    pub const fn with_monitor_timeout(mut self, timeout: Duration) -> Self {
        self.monitor_timeout = timeout;
        self
    }

    /// Consecutive failed health checks that trigger a restart.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = if threshold == 0 { 1 } else { threshold };
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub const fn port_range(&self) -> (u16, u16) {
        self.port_range
    }

    pub const fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Launch description for a process bound to `port`.
    pub fn launch_spec(&self, port: u16) -> LaunchSpec {
        let mut args = self.args.clone();
        args.push(format!("--port={port}"));
        if let Some(flag) = &self.mode_flag {
            args.push(flag.clone());
        }

        let mut envs = self.envs.clone();
        envs.push(("PORT".to_string(), port.to_string()));
        if let Some(env) = &self.mode_env {
            envs.push(env.clone());
        }

        LaunchSpec {
            program: self.program.clone(),
            args,
            envs,
            working_dir: self.working_dir.clone(),
            port,
        }
    }
}
