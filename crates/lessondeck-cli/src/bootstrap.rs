//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together
//! for the CLI. All concrete implementations are instantiated here:
//! - Settings (environment, `.env`, command-line overrides)
//! - The presentation API client (via lessondeck-client)
//! - Progress configuration shared by job and export subscriptions
//! - The backend supervisor (via lessondeck-runtime), when requested
//!
//! Command handlers receive the composed [`AppContext`] and never build
//! clients themselves.

use std::sync::Arc;

use lessondeck_client::{
    ClientConfig, ExportProgressClient, PresentationApiClient, ProgressClientConfig,
    ProgressSubscriptionClient,
};
use lessondeck_core::{Settings, SettingsUpdate, validate_settings};
use lessondeck_runtime::{BackendSupervisor, SupervisorConfig};
use tracing::info;

use crate::error::CliError;

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Settings loaded from the environment.
    pub settings: Settings,
    /// `--api-url` override.
    pub api_url: Option<String>,
    /// Start a supervised backend and talk to it instead of `api_url`.
    pub local_backend: bool,
}

impl CliConfig {
    /// Settings from `LESSONDECK_*` environment variables.
    pub fn from_env() -> Result<Self, CliError> {
        Ok(Self::from_settings(Settings::from_env()?))
    }

    pub const fn from_settings(settings: Settings) -> Self {
        Self {
            settings,
            api_url: None,
            local_backend: false,
        }
    }

    #[must_use]
    pub fn with_api_url(mut self, url: Option<String>) -> Self {
        self.api_url = url;
        self
    }

    #[must_use]
    pub const fn with_local_backend(mut self, enabled: bool) -> Self {
        self.local_backend = enabled;
        self
    }
}

/// Fully composed application context for CLI commands.
///
/// Owns the API client and, with `--local-backend`, the supervisor of the
/// backend it talks to. There are no process-wide singletons.
pub struct AppContext {
    settings: Settings,
    api: PresentationApiClient,
    progress: ProgressClientConfig,
    supervisor: Option<Arc<BackendSupervisor>>,
}

impl AppContext {
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Access the presentation API client.
    pub const fn api(&self) -> &PresentationApiClient {
        &self.api
    }

    /// A subscription client for generation jobs.
    pub fn job_progress(&self) -> ProgressSubscriptionClient {
        ProgressSubscriptionClient::for_jobs(&self.api, self.progress.clone())
    }

    /// A client for progress-tracked exports.
    pub fn exports(&self) -> ExportProgressClient {
        ExportProgressClient::new(self.api.clone(), self.progress.clone())
    }

    pub fn supervisor(&self) -> Option<&Arc<BackendSupervisor>> {
        self.supervisor.as_ref()
    }

    /// Stop the supervised backend, if this context started one.
    pub async fn shutdown(&self) {
        if let Some(supervisor) = &self.supervisor {
            supervisor.stop().await;
        }
    }
}

/// Supervisor configuration for `settings`, with an optional program
/// and argument override.
pub fn supervisor_config(
    settings: &Settings,
    program: Option<String>,
    args: Vec<String>,
) -> Result<SupervisorConfig, CliError> {
    let mut settings = settings.clone();
    if program.is_some() {
        settings.backend_program = program;
    }
    let config = SupervisorConfig::from_settings(&settings).ok_or_else(|| {
        CliError::Config(
            "no backend program configured (set LESSONDECK_BACKEND_PROGRAM or pass --program)"
                .to_string(),
        )
    })?;
    Ok(if args.is_empty() {
        config
    } else {
        config.with_args(args)
    })
}

/// Bootstrap the CLI application.
///
/// This is the composition root. It:
/// 1. Applies command-line overrides to the settings and validates them
/// 2. Starts the supervised backend when asked to, pointing the API at it
/// 3. Creates the API client and the progress configuration
pub async fn bootstrap(config: CliConfig) -> Result<AppContext, CliError> {
    let mut settings = config.settings;
    if let Some(url) = config.api_url {
        settings.merge(&SettingsUpdate {
            api_base_url: Some(Some(url)),
            ..SettingsUpdate::default()
        });
    }

    let supervisor = if config.local_backend {
        let supervisor = Arc::new(BackendSupervisor::new(supervisor_config(
            &settings,
            None,
            Vec::new(),
        )?)?);
        let port = supervisor.start().await?;
        info!(port, "local backend running");
        settings.merge(&SettingsUpdate {
            api_base_url: Some(Some(format!("http://127.0.0.1:{port}/api"))),
            ws_base_url: Some(None),
            ..SettingsUpdate::default()
        });
        Some(supervisor)
    } else {
        None
    };

    validate_settings(&settings)?;

    let api = PresentationApiClient::new(ClientConfig::from_settings(&settings))?;
    let progress = ProgressClientConfig::from_settings(&settings);

    Ok(AppContext {
        settings,
        api,
        progress,
        supervisor,
    })
}
