//! CLI entry point.
//!
//! Parses arguments, sets up logging, and routes commands to handlers.
//! Everything a handler needs comes from the bootstrapped context.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use lessondeck_cli::handlers::export::ExportArgs;
use lessondeck_cli::handlers::generate::GenerateArgs;
use lessondeck_cli::{
    AppContext, Cli, CliConfig, CliError, Commands, bootstrap, exit_code_for, handlers,
};

/// Log to stderr (stdout carries command output) and to a daily file
/// under the user data directory.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let log_dir = dirs::data_dir().map_or_else(
        || PathBuf::from(".").join("logs"),
        |dir| dir.join("lessondeck").join("logs"),
    );
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory: {e}");
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, "lessondeck");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .compact(),
        )
        .try_init()
        .ok();

    // Keep the writer alive for the life of the process.
    std::mem::forget(guard);
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = CliConfig::from_env()?
        .with_api_url(cli.api_url)
        .with_local_backend(cli.local_backend);

    // `serve` owns its supervisor and never talks to the API.
    if let Commands::Serve { program, args } = command {
        handlers::serve::execute(&config.settings, program, args).await?;
        return Ok(());
    }

    let ctx = bootstrap(config).await?;
    let result = dispatch(&ctx, command).await;
    ctx.shutdown().await;
    result.map_err(Into::into)
}

async fn dispatch(ctx: &AppContext, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Serve { .. } => Err(CliError::Arguments(
            "serve cannot be combined with a running context".to_string(),
        )),
        Commands::Generate {
            lesson_id,
            style,
            no_polish,
            priority,
            timeout,
            detach,
            export,
            output,
        } => {
            let args = GenerateArgs {
                lesson_id,
                style,
                polish: !no_polish,
                priority: priority.into(),
                timeout_seconds: timeout,
                detach,
                export: export.map(Into::into),
                output,
            };
            handlers::generate::execute(ctx, args).await
        }
        Commands::Status { job_id } => handlers::jobs::status(ctx, &job_id).await,
        Commands::Watch { job_id } => handlers::jobs::watch(ctx, &job_id).await,
        Commands::Cancel { job_id } => handlers::jobs::cancel(ctx, &job_id).await,
        Commands::Retry { job_id, watch } => handlers::jobs::retry(ctx, &job_id, watch).await,
        Commands::Export {
            presentation_id,
            format,
            fallback,
            track,
            output,
        } => {
            let args = ExportArgs {
                presentation_id,
                format: format.into(),
                fallbacks: fallback.into_iter().map(Into::into).collect(),
                track,
                output,
            };
            handlers::export::execute(ctx, args).await
        }
    }
}
