//! Serve command handler.
//!
//! Runs the backend under supervision in the foreground, reporting
//! lifecycle events until Ctrl-C.

use lessondeck_core::{BackendEvent, Settings, validate_settings};
use lessondeck_runtime::BackendSupervisor;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::bootstrap::supervisor_config;
use crate::error::CliError;

/// Execute the serve command.
///
/// # Arguments
///
/// * `settings` - Validated settings; supply the program and port range
/// * `program` - Overrides `LESSONDECK_BACKEND_PROGRAM`
/// * `args` - Extra backend arguments, replacing the configured ones
pub async fn execute(
    settings: &Settings,
    program: Option<String>,
    args: Vec<String>,
) -> Result<(), CliError> {
    validate_settings(settings)?;
    let supervisor = BackendSupervisor::new(supervisor_config(settings, program, args)?)?;
    let mut events = supervisor.subscribe_events();

    let port = supervisor.start().await?;
    println!("Backend running at http://127.0.0.1:{port} (Ctrl-C to stop)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping backend...");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => report(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed backend events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    supervisor.stop().await;
    println!("Backend stopped");
    Ok(())
}

fn report(event: &BackendEvent) {
    let state = event.state();
    info!(
        event = event.name(),
        port = ?state.port,
        pid = ?state.pid,
        "backend event"
    );
    match event {
        BackendEvent::Crashed(_) => eprintln!("Backend exited unexpectedly"),
        BackendEvent::Restarting { reason, .. } => eprintln!("Restarting backend: {reason}"),
        BackendEvent::Running(state) => {
            if let Some(port) = state.port {
                println!("Backend healthy on port {port}");
            }
        }
        _ => {}
    }
}
