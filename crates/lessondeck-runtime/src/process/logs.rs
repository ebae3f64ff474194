//! Backend output capture.
//!
//! Lines written by the managed process are forwarded into `tracing` under
//! the `lessondeck::backend` target and kept in a small ring buffer so
//! startup failures can be diagnosed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tracing::{debug, info, warn};

/// Maximum number of log lines kept.
const MAX_LOG_LINES: usize = 200;

/// Ring buffer of recent backend output lines.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line, removing the oldest if at capacity
    pub fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() >= MAX_LOG_LINES {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    /// The last `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        self.lines.lock().map_or_else(
            |_| Vec::new(),
            |lines| lines.iter().skip(lines.len().saturating_sub(n)).cloned().collect(),
        )
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Spawn reader tasks for the child's piped stdout and stderr.
pub fn forward_output(child: &mut Child, port: u16, buffer: &LogBuffer) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(read_lines(stdout, Stream::Stdout, port, buffer.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(read_lines(stderr, Stream::Stderr, port, buffer.clone()));
    }
}

async fn read_lines<R>(reader: R, stream: Stream, port: u16, buffer: LogBuffer)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(text)) => {
                match stream {
                    Stream::Stdout => info!(target: "lessondeck::backend", port, "{text}"),
                    Stream::Stderr => warn!(target: "lessondeck::backend", port, "{text}"),
                }
                buffer.push(text);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(port, ?stream, error = %e, "Backend output read failed");
                break;
            }
        }
    }
    debug!(port, ?stream, "Backend output reader exiting");
}
