//! CLI progress rendering for generation and export jobs.
//!
//! Presentation-only: fed with [`JobProgress`] snapshots, knows nothing
//! about sockets or polling. Terminals get an indicatif bar; pipes and log
//! files get one line per meaningful change.

use std::io::{self, IsTerminal};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use lessondeck_core::JobProgress;

use super::status::describe_step;

/// Minimum percentage change before the plain renderer prints again.
const PLAIN_STEP_PERCENT: u64 = 5;

/// Progress display that selects terminal or plain output.
pub struct JobProgressPrinter {
    inner: ProgressRender,
}

enum ProgressRender {
    Fancy(FancyProgress),
    Plain(PlainProgress),
}

impl JobProgressPrinter {
    /// Create a printer for `label`, auto-detecting terminal capability.
    pub fn new(label: &str) -> Self {
        if io::stdout().is_terminal() {
            Self {
                inner: ProgressRender::Fancy(FancyProgress::new(label)),
            }
        } else {
            Self::plain(label)
        }
    }

    /// A printer that always writes plain lines.
    pub fn plain(label: &str) -> Self {
        Self {
            inner: ProgressRender::Plain(PlainProgress::new(label)),
        }
    }

    pub fn update(&mut self, progress: &JobProgress) {
        match &mut self.inner {
            ProgressRender::Fancy(inner) => inner.update(progress),
            ProgressRender::Plain(inner) => inner.update(progress),
        }
    }

    /// Show whether updates are pushed live or polled.
    pub fn connection(&mut self, connected: bool) {
        match &mut self.inner {
            ProgressRender::Fancy(inner) => inner.connection(connected),
            ProgressRender::Plain(inner) => inner.connection(connected),
        }
    }

    /// Finish successfully with a summary line.
    pub fn finish(&mut self, summary: &str) {
        match &mut self.inner {
            ProgressRender::Fancy(inner) => inner.bar.finish_with_message(summary.to_string()),
            ProgressRender::Plain(inner) => inner.emit(summary),
        }
    }

    /// Stop the display, leaving the last state visible.
    pub fn abandon(&mut self, summary: &str) {
        match &mut self.inner {
            ProgressRender::Fancy(inner) => inner.bar.abandon_with_message(summary.to_string()),
            ProgressRender::Plain(inner) => inner.emit(summary),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_percent(percent: f64) -> u64 {
    percent.clamp(0.0, 100.0).round() as u64
}

/// One line of plain progress output.
pub(crate) fn progress_line(label: &str, progress: &JobProgress) -> String {
    format!(
        "{label}: {:>3}% {}",
        whole_percent(progress.overall_progress_percent),
        describe_step(progress)
    )
}

// ============================================================================
// Fancy Terminal Progress (indicatif)
// ============================================================================

struct FancyProgress {
    bar: ProgressBar,
    label: String,
}

impl FancyProgress {
    fn new(label: &str) -> Self {
        let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stdout());
        bar.set_style(Self::bar_style());
        bar.set_prefix(label.to_string());
        bar.set_message("waiting for the server".to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            label: label.to_string(),
        }
    }

    fn update(&mut self, progress: &JobProgress) {
        self.bar
            .set_position(whole_percent(progress.overall_progress_percent));
        self.bar.set_message(describe_step(progress));
    }

    fn connection(&mut self, connected: bool) {
        let mode = if connected { "live" } else { "polling" };
        self.bar.set_prefix(format!("{} [{mode}]", self.label));
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {prefix} {bar:30.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }
}

// ============================================================================
// Plain Progress (non-terminal)
// ============================================================================

struct PlainProgress {
    label: String,
    last_percent: Option<u64>,
    last_step: Option<String>,
    connected: Option<bool>,
}

impl PlainProgress {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            last_percent: None,
            last_step: None,
            connected: None,
        }
    }

    fn update(&mut self, progress: &JobProgress) {
        let percent = whole_percent(progress.overall_progress_percent);
        let moved = self
            .last_percent
            .is_none_or(|last| percent >= last + PLAIN_STEP_PERCENT || percent == 100);
        let step_changed = self.last_step != progress.current_step;
        if !moved && !step_changed {
            return;
        }
        self.last_percent = Some(percent);
        self.last_step.clone_from(&progress.current_step);
        println!("{}", progress_line(&self.label, progress));
    }

    fn connection(&mut self, connected: bool) {
        if self.connected == Some(connected) {
            return;
        }
        // The first report is only interesting when it is a fallback.
        if self.connected.is_some() || !connected {
            let mode = if connected {
                "live updates restored"
            } else {
                "live updates unavailable, polling for status"
            };
            self.emit(mode);
        }
        self.connected = Some(connected);
    }

    fn emit(&self, line: &str) {
        println!("{}: {line}", self.label);
    }
}
