//! Steady-state health monitoring of the managed backend.
//!
//! The monitor is policy-free: it probes at a fixed interval and yields
//! every result together with the running count of consecutive failures.
//! The supervisor decides what a failure streak means.

use std::time::Duration;

use async_stream::stream;
use futures_util::Stream;
use reqwest::Client;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::health::{HealthProbe, check_http_health};

/// One health check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSample {
    pub probe: HealthProbe,
    /// Failures in a row, this one included. Zero when healthy.
    pub consecutive_failures: u32,
}

/// Periodic health monitor for one backend port.
pub struct BackendHealthMonitor {
    client: Client,
    port: u16,
    interval: Duration,
    timeout: Duration,
    cancel_token: CancellationToken,
}

impl BackendHealthMonitor {
    /// Create a new health monitor.
    ///
    /// * `check_interval` - time between checks; the first check happens
    ///   one interval after the stream is first polled
    /// * `timeout` - per-request timeout
    /// * `cancel_token` - ends the stream
    pub const fn new(
        client: Client,
        port: u16,
        check_interval: Duration,
        timeout: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            client,
            port,
            interval: check_interval,
            timeout,
            cancel_token,
        }
    }

    /// Start monitoring and return a stream of samples.
    ///
    /// Completes when the cancellation token is triggered.
    pub fn monitor(self) -> impl Stream<Item = HealthSample> {
        let Self {
            client,
            port,
            interval: period,
            timeout,
            cancel_token,
        } = self;

        stream! {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut consecutive_failures = 0u32;

            debug!(port, "Starting health monitor");

            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        debug!(port, "Health monitor cancelled");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let probe = tokio::select! {
                    () = cancel_token.cancelled() => break,
                    probe = check_http_health(&client, port, timeout) => probe,
                };
                if probe.is_healthy() {
                    consecutive_failures = 0;
                } else {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    debug!(port, consecutive_failures, %probe, "Health check failed");
                }
                yield HealthSample { probe, consecutive_failures };
            }
        }
    }
}
