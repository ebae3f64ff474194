//! Per-operation retry policies.
//!
//! Each API operation has its own [`RetryPolicy`] field in
//! [`RetryPolicies`]; the request executor in `client` is the only place
//! that loops on it.

use std::time::Duration;

/// Retry behaviour for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Automatic retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once(Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Never retry.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Retry a single time after `delay`.
    #[must_use]
    pub const fn once(delay: Duration) -> Self {
        Self {
            max_retries: 1,
            base_delay: delay,
        }
    }

    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// A server-provided `Retry-After` replaces the computed backoff.
    #[must_use]
    pub fn delay_for(&self, retry: u32, retry_after_seconds: Option<u64>) -> Duration {
        if let Some(seconds) = retry_after_seconds {
            return Duration::from_secs(seconds);
        }
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Retry policies for every API operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicies {
    pub generate: RetryPolicy,
    pub job_status: RetryPolicy,
    pub cancel_job: RetryPolicy,
    pub retry_job: RetryPolicy,
    pub export: RetryPolicy,
    pub export_job: RetryPolicy,
    pub export_status: RetryPolicy,
    pub download: RetryPolicy,
    pub presentation: RetryPolicy,
}

impl RetryPolicies {
    /// The same policy for every operation.
    #[must_use]
    pub const fn uniform(policy: RetryPolicy) -> Self {
        Self {
            generate: policy,
            job_status: policy,
            cancel_job: policy,
            retry_job: policy,
            export: policy,
            export_job: policy,
            export_status: policy,
            download: policy,
            presentation: policy,
        }
    }

    /// No automatic retries anywhere.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::uniform(RetryPolicy::none())
    }
}
