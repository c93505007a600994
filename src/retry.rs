//! Retry policy and the generic retry combinator.
//!
//! A [`RetryPolicy`] is immutable once built and is consulted on every call
//! through the request executor. `Progressive` mode grows the delay linearly
//! with the attempt number; there is no exponential mode because the server
//! this client talks to recovers on the order of seconds, not minutes.

use std::future::Future;
use std::time::Duration;

/// How the delay between attempts evolves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetryMode {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay multiplied by the (1-based) number of the attempt that just
    /// failed, so waits grow `base, 2×base, 3×base, …`.
    Progressive,
}

/// Retry policy for a single request call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    mode: RetryMode,
}

impl Default for RetryPolicy {
    /// One attempt, no retries — matches the executor's historical default.
    fn default() -> Self {
        Self::new(1, Duration::from_secs(1), RetryMode::Fixed)
    }
}

impl RetryPolicy {
    /// Build a policy. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, mode: RetryMode) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            mode,
        }
    }

    /// Total number of attempts, including the first one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to sleep after attempt `failed_attempt` (1-based) before the
    /// next one.
    #[must_use]
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        match self.mode {
            RetryMode::Fixed => self.base_delay,
            RetryMode::Progressive => self.base_delay * failed_attempt.max(1),
        }
    }
}

/// Run `op` up to `policy.max_attempts()` times, sleeping the policy delay
/// between attempts.
///
/// # Errors
///
/// On exhaustion the error from the **last** attempt is returned unchanged —
/// no wrapping, so the caller keeps the original diagnostics.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_attempts() {
                    return Err(error);
                }
                tokio::time::sleep(policy.delay_after(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
