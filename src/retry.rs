//! Bounded polling.
//!
//! [`poll_until`] re-runs a probe with exponential backoff until it reports
//! a terminal outcome, the wall-clock budget runs out, or the caller
//! cancels. Every probe and every sleep is raced against both the deadline
//! and the cancellation token.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProviderError;

/// Backoff and budget for polling a remote object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first probe.
    pub initial_backoff: Duration,
    /// Ceiling for any single delay.
    pub max_backoff: Duration,
    /// Growth factor between delays.
    pub multiplier: f64,
    /// Hard cap on the total time spent polling.
    pub budget: Duration,
}

impl RetryPolicy {
    /// Doubling backoff from `initial_backoff` up to `max_backoff`, bounded by `budget`.
    pub fn exponential(initial_backoff: Duration, max_backoff: Duration, budget: Duration) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            multiplier: 2.0,
            budget,
        }
    }

    /// Fixed delay between probes.
    pub fn fixed(interval: Duration, budget: Duration) -> Self {
        Self {
            initial_backoff: interval,
            max_backoff: interval,
            multiplier: 1.0,
            budget,
        }
    }

    /// Delay to wait after the given (1-based) probe.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt as i32).saturating_sub(1);
        let delay = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(
            Duration::from_secs(1),
            Duration::from_secs(10),
            Duration::from_secs(300),
        )
    }
}

/// Outcome of a single probe.
#[derive(Debug)]
pub enum Probe<T> {
    /// The object reached the expected terminal state.
    Ready(T),
    /// Not there yet; carries the last observed state for diagnostics.
    Pending(String),
    /// The object reached a state it will not recover from.
    Failed(ProviderError),
}

/// Poll until `probe` reports [`Probe::Ready`].
///
/// `failure` prefixes the timeout message, e.g. "query failed to start".
///
/// # Errors
///
/// - [`ProviderError::DeadlineExceeded`] once the budget is spent
/// - [`ProviderError::Cancelled`] when `cancel` fires
/// - the probe's own error, or the error carried by [`Probe::Failed`]
pub async fn poll_until<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    failure: &str,
    mut probe: F,
) -> Result<T, ProviderError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Probe<T>, ProviderError>>,
{
    let deadline = Instant::now() + policy.budget;
    let mut last_state = String::from("unknown");
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(failure)),
            outcome = tokio::time::timeout_at(deadline, probe(attempt)) => outcome,
        };

        match outcome {
            Err(_) => break,
            Ok(Err(e)) => return Err(e),
            Ok(Ok(Probe::Failed(e))) => return Err(e),
            Ok(Ok(Probe::Ready(value))) => {
                debug!(attempt, "reached terminal state");
                return Ok(value);
            }
            Ok(Ok(Probe::Pending(state))) => {
                debug!(attempt, state = %state, "waiting for terminal state");
                last_state = state;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let delay = policy.delay_for_attempt(attempt).min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(failure)),
            _ = tokio::time::sleep(delay) => {}
        }
    }

    Err(ProviderError::DeadlineExceeded(format!(
        "{}: still '{}' after {}s",
        failure,
        last_state,
        policy.budget.as_secs()
    )))
}

fn cancelled(failure: &str) -> ProviderError {
    ProviderError::Cancelled(format!("{}: operation cancelled", failure))
}
