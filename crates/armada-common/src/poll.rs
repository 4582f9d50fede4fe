//! Bounded readiness polling
//!
//! [`wait_until`] evaluates a predicate immediately, then once per interval,
//! until it holds or the timeout elapses. A caller with its own deadline can
//! pass it in; the effective timeout is whichever bound is closer.
//!
//! Predicates must be idempotent observations. An `Err` from the predicate
//! counts as "not ready yet"; the last such error is reported if the wait
//! times out.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::{Error, Result};

/// Floor applied to the interval so a zero interval cannot busy-loop
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Interval and timeout of one wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Time between evaluations
    pub interval: Duration,
    /// Upper bound on the whole wait
    pub timeout: Duration,
}

impl PollPolicy {
    /// Create a policy
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Policy for the operator's admission webhook endpoint
    pub fn webhook(timeout_secs: u64) -> Self {
        Self::new(
            Duration::from_millis(crate::DEFAULT_WEBHOOK_INTERVAL_MS),
            Duration::from_secs(timeout_secs),
        )
    }

    /// Policy expressed as a number of attempts spaced `sleep_secs` apart
    pub fn attempts(retries: u32, sleep_secs: u64) -> Self {
        let interval = Duration::from_secs(sleep_secs);
        Self::new(interval, interval * retries.max(1))
    }
}

/// Wait until `predicate` holds.
///
/// Returns `Ok(())` as soon as the predicate returns `Ok(true)`. Otherwise
/// returns [`Error::ReadinessTimeout`] once the effective timeout has elapsed,
/// with the elapsed time in the error. Never sleeps past the effective
/// timeout.
///
/// # Arguments
/// * `description` - Names the condition in logs and in the timeout error
/// * `policy` - Interval and timeout
/// * `deadline` - Caller's own deadline, if it has a smaller budget
/// * `predicate` - Async observation returning whether the condition holds
pub async fn wait_until<F, Fut>(
    description: &str,
    policy: PollPolicy,
    deadline: Option<Instant>,
    mut predicate: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let budget = match deadline {
        Some(deadline) => policy
            .timeout
            .min(deadline.saturating_duration_since(start)),
        None => policy.timeout,
    };
    let interval = policy.interval.max(MIN_INTERVAL);
    let mut last_error = None;

    loop {
        match predicate().await {
            Ok(true) => {
                debug!(condition = %description, elapsed_ms = start.elapsed().as_millis(), "condition met");
                return Ok(());
            }
            Ok(false) => debug!(condition = %description, "waiting"),
            Err(e) => {
                debug!(condition = %description, error = %e, "observation failed, still waiting");
                last_error = Some(e.to_string());
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= budget {
            return Err(Error::readiness_timeout(description, elapsed, last_error));
        }

        tokio::time::sleep(interval.min(budget - elapsed)).await;
    }
}
