//! Retry with exponential backoff and jitter.
//!
//! The orchestrator retries very little: prerequisite chart installs get
//! exactly one more attempt whatever the failure, infra apply gets none.
//! Callers pick the attempt count and which failures qualify; the default is
//! failures that [`Error::is_retryable`].
//!
//! # Example
//!
//! ```ignore
//! use armada_common::retry::{retry_with_backoff, RetryConfig};
//!
//! retry_with_backoff(&RetryConfig::once(), "cert-manager", || async {
//!     kubectl.apply_url(&session, CERT_MANAGER_MANIFEST).await
//! })
//! .await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::{Error, Result};

/// How many times, and how far apart, to attempt an operation
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Which failures get another attempt
    pub retry_if: fn(&Error) -> bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            retry_if: Error::is_retryable,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }

    /// First attempt plus exactly one retry, whatever the first failure was
    ///
    /// A first cert-manager apply commonly fails with "resource mapping not
    /// found" while its CRDs register, which is not a transient error by
    /// [`Error::is_retryable`] but does succeed on the second attempt.
    pub fn once() -> Self {
        Self {
            retry_if: |_| true,
            ..Self::with_max_attempts(2)
        }
    }
}

/// Execute an async operation, retrying qualifying failures with backoff.
///
/// Stops at the first success, at the first error `retry_if` rejects, or when
/// `max_attempts` is exhausted, returning the last error.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= config.max_attempts || !(config.retry_if)(&e) {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed, giving up"
                    );
                    return Err(e);
                }

                // Add jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

/// Run an operation and, if it fails for any reason, run it exactly once more
pub async fn retry_once<F, Fut, T>(operation_name: &str, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    retry_with_backoff(&RetryConfig::once(), operation_name, operation).await
}
