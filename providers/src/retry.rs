//! Fixed-delay retry policy.
//!
//! # Retry Policy
//!
//! - Max attempts: 3 (initial request included)
//! - Delay: 7 seconds between attempts, no jitter, no growth
//! - No delay after the final attempt
//!
//! The policy is payload-agnostic: the attempt closure decides what counts as a
//! failure, this module only decides whether another attempt is allowed.

use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(7);

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn effective_attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }
}

/// A value produced after `attempts` tries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Every attempt failed; `last` is the error from the final one.
///
/// This is a value, not a fault: callers degrade gracefully on it.
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempts: {last}")]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run `attempt` until it succeeds or the attempt ceiling is reached.
///
/// The closure receives the 1-based attempt number.
pub async fn retry_with_fixed_delay<T, E, F, Fut>(
    config: &RetryConfig,
    mut attempt: F,
) -> Result<Attempted<T>, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.effective_attempts();
    let mut number = 1;

    loop {
        match attempt(number).await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: number,
                });
            }
            Err(last) if number >= max_attempts => {
                return Err(RetryExhausted {
                    attempts: number,
                    last,
                });
            }
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    attempt = number,
                    delay_ms = config.delay.as_millis(),
                    "Retrying after failed attempt"
                );
                tokio::time::sleep(config.delay).await;
                number += 1;
            }
        }
    }
}
