//! Bounded fixed-interval polling.
//!
//! Used for the two places the provisioner waits on a collaborator that may
//! still be starting: the gateway readiness probe and the identity provider's
//! key-set endpoint. Both the attempt cap and the interval are validated at
//! config load, so a poll always terminates.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Fixed-interval retry policy with a hard attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,

    /// Sleep between consecutive attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Upper bound on time spent sleeping across a full poll.
    pub fn max_wait(&self) -> Duration {
        self.interval
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

/// Classifies an error as worth another attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Why a poll gave up.
#[derive(Debug)]
pub enum PollError<E> {
    /// Every attempt failed with a transient error.
    Exhausted { attempts: u32, last_error: E },

    /// An attempt failed with a non-transient error; no further attempts made.
    Permanent(E),
}

/// Run `attempt` until it succeeds, fails permanently, or the policy's
/// attempt cap is reached.
///
/// `operation` names the poll in log lines.
pub async fn poll<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt_number: u32 = 1;

    loop {
        match attempt().await {
            Ok(value) => {
                if attempt_number > 1 {
                    tracing::info!(
                        target: "provisioner.retry",
                        operation,
                        attempts = attempt_number,
                        "Succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => {
                return Err(PollError::Permanent(e));
            }
            Err(e) if attempt_number >= max_attempts => {
                tracing::warn!(
                    target: "provisioner.retry",
                    operation,
                    attempts = attempt_number,
                    error = %e,
                    "Giving up after final attempt"
                );
                return Err(PollError::Exhausted {
                    attempts: attempt_number,
                    last_error: e,
                });
            }
            Err(e) => {
                tracing::debug!(
                    target: "provisioner.retry",
                    operation,
                    attempt = attempt_number,
                    max_attempts,
                    retry_in_ms = policy.interval.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                sleep(policy.interval).await;
                attempt_number += 1;
            }
        }
    }
}
