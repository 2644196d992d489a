//! Polling helpers for state that converges after the stack starts.
//!
//! The provisioner configures the gateway some time after `docker compose up`,
//! and the gateway applies admin changes to its proxy with a short delay.
//! Tests that depend on either poll with exponential backoff until a deadline.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

const INITIAL_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(8);

/// What the test is waiting for, with its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyCategory {
    /// Provisioner run to completion after stack start (IdP boot + 30 retries x 2s = 90s)
    Provisioning,

    /// Gateway admin change visible on the proxy (2x 5s router rebuild = 10s)
    GatewayPropagation,
}

impl ConsistencyCategory {
    pub fn timeout(self) -> Duration {
        match self {
            ConsistencyCategory::Provisioning => Duration::from_secs(90),
            ConsistencyCategory::GatewayPropagation => Duration::from_secs(10),
        }
    }
}

/// Deadline passed without the probe producing a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotConverged {
    pub category: ConsistencyCategory,
    pub attempts: u32,
}

impl fmt::Display for NotConverged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} not converged within {:?} ({} attempts)",
            self.category,
            self.category.timeout(),
            self.attempts
        )
    }
}

impl std::error::Error for NotConverged {}

/// Poll `probe` until it returns `Some`, doubling the delay between attempts
/// (500ms start, 8s cap) and giving up at the category's deadline.
///
/// The probe runs at least once, even with an already-expired deadline.
pub async fn eventually<T, F, Fut>(
    category: ConsistencyCategory,
    mut probe: F,
) -> Result<T, NotConverged>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + category.timeout();
    let mut delay = INITIAL_DELAY;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = probe().await {
            return Ok(value);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(NotConverged { category, attempts });
        }

        debug!(
            target: "env_tests.eventual",
            category = ?category,
            attempts,
            next_delay_ms = delay.min(remaining).as_millis() as u64,
            "Not converged yet, retrying"
        );
        sleep(delay.min(remaining)).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// [`eventually`] for a boolean condition.
pub async fn assert_eventually<F, Fut>(
    category: ConsistencyCategory,
    mut condition: F,
) -> Result<(), NotConverged>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    eventually(category, || {
        let check = condition();
        async move { check.await.then_some(()) }
    })
    .await
}
