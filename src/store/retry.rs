//! Retry governor: bounded exponential backoff for store mutations.
//!
//! Every mutation path routes through [`with_retry`]; it is the only place
//! backoff policy lives. The governor is idempotency-agnostic: each merge
//! attempt re-reads current row state inside its own transaction, so
//! re-executing from scratch is always safe.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use super::error::{Result, StoreError};

/// Backoff policy for mutations that hit lock or serialization contention.
///
/// The defaults mirror the write path this store was built for: a 100ms
/// first wait, doubling per attempt, capped at 2s, ten attempts total. With
/// the SQLite busy timeout at tens of seconds, ten capped waits give a writer
/// a realistic window to drain a burst of concurrent station submissions.
///
/// # Examples
///
/// ```
/// use qcledger::store::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 10);
///
/// let eager = RetryPolicy {
///     max_attempts: 3,
///     initial_delay: Duration::from_millis(10),
///     ..RetryPolicy::default()
/// };
/// assert_eq!(eager.max_attempts, 3);
/// ```
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub initial_delay: Duration,
    /// Per-wait cap; doubling stops here.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Minimal delays for tests that exercise exhaustion.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }
}

/// Runs `operation`, retrying on contention signals with exponential backoff.
///
/// Only errors for which [`StoreError::is_contention`] holds are retried;
/// everything else propagates on first occurrence. Exhausting the budget
/// surfaces [`StoreError::WriteContention`] so callers can tell "still
/// locked after reasonable effort" from a logic error.
///
/// A small random jitter (up to 25% of the wait) is added to each delay so
/// stations that collided once do not keep colliding in lockstep.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &'static str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = policy.initial_delay;
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_contention() => {
                if attempt == attempts {
                    warn!(op = op_name, attempts, "write lock still held, giving up");
                    return Err(StoreError::WriteContention { attempts });
                }
                let jitter = delay.mul_f64(rand::rng().random_range(0.0..0.25));
                warn!(
                    op = op_name,
                    attempt,
                    wait_ms = (delay + jitter).as_millis() as u64,
                    "database locked, backing off"
                );
                sleep(delay + jitter).await;
                delay = (delay * 2).min(policy.max_delay);
            }
            Err(err) => return Err(err),
        }
    }

    unreachable!("retry loop returns on success, contention exhaustion, or error")
}
