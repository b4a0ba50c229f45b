//! Bounded retries with a per-attempt timeout.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::random;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Hard limit for a single attempt. The attempt's future is dropped when
    /// it expires.
    pub timeout: Duration,
    /// Base delay between attempts, multiplied by the attempt number. Zero
    /// retries immediately.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if self.backoff.is_zero() {
            return Duration::ZERO;
        }
        let base_ms = self.backoff.as_millis() as u64 * attempt as u64;
        Duration::from_millis(base_ms + rand_jitter(self.backoff.as_millis() as u64))
    }
}

/// Marker error for an attempt that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTimedOut(pub Duration);

fn rand_jitter(base_ms: u64) -> u64 {
    random::<u64>() % (base_ms / 2 + 1)
}

/// Run `attempt_fn` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up. The last error is returned.
///
/// `attempt_fn` receives the 1-based attempt number.
pub async fn with_retries<T, E, F, Fut, R>(
    policy: RetryPolicy,
    label: &str,
    mut attempt_fn: F,
    is_retryable: R,
) -> Result<T, E>
where
    E: From<AttemptTimedOut> + Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let result = match tokio::time::timeout(policy.timeout, attempt_fn(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(E::from(AttemptTimedOut(policy.timeout))),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && is_retryable(&err) => {
                let delay = policy.backoff_for(attempt);
                log::info!(
                    "{label}: retrying (attempt {}/{}) after error: {err}, backoff {}ms",
                    attempt + 1,
                    attempts,
                    delay.as_millis()
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => {
                if attempt > 1 {
                    log::warn!("{label}: giving up after {attempt} attempt(s): {err}");
                }
                return Err(err);
            }
        }
    }
}
