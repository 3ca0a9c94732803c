//! Bounded exponential backoff for sink writes.

use std::future::Future;
use std::time::Duration;

use crate::sink::SinkError;

/// Retry schedule for transient sink failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Outcome of an operation that did not succeed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError {
    /// Every attempt failed transiently
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: SinkError },

    /// A permanent failure; no further attempts were made
    #[error(transparent)]
    Permanent(SinkError),
}

impl RetryPolicy {
    /// Delay after the `failures`-th consecutive failure (1-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay = self.initial_backoff.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(delay)
        }
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of attempts.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SinkError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(RetryError::Permanent(err)),
                Err(err) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    })
                }
                Err(err) => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "Attempt {}/{} to {} failed: {}; retrying in {:?}",
                        attempt,
                        max_attempts,
                        what,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(20), Duration::from_secs(10));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let calls = &AtomicU32::new(0);
        let begin = Instant::now();

        let result = policy
            .run("put", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(SinkError::Unavailable("down".to_string()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100 + 200 + 400 ms of backoff
        assert!(begin.elapsed() >= Duration::from_millis(700));
        assert!(begin.elapsed() < Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("put", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SinkError::Unavailable("down".to_string()))
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_not_retried() {
        let policy = RetryPolicy::default();
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("put", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SinkError::Rejected {
                    key: "k".to_string(),
                    reason: "bad".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(RetryError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
