//! Bounded retries for external-I/O boundaries
//!
//! Every call that leaves the process (LLM services, Google Workspace, the
//! desktop bridge) runs under a [`RetryPolicy`]: a small fixed number of
//! attempts with doubling backoff and jitter. Exhaustion surfaces as
//! [`RetryExhausted`] carrying the attempt count and the last error, so the
//! caller can fold the failure into the turn's error list
//! (`external_io_error`) without losing the cause.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Attempt budget and backoff shape for one external boundary
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: usize,
    /// Delay before the first retry; doubles on each subsequent one
    pub initial_interval: Duration,
    /// Ceiling on the per-retry delay
    pub max_interval: Duration,
    /// Randomize delays (factor 0.5 to 1.5) to avoid thundering retries
    pub jitter: bool,
}

impl RetryPolicy {
    /// Policy with the given attempt budget and default backoff
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            jitter: true,
        }
    }

    /// Profile for external service calls: one retry on top of the first
    /// attempt, short initial delay
    pub fn external_io() -> Self {
        Self::new(2).with_initial_interval(Duration::from_millis(200))
    }

    /// Set the delay before the first retry
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the ceiling on per-retry delays
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retrying after the given failed attempt (0-indexed)
    pub fn delay_before(&self, attempt: usize) -> Duration {
        let doubled = self
            .initial_interval
            .saturating_mul(1u32 << attempt.min(16) as u32);
        let capped = doubled.min(self.max_interval);
        if self.jitter {
            capped.mul_f64(rand::thread_rng().gen_range(0.5..=1.5))
        } else {
            capped
        }
    }

    /// Whether another attempt is allowed after the given one failed
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt + 1 < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// The final attempt failed; carries the attempt count and the last error
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Attempts made, including the first
    pub attempts: usize,
    /// Error from the last attempt
    pub error: E,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "operation failed after {} attempt(s): {}",
            self.attempts, self.error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Run an async operation under a retry policy
///
/// The factory is invoked once per attempt; the first success wins. Once the
/// budget runs out the last error comes back wrapped in [`RetryExhausted`].
pub async fn run_with_retries<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> std::result::Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !policy.should_retry(attempt) {
                    return Err(RetryExhausted {
                        attempts: attempt + 1,
                        error,
                    });
                }
                let delay = policy.delay_before(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying after failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.jitter);
    }

    #[test]
    fn test_external_io_profile_is_bounded() {
        let policy = RetryPolicy::external_io();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.initial_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(10)
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(5))
            .with_jitter(false);

        assert_eq!(policy.delay_before(0), Duration::from_secs(1));
        assert_eq!(policy.delay_before(1), Duration::from_secs(2));
        assert_eq!(policy.delay_before(2), Duration::from_secs(4));
        assert_eq!(policy.delay_before(6), Duration::from_secs(5));
    }

    #[test]
    fn test_should_retry_boundary() {
        let policy = RetryPolicy::new(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let policy = RetryPolicy::new(3)
            .with_initial_interval(Duration::from_millis(1))
            .with_jitter(false);

        let result: Result<usize, RetryExhausted<String>> =
            run_with_retries(&policy, move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts_and_cause() {
        let policy = RetryPolicy::new(2)
            .with_initial_interval(Duration::from_millis(1))
            .with_jitter(false);

        let result: Result<(), RetryExhausted<String>> =
            run_with_retries(&policy, || async { Err("always".to_string()) }).await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 2);
        assert_eq!(exhausted.error, "always");
        assert!(exhausted.to_string().contains("2 attempt(s)"));
    }
}
