//! Retry policies for collaborator calls.
//!
//! The model service and the execution sandbox fail in different ways (malformed
//! output vs. crashing code), so each gets its own [`RetryPolicy`] from
//! [`SearchConfig`](crate::SearchConfig). `max_attempts` counts retries after the
//! first try.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Retry policy for handling failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// No retry - fail immediately on error.
    None,
    /// Fixed interval retry - retry with a constant delay between attempts.
    Fixed {
        /// Maximum number of retry attempts.
        max_attempts: usize,
        /// Fixed interval between retries.
        #[serde(with = "duration_ms", rename = "interval_ms")]
        interval: Duration,
    },
    /// Exponential backoff retry - retry with exponentially increasing delays.
    Exponential {
        /// Maximum number of retry attempts.
        max_attempts: usize,
        /// Initial interval before the first retry.
        #[serde(with = "duration_ms", rename = "initial_interval_ms")]
        initial_interval: Duration,
        /// Maximum interval cap (won't exceed this).
        #[serde(with = "duration_ms", rename = "max_interval_ms")]
        max_interval: Duration,
        /// Multiplier for exponential backoff (e.g., 2.0 doubles each time).
        multiplier: f64,
    },
}

impl RetryPolicy {
    /// Creates a new retry policy with no retries.
    pub fn none() -> Self {
        RetryPolicy::None
    }

    /// Creates a new fixed interval retry policy.
    pub fn fixed(max_attempts: usize, interval: Duration) -> Self {
        RetryPolicy::Fixed {
            max_attempts,
            interval,
        }
    }

    /// Creates a new exponential backoff retry policy.
    pub fn exponential(
        max_attempts: usize,
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
    ) -> Self {
        RetryPolicy::Exponential {
            max_attempts,
            initial_interval,
            max_interval,
            multiplier,
        }
    }

    /// Returns `true` if retry number `attempt` (0-based) is still allowed.
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts()
    }

    /// Delay before retry number `attempt`.
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::Fixed { interval, .. } => *interval,
            RetryPolicy::Exponential {
                initial_interval,
                max_interval,
                multiplier,
                ..
            } => {
                let delay_secs = initial_interval.as_secs_f64() * multiplier.powi(attempt as i32);
                let delay = Duration::from_secs_f64(delay_secs.max(0.0));
                delay.min(*max_interval)
            }
        }
    }

    /// Gets the maximum number of retries for this policy.
    pub fn max_attempts(&self) -> usize {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { max_attempts, .. } => *max_attempts,
            RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::None
    }
}

/// Runs `op` until it succeeds, returns a non-retryable error, or the policy is
/// exhausted. `op` receives the 0-based try number.
pub async fn retry_llm<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, LlmError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && policy.should_retry(attempt) => {
                let delay = policy.delay(attempt);
                tracing::debug!(
                    label = label,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying llm call"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(err) => {
                tracing::warn!(label = label, attempts = attempt + 1, error = %err, "llm call gave up");
                return Err(err);
            }
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_retry_policy_none() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(0));
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.max_attempts(), 0);
    }

    #[test]
    fn test_retry_policy_fixed() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_retry_policy_exponential_caps_at_max_interval() {
        let policy =
            RetryPolicy::exponential(5, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(5));
    }

    #[test]
    fn retry_policy_deserializes_from_millis() {
        let policy: RetryPolicy = serde_json::from_str(
            r#"{"kind":"exponential","max_attempts":2,"initial_interval_ms":100,"max_interval_ms":400,"multiplier":2.0}"#,
        )
        .unwrap();
        assert_eq!(
            policy,
            RetryPolicy::exponential(2, Duration::from_millis(100), Duration::from_millis(400), 2.0)
        );
    }

    #[tokio::test]
    async fn retry_llm_retries_until_success() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        let out = retry_llm(&policy, "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::Validation("bad json".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_llm_stops_when_exhausted() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::fixed(2, Duration::ZERO);
        let err = retry_llm::<(), _, _>(&policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Transport("down".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, LlmError::Transport(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_llm_does_not_retry_cancelled() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::fixed(5, Duration::ZERO);
        let err = retry_llm::<(), _, _>(&policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Cancelled) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
