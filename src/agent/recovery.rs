//! Resilient Invocation
//!
//! Rate-limit aware retry for remote calls:
//! - Fixed or progressive pre-call pacing (stay under a steady-state rate ceiling)
//! - Exponential backoff on throttling
//! - Immediate pass-through of any non-throttling failure
//!
//! At most `max_retries + 1` calls are made per invocation.

use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::InvokeError;

/// HTTP 429 as a standalone status code, not digits inside a token count or id
static STATUS_429: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b429\b").expect("static regex"));

/// Classification of errors for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Provider rate limiting, retry after backoff
    Throttled,
    /// Anything else, never retried
    Fatal,
}

impl ErrorClass {
    /// Classify an error from its message
    pub fn from_error(error: &str) -> Self {
        let lower = error.to_lowercase();

        if lower.contains("throttl")
            || lower.contains("too many requests")
            || lower.contains("toomanyrequests")
            || lower.contains("rate limit")
            || STATUS_429.is_match(&lower)
        {
            Self::Throttled
        } else {
            Self::Fatal
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first call
    pub max_retries: u32,
    /// Backoff for attempt `i` is `base_delay * 2^i`
    pub base_delay: Duration,
    /// Delay injected before every call
    pub pre_call_delay: Duration,
    /// Added to the pre-call delay for each prior attempt
    pub pre_call_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryPolicy {
    /// Generic throttling-prone call: fixed pacing, 2s/4s/8s backoff
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            pre_call_delay: Duration::from_millis(1500),
            pre_call_step: Duration::ZERO,
        }
    }

    /// Model invocation: progressive pacing (1.5s, 2s, 2.5s, 3s), 3s/6s/12s backoff
    pub fn model_invocation() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(3),
            pre_call_delay: Duration::from_millis(1500),
            pre_call_step: Duration::from_millis(500),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Backoff to sleep after throttled attempt `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Pacing delay before attempt `attempt` (0-indexed)
    pub fn pre_call_delay_for(&self, attempt: u32) -> Duration {
        self.pre_call_delay
            .saturating_add(self.pre_call_step.saturating_mul(attempt))
    }

    /// Upper bound on total injected latency when every attempt is throttled
    pub fn worst_case_delay(&self) -> Duration {
        let backoff = (0..self.max_retries)
            .map(|i| self.delay_for_attempt(i))
            .fold(Duration::ZERO, Duration::saturating_add);
        let pacing = (0..=self.max_retries)
            .map(|i| self.pre_call_delay_for(i))
            .fold(Duration::ZERO, Duration::saturating_add);
        backoff.saturating_add(pacing)
    }
}

/// Counters for recovery operations
struct RecoveryMetrics {
    invocations: AtomicU64,
    calls: AtomicU64,
    successful: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    exhausted: AtomicU64,
    delayed_ms: AtomicU64,
}

impl RecoveryMetrics {
    fn new() -> Self {
        Self {
            invocations: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            delayed_ms: AtomicU64::new(0),
        }
    }
}

/// Retry wrapper around a throttling-prone remote call
pub struct RecoveryStrategy {
    name: String,
    policy: RetryPolicy,
    metrics: RecoveryMetrics,
}

impl RecoveryStrategy {
    pub fn new(name: &str) -> Self {
        Self::with_policy(name, RetryPolicy::default())
    }

    pub fn with_policy(name: &str, policy: RetryPolicy) -> Self {
        Self {
            name: name.to_string(),
            policy,
            metrics: RecoveryMetrics::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        self.metrics
            .delayed_ms
            .fetch_add(delay.as_millis() as u64, Ordering::Relaxed);
        tokio::time::sleep(delay).await;
    }

    /// Execute `operation`, retrying only on throttling
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, InvokeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InvokeError>>,
    {
        self.metrics.invocations.fetch_add(1, Ordering::Relaxed);
        let mut attempt: u32 = 0;

        loop {
            self.pause(self.policy.pre_call_delay_for(attempt)).await;
            self.metrics.calls.fetch_add(1, Ordering::Relaxed);

            match operation().await {
                Ok(result) => {
                    self.metrics.successful.fetch_add(1, Ordering::Relaxed);
                    return Ok(result);
                }
                Err(e) if e.is_throttled() => {
                    if attempt >= self.policy.max_retries {
                        error!(
                            "'{}' still throttled after {} retries: {}",
                            self.name, self.policy.max_retries, e
                        );
                        self.metrics.exhausted.fetch_add(1, Ordering::Relaxed);
                        self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        "'{}' throttled (attempt {}/{}), backing off {:?}",
                        self.name,
                        attempt + 1,
                        self.policy.max_retries + 1,
                        delay
                    );
                    self.metrics.retried.fetch_add(1, Ordering::Relaxed);
                    self.pause(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!("'{}' failed without retry: {}", self.name, e);
                    self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }
    }

    pub fn stats(&self) -> RecoveryStats {
        RecoveryStats {
            name: self.name.clone(),
            invocations: self.metrics.invocations.load(Ordering::Relaxed),
            calls: self.metrics.calls.load(Ordering::Relaxed),
            successful: self.metrics.successful.load(Ordering::Relaxed),
            retried: self.metrics.retried.load(Ordering::Relaxed),
            failed: self.metrics.failed.load(Ordering::Relaxed),
            exhausted: self.metrics.exhausted.load(Ordering::Relaxed),
            delayed: Duration::from_millis(self.metrics.delayed_ms.load(Ordering::Relaxed)),
        }
    }
}

/// One-off retry of `call` with standard pacing and the given backoff budget
pub async fn invoke_with_retry<F, Fut, T>(
    call: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, InvokeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InvokeError>>,
{
    let policy = RetryPolicy::standard()
        .with_max_retries(max_retries)
        .with_base_delay(base_delay);
    RecoveryStrategy::with_policy("invoke_with_retry", policy)
        .execute(call)
        .await
}

/// Statistics for recovery operations
#[derive(Debug, Clone)]
pub struct RecoveryStats {
    pub name: String,
    pub invocations: u64,
    pub calls: u64,
    pub successful: u64,
    pub retried: u64,
    pub failed: u64,
    pub exhausted: u64,
    pub delayed: Duration,
}

impl RecoveryStats {
    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            1.0
        } else {
            self.successful as f64 / self.invocations as f64
        }
    }

    pub fn format(&self) -> String {
        format!(
            "{}: {:.1}% success ({}/{} invocations, {} calls, {} retries, {} failed)",
            self.name,
            self.success_rate() * 100.0,
            self.successful,
            self.invocations,
            self.calls,
            self.retried,
            self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counting_op(
        counter: Arc<AtomicUsize>,
        succeed_on: Option<usize>,
        err: InvokeError,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, InvokeError>> + Send>> {
        move || {
            let counter = counter.clone();
            let err = err.clone();
            Box::pin(async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                match succeed_on {
                    Some(k) if n >= k => Ok(42),
                    _ => Err(err),
                }
            })
        }
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(ErrorClass::from_error("ThrottlingException: Rate exceeded"), ErrorClass::Throttled);
        assert_eq!(ErrorClass::from_error("429 Too Many Requests"), ErrorClass::Throttled);
        assert_eq!(ErrorClass::from_error("rate limit exceeded"), ErrorClass::Throttled);
        assert_eq!(ErrorClass::from_error("ValidationException"), ErrorClass::Fatal);
        assert_eq!(ErrorClass::from_error("unauthorized"), ErrorClass::Fatal);
        assert!(!ErrorClass::Fatal.is_retryable());
    }

    #[test]
    fn test_429_digits_inside_numbers_are_fatal() {
        assert_eq!(
            ErrorClass::from_error("Claude API error 400 Bad Request: prompt is too long: 204291 tokens"),
            ErrorClass::Fatal
        );
        assert_eq!(ErrorClass::from_error("request req_4291 failed"), ErrorClass::Fatal);
        assert_eq!(ErrorClass::from_error("Claude API error 429: slow down"), ErrorClass::Throttled);
    }

    #[test]
    fn test_retry_policy_delay() {
        let policy = RetryPolicy::standard();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(8));
        assert_eq!(policy.pre_call_delay_for(3), Duration::from_millis(1500));
    }

    #[test]
    fn test_huge_policy_saturates() {
        let policy = RetryPolicy::standard()
            .with_max_retries(u32::MAX)
            .with_base_delay(Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.delay_for_attempt(40), Duration::MAX);
        assert_eq!(policy.pre_call_delay_for(u32::MAX), Duration::from_millis(1500));

        let policy = RetryPolicy::model_invocation().with_max_retries(64);
        assert!(policy.delay_for_attempt(63) > Duration::from_secs(3));
        assert!(policy.worst_case_delay() >= policy.delay_for_attempt(63));
    }

    #[test]
    fn test_progressive_pacing() {
        let policy = RetryPolicy::model_invocation();
        assert_eq!(policy.pre_call_delay_for(0), Duration::from_millis(1500));
        assert_eq!(policy.pre_call_delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.pre_call_delay_for(3), Duration::from_millis(3000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_bound_when_always_throttled() {
        let policy = RetryPolicy::standard();
        let strategy = RecoveryStrategy::with_policy("test", policy.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let start = tokio::time::Instant::now();
        let result = strategy
            .execute(counting_op(calls.clone(), None, InvokeError::Throttled("slow".into())))
            .await;
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(InvokeError::Throttled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        // 2 + 4 + 8 backoff plus four 1.5s pacing delays
        let backoff: Duration = (0..3).map(|i| Duration::from_secs(2) * 2u32.pow(i)).sum();
        let expected = backoff + Duration::from_millis(1500) * 4;
        assert_eq!(expected, policy.worst_case_delay());
        assert_eq!(strategy.stats().delayed, expected);
        assert!(elapsed >= expected && elapsed < expected + Duration::from_millis(50));

        let stats = strategy.stats();
        assert_eq!(stats.retried, 3);
        assert_eq!(stats.exhausted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let strategy = RecoveryStrategy::with_policy("test", RetryPolicy::standard());
        let calls = Arc::new(AtomicUsize::new(0));

        let result = strategy
            .execute(counting_op(calls.clone(), None, InvokeError::Upstream("AccessDenied".into())))
            .await;

        assert!(matches!(result, Err(InvokeError::Upstream(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(strategy.stats().retried, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_throttling() {
        let strategy = RecoveryStrategy::with_policy("test", RetryPolicy::model_invocation());
        let calls = Arc::new(AtomicUsize::new(0));

        let result = strategy
            .execute(counting_op(calls.clone(), Some(2), InvokeError::Throttled("429".into())))
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // pacing 1.5 + 2 + 2.5, backoff 3 + 6
        assert_eq!(strategy.stats().delayed, Duration::from_millis(15_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_makes_one_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = invoke_with_retry(
            counting_op(calls.clone(), None, InvokeError::Throttled("slow".into())),
            0,
            Duration::from_secs(1),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_recovery_stats_format() {
        let stats = RecoveryStats {
            name: "model".to_string(),
            invocations: 100,
            calls: 120,
            successful: 95,
            retried: 20,
            failed: 5,
            exhausted: 1,
            delayed: Duration::ZERO,
        };

        let formatted = stats.format();
        assert!(formatted.contains("95.0%"));
        assert!(formatted.contains("95/100"));
    }
}
