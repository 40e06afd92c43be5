use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::instrument;

use utils::telemetry::DispatcherMetrics;

#[derive(Debug, Error, Clone)]
pub enum DispatcherError<E> {
    #[error("operation cancelled")]
    Cancelled,
    #[error("retries exhausted: {0}")]
    Exhausted(E),
}

/// Retry policy. `max_attempts = 1` disables retry. Backoff is exponential
/// with jitter, capped at `max_backoff_ms`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        let raw = self.initial_backoff_ms as f64 * self.multiplier.powi(attempt as i32 - 1);
        let capped = raw.min(self.max_backoff_ms as f64);
        let jitter_span = capped * self.jitter.clamp(0.0, 1.0);
        let jittered = if jitter_span > 0.0 {
            capped - jitter_span + rand::rng().random::<f64>() * jitter_span * 2.0
        } else {
            capped
        };
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

/// Hooks observing each attempt, matching spec.md §4.4's `hooks.before`/
/// `hooks.after`.
pub trait DispatchHooks<E>: Send + Sync {
    fn before(&self, _attempt: u32) {}
    fn after(&self, _attempt: u32, _err: Option<&E>) {}
}

/// No-op hooks for callers that don't need observation.
pub struct NoopHooks;
impl<E> DispatchHooks<E> for NoopHooks {}

/// Wraps an outbound effect with retry, exponential backoff with jitter,
/// and cancellation. Stateless: no cross-call ordering, safe to share via
/// `Arc` across every dispatch site in the process.
pub struct Dispatcher {
    policy: RetryPolicy,
    metrics: Arc<DispatcherMetrics>,
}

impl Dispatcher {
    pub fn new(policy: RetryPolicy, metrics: Arc<DispatcherMetrics>) -> Self {
        Self { policy, metrics }
    }

    /// Runs `f` up to `max_attempts` times. `retryable` classifies whether a
    /// returned error should be retried; `kill` is honored immediately
    /// between attempts and during backoff sleeps.
    #[instrument(skip(self, f, retryable, hooks, kill), fields(subsys = "Dispatcher", name = name))]
    pub async fn run<F, Fut, T, E>(
        &self,
        name: &str,
        mut kill: broadcast::Receiver<()>,
        retryable: impl Fn(&E) -> bool,
        hooks: &dyn DispatchHooks<E>,
        mut f: F,
    ) -> Result<T, DispatcherError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_err = None;

        for attempt in 1..=self.policy.max_attempts {
            self.metrics.attempts_total.inc();
            hooks.before(attempt);

            if kill.try_recv().is_ok() {
                return Err(DispatcherError::Cancelled);
            }

            let outcome = f(attempt).await;
            hooks.after(attempt, outcome.as_ref().err());

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !retryable(&err) {
                        return Err(DispatcherError::Exhausted(err));
                    }
                    if attempt == self.policy.max_attempts {
                        last_err = Some(err);
                        break;
                    }
                    self.metrics.retries_total.inc();
                    let backoff = self.policy.backoff_for(attempt);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = kill.recv() => return Err(DispatcherError::Cancelled),
                    }
                    last_err = Some(err);
                }
            }
        }

        self.metrics.failures_total.inc();
        Err(DispatcherError::Exhausted(last_err.expect("loop always sets last_err before exit")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use utils::telemetry::Metrics;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Transient,
        Permanent,
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
                multiplier: 2.0,
                jitter: 0.0,
            },
            Arc::new(Metrics::new().dispatcher),
        )
    }

    #[tokio::test]
    async fn succeeds_after_two_transient_failures() {
        let dispatcher = dispatcher();
        let attempts = Arc::new(AtomicU32::new(0));
        let before_calls = Arc::new(AtomicU32::new(0));
        let after_calls = Arc::new(AtomicU32::new(0));

        struct CountHooks {
            before: Arc<AtomicU32>,
            after: Arc<AtomicU32>,
        }
        impl DispatchHooks<TestError> for CountHooks {
            fn before(&self, _attempt: u32) {
                self.before.fetch_add(1, Ordering::SeqCst);
            }
            fn after(&self, _attempt: u32, _err: Option<&TestError>) {
                self.after.fetch_add(1, Ordering::SeqCst);
            }
        }
        let hooks = CountHooks {
            before: before_calls.clone(),
            after: after_calls.clone(),
        };

        let (_tx, rx) = broadcast::channel(1);
        let attempts_clone = attempts.clone();
        let result = dispatcher
            .run(
                "test",
                rx,
                |e: &TestError| *e == TestError::Transient,
                &hooks,
                move |_attempt| {
                    let attempts = attempts_clone.clone();
                    async move {
                        let n = attempts.fetch_add(1, Ordering::SeqCst);
                        if n < 2 {
                            Err(TestError::Transient)
                        } else {
                            Ok(42)
                        }
                    }
                },
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(before_calls.load(Ordering::SeqCst), 3);
        assert_eq!(after_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let dispatcher = dispatcher();
        let (_tx, rx) = broadcast::channel(1);

        let result: Result<(), _> = dispatcher
            .run(
                "test",
                rx,
                |e: &TestError| *e == TestError::Transient,
                &NoopHooks,
                |_attempt| async { Err(TestError::Transient) },
            )
            .await;

        match result {
            Err(DispatcherError::Exhausted(TestError::Transient)) => {}
            other => panic!("expected exhausted transient error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let dispatcher = dispatcher();
        let attempts = Arc::new(AtomicU32::new(0));
        let (_tx, rx) = broadcast::channel(1);

        let attempts_clone = attempts.clone();
        let result: Result<(), _> = dispatcher
            .run(
                "test",
                rx,
                |e: &TestError| *e == TestError::Transient,
                &NoopHooks,
                move |_attempt| {
                    let attempts = attempts_clone.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(TestError::Permanent)
                    }
                },
            )
            .await;

        assert!(matches!(result, Err(DispatcherError::Exhausted(TestError::Permanent))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn kill_signal_cancels_between_attempts() {
        let dispatcher = dispatcher();
        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let result: Result<(), _> = dispatcher
            .run(
                "test",
                rx,
                |e: &TestError| *e == TestError::Transient,
                &NoopHooks,
                |_attempt| async { Err(TestError::Transient) },
            )
            .await;

        assert!(matches!(result, Err(DispatcherError::Cancelled)));
    }
}
