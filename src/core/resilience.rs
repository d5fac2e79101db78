// Retry helper and stop signal for the engine loops

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;

/// Bounded retry with a fixed (or growing) delay between attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff_multiplier,
        }
    }

    /// Same delay between every attempt
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, 1.0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it yields a non-empty list, at most
    /// `max_attempts` times, and hand back whatever the last attempt produced.
    ///
    /// Errors are retried the same way as empty results.
    pub async fn execute_until_nonempty<F, Fut, T, E>(&self, mut operation: F) -> Result<Vec<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
        E: std::fmt::Display,
    {
        let mut delay = self.delay;
        let mut attempt = 1;

        loop {
            let outcome = operation().await;

            let settled = matches!(&outcome, Ok(items) if !items.is_empty());
            if settled || attempt >= self.max_attempts {
                return outcome;
            }

            match &outcome {
                Ok(_) => debug!("Empty result (attempt {}), retrying in {:?}", attempt, delay),
                Err(e) => debug!("Operation failed (attempt {}), retrying in {:?}: {}", attempt, delay, e),
            }

            sleep(delay).await;
            delay = Duration::from_millis((delay.as_millis() as f64 * self.backoff_multiplier) as u64);
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

/// Clonable stop token shared between the engine and whoever controls it
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `trigger()` has been called
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // Sender lives in self, so wait_for only fails if it was dropped
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retry_stops_on_first_nonempty() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));

        let counter = calls.clone();
        let result: Result<Vec<u32>, String> = policy
            .execute_until_nonempty(|| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n == 0 { Ok(vec![]) } else { Ok(vec![7]) }
                }
            })
            .await;

        assert_eq!(result.unwrap(), vec![7]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_accepts_empty_after_bound() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));

        let counter = calls.clone();
        let result: Result<Vec<u32>, String> = policy
            .execute_until_nonempty(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![])
                }
            })
            .await;

        assert!(result.unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_last_error() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let result: Result<Vec<u32>, String> = policy
            .execute_until_nonempty(|| async { Err("down".to_string()) })
            .await;

        assert_eq!(result.unwrap_err(), "down");
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());

        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        signal.trigger();
        handle.await.unwrap();
        assert!(signal.is_triggered());

        signal.reset();
        assert!(!signal.is_triggered());
    }
}
