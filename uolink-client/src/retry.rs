//! Bounded-attempt retry with backoff and cancellation.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::UoError;

/// Backoff configuration for one retryable operation.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Attempts allowed in total (first try included).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_interval: Duration,
    /// Growth factor applied per retry.
    pub multiplier: f64,
    /// Random spread as a fraction of the delay, `0.0` to disable.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts:  3,
            base_interval: Duration::from_millis(500),
            multiplier:    2.0,
            jitter:        0.0,
        }
    }
}

impl RetryPolicy {
    /// The delay before retry number `retry` (0-based).
    fn delay_for(&self, retry: u32) -> Duration {
        let scaled = self.base_interval.as_secs_f64() * self.multiplier.powi(retry as i32);
        let spread = if self.jitter > 0.0 {
            1.0 + self.jitter * (random_unit() * 2.0 - 1.0)
        } else {
            1.0
        };
        Duration::from_secs_f64((scaled * spread).max(0.0))
    }
}

/// A uniform value in `[0, 1)` from the CSPRNG.
fn random_unit() -> f64 {
    let mut b = [0u8; 4];
    getrandom::getrandom(&mut b).expect("getrandom failed");
    f64::from(u32::from_be_bytes(b)) / f64::from(u32::MAX)
}

/// Drives the retries of a single operation.
///
/// At most one sleep is outstanding at a time, and once cancelled the
/// handler never lets the operation run again: every subsequent
/// [`RetryHandler::wait`] returns [`UoError::Cancelled`].
#[derive(Debug)]
pub struct RetryHandler {
    policy:   RetryPolicy,
    attempts: u32,
    cancel:   CancellationToken,
}

impl RetryHandler {
    /// A handler with its own cancellation token.
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_token(policy, CancellationToken::new())
    }

    /// A handler sharing an external cancellation token.
    pub fn with_token(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, attempts: 1, cancel }
    }

    /// Attempts consumed so far (the first try counts).
    pub fn attempts(&self) -> u32 { self.attempts }

    /// Start counting attempts from scratch.
    pub fn reset(&mut self) { self.attempts = 1; }

    /// True once no further retry is allowed.
    pub fn limit_reached(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    /// Cancel the pending (and any future) retry sleep.
    pub fn cancel(&self) { self.cancel.cancel(); }

    /// True once [`RetryHandler::cancel`] was called.
    pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }

    /// Sleep out the backoff before the next attempt and consume it.
    ///
    /// Returns the delay that was slept, or [`UoError::Cancelled`] if the
    /// handler was cancelled before or during the sleep.
    pub async fn wait(&mut self) -> Result<Duration, UoError> {
        if self.cancel.is_cancelled() {
            return Err(UoError::Cancelled);
        }
        let delay = self.policy.delay_for(self.attempts - 1);
        self.attempts += 1;
        tokio::select! {
            () = self.cancel.cancelled() => Err(UoError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_interval: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delays_grow_by_the_multiplier() {
        let mut h = RetryHandler::new(fast_policy(4));
        assert_eq!(h.wait().await.unwrap(), Duration::from_millis(100));
        assert_eq!(h.wait().await.unwrap(), Duration::from_millis(200));
        assert_eq!(h.wait().await.unwrap(), Duration::from_millis(400));
        assert!(h.limit_reached());
        h.reset();
        assert_eq!(h.attempts(), 1);
        assert!(!h.limit_reached());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_handler_never_waits_again() {
        let mut h = RetryHandler::new(fast_policy(10));
        h.cancel();
        assert!(matches!(h.wait().await, Err(UoError::Cancelled)));
        assert!(matches!(h.wait().await, Err(UoError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_sleep_aborts_it() {
        let policy = RetryPolicy {
            base_interval: Duration::from_secs(3600),
            ..fast_policy(5)
        };
        let token = CancellationToken::new();
        let mut h = RetryHandler::with_token(policy, token.clone());
        let waiter = tokio::spawn(async move { h.wait().await });
        tokio::task::yield_now().await;
        token.cancel();
        assert!(matches!(waiter.await.unwrap(), Err(UoError::Cancelled)));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy { jitter: 0.5, ..fast_policy(2) };
        for _ in 0..100 {
            let d = policy.delay_for(0);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(150), "{d:?}");
        }
    }
}
