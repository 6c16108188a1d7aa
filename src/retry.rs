//! Exponential backoff for calls the backend rejects with a rate limit.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{AppError, GatewayError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Delay grows as `base_delay * 2^(attempt - 1)`: 1s, 2s, 4s, 8s, 16s with the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl Backoff {
    /// `max_attempts` below 1 is treated as 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Status surfaced to the user before each wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    pub attempt: u32,
    pub delay: Duration,
}

impl RetryNotice {
    pub fn message(&self) -> String {
        format!(
            "Rate limit exceeded. Retrying in {} seconds...",
            self.delay.as_secs_f64()
        )
    }
}

#[allow(async_fn_in_trait)]
pub trait Sleeper {
    async fn sleep(&self, delay: Duration);
}

/// Sleeps on the actix runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeSleeper;

impl Sleeper for RuntimeSleeper {
    async fn sleep(&self, delay: Duration) {
        actix_web::rt::time::sleep(delay).await;
    }
}

/// Run `operation`, retrying only while it fails with a rate limit.
///
/// The attempt counter lives in this call: independent invocations never share it.
/// Any other failure is returned on first occurrence. After `max_attempts`
/// rate-limited attempts (each followed by its wait) the call gives up with
/// [`AppError::RetriesExhausted`].
pub async fn attempt_with_backoff<T, F, Fut, S, N>(
    backoff: &Backoff,
    sleeper: &S,
    mut notify: N,
    mut operation: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
    S: Sleeper,
    N: FnMut(&RetryNotice),
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(attempts = attempt + 1, "succeeded after backing off");
                }
                return Ok(value);
            }
            Err(e) if e.is_rate_limited() => {
                attempt += 1;
                let delay = backoff.delay_for(attempt);
                let notice = RetryNotice { attempt, delay };
                warn!(attempt, delay_ms = delay.as_millis() as u64, "rate limited, backing off");
                notify(&notice);
                sleeper.sleep(delay).await;

                if attempt >= backoff.max_attempts {
                    warn!(attempts = attempt, "giving up after repeated rate limiting");
                    return Err(AppError::RetriesExhausted { attempts: attempt });
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct Recorder(RefCell<Vec<Duration>>);

    impl Sleeper for Recorder {
        async fn sleep(&self, delay: Duration) {
            self.0.borrow_mut().push(delay);
        }
    }

    fn secs(list: &[u64]) -> Vec<Duration> {
        list.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn delays_double_from_the_base() {
        let b = Backoff::default();
        let delays: Vec<_> = (1..=5).map(|a| b.delay_for(a)).collect();
        assert_eq!(delays, secs(&[1, 2, 4, 8, 16]));
        assert_eq!(Backoff::new(0, DEFAULT_BASE_DELAY).max_attempts(), 1);
    }

    #[actix_web::test]
    async fn non_rate_limit_failures_are_not_retried() {
        let sleeper = Recorder::default();
        let calls = Cell::new(0);
        let result: Result<(), _> = attempt_with_backoff(&Backoff::default(), &sleeper, |_| {}, || {
            calls.set(calls.get() + 1);
            async { Err(GatewayError::UnknownEmail) }
        })
        .await;

        assert!(matches!(result, Err(AppError::Remote(GatewayError::UnknownEmail))));
        assert_eq!(calls.get(), 1);
        assert!(sleeper.0.borrow().is_empty());
    }

    #[actix_web::test]
    async fn notices_precede_each_wait() {
        let sleeper = Recorder::default();
        let calls = Cell::new(0);
        let mut messages = Vec::new();
        let result = attempt_with_backoff(
            &Backoff::default(),
            &sleeper,
            |n| messages.push(n.message()),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 { Err(GatewayError::RateLimited) } else { Ok(n) }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            messages,
            vec![
                "Rate limit exceeded. Retrying in 1 seconds...",
                "Rate limit exceeded. Retrying in 2 seconds...",
            ]
        );
        assert_eq!(*sleeper.0.borrow(), secs(&[1, 2]));
    }
}
