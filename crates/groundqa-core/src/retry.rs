//! Fixed-attempt retry with a constant delay, applied explicitly at the call
//! site around a single fallible operation.

use std::fmt;
use std::time::Duration;
use tracing::{error, warn};

pub struct RetryPolicy<E> {
    max_attempts: u32,
    delay: Duration,
    retryable: fn(&E) -> bool,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self { *self }
}

impl<E> Copy for RetryPolicy<E> {}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl<E: fmt::Display> RetryPolicy<E> {
    /// `max_attempts` counts the first call; zero is treated as one.
    pub fn new(max_attempts: u32, delay: Duration, retryable: fn(&E) -> bool) -> Self {
        Self { max_attempts: max_attempts.max(1), delay, retryable }
    }

    /// Retry every error.
    pub fn always(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, |_| true)
    }

    pub fn max_attempts(&self) -> u32 { self.max_attempts }
    pub fn delay(&self) -> Duration { self.delay }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are exhausted. The last error is returned unchanged. `op`
    /// receives the 1-based attempt number.
    pub fn run<T>(&self, label: &str, mut op: impl FnMut(u32) -> Result<T, E>) -> Result<T, E> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(e) if !(self.retryable)(&e) => {
                    error!(operation = label, attempt, error = %e, "non-retryable failure");
                    return Err(e);
                }
                Err(e) if attempt >= self.max_attempts => {
                    error!(operation = label, attempts = self.max_attempts, error = %e, "all attempts failed");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "attempt failed, retrying"
                    );
                    if !self.delay.is_zero() { std::thread::sleep(self.delay); }
                    attempt += 1;
                }
            }
        }
    }
}
