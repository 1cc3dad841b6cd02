//! Exponential backoff with jitter for remote calls
//!
//! A retry waits `initial_delay * multiplier^n`, scaled by a uniform factor
//! in `[1 - jitter, 1 + jitter)`. With the defaults that is 1s, 2s, 4s, ...
//! each multiplied by a value in `[0.5, 1.5)`.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{GmailError, Result};
use crate::interrupt::Interrupt;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a unit of work runs at most `max_retries + 1` times
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    /// Randomization factor applied to every delay
    pub jitter: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.5,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }

    /// Same retry budget, no waiting between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
            max_delay: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(self.jitter)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Fresh per-chunk retry state
    pub fn start(&self) -> RetryState {
        RetryState {
            backoff: self.backoff(),
            retries: 0,
            max_retries: self.max_retries,
        }
    }

    /// Run `operation` until it succeeds, fails terminally, or the retry
    /// budget is spent. Used for setup calls such as listing pages. An
    /// interrupt during a backoff wait ends the loop with `OperationCancelled`.
    pub async fn with_retry<T, F, Fut>(
        &self,
        operation_name: &str,
        interrupt: &Interrupt,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = self.start();

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            let Some(delay) = state.next_delay() else {
                warn!(
                    "{} failed after {} retries: {}",
                    operation_name,
                    state.retries(),
                    error
                );
                return Err(error);
            };

            warn!(
                "{} failed: {}. Retrying in {:.2?} (attempt {}/{})",
                operation_name,
                error,
                delay,
                state.retries(),
                state.max_retries()
            );

            if !interrupt.sleep(delay).await {
                return Err(GmailError::OperationCancelled(format!(
                    "{} interrupted while waiting to retry",
                    operation_name
                )));
            }
        }
    }
}

/// Attempt bookkeeping for one chunk; dropped once the chunk resolves
#[derive(Debug)]
pub struct RetryState {
    backoff: ExponentialBackoff,
    retries: u32,
    max_retries: u32,
}

impl RetryState {
    /// Delay before the next retry, or `None` when the budget is exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.max_retries {
            return None;
        }
        self.retries += 1;
        self.backoff.next_backoff()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_state_budget() {
        let mut state = RetryPolicy::immediate(5).start();
        for _ in 0..5 {
            assert!(state.next_delay().is_some());
        }
        assert_eq!(state.retries(), 5);
        assert!(state.next_delay().is_none());
        assert_eq!(state.retries(), 5);
    }

    #[test]
    fn test_default_delays_grow_with_jitter() {
        let mut state = RetryPolicy::default().start();
        let mut nominal = Duration::from_secs(1);

        while let Some(delay) = state.next_delay() {
            assert!(delay >= nominal.mul_f64(0.5), "{:?} below {:?}", delay, nominal);
            assert!(
                delay <= nominal.mul_f64(1.5) + Duration::from_micros(1),
                "{:?} above {:?}",
                delay,
                nominal
            );
            nominal *= 2;
        }
        assert_eq!(state.retries(), 5);
    }

    #[test]
    fn test_zero_retries_never_waits() {
        let mut state = RetryPolicy::immediate(0).start();
        assert!(state.next_delay().is_none());
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempt_count);

        let result = RetryPolicy::immediate(3)
            .with_retry("test_op", &Interrupt::never(), || {
                let count = Arc::clone(&counter);
                async move {
                    if count.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(GmailError::ServerError {
                            status: 503,
                            message: "unavailable".to_string(),
                        })
                    } else {
                        Ok("success".to_string())
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_fails_on_terminal_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempt_count);

        let result = RetryPolicy::immediate(3)
            .with_retry("test_op", &Interrupt::never(), || {
                let count = Arc::clone(&counter);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err::<String, _>(GmailError::NetworkError("reset".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(GmailError::NetworkError(_))));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_all_retries() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempt_count);

        let result = RetryPolicy::immediate(3)
            .with_retry("test_op", &Interrupt::never(), || {
                let count = Arc::clone(&counter);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err::<String, _>(GmailError::RateLimited("429".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(GmailError::RateLimited(_))));
        // initial + 3 retries
        assert_eq!(attempt_count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            max_retries: 2,
            initial_delay_ms: 250,
            multiplier: 3.0,
            jitter: 0.1,
            max_delay_secs: 10,
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_with_retry_stops_waiting_on_interrupt() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempt_count);
        let (handle, interrupt) = interrupt::channel();
        handle.interrupt();

        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(3600),
            ..RetryPolicy::default()
        };
        let call = policy.with_retry("messages.list", &interrupt, || {
            let count = Arc::clone(&counter);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(GmailError::RateLimited("429".to_string()))
            }
        });

        let result = tokio::time::timeout(Duration::from_secs(5), call)
            .await
            .expect("backoff wait should end on interrupt");
        assert!(matches!(result, Err(GmailError::OperationCancelled(_))));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }
}
