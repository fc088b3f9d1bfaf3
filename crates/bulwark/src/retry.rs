// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use sundial::Clock;

use crate::backoff::DelaySchedule;
use crate::{Attempt, Backoff, Recovery, RecoveryKind};

/// The error returned when a retried operation does not produce a value.
///
/// Carries the failure of the final attempt: either the attempt exceeded its
/// timeout budget or the upstream returned an error.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The attempt did not complete within its timeout budget.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
    /// The upstream operation returned an error.
    #[error(transparent)]
    Upstream(E),
}

impl<E: Recovery> RetryError<E> {
    /// Returns true if this failure is transient.
    ///
    /// Timeouts are always transient; upstream errors classify themselves
    /// through [`Recovery`]. Transient failures are the ones a circuit
    /// breaker should count.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Upstream(error) => error.recovery() == RecoveryKind::Retry,
        }
    }
}

/// Configuration for a [`Retry`] executor.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark::{Backoff, RetryOptions};
///
/// let options = RetryOptions::new()
///     .max_attempts(3)
///     .attempt_timeout(Duration::from_secs(10))
///     .base_delay(Duration::from_secs(1))
///     .max_delay(Duration::from_secs(4))
///     .backoff(Backoff::Exponential);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    max_attempts: u32,
    attempt_timeout: Duration,
    base_delay: Duration,
    max_delay: Duration,
    backoff: Backoff,
    jitter: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(10),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            backoff: Backoff::Exponential,
            jitter: true,
        }
    }
}

impl RetryOptions {
    /// Creates options with the defaults: 3 attempts, a 10 second per-attempt
    /// timeout, and jittered exponential backoff between 1 and 4 seconds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total number of attempts (the first attempt included).
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts` is 0.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        assert!(max_attempts > 0, "max_attempts must be at least 1");
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the timeout budget for each individual attempt.
    #[must_use]
    pub fn attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Sets the base delay the backoff strategy scales from.
    #[must_use]
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the cap applied to every computed backoff delay.
    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enables or disables full jitter on backoff delays.
    ///
    /// Jitter is on by default; disable it for deterministic delay sequences.
    #[must_use]
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the configured attempt budget.
    #[must_use]
    pub fn get_max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the configured per-attempt timeout.
    #[must_use]
    pub fn get_attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub(crate) fn delays(&self) -> DelaySchedule {
        DelaySchedule::new(self.backoff, self.base_delay, self.max_delay, self.jitter)
    }
}

/// Executes an operation with bounded retry, per-attempt timeouts, and
/// backoff.
///
/// The executor knows nothing about caching or circuit state: it drives one
/// operation to success or to an exhausted attempt budget and reports the
/// final failure upward. Attempts stop early when the upstream error
/// classifies itself as permanent via [`Recovery`], since repeating such a
/// call cannot change its outcome.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark::{Recovery, Retry, RetryOptions};
/// use sundial::Clock;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("connection reset")]
/// struct TransportError;
///
/// impl Recovery for TransportError {}
///
/// # async fn example(clock: Clock) {
/// let retry = Retry::new(
///     "categories",
///     clock,
///     RetryOptions::new().max_attempts(3).attempt_timeout(Duration::from_secs(10)),
/// );
///
/// let result = retry
///     .execute(|| async { Ok::<_, TransportError>("payload".to_string()) })
///     .await;
/// assert!(result.is_ok());
/// # }
/// ```
#[derive(Debug)]
pub struct Retry {
    name: &'static str,
    clock: Clock,
    options: RetryOptions,
}

impl Retry {
    /// Creates an executor with the given name (used in log events) and
    /// options.
    #[must_use]
    pub fn new(name: &'static str, clock: Clock, options: RetryOptions) -> Self {
        Self { name, clock, options }
    }

    /// Returns the executor's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Drives `operation` until it succeeds, fails permanently, or the
    /// attempt budget is exhausted.
    ///
    /// The factory is invoked once per attempt so every attempt gets a fresh
    /// future.
    ///
    /// # Errors
    ///
    /// Returns the final attempt's failure: [`RetryError::Timeout`] when the
    /// attempt outlived its timeout budget, [`RetryError::Upstream`] when the
    /// upstream returned an error.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Recovery,
    {
        let mut attempt = Attempt::first(self.options.max_attempts);
        let mut delays = self.options.delays();

        loop {
            let error = match self.clock.timeout(self.options.attempt_timeout, operation()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => {
                    if error.recovery() == RecoveryKind::Never {
                        return Err(RetryError::Upstream(error));
                    }
                    RetryError::Upstream(error)
                }
                Err(elapsed) => RetryError::Timeout(elapsed.duration()),
            };

            let Some(next) = attempt.increment(self.options.max_attempts) else {
                return Err(error);
            };

            let delay = delays.next().unwrap_or(Duration::ZERO);
            tracing::event!(
                name: "bulwark.retry",
                tracing::Level::WARN,
                retry = self.name,
                attempt.index = attempt.index(),
                attempt.is_last = attempt.is_last(),
                retry.delay_secs = delay.as_secs_f32(),
                error = %error,
            );

            self.clock.delay(delay).await;
            attempt = next;
        }
    }
}
