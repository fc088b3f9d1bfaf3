// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use bulwark::{Backoff, BreakerOptions, RetryOptions};

/// The resilience profile of one dataset.
///
/// One profile is constructed per dataset type at startup and passed to
/// [`Fetcher::new`][crate::Fetcher::new]; call sites never carry their own
/// magic numbers. The TTL is the only mandatory parameter - how long a
/// dataset stays fresh is inherently dataset-specific - while retry and
/// breaker behavior default to values that suit a read-mostly information
/// API.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use forage::DatasetOptions;
///
/// // FAQs change rarely; cache them for an hour and keep the breaker
/// // defaults.
/// let faqs = DatasetOptions::new(Duration::from_secs(3600));
///
/// // Business context is hot data with a tight budget.
/// let context = DatasetOptions::new(Duration::from_secs(300))
///     .max_attempts(2)
///     .attempt_timeout(Duration::from_secs(5))
///     .failure_threshold(3)
///     .cooldown(Duration::from_secs(60));
///
/// // A dataset that only wants TTL semantics can opt out of the breaker.
/// let ttl_only = DatasetOptions::new(Duration::from_secs(900)).breaker(false);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DatasetOptions {
    ttl: Duration,
    retry: RetryOptions,
    breaker: BreakerOptions,
    breaker_enabled: bool,
    stampede_protection: bool,
}

impl DatasetOptions {
    /// Creates a profile with the given TTL and default retry and breaker
    /// behavior (3 attempts, 10 second attempt timeout, jittered exponential
    /// backoff, breaker opening after 3 consecutive failures for 300
    /// seconds, stampede protection on).
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            retry: RetryOptions::new(),
            breaker: BreakerOptions::new(),
            breaker_enabled: true,
            stampede_protection: true,
        }
    }

    /// Sets the total number of attempts per refresh.
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts` is 0.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry = self.retry.max_attempts(max_attempts);
        self
    }

    /// Sets the timeout budget for each upstream attempt.
    #[must_use]
    pub fn attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.retry = self.retry.attempt_timeout(attempt_timeout);
        self
    }

    /// Sets the base backoff delay between attempts.
    #[must_use]
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.retry = self.retry.base_delay(base_delay);
        self
    }

    /// Sets the cap on backoff delays.
    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.retry = self.retry.max_delay(max_delay);
        self
    }

    /// Sets the backoff strategy between attempts.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.retry = self.retry.backoff(backoff);
        self
    }

    /// Enables or disables jitter on backoff delays.
    #[must_use]
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.retry = self.retry.jitter(jitter);
        self
    }

    /// Sets the number of consecutive transient failures that opens the
    /// breaker.
    ///
    /// # Panics
    ///
    /// Panics if `failure_threshold` is 0.
    #[must_use]
    pub fn failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.breaker = self.breaker.failure_threshold(failure_threshold);
        self
    }

    /// Sets how long the breaker stays open before probing.
    #[must_use]
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.breaker = self.breaker.cooldown(cooldown);
        self
    }

    /// Enables or disables the circuit breaker for this dataset.
    ///
    /// On by default. Datasets that only want TTL semantics - every refresh
    /// is attempted regardless of recent failures - can opt out.
    #[must_use]
    pub fn breaker(mut self, enabled: bool) -> Self {
        self.breaker_enabled = enabled;
        self
    }

    /// Enables or disables single-flight refresh coalescing.
    ///
    /// On by default: concurrent cache-miss callers for the same key share
    /// one upstream refresh instead of each issuing their own. Duplicate
    /// refreshes are wasteful but not incorrect for idempotent reads, so
    /// this can be turned off.
    #[must_use]
    pub fn stampede_protection(mut self, enabled: bool) -> Self {
        self.stampede_protection = enabled;
        self
    }

    /// Returns the freshness TTL.
    #[must_use]
    pub fn get_ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the retry configuration.
    #[must_use]
    pub fn get_retry(&self) -> RetryOptions {
        self.retry
    }

    /// Returns the breaker configuration.
    #[must_use]
    pub fn get_breaker(&self) -> BreakerOptions {
        self.breaker
    }

    /// Returns true if the breaker is enabled for this dataset.
    #[must_use]
    pub fn breaker_enabled(&self) -> bool {
        self.breaker_enabled
    }

    /// Returns true if single-flight coalescing is enabled.
    #[must_use]
    pub fn stampede_protection_enabled(&self) -> bool {
        self.stampede_protection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_breaker_and_stampede_protection() {
        let options = DatasetOptions::new(Duration::from_secs(60));

        assert_eq!(options.get_ttl(), Duration::from_secs(60));
        assert!(options.breaker_enabled());
        assert!(options.stampede_protection_enabled());
    }

    #[test]
    fn setters_pass_through() {
        let options = DatasetOptions::new(Duration::from_secs(60))
            .max_attempts(5)
            .attempt_timeout(Duration::from_secs(2))
            .failure_threshold(7)
            .cooldown(Duration::from_secs(10))
            .breaker(false)
            .stampede_protection(false);

        assert_eq!(options.get_retry().get_max_attempts(), 5);
        assert_eq!(options.get_retry().get_attempt_timeout(), Duration::from_secs(2));
        assert_eq!(options.get_breaker().get_failure_threshold(), 7);
        assert_eq!(options.get_breaker().get_cooldown(), Duration::from_secs(10));
        assert!(!options.breaker_enabled());
        assert!(!options.stampede_protection_enabled());
    }

    #[test]
    #[should_panic(expected = "max_attempts must be at least 1")]
    fn zero_attempts_rejected_at_construction() {
        let _ = DatasetOptions::new(Duration::from_secs(60)).max_attempts(0);
    }
}
