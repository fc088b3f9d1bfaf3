// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::hash::Hash;

use bulwark::{Admission, Breaker, ExecutionResult, Recovery, Retry};
use larder::{Entry, Larder};
use sundial::Clock;

use crate::flight::Merger;
use crate::{DatasetOptions, DegradeReason, Outcome};

/// Type alias for dataset names used in log events.
pub type DatasetName = &'static str;

/// Resilient access to one logical dataset.
///
/// A `Fetcher` owns the full resilience stack for a dataset: a TTL cache
/// with last-known-good retention, a per-key circuit breaker, a bounded
/// retry executor, and single-flight refresh coalescing. Its one operation,
/// [`fetch_or_default`][Self::fetch_or_default], always produces a usable
/// value - callers never see an upstream error.
///
/// Construct one fetcher per dataset type (categories, branches, FAQs, ...)
/// and keep it for the life of the process; keys carry the tenant scope.
/// State is never shared between fetchers, so datasets degrade
/// independently.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark::Recovery;
/// use forage::{DatasetOptions, Fetcher};
/// use sundial::Clock;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("upstream unavailable")]
/// struct UpstreamError;
///
/// impl Recovery for UpstreamError {}
///
/// # futures::executor::block_on(async {
/// let clock = Clock::new_frozen();
/// let fetcher: Fetcher<u64, String> =
///     Fetcher::new("categories", clock, DatasetOptions::new(Duration::from_secs(300)));
///
/// let outcome = fetcher
///     .fetch_or_default(
///         &123,
///         || async { Ok::<_, UpstreamError>("1) Shoes: leather goods.".to_string()) },
///         "No category information available.".to_string(),
///     )
///     .await;
///
/// assert!(!outcome.is_degraded());
/// # });
/// ```
///
/// # Upstream client state
///
/// The fetcher never owns upstream connections. Collaborators construct
/// their client (connection pool, base URL, credentials) at startup and move
/// a handle into each `fetch` closure explicitly:
///
/// ```ignore
/// let client = Arc::new(ApiClient::connect(&config).await?);
///
/// let fetch = {
///     let client = Arc::clone(&client);
///     move || {
///         let client = Arc::clone(&client);
///         async move { client.categories(business_id).await }
///     }
/// };
/// ```
#[derive(Debug)]
pub struct Fetcher<K, V> {
    name: DatasetName,
    options: DatasetOptions,
    clock: Clock,
    larder: Larder<K, V>,
    breaker: Option<Breaker<K>>,
    retry: Retry,
    merger: Option<Merger<K, Result<V, DegradeReason>>>,
}

impl<K, V> Fetcher<K, V>
where
    K: Clone + Eq + Hash + Debug,
    V: Clone,
{
    /// Creates a fetcher for one dataset.
    ///
    /// The name identifies the dataset in log events; the options carry the
    /// dataset's full resilience profile.
    #[must_use]
    pub fn new(name: DatasetName, clock: Clock, options: DatasetOptions) -> Self {
        Self {
            name,
            options,
            larder: Larder::new(clock.clone()),
            breaker: options
                .breaker_enabled()
                .then(|| Breaker::new(name, clock.clone(), options.get_breaker())),
            retry: Retry::new(name, clock.clone(), options.get_retry()),
            merger: options.stampede_protection_enabled().then(Merger::new),
            clock,
        }
    }

    /// Returns the dataset name.
    #[must_use]
    pub fn name(&self) -> DatasetName {
        self.name
    }

    /// Returns the dataset's resilience profile.
    #[must_use]
    pub fn options(&self) -> &DatasetOptions {
        &self.options
    }

    /// Returns the underlying store.
    ///
    /// Useful for inspection and for pre-seeding values at startup.
    #[must_use]
    pub fn larder(&self) -> &Larder<K, V> {
        &self.larder
    }

    /// Returns the dataset's circuit breaker, if enabled.
    ///
    /// Health endpoints use this to report partial degradation via
    /// [`Breaker::any_open`].
    #[must_use]
    pub fn breaker(&self) -> Option<&Breaker<K>> {
        self.breaker.as_ref()
    }

    /// Fetches the dataset for a key, degrading instead of failing.
    ///
    /// The decision sequence:
    ///
    /// 1. A fresh cache entry is returned as [`Outcome::Fresh`] - no
    ///    upstream call, no breaker check.
    /// 2. An open circuit short-circuits to [`Outcome::Degraded`] carrying
    ///    the stale cached value if one exists, else `fallback`.
    /// 3. Otherwise the upstream is refreshed through the retry executor
    ///    (joining an already in-flight refresh for the same key when
    ///    stampede protection is on). Success caches the value and returns
    ///    [`Outcome::Refreshed`]; exhausted or permanent failure returns
    ///    [`Outcome::Degraded`], again preferring stale data over the
    ///    static fallback.
    ///
    /// The injected `fetch` is invoked once per attempt. Its error type
    /// classifies itself via [`Recovery`]: transient failures are retried
    /// and count against the circuit, permanent failures do neither.
    pub async fn fetch_or_default<F, Fut, E>(&self, key: &K, fetch: F, fallback: V) -> Outcome<V>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::error::Error + Recovery,
    {
        let now = self.clock.instant();
        if let Some(entry) = self.larder.get(key)
            && entry.is_fresh(self.options.get_ttl(), now)
        {
            tracing::event!(
                name: "forage.fetch.hit",
                tracing::Level::DEBUG,
                dataset = self.name,
                key = ?key,
            );
            return Outcome::Fresh(entry.into_value());
        }

        // Fast rejection: an open circuit means no refresh can happen, so
        // skip the single-flight entirely.
        if let Some(breaker) = &self.breaker
            && breaker.is_open(key)
        {
            return self.degraded(key, fallback, DegradeReason::BreakerOpen);
        }

        let refreshed = match &self.merger {
            Some(merger) => merger.work(key.clone(), || self.refresh(key, &fetch)).await,
            None => self.refresh(key, &fetch).await,
        };

        match refreshed {
            Ok(value) => Outcome::Refreshed(value),
            Err(reason) => self.degraded(key, fallback, reason),
        }
    }

    /// Drives one upstream refresh under the breaker and retry executor.
    ///
    /// Callers coalesced into the same flight share this result, so
    /// everything here happens exactly once per flight.
    async fn refresh<F, Fut, E>(&self, key: &K, fetch: &F) -> Result<V, DegradeReason>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::error::Error + Recovery,
    {
        // A concurrent caller may have refreshed while we waited to join the
        // flight.
        let now = self.clock.instant();
        if let Some(entry) = self.larder.get(key)
            && entry.is_fresh(self.options.get_ttl(), now)
        {
            return Ok(entry.into_value());
        }

        if let Some(breaker) = &self.breaker
            && breaker.enter(key) == Admission::Rejected
        {
            return Err(DegradeReason::BreakerOpen);
        }

        match self.retry.execute(|| fetch()).await {
            Ok(value) => {
                // Cache before handing the value out: even if every caller
                // has gone away by now, the value serves the next one.
                self.larder.insert(key, value.clone());
                if let Some(breaker) = &self.breaker {
                    breaker.exit(key, ExecutionResult::Success);
                }
                tracing::event!(
                    name: "forage.fetch.refreshed",
                    tracing::Level::DEBUG,
                    dataset = self.name,
                    key = ?key,
                );
                Ok(value)
            }
            Err(error) => {
                if let Some(breaker) = &self.breaker
                    && error.is_transient()
                {
                    breaker.exit(key, ExecutionResult::Failure);
                }
                tracing::event!(
                    name: "forage.fetch.failed",
                    tracing::Level::WARN,
                    dataset = self.name,
                    key = ?key,
                    error = %error,
                );
                Err(DegradeReason::FetchFailed)
            }
        }
    }

    /// Builds the degraded outcome, preferring stale cached data over the
    /// static fallback.
    fn degraded(&self, key: &K, fallback: V, reason: DegradeReason) -> Outcome<V> {
        let value = self.larder.get(key).map_or(fallback, Entry::into_value);
        tracing::event!(
            name: "forage.fetch.degraded",
            tracing::Level::WARN,
            dataset = self.name,
            key = ?key,
            reason = %reason,
        );
        Outcome::Degraded { value, reason }
    }
}
