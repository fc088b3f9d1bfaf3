// Copyright (c) Microsoft Corporation.

use std::ops::Deref;
use std::time::{Duration, Instant};

/// A stored value with the instant it was successfully fetched.
///
/// Freshness is not a stored property: it is judged at read time against a
/// caller-supplied TTL, so different readers can apply different freshness
/// requirements to the same entry.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
///
/// use larder::Entry;
///
/// let now = Instant::now();
/// let entry = Entry::new(42, now);
///
/// assert_eq!(*entry.value(), 42);
/// assert!(entry.is_fresh(Duration::from_secs(60), now));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry<V> {
    value: V,
    fetched_at: Instant,
}

impl<V> Entry<V> {
    /// Creates an entry fetched at the given instant.
    pub fn new(value: V, fetched_at: Instant) -> Self {
        Self { value, fetched_at }
    }

    /// Returns a reference to the stored value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry and returns the stored value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }

    /// Returns the instant the value was fetched.
    #[must_use]
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Returns how long ago the value was fetched, as seen from `now`.
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    /// Returns true if the entry's age is strictly within `ttl`.
    ///
    /// An entry fetched at `t` is fresh for reads before `t + ttl` and stale
    /// from `t + ttl` onwards.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        self.age(now) < ttl
    }
}

impl<V> Deref for Entry<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}
