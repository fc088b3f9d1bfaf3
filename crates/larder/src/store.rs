// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::RwLock;
use sundial::Clock;

use crate::Entry;

/// A keyed store of last-known-good values.
///
/// Each key maps to the most recent successfully stored value and the instant
/// it was stored. Entries are only ever replaced by a newer [`insert`][Self::insert]
/// or removed explicitly - there is no eviction, so a value that has gone
/// stale remains available as a degraded fallback.
///
/// The store encapsulates its own synchronization: reads and writes from any
/// number of threads are safe, inserts are atomic with respect to reads, and
/// no operation suspends.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use larder::Larder;
/// use sundial::Clock;
///
/// let clock = Clock::new_frozen();
/// let larder = Larder::new(clock);
///
/// larder.insert(&"faq:42", "formatted faq text".to_string());
/// assert!(!larder.is_stale(&"faq:42", Duration::from_secs(3600)));
/// ```
#[derive(Debug)]
pub struct Larder<K, V> {
    clock: Clock,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> Larder<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Creates an empty store that stamps entries with the given clock.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a reference to the store's clock.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Retrieves the entry for a key, fresh or stale.
    ///
    /// Returns `None` only if no value was ever stored for the key.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Entry<V>> {
        self.entries.read().get(key).cloned()
    }

    /// Stores a value for a key, stamping it with the current instant.
    ///
    /// Replaces any previous entry for the key. Call this only with
    /// successfully fetched values; failures must leave the previous entry in
    /// place.
    pub fn insert(&self, key: &K, value: V) {
        let entry = Entry::new(value, self.clock.instant());
        self.entries.write().insert(key.clone(), entry);
    }

    /// Returns true if the key has no entry or its entry has outlived `ttl`.
    #[must_use]
    pub fn is_stale(&self, key: &K, ttl: Duration) -> bool {
        let now = self.clock.instant();
        self.entries.read().get(key).is_none_or(|entry| !entry.is_fresh(ttl, now))
    }

    /// Removes the entry for a key, returning it if present.
    pub fn remove(&self, key: &K) -> Option<Entry<V>> {
        self.entries.write().remove(key)
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
