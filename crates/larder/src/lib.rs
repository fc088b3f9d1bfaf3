// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Keyed in-memory store with TTL staleness and last-known-good retention.
//!
//! A [`Larder`] holds the most recent *successfully* fetched value per key,
//! together with the instant it was fetched. Staleness is a property judged at
//! read time against a caller-supplied TTL - a stale entry is never evicted,
//! because a stale value is the best available fallback when a refresh fails.
//!
//! All operations are synchronous and complete without suspension; the store
//! encapsulates its own synchronization and readers never observe a torn
//! write.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use larder::Larder;
//! use sundial::Clock;
//!
//! let clock = Clock::new_frozen();
//! let larder = Larder::new(clock.clone());
//!
//! larder.insert(&"tenant-1", "payload".to_string());
//!
//! let entry = larder.get(&"tenant-1").unwrap();
//! assert_eq!(*entry.value(), "payload");
//! assert!(entry.is_fresh(Duration::from_secs(60), clock.instant()));
//! ```

mod entry;
mod store;

pub use entry::Entry;
pub use store::Larder;
