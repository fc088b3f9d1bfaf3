// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Time abstraction for resilience components.
//!
//! Working with time is notoriously difficult to test: sleeps slow test suites
//! down and wall-clock assertions are flaky. This crate isolates every
//! time-related operation behind a [`Clock`] so that production code runs on
//! real time while tests control the passage of time explicitly.
//!
//! The clock is used for:
//!
//! - Retrieving the current monotonic [`Instant`](std::time::Instant) and
//!   absolute [`SystemTime`](std::time::SystemTime).
//! - Creating [`Delay`] futures that complete after a duration.
//! - Bounding arbitrary futures with a [`Timeout`].
//!
//! # Clock construction
//!
//! In production, create the clock with [`Clock::new_tokio`]; delays are
//! scheduled on the Tokio timer:
//!
//! ```
//! use std::time::Duration;
//!
//! use sundial::Clock;
//!
//! # async fn example() {
//! let clock = Clock::new_tokio();
//!
//! clock.delay(Duration::from_millis(10)).await;
//!
//! let result = clock.timeout(Duration::from_secs(5), async { 42 }).await;
//! assert_eq!(result, Ok(42));
//! # }
//! ```
//!
//! In tests, enable the `test-util` feature and drive time manually through
//! `ClockControl`: `control.advance(Duration::from_secs(30))` moves every
//! clock cloned from it, fires due delays, and costs no wall-clock time.
//! See `ClockControl` for examples.
//!
//! # Cloning and shared state
//!
//! Cloning a clock is inexpensive and every clone shares the same underlying
//! state: time adjustments performed through a `ClockControl` are visible to
//! every clock cloned from it, and to every pending [`Delay`] those clocks
//! created.

mod clock;
#[cfg(any(feature = "test-util", test))]
mod control;
mod delay;
mod timeout;

pub use clock::Clock;
#[cfg(any(feature = "test-util", test))]
pub use control::ClockControl;
pub use delay::Delay;
pub use timeout::{Elapsed, Timeout};

/// Identifies a timer registered with a controlled clock.
#[cfg(any(feature = "test-util", test))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerKey(u64);

#[cfg(any(feature = "test-util", test))]
impl TimerKey {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }
}
