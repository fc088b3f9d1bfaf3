// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant, SystemTime};

use crate::{Delay, Timeout};

/// Provides an abstraction for time-related operations.
///
/// The clock decouples components from the system clock so their behavior can
/// be tested without real sleeps. In production the clock reads system time
/// and schedules delays on the Tokio timer; with the `test-util` feature a
/// clock can instead be driven by a `ClockControl`,
/// which freezes time and advances it on demand.
///
/// # Examples
///
/// ## Measure elapsed time
///
/// ```
/// use sundial::Clock;
///
/// # fn measure(clock: &Clock) {
/// let start = clock.instant();
/// // Perform some operation...
/// let elapsed = clock.instant() - start;
/// # }
/// ```
///
/// ## Delay operations
///
/// ```
/// use std::time::Duration;
///
/// use sundial::Clock;
///
/// # async fn delay_example(clock: &Clock) {
/// clock.delay(Duration::from_millis(10)).await;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Clock(ClockState);

#[derive(Debug, Clone)]
pub(crate) enum ClockState {
    /// Real time; delays run on the Tokio timer.
    System,
    /// Time controlled by a [`ClockControl`][crate::ClockControl].
    #[cfg(any(feature = "test-util", test))]
    Control(crate::ClockControl),
}

impl Clock {
    /// Creates a new clock that reads real time and schedules delays on the
    /// Tokio timer.
    ///
    /// The clock itself can be created anywhere, but polling a [`Delay`] or
    /// [`Timeout`] produced by it requires an active Tokio runtime.
    #[must_use]
    pub fn new_tokio() -> Self {
        Self(ClockState::System)
    }

    /// Creates a new frozen clock.
    ///
    /// This is a convenience method equivalent to calling
    /// `ClockControl::new().to_clock()`.
    ///
    /// > **Note**: The returned clock will not advance time; all time and
    /// > timers are frozen. Keep the [`ClockControl`][crate::ClockControl]
    /// > around instead when the test needs to move time forward.
    ///
    /// # Examples
    ///
    /// ```
    /// use sundial::Clock;
    ///
    /// let clock = Clock::new_frozen();
    /// assert_eq!(clock.instant(), clock.instant());
    /// ```
    #[cfg(any(feature = "test-util", test))]
    #[must_use]
    pub fn new_frozen() -> Self {
        crate::ClockControl::new().to_clock()
    }

    /// Creates a new frozen clock at the specified timestamp.
    ///
    /// This is a convenience method equivalent to calling
    /// `ClockControl::new_at(time).to_clock()`.
    #[cfg(any(feature = "test-util", test))]
    #[must_use]
    pub fn new_frozen_at(time: SystemTime) -> Self {
        crate::ClockControl::new_at(time).to_clock()
    }

    #[cfg(any(feature = "test-util", test))]
    pub(crate) fn with_control(control: &crate::ClockControl) -> Self {
        Self(ClockState::Control(control.clone()))
    }

    /// Retrieves the current absolute time as [`SystemTime`].
    ///
    /// > **Note**: System time is not monotonic and can be affected by system
    /// > clock changes. For relative measurements, use
    /// > [`instant()`][Self::instant].
    #[must_use]
    pub fn system_time(&self) -> SystemTime {
        match &self.0 {
            ClockState::System => SystemTime::now(),
            #[cfg(any(feature = "test-util", test))]
            ClockState::Control(control) => control.system_time(),
        }
    }

    /// Retrieves the current monotonic [`Instant`].
    ///
    /// > **Important**: When measuring elapsed time, use
    /// > [`Instant::duration_since`] against another instant retrieved from
    /// > the clock rather than `Instant::elapsed`. The `elapsed` method
    /// > bypasses the clock and reads system time directly, so it does not
    /// > respect controlled time in tests.
    #[must_use]
    pub fn instant(&self) -> Instant {
        match &self.0 {
            ClockState::System => Instant::now(),
            #[cfg(any(feature = "test-util", test))]
            ClockState::Control(control) => control.instant(),
        }
    }

    /// Creates a new [`Delay`] that completes after the specified duration.
    ///
    /// If the duration is [`Duration::ZERO`], the delay completes immediately.
    /// If the duration is [`Duration::MAX`], the delay never completes.
    #[must_use]
    pub fn delay(&self, duration: Duration) -> Delay {
        Delay::new(self, duration)
    }

    /// Bounds a future with a deadline relative to now.
    ///
    /// If the future completes before the deadline its output is returned;
    /// otherwise the future is abandoned and [`Elapsed`][crate::Elapsed] is
    /// returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use sundial::Clock;
    ///
    /// # async fn timeout_example(clock: &Clock) {
    /// let result = clock.timeout(Duration::from_secs(5), async { 42 }).await;
    /// assert_eq!(result, Ok(42));
    /// # }
    /// ```
    pub fn timeout<F: Future>(&self, duration: Duration, future: F) -> Timeout<F> {
        Timeout::new(future, self.delay(duration))
    }

    pub(crate) fn state(&self) -> &ClockState {
        &self.0
    }
}

impl AsRef<Self> for Clock {
    fn as_ref(&self) -> &Self {
        self
    }
}
