// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::task::Waker;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

use crate::{Clock, TimerKey};

/// Controls the flow of time in tests.
///
/// A `ClockControl` freezes time at creation. Clocks obtained through
/// [`to_clock`][Self::to_clock] observe the controlled time, and pending
/// [`Delay`][crate::Delay] futures registered against those clocks fire when
/// [`advance`][Self::advance] moves time past their deadline.
///
/// `ClockControl` is available when the `test-util` feature is enabled. Never
/// enable `test-util` outside of `dev-dependencies`; production code should
/// only ever see real time.
///
/// # Examples
///
/// ## Advancing time manually
///
/// ```
/// use std::time::Duration;
///
/// use sundial::ClockControl;
///
/// let control = ClockControl::new();
/// let clock = control.to_clock();
///
/// let before = clock.instant();
/// control.advance(Duration::from_secs(1));
/// assert_eq!(clock.instant() - before, Duration::from_secs(1));
/// ```
///
/// ## Advancing timers automatically
///
/// When `auto_advance_timers` is enabled, a pending delay jumps the clock to
/// its own deadline the first time it is polled. This lets timeout and
/// backoff paths run to completion instantly without a cooperating thread:
///
/// ```
/// use std::time::Duration;
///
/// use sundial::ClockControl;
///
/// # futures::executor::block_on(async {
/// let control = ClockControl::new().auto_advance_timers(true);
/// let clock = control.to_clock();
///
/// clock.delay(Duration::from_secs(3600)).await; // completes immediately
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ClockControl {
    /// Time control must be consistent across threads, so all mutable state
    /// lives behind one mutex.
    state: Arc<ControlState>,
}

#[derive(Debug)]
struct ControlState {
    /// Anchor for the monotonic timeline; controlled instants are
    /// `base_instant + offset`.
    base_instant: Instant,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    base_system: SystemTime,
    offset: Duration,
    auto_advance_timers: bool,
    next_key: u64,
    timers: Vec<Timer>,
}

#[derive(Debug)]
struct Timer {
    key: TimerKey,
    /// Deadline expressed as an offset from the control's creation.
    due: Duration,
    waker: Waker,
}

impl Default for ClockControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockControl {
    /// Creates a new `ClockControl` instance.
    ///
    /// The initial system time is the UNIX epoch and auto-advance is off.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(ControlState {
                base_instant: Instant::now(),
                inner: Mutex::new(Inner {
                    base_system: SystemTime::UNIX_EPOCH,
                    offset: Duration::ZERO,
                    auto_advance_timers: false,
                    next_key: 0,
                    timers: Vec::new(),
                }),
            }),
        }
    }

    /// Creates a new `ClockControl` instance frozen at the specified system
    /// time.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::{Duration, SystemTime};
    ///
    /// use sundial::ClockControl;
    ///
    /// let time = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
    /// let control = ClockControl::new_at(time);
    /// assert_eq!(control.to_clock().system_time(), time);
    /// ```
    #[must_use]
    pub fn new_at(time: SystemTime) -> Self {
        let this = Self::new();
        this.state.inner.lock().base_system = time;
        this
    }

    /// Creates a new `ClockControl` instance frozen at the current system
    /// time.
    #[must_use]
    pub fn now() -> Self {
        Self::new_at(SystemTime::now())
    }

    /// Enables or disables automatic timer advancement.
    ///
    /// When enabled, a pending delay advances the clock to its own deadline
    /// the first time it is polled instead of waiting for a manual
    /// [`advance`][Self::advance] call.
    #[must_use]
    pub fn auto_advance_timers(self, enabled: bool) -> Self {
        self.state.inner.lock().auto_advance_timers = enabled;
        self
    }

    /// Converts the `ClockControl` to a [`Clock`] instance.
    ///
    /// Every clock produced by this method shares this control's timeline.
    #[must_use]
    pub fn to_clock(&self) -> Clock {
        Clock::with_control(self)
    }

    /// Advances the controlled time by the given duration and wakes every
    /// delay whose deadline has passed.
    pub fn advance(&self, duration: Duration) {
        let due = {
            let inner = self.state.inner.lock();
            inner.offset.saturating_add(duration)
        };
        self.advance_to_offset(due);
    }

    /// Advances the controlled time to the given system time.
    ///
    /// Time never moves backwards; a target earlier than the current
    /// controlled time leaves the clock untouched.
    pub fn advance_to(&self, time: SystemTime) {
        let delta = {
            let inner = self.state.inner.lock();
            let current = inner.base_system + inner.offset;
            time.duration_since(current).unwrap_or(Duration::ZERO)
        };
        if delta > Duration::ZERO {
            self.advance(delta);
        }
    }

    /// Retrieves the current controlled system time.
    #[must_use]
    pub fn system_time(&self) -> SystemTime {
        let inner = self.state.inner.lock();
        inner.base_system + inner.offset
    }

    /// Retrieves the current controlled instant.
    #[must_use]
    pub fn instant(&self) -> Instant {
        self.state.base_instant + self.state.inner.lock().offset
    }

    pub(crate) fn current_offset(&self) -> Duration {
        self.state.inner.lock().offset
    }

    pub(crate) fn auto_advance_enabled(&self) -> bool {
        self.state.inner.lock().auto_advance_timers
    }

    /// Moves the timeline forward to `target` (an offset from creation),
    /// firing due timers. Wakers are invoked outside the lock.
    pub(crate) fn advance_to_offset(&self, target: Duration) {
        let fired: Vec<Waker> = {
            let mut inner = self.state.inner.lock();
            if target <= inner.offset {
                return;
            }
            inner.offset = target;
            let mut fired = Vec::new();
            inner.timers.retain_mut(|timer| {
                if timer.due <= target {
                    fired.push(timer.waker.clone());
                    false
                } else {
                    true
                }
            });
            fired
        };

        for waker in fired {
            waker.wake();
        }
    }

    pub(crate) fn register_timer(&self, due: Duration, waker: Waker) -> TimerKey {
        let mut inner = self.state.inner.lock();
        let key = TimerKey::new(inner.next_key);
        inner.next_key = inner.next_key.wrapping_add(1);
        inner.timers.push(Timer { key, due, waker });
        key
    }

    pub(crate) fn update_timer(&self, key: TimerKey, waker: Waker) {
        let mut inner = self.state.inner.lock();
        if let Some(timer) = inner.timers.iter_mut().find(|t| t.key == key) {
            timer.waker = waker;
        }
    }

    pub(crate) fn unregister_timer(&self, key: TimerKey) {
        self.state.inner.lock().timers.retain(|t| t.key != key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_system_time_and_instant() {
        let control = ClockControl::new();
        let instant = control.instant();
        let system = control.system_time();

        control.advance(Duration::from_secs(42));

        assert_eq!(control.instant() - instant, Duration::from_secs(42));
        assert_eq!(
            control.system_time().duration_since(system).expect("time moved forward"),
            Duration::from_secs(42)
        );
    }

    #[test]
    fn advance_to_never_moves_backwards() {
        let control = ClockControl::new_at(SystemTime::UNIX_EPOCH + Duration::from_secs(100));

        control.advance_to(SystemTime::UNIX_EPOCH + Duration::from_secs(50));

        assert_eq!(control.system_time(), SystemTime::UNIX_EPOCH + Duration::from_secs(100));
    }

    #[test]
    fn advance_fires_due_timers_only() {
        use std::task::Waker;

        let control = ClockControl::new();
        let early = control.register_timer(Duration::from_secs(1), Waker::noop().clone());
        let late = control.register_timer(Duration::from_secs(10), Waker::noop().clone());

        control.advance(Duration::from_secs(5));

        let inner = control.state.inner.lock();
        assert!(!inner.timers.iter().any(|t| t.key == early));
        assert!(inner.timers.iter().any(|t| t.key == late));
    }

    #[test]
    fn unregister_removes_timer() {
        use std::task::Waker;

        let control = ClockControl::new();
        let key = control.register_timer(Duration::from_secs(1), Waker::noop().clone());

        control.unregister_timer(key);

        assert!(control.state.inner.lock().timers.is_empty());
    }

    #[test]
    fn clones_share_the_timeline() {
        let control = ClockControl::new();
        let clone = control.clone();

        control.advance(Duration::from_secs(7));

        assert_eq!(clone.system_time(), control.system_time());
    }
}
