// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::clock::ClockState;
use crate::Clock;

/// Tokio's timer rejects deadlines in the very far future, so system-mode
/// delays are clamped. Two years is indistinguishable from "never" for the
/// operations this crate bounds.
const MAX_SYSTEM_DELAY: Duration = Duration::from_secs(2 * 365 * 24 * 60 * 60);

/// Asynchronously delays for the specified duration.
///
/// On a Tokio-backed clock the delay is scheduled on the Tokio timer and
/// requires an active runtime when polled. On a controlled clock the delay
/// completes when the `ClockControl` advances past its
/// deadline, or immediately on first poll when `auto_advance_timers` is
/// enabled.
///
/// # Examples
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
#[derive(Debug)]
pub struct Delay {
    clock: Clock,
    duration: Duration,
    state: DelayState,
}

#[derive(Debug)]
enum DelayState {
    /// Not yet polled; the concrete timer is created lazily so a delay can be
    /// constructed outside a runtime and polled inside one.
    Init,
    System {
        sleep: Pin<Box<tokio::time::Sleep>>,
    },
    #[cfg(any(feature = "test-util", test))]
    Control {
        control: crate::ClockControl,
        /// Deadline as an offset from the control's creation.
        due: Duration,
        key: Option<crate::TimerKey>,
    },
    Completed,
}

impl Delay {
    /// Creates a new delay that will complete after the specified duration.
    ///
    /// If the duration is [`Duration::ZERO`], the delay completes immediately.
    /// If the duration is [`Duration::MAX`], the delay never completes.
    ///
    /// > **Note**: Consider using [`Clock::delay()`] as a shortcut.
    #[must_use]
    pub fn new(clock: &Clock, duration: Duration) -> Self {
        Self {
            clock: clock.clone(),
            duration,
            state: DelayState::Init,
        }
    }

    /// Returns the duration this delay was created with.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Future for Delay {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                DelayState::Init => {
                    if this.duration == Duration::ZERO {
                        this.state = DelayState::Completed;
                        return Poll::Ready(());
                    }
                    if this.duration == Duration::MAX {
                        // Never completes; nothing to register.
                        return Poll::Pending;
                    }
                    this.state = match this.clock.state() {
                        ClockState::System => DelayState::System {
                            sleep: Box::pin(tokio::time::sleep(this.duration.min(MAX_SYSTEM_DELAY))),
                        },
                        #[cfg(any(feature = "test-util", test))]
                        ClockState::Control(control) => DelayState::Control {
                            control: control.clone(),
                            due: control.current_offset().saturating_add(this.duration),
                            key: None,
                        },
                    };
                }
                DelayState::System { sleep } => {
                    return match sleep.as_mut().poll(cx) {
                        Poll::Ready(()) => {
                            this.state = DelayState::Completed;
                            Poll::Ready(())
                        }
                        Poll::Pending => Poll::Pending,
                    };
                }
                #[cfg(any(feature = "test-util", test))]
                DelayState::Control { control, due, key } => {
                    let (control, due, existing) = (control.clone(), *due, *key);

                    if control.current_offset() < due && control.auto_advance_enabled() {
                        control.advance_to_offset(due);
                    }

                    if control.current_offset() >= due {
                        if let Some(k) = existing {
                            control.unregister_timer(k);
                        }
                        this.state = DelayState::Completed;
                        return Poll::Ready(());
                    }

                    let key = match existing {
                        Some(k) => {
                            control.update_timer(k, cx.waker().clone());
                            k
                        }
                        None => control.register_timer(due, cx.waker().clone()),
                    };
                    this.state = DelayState::Control {
                        control,
                        due,
                        key: Some(key),
                    };
                    return Poll::Pending;
                }
                DelayState::Completed => return Poll::Ready(()),
            }
        }
    }
}

impl Drop for Delay {
    fn drop(&mut self) {
        #[cfg(any(feature = "test-util", test))]
        if let DelayState::Control {
            control, key: Some(key), ..
        } = &self.state
        {
            control.unregister_timer(*key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::pin::pin;
    use std::task::Waker;

    use crate::ClockControl;

    use super::*;

    fn poll_once<F: Future>(future: Pin<&mut F>) -> Poll<F::Output> {
        let mut cx = Context::from_waker(Waker::noop());
        future.poll(&mut cx)
    }

    #[test]
    fn zero_duration_completes_immediately() {
        let clock = Clock::new_frozen();
        let mut delay = pin!(clock.delay(Duration::ZERO));

        assert_eq!(poll_once(delay.as_mut()), Poll::Ready(()));
    }

    #[test]
    fn max_duration_never_completes() {
        let control = ClockControl::new().auto_advance_timers(true);
        let clock = control.to_clock();
        let mut delay = pin!(clock.delay(Duration::MAX));

        assert_eq!(poll_once(delay.as_mut()), Poll::Pending);
    }

    #[test]
    fn completes_when_control_advances() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let mut delay = pin!(clock.delay(Duration::from_secs(5)));

        assert_eq!(poll_once(delay.as_mut()), Poll::Pending);

        control.advance(Duration::from_secs(4));
        assert_eq!(poll_once(delay.as_mut()), Poll::Pending);

        control.advance(Duration::from_secs(1));
        assert_eq!(poll_once(delay.as_mut()), Poll::Ready(()));
    }

    #[test]
    fn auto_advance_completes_on_first_poll() {
        let control = ClockControl::new().auto_advance_timers(true);
        let clock = control.to_clock();
        let before = clock.instant();
        let mut delay = pin!(clock.delay(Duration::from_secs(3600)));

        assert_eq!(poll_once(delay.as_mut()), Poll::Ready(()));
        assert_eq!(clock.instant() - before, Duration::from_secs(3600));
    }

    #[test]
    fn dropped_delay_unregisters_its_timer() {
        let control = ClockControl::new();
        let clock = control.to_clock();

        {
            let mut delay = pin!(clock.delay(Duration::from_secs(5)));
            assert_eq!(poll_once(delay.as_mut()), Poll::Pending);
        }

        // Advancing after the delay is gone must not wake anything stale.
        control.advance(Duration::from_secs(10));
    }

    #[test]
    fn reports_duration() {
        let clock = Clock::new_frozen();
        assert_eq!(clock.delay(Duration::from_secs(2)).duration(), Duration::from_secs(2));
    }
}
