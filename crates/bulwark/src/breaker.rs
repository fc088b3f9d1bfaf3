// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sundial::Clock;

/// The observed result of one guarded upstream execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The execution succeeded.
    Success,
    /// The execution failed transiently.
    ///
    /// Only transient failures belong here; permanent upstream errors say
    /// nothing about transport health and must not be reported to a breaker.
    Failure,
}

/// The admission decision for a call entering a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The circuit is closed; the call proceeds normally.
    Allowed,
    /// The circuit was open and the cooldown elapsed; this call is the
    /// half-open trial probe.
    Probe,
    /// The circuit is open; the call must not touch the upstream.
    Rejected,
}

/// Configuration for a [`Breaker`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark::BreakerOptions;
///
/// let options = BreakerOptions::new()
///     .failure_threshold(3)
///     .cooldown(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BreakerOptions {
    failure_threshold: u32,
    cooldown: Duration,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(300),
        }
    }
}

impl BreakerOptions {
    /// Creates options with the default threshold (3 consecutive failures)
    /// and cooldown (300 seconds).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of consecutive transient failures that opens a
    /// circuit.
    ///
    /// # Panics
    ///
    /// Panics if `failure_threshold` is 0.
    #[must_use]
    pub fn failure_threshold(mut self, failure_threshold: u32) -> Self {
        assert!(failure_threshold > 0, "failure_threshold must be at least 1");
        self.failure_threshold = failure_threshold;
        self
    }

    /// Sets how long a circuit stays open before a probe is admitted.
    #[must_use]
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Returns the configured failure threshold.
    #[must_use]
    pub fn get_failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Returns the configured cooldown.
    #[must_use]
    pub fn get_cooldown(&self) -> Duration {
        self.cooldown
    }
}

/// A circuit breaker partitioned by key.
///
/// Each key (typically a tenant or business identifier) gets an independent
/// circuit: consecutive transient failures for one key open that key's
/// circuit without affecting any other. While a circuit is open, calls are
/// rejected immediately so a degraded upstream is not hammered and the
/// latency cost of an outage is bounded.
///
/// Callers bracket each guarded execution with [`enter`][Self::enter] and
/// [`exit`][Self::exit]:
///
/// ```
/// use bulwark::{Admission, Breaker, ExecutionResult};
///
/// # async fn guarded(breaker: &Breaker<u64>, tenant: u64) -> Option<String> {
/// match breaker.enter(&tenant) {
///     Admission::Rejected => None, // serve a fallback instead
///     Admission::Allowed | Admission::Probe => {
///         let result = call_upstream(tenant).await;
///         breaker.exit(
///             &tenant,
///             if result.is_some() { ExecutionResult::Success } else { ExecutionResult::Failure },
///         );
///         result
///     }
/// }
/// # }
/// # async fn call_upstream(_tenant: u64) -> Option<String> { None }
/// ```
///
/// # State machine
///
/// - **Closed** (initial): calls pass through; consecutive failures are
///   counted and any success resets the count. Reaching the threshold opens
///   the circuit.
/// - **Open**: calls are rejected until the cooldown elapses, then the next
///   call is admitted as the half-open probe.
/// - **Half-open**: one probe is in flight; other calls are rejected. A
///   successful probe closes the circuit, a failed probe reopens it. If a
///   probe is abandoned (its caller went away before reporting), a new probe
///   is admitted once a full cooldown has passed since the probe started, so
///   a lost probe cannot wedge the circuit.
///
/// Results reported while a circuit is open are ignored: with concurrent
/// callers the state can change between `enter` and `exit`, and a stale
/// result must not disturb the newer state.
#[derive(Debug)]
pub struct Breaker<K> {
    name: &'static str,
    options: BreakerOptions,
    clock: Clock,
    circuits: Mutex<HashMap<K, Circuit>>,
}

#[derive(Debug, Clone, Copy)]
enum Circuit {
    Closed { failures: u32 },
    Open { open_until: Instant },
    HalfOpen { probe_started: Instant },
}

/// State changes worth reporting, recorded under the lock and logged outside
/// it.
#[derive(Debug, Clone, Copy)]
enum Transition {
    Opened { failures: u32 },
    Reopened,
    Closed,
    Probing,
}

impl<K> Breaker<K>
where
    K: Clone + Eq + Hash + Debug,
{
    /// Creates a breaker with the given name (used in log events) and
    /// options.
    #[must_use]
    pub fn new(name: &'static str, clock: Clock, options: BreakerOptions) -> Self {
        Self {
            name,
            options,
            clock,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the breaker's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decides whether a call for this key may proceed.
    ///
    /// An [`Admission::Probe`] admission transitions the circuit to
    /// half-open; the caller is expected to report the probe's outcome via
    /// [`exit`][Self::exit].
    pub fn enter(&self, key: &K) -> Admission {
        // NOTE: time checks are performed outside the lock.
        let now = self.clock.instant();

        let (admission, transition) = {
            let mut circuits = self.circuits.lock();
            let circuit = circuits.entry(key.clone()).or_insert(Circuit::Closed { failures: 0 });
            match *circuit {
                Circuit::Closed { .. } => (Admission::Allowed, None),
                Circuit::Open { open_until } => {
                    if now >= open_until {
                        *circuit = Circuit::HalfOpen { probe_started: now };
                        (Admission::Probe, Some(Transition::Probing))
                    } else {
                        (Admission::Rejected, None)
                    }
                }
                Circuit::HalfOpen { probe_started } => {
                    if now.saturating_duration_since(probe_started) >= self.options.cooldown {
                        // The previous probe never reported back; admit a new one.
                        *circuit = Circuit::HalfOpen { probe_started: now };
                        (Admission::Probe, Some(Transition::Probing))
                    } else {
                        (Admission::Rejected, None)
                    }
                }
            }
        };

        if let Some(transition) = transition {
            self.emit(key, transition);
        }
        admission
    }

    /// Reports the result of an execution previously admitted by
    /// [`enter`][Self::enter].
    pub fn exit(&self, key: &K, result: ExecutionResult) {
        let now = self.clock.instant();

        let transition = {
            let mut circuits = self.circuits.lock();
            let Some(circuit) = circuits.get_mut(key) else {
                return;
            };
            match (*circuit, result) {
                (Circuit::Closed { failures }, ExecutionResult::Failure) => {
                    let failures = failures.saturating_add(1);
                    if failures >= self.options.failure_threshold {
                        *circuit = Circuit::Open {
                            open_until: now + self.options.cooldown,
                        };
                        Some(Transition::Opened { failures })
                    } else {
                        *circuit = Circuit::Closed { failures };
                        None
                    }
                }
                (Circuit::Closed { failures }, ExecutionResult::Success) => {
                    if failures != 0 {
                        *circuit = Circuit::Closed { failures: 0 };
                    }
                    None
                }
                // The circuit changed state between enter and exit of an
                // interleaved caller; a stale result is ignored.
                (Circuit::Open { .. }, _) => None,
                (Circuit::HalfOpen { .. }, ExecutionResult::Success) => {
                    *circuit = Circuit::Closed { failures: 0 };
                    Some(Transition::Closed)
                }
                (Circuit::HalfOpen { .. }, ExecutionResult::Failure) => {
                    *circuit = Circuit::Open {
                        open_until: now + self.options.cooldown,
                    };
                    Some(Transition::Reopened)
                }
            }
        };

        if let Some(transition) = transition {
            self.emit(key, transition);
        }
    }

    /// Returns true if the circuit for this key is open and its cooldown has
    /// not elapsed.
    ///
    /// This is a non-mutating peek; callers use it to reject fast before
    /// doing any per-call setup. A circuit whose cooldown has elapsed reports
    /// closed here so the caller proceeds to [`enter`][Self::enter] and is
    /// admitted as the probe.
    #[must_use]
    pub fn is_open(&self, key: &K) -> bool {
        let now = self.clock.instant();
        match self.circuits.lock().get(key) {
            Some(Circuit::Open { open_until }) => now < *open_until,
            _ => false,
        }
    }

    /// Returns true if at least one circuit is currently open.
    ///
    /// Health endpoints use this to report partial degradation.
    #[must_use]
    pub fn any_open(&self) -> bool {
        let now = self.clock.instant();
        self.circuits
            .lock()
            .values()
            .any(|circuit| matches!(circuit, Circuit::Open { open_until } if now < *open_until))
    }

    /// Returns the consecutive-failure count for a closed circuit.
    ///
    /// Open and half-open circuits report 0; their failure history is
    /// captured by the state itself.
    #[must_use]
    pub fn failures(&self, key: &K) -> u32 {
        match self.circuits.lock().get(key) {
            Some(Circuit::Closed { failures }) => *failures,
            _ => 0,
        }
    }

    fn emit(&self, key: &K, transition: Transition) {
        match transition {
            Transition::Opened { failures } => {
                tracing::event!(
                    name: "bulwark.breaker.opened",
                    tracing::Level::WARN,
                    breaker = self.name,
                    key = ?key,
                    failures = failures,
                    cooldown_secs = self.options.cooldown.as_secs_f32(),
                );
            }
            Transition::Reopened => {
                tracing::event!(
                    name: "bulwark.breaker.reopened",
                    tracing::Level::WARN,
                    breaker = self.name,
                    key = ?key,
                    cooldown_secs = self.options.cooldown.as_secs_f32(),
                );
            }
            Transition::Closed => {
                tracing::event!(
                    name: "bulwark.breaker.closed",
                    tracing::Level::INFO,
                    breaker = self.name,
                    key = ?key,
                );
            }
            Transition::Probing => {
                tracing::event!(
                    name: "bulwark.breaker.probing",
                    tracing::Level::DEBUG,
                    breaker = self.name,
                    key = ?key,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "failure_threshold must be at least 1")]
    fn zero_threshold_is_rejected() {
        let _ = BreakerOptions::new().failure_threshold(0);
    }

    #[test]
    fn options_defaults() {
        let options = BreakerOptions::default();
        assert_eq!(options.get_failure_threshold(), 3);
        assert_eq!(options.get_cooldown(), Duration::from_secs(300));
    }

    #[test]
    fn unknown_key_starts_closed() {
        let breaker: Breaker<&str> = Breaker::new("test", Clock::new_frozen(), BreakerOptions::new());

        assert_eq!(breaker.enter(&"k"), Admission::Allowed);
        assert!(!breaker.is_open(&"k"));
        assert_eq!(breaker.failures(&"k"), 0);
    }

    #[test]
    fn exit_without_enter_is_ignored() {
        let breaker: Breaker<&str> = Breaker::new("test", Clock::new_frozen(), BreakerOptions::new());

        breaker.exit(&"never-entered", ExecutionResult::Failure);

        assert_eq!(breaker.failures(&"never-entered"), 0);
    }
}
