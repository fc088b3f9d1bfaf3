// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the resilient fetcher using only the public API.

use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bulwark::{Recovery, RecoveryKind};
use forage::{DatasetOptions, DegradeReason, Fetcher, Outcome};
use futures::executor::block_on;
use futures::join;
use sundial::{Clock, ClockControl};

static_assertions::assert_impl_all!(Fetcher<String, String>: Debug, Send, Sync);

#[derive(Debug, Clone, thiserror::Error)]
enum TestError {
    #[error("connection reset")]
    Transport,
    #[error("malformed request")]
    Malformed,
}

impl Recovery for TestError {
    fn recovery(&self) -> RecoveryKind {
        match self {
            Self::Transport => RecoveryKind::Retry,
            Self::Malformed => RecoveryKind::Never,
        }
    }
}

/// Yields once, waking itself, so a refresh stays in flight long enough for
/// a concurrent caller to join it.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

const TTL: Duration = Duration::from_secs(60);
const COOLDOWN: Duration = Duration::from_secs(30);

/// The profile used by most tests: single attempt (so upstream call counts
/// are exact and no backoff delay is pending on a manually driven clock),
/// threshold 3, cooldown 30s.
fn options() -> DatasetOptions {
    DatasetOptions::new(TTL)
        .max_attempts(1)
        .attempt_timeout(Duration::from_secs(10))
        .failure_threshold(3)
        .cooldown(COOLDOWN)
        .jitter(false)
}

fn fallback() -> String {
    "fallback".to_string()
}

#[test]
fn fresh_cache_skips_the_upstream() {
    let control = ClockControl::new();
    let fetcher: Fetcher<&str, String> = Fetcher::new("categories", control.to_clock(), options());
    let calls = AtomicU32::new(0);
    let fetch = || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, TestError>("v1".to_string()) }
    };

    let first = block_on(fetcher.fetch_or_default(&"biz-1", fetch, fallback()));
    assert_eq!(first, Outcome::Refreshed("v1".to_string()));

    control.advance(Duration::from_secs(59));
    let second = block_on(fetcher.fetch_or_default(&"biz-1", fetch, fallback()));
    assert_eq!(second, Outcome::Fresh("v1".to_string()));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn staleness_triggers_exactly_one_refetch() {
    let control = ClockControl::new();
    let fetcher: Fetcher<&str, String> = Fetcher::new("categories", control.to_clock(), options());
    let calls = AtomicU32::new(0);
    let fetch = || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, TestError>("v".to_string()) }
    };

    let _ = block_on(fetcher.fetch_or_default(&"biz-1", fetch, fallback()));
    control.advance(TTL);

    let outcome = block_on(fetcher.fetch_or_default(&"biz-1", fetch, fallback()));

    assert_eq!(outcome, Outcome::Refreshed("v".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn degradation_never_surfaces_an_error() {
    let control = ClockControl::new();
    let fetcher: Fetcher<&str, String> = Fetcher::new("categories", control.to_clock(), options());

    let outcome = block_on(fetcher.fetch_or_default(
        &"biz-1",
        || async { Err::<String, _>(TestError::Transport) },
        fallback(),
    ));

    assert_eq!(
        outcome,
        Outcome::Degraded {
            value: fallback(),
            reason: DegradeReason::FetchFailed
        }
    );
}

#[test]
fn stale_cache_beats_the_static_fallback() {
    let control = ClockControl::new();
    let fetcher: Fetcher<&str, String> = Fetcher::new("categories", control.to_clock(), options());

    let _ = block_on(fetcher.fetch_or_default(
        &"biz-1",
        || async { Ok::<_, TestError>("real data".to_string()) },
        fallback(),
    ));

    control.advance(TTL + Duration::from_secs(1));
    let failing = || async { Err::<String, _>(TestError::Transport) };

    let outcome = block_on(fetcher.fetch_or_default(&"biz-1", failing, fallback()));
    assert_eq!(
        outcome,
        Outcome::Degraded {
            value: "real data".to_string(),
            reason: DegradeReason::FetchFailed
        }
    );

    // Two more failures reach the threshold and open the breaker; the
    // short-circuited path also prefers the stale value.
    let _ = block_on(fetcher.fetch_or_default(&"biz-1", failing, fallback()));
    let _ = block_on(fetcher.fetch_or_default(&"biz-1", failing, fallback()));
    let outcome = block_on(fetcher.fetch_or_default(&"biz-1", failing, fallback()));
    assert_eq!(
        outcome,
        Outcome::Degraded {
            value: "real data".to_string(),
            reason: DegradeReason::BreakerOpen
        }
    );
}

#[test]
fn breaker_scenario_walkthrough() {
    let control = ClockControl::new();
    let fetcher: Fetcher<&str, String> = Fetcher::new("scenario", control.to_clock(), options());
    let calls = AtomicU32::new(0);
    let failing = || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<String, _>(TestError::Transport) }
    };

    // t=0,1,2: three consecutive failures open the circuit.
    for _ in 0..3 {
        let outcome = block_on(fetcher.fetch_or_default(&"biz-1", failing, fallback()));
        assert_eq!(outcome.degrade_reason(), Some(DegradeReason::FetchFailed));
        control.advance(Duration::from_secs(1));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // t=3: short-circuited; the upstream is not touched.
    let outcome = block_on(fetcher.fetch_or_default(&"biz-1", failing, fallback()));
    assert_eq!(
        outcome,
        Outcome::Degraded {
            value: fallback(),
            reason: DegradeReason::BreakerOpen
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // t=35: the cooldown elapsed; the probe goes through and succeeds.
    control.advance(Duration::from_secs(32));
    let outcome = block_on(fetcher.fetch_or_default(
        &"biz-1",
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, TestError>("OK".to_string()) }
        },
        fallback(),
    ));
    assert_eq!(outcome, Outcome::Refreshed("OK".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let breaker = fetcher.breaker().expect("breaker enabled");
    assert!(!breaker.is_open(&"biz-1"));
    assert_eq!(breaker.failures(&"biz-1"), 0);
}

#[test]
fn failed_probe_reopens_and_stays_short_circuited() {
    let control = ClockControl::new();
    let fetcher: Fetcher<&str, String> = Fetcher::new("scenario", control.to_clock(), options());
    let calls = AtomicU32::new(0);
    let failing = || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<String, _>(TestError::Transport) }
    };

    for _ in 0..3 {
        let _ = block_on(fetcher.fetch_or_default(&"biz-1", failing, fallback()));
    }
    control.advance(COOLDOWN);

    // The probe fails; the circuit reopens for a fresh cooldown.
    let outcome = block_on(fetcher.fetch_or_default(&"biz-1", failing, fallback()));
    assert_eq!(outcome.degrade_reason(), Some(DegradeReason::FetchFailed));
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let outcome = block_on(fetcher.fetch_or_default(&"biz-1", failing, fallback()));
    assert_eq!(outcome.degrade_reason(), Some(DegradeReason::BreakerOpen));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn transient_failures_retry_within_one_fetch() {
    let control = ClockControl::new().auto_advance_timers(true);
    let fetcher: Fetcher<&str, String> =
        Fetcher::new("categories", control.to_clock(), options().max_attempts(3).jitter(false));
    let calls = AtomicU32::new(0);

    let outcome = block_on(fetcher.fetch_or_default(
        &"biz-1",
        || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(TestError::Transport)
                } else {
                    Ok("recovered".to_string())
                }
            }
        },
        fallback(),
    ));

    assert_eq!(outcome, Outcome::Refreshed("recovered".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // The refresh as a whole succeeded; no failure was reported to the
    // breaker.
    assert_eq!(fetcher.breaker().expect("breaker enabled").failures(&"biz-1"), 0);
}

#[test]
fn permanent_errors_do_not_trip_the_breaker() {
    let control = ClockControl::new();
    let fetcher: Fetcher<&str, String> =
        Fetcher::new("categories", control.to_clock(), options().max_attempts(3));
    let calls = AtomicU32::new(0);
    let failing = || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<String, _>(TestError::Malformed) }
    };

    for _ in 0..5 {
        let outcome = block_on(fetcher.fetch_or_default(&"biz-1", failing, fallback()));
        // Permanent failures stop the retry loop on the first attempt and
        // still degrade gracefully.
        assert_eq!(outcome.degrade_reason(), Some(DegradeReason::FetchFailed));
    }

    // Every call attempted the upstream exactly once; the circuit never
    // opened.
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert!(!fetcher.breaker().expect("breaker enabled").is_open(&"biz-1"));
}

#[test]
fn keys_degrade_independently() {
    let control = ClockControl::new();
    let fetcher: Fetcher<&str, String> = Fetcher::new("categories", control.to_clock(), options());
    let failing = || async { Err::<String, _>(TestError::Transport) };

    for _ in 0..3 {
        let _ = block_on(fetcher.fetch_or_default(&"down", failing, fallback()));
    }

    let healthy = block_on(fetcher.fetch_or_default(
        &"healthy",
        || async { Ok::<_, TestError>("v".to_string()) },
        fallback(),
    ));

    assert_eq!(healthy, Outcome::Refreshed("v".to_string()));
    let breaker = fetcher.breaker().expect("breaker enabled");
    assert!(breaker.is_open(&"down"));
    assert!(!breaker.is_open(&"healthy"));
    assert!(breaker.any_open());
}

#[test]
fn concurrent_misses_share_one_refresh() {
    let control = ClockControl::new();
    let fetcher: Fetcher<&str, String> = Fetcher::new("categories", control.to_clock(), options());
    let calls = AtomicU32::new(0);
    let fetch = || {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            YieldOnce(false).await;
            Ok::<_, TestError>("shared".to_string())
        }
    };

    let (a, b) = block_on(async {
        join!(
            fetcher.fetch_or_default(&"biz-1", fetch, fallback()),
            fetcher.fetch_or_default(&"biz-1", fetch, fallback()),
        )
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a, Outcome::Refreshed("shared".to_string()));
    assert_eq!(b, Outcome::Refreshed("shared".to_string()));
}

#[test]
fn stampede_protection_can_be_disabled() {
    let control = ClockControl::new();
    let fetcher: Fetcher<&str, String> =
        Fetcher::new("categories", control.to_clock(), options().stampede_protection(false));
    let calls = AtomicU32::new(0);
    let fetch = || {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            YieldOnce(false).await;
            Ok::<_, TestError>("dup".to_string())
        }
    };

    let (a, b) = block_on(async {
        join!(
            fetcher.fetch_or_default(&"biz-1", fetch, fallback()),
            fetcher.fetch_or_default(&"biz-1", fetch, fallback()),
        )
    });

    // Without coalescing, both callers issue their own upstream call -
    // wasteful but correct for idempotent reads.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!a.is_degraded());
    assert!(!b.is_degraded());
}

#[test]
fn breaker_opt_out_always_attempts() {
    let control = ClockControl::new();
    let fetcher: Fetcher<&str, String> =
        Fetcher::new("faqs", control.to_clock(), options().breaker(false));
    let calls = AtomicU32::new(0);
    let failing = || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<String, _>(TestError::Transport) }
    };

    for _ in 0..5 {
        let outcome = block_on(fetcher.fetch_or_default(&"biz-1", failing, fallback()));
        assert_eq!(outcome.degrade_reason(), Some(DegradeReason::FetchFailed));
    }

    assert!(fetcher.breaker().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[test]
fn stuck_upstream_times_out_into_degradation() {
    let control = ClockControl::new().auto_advance_timers(true);
    let fetcher: Fetcher<&str, String> = Fetcher::new("categories", control.to_clock(), options());

    let outcome = block_on(fetcher.fetch_or_default(
        &"biz-1",
        || std::future::pending::<Result<String, TestError>>(),
        fallback(),
    ));

    assert_eq!(
        outcome,
        Outcome::Degraded {
            value: fallback(),
            reason: DegradeReason::FetchFailed
        }
    );
}

#[tokio::test]
async fn fetchers_are_shared_across_tasks() {
    let fetcher: Arc<Fetcher<String, String>> =
        Arc::new(Fetcher::new("categories", Clock::new_tokio(), options()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let fetcher = Arc::clone(&fetcher);
            tokio::spawn(async move {
                fetcher
                    .fetch_or_default(
                        &format!("tenant-{i}"),
                        || async { Ok::<_, TestError>("v".to_string()) },
                        "fallback".to_string(),
                    )
                    .await
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.expect("task completed");
        assert_eq!(outcome, Outcome::Refreshed("v".to_string()));
    }
    assert_eq!(fetcher.larder().len(), 4);
}
