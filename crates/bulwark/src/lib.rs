// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resilience primitives for fallible upstream operations.
//!
//! This crate provides the two guards that keep a flaky upstream from
//! degrading its callers:
//!
//! - [`Breaker`]: a per-key circuit breaker. After a configured number of
//!   consecutive transient failures for a key, calls for that key are
//!   rejected without touching the upstream until a cooldown elapses, after
//!   which a single probe call decides whether the circuit closes again.
//! - [`Retry`]: a bounded retry executor. Each attempt runs under a
//!   per-attempt timeout; failed attempts are retried with configurable
//!   backoff until the attempt budget is exhausted.
//!
//! Both components take their time from a [`Clock`][sundial::Clock], so tests
//! drive cooldowns, timeouts, and backoff delays without real sleeps.
//!
//! # Circuit breaker states
//!
//! ```text
//! ┌────────┐   threshold consecutive failures   ┌──────────┐
//! │ Closed │ ──────────────────────────────────▶│   Open   │
//! └────────┘                                    └──────────┘
//!      ▲                                              │
//!      │ probe        ┌────────────────┐              │ cooldown
//!      │ succeeds     │   Half-Open    │◀─────────────┘ elapsed
//!      └──────────────└────────────────┘
//!                        │ probe fails
//!                        ▼ back to Open
//! ```
//!
//! # Recovery classification
//!
//! The retry executor distinguishes transient failures (worth retrying and
//! worth counting against a circuit) from permanent ones (a retry cannot
//! change the outcome) through the [`Recovery`] trait. Timeouts are always
//! transient; upstream error types report their own [`RecoveryKind`], and
//! the default classification is transient.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use bulwark::{Retry, RetryOptions, Recovery};
//! use sundial::Clock;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("upstream unavailable")]
//! struct UpstreamError;
//!
//! impl Recovery for UpstreamError {}
//!
//! # async fn example(clock: Clock) {
//! let retry = Retry::new("categories", clock, RetryOptions::new().max_attempts(3));
//!
//! let result: Result<&str, _> = retry.execute(|| async { Ok::<_, UpstreamError>("payload") }).await;
//! assert!(result.is_ok());
//! # }
//! ```

mod attempt;
mod backoff;
mod breaker;
mod recovery;
mod retry;

pub use attempt::Attempt;
pub use backoff::Backoff;
pub use breaker::{Admission, Breaker, BreakerOptions, ExecutionResult};
pub use recovery::{Recovery, RecoveryKind};
pub use retry::{Retry, RetryError, RetryOptions};
