// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resilient data access for conversational agents.
//!
//! A conversational turn cannot afford to fail because one upstream
//! information API is slow, flaky, or rate limited. This crate insulates
//! callers from a single upstream by composing, per dataset:
//!
//! - a TTL cache with last-known-good retention ([`larder`]),
//! - a per-key circuit breaker and bounded retry with per-attempt timeouts
//!   ([`bulwark`]),
//! - single-flight refresh coalescing, and
//! - graceful degradation to stale or default data.
//!
//! The result is one infallible operation,
//! [`Fetcher::fetch_or_default`], which always returns a usable value
//! annotated with its provenance ([`Outcome`]): fresh from cache, newly
//! refreshed, or degraded. An [`Aggregator`] drives several fetchers
//! concurrently so one degraded dataset never blocks the rest of the
//! bundle.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use bulwark::Recovery;
//! use forage::{Aggregator, DatasetOptions, Fetcher};
//! use sundial::Clock;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("upstream unavailable")]
//! struct UpstreamError;
//!
//! impl Recovery for UpstreamError {}
//!
//! # futures::executor::block_on(async {
//! let clock = Clock::new_frozen();
//!
//! // One fetcher per dataset, configured once at startup.
//! let categories: Fetcher<u64, String> = Fetcher::new(
//!     "categories",
//!     clock.clone(),
//!     DatasetOptions::new(Duration::from_secs(300)),
//! );
//! let faqs: Fetcher<u64, String> = Fetcher::new(
//!     "faqs",
//!     clock.clone(),
//!     // A single attempt keeps this example free of backoff delays, which
//!     // a frozen clock would never let elapse.
//!     DatasetOptions::new(Duration::from_secs(3600)).max_attempts(1),
//! );
//!
//! let business = 123;
//! let bundle = Aggregator::new()
//!     .dataset(
//!         "categories",
//!         categories.fetch_or_default(
//!             &business,
//!             || async { Ok::<_, UpstreamError>("1) Shoes.".to_string()) },
//!             "No category information available.".to_string(),
//!         ),
//!     )
//!     .dataset(
//!         "faqs",
//!         faqs.fetch_or_default(
//!             &business,
//!             || async { Err::<String, _>(UpstreamError) },
//!             String::new(),
//!         ),
//!     )
//!     .assemble()
//!     .await;
//!
//! // The aggregation itself never fails; the FAQ section degraded to its
//! // fallback while categories refreshed normally.
//! assert!(!bundle.get("categories").unwrap().is_degraded());
//! assert!(bundle.get("faqs").unwrap().is_degraded());
//! # });
//! ```
//!
//! # Keys and tenancy
//!
//! Cache entries and breaker circuits are scoped by key. Callers must embed
//! the tenant identity (business id, chatbot id) in the key so one tenant's
//! data and failures never bleed into another's.
//!
//! # Observability
//!
//! Every decision emits a structured [`tracing`] event: cache hits and
//! refreshes at `DEBUG`, failed refreshes and degraded outcomes at `WARN`.
//! Circuit transitions are logged by [`bulwark`] under the dataset's name.

mod aggregate;
mod fetcher;
mod flight;
mod options;
mod outcome;

pub use aggregate::{Aggregator, Bundle};
pub use fetcher::{DatasetName, Fetcher};
pub use options::DatasetOptions;
pub use outcome::{DegradeReason, Outcome};
