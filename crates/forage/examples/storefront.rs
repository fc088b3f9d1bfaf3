// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Assembles prompt sections for a storefront agent while one upstream
//! dataset is down.
//!
//! Run with: `cargo run -p forage --example storefront`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bulwark::Recovery;
use forage::{Aggregator, Bundle, DatasetOptions, Fetcher};
use sundial::Clock;

#[derive(Debug, thiserror::Error)]
#[error("upstream unavailable")]
struct UpstreamError;

impl Recovery for UpstreamError {}

fn print_bundle(label: &str, bundle: &Bundle<String>) {
    println!("--- {label} ({} degraded) ---", bundle.degraded_count());
    for (name, outcome) in bundle.iter() {
        let provenance = if outcome.is_degraded() { "degraded" } else { "live" };
        println!("[{provenance}] {name}: {}", outcome.value());
    }
    println!();
}

async fn assemble(
    business: u64,
    categories: &Fetcher<u64, String>,
    branches: &Fetcher<u64, String>,
    fetch_branches: impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<String, UpstreamError>> + Send>> + Send + Sync,
) -> Bundle<String> {
    Aggregator::new()
        .dataset(
            "categories",
            categories.fetch_or_default(
                &business,
                || async { Ok::<_, UpstreamError>("1) Shoes: leather goods. 2) Bags.".to_string()) },
                "No category information loaded.".to_string(),
            ),
        )
        .dataset(
            "branches",
            branches.fetch_or_default(&business, fetch_branches, "No branch information loaded.".to_string()),
        )
        .assemble()
        .await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let clock = Clock::new_tokio();
    let business = 123_u64;

    // One profile per dataset, constructed once at startup. Tight budgets
    // keep this demo snappy.
    let categories: Fetcher<u64, String> = Fetcher::new(
        "categories",
        clock.clone(),
        DatasetOptions::new(Duration::from_secs(300))
            .base_delay(Duration::from_millis(50))
            .attempt_timeout(Duration::from_secs(2)),
    );
    let branches: Fetcher<u64, String> = Fetcher::new(
        "branches",
        clock,
        DatasetOptions::new(Duration::from_secs(300))
            .max_attempts(2)
            .base_delay(Duration::from_millis(50))
            .failure_threshold(1)
            .cooldown(Duration::from_secs(1)),
    );

    // Simulated upstream: the branches API starts out unreachable.
    let branches_down = Arc::new(AtomicBool::new(true));
    let fetch_branches = {
        let branches_down = Arc::clone(&branches_down);
        move || -> std::pin::Pin<Box<dyn Future<Output = Result<String, UpstreamError>> + Send>> {
            let branches_down = Arc::clone(&branches_down);
            Box::pin(async move {
                if branches_down.load(Ordering::SeqCst) {
                    Err(UpstreamError)
                } else {
                    Ok("Downtown (9-18h), Airport (6-22h)".to_string())
                }
            })
        }
    };

    // Turn 1: both refresh attempts fail, the breaker opens, and the bundle
    // still assembles with the branches fallback.
    let bundle = assemble(business, &categories, &branches, fetch_branches.clone()).await;
    print_bundle("upstream down", &bundle);

    // Turn 2: the circuit is open, so branches short-circuit straight to
    // degraded data without touching the upstream.
    let bundle = assemble(business, &categories, &branches, fetch_branches.clone()).await;
    print_bundle("circuit open", &bundle);

    // The upstream recovers; after the cooldown the next assembly probes it
    // and comes back live.
    branches_down.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let bundle = assemble(business, &categories, &branches, fetch_branches).await;
    print_bundle("upstream recovered", &bundle);
}
