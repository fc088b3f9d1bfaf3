// Copyright (c) Microsoft Corporation.

use std::time::Duration;

/// Defines the backoff strategy used between retry attempts.
///
/// Backoff strategies control how delays between retry attempts are
/// calculated, spacing out retries to avoid overwhelming a failing upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backoff {
    /// Constant backoff that maintains consistent delays between attempts.
    ///
    /// **Example with `1s` base delay:** `1s, 1s, 1s, ...`
    Constant,

    /// Linear backoff that increases delays proportionally with attempt count.
    ///
    /// **Example with `1s` base delay:** `1s, 2s, 3s, ...`
    Linear,

    /// Exponential backoff that doubles delays with each attempt.
    ///
    /// **Example with `1s` base delay:** `1s, 2s, 4s, 8s, ...`
    #[default]
    Exponential,
}

/// Produces the sequence of inter-attempt delays for one retry operation.
#[derive(Debug)]
pub(crate) struct DelaySchedule {
    backoff: Backoff,
    base: Duration,
    max: Duration,
    jitter: bool,
    index: u32,
}

impl DelaySchedule {
    pub(crate) fn new(backoff: Backoff, base: Duration, max: Duration, jitter: bool) -> Self {
        Self {
            backoff,
            base,
            max,
            jitter,
            index: 0,
        }
    }
}

impl Iterator for DelaySchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let raw = match self.backoff {
            Backoff::Constant => self.base,
            Backoff::Linear => self.base.saturating_mul(self.index.saturating_add(1)),
            Backoff::Exponential => self.base.saturating_mul(1_u32.checked_shl(self.index).unwrap_or(u32::MAX)),
        };
        self.index = self.index.saturating_add(1);

        let capped = raw.min(self.max);
        if self.jitter {
            // Full jitter: a uniformly random share of the capped delay.
            Some(capped.mul_f64(fastrand::f64()))
        } else {
            Some(capped)
        }
    }
}
