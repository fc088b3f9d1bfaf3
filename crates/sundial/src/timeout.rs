// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project_lite::pin_project;

use crate::Delay;

/// The error returned when a [`Timeout`] deadline is reached before the inner
/// future completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out after {0:?}")]
pub struct Elapsed(Duration);

impl Elapsed {
    /// Returns the timeout budget that was exhausted.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.0
    }
}

pin_project! {
    /// A future that races between an inner future and a deadline.
    ///
    /// - If the inner future completes before the deadline, its output is
    ///   returned.
    /// - If the deadline is reached first, [`Elapsed`] is returned and the
    ///   inner future is dropped with the `Timeout`.
    ///
    /// The inner future is polled before the deadline, so an output that is
    /// ready at the same instant the deadline fires wins the race.
    #[derive(Debug)]
    pub struct Timeout<F> {
        #[pin]
        future: F,
        delay: Delay,
    }
}

impl<F> Timeout<F> {
    pub(crate) fn new(future: F, delay: Delay) -> Self {
        Self { future, delay }
    }
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, Elapsed>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if let Poll::Ready(output) = this.future.poll(cx) {
            return Poll::Ready(Ok(output));
        }

        match Pin::new(&mut *this.delay).poll(cx) {
            Poll::Ready(()) => Poll::Ready(Err(Elapsed(this.delay.duration()))),
            Poll::Pending => Poll::Pending,
        }
    }
}
