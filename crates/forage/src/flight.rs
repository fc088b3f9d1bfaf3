// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Single-flight coalescing for refresh operations.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Coalesces concurrent executions of the same work, identified by key.
///
/// The first caller for a key (the leader) executes its work while holding
/// the key's result slot; callers that arrive during execution (followers)
/// wait on the slot and receive a clone of the leader's result. If the
/// leader is cancelled before storing a result, the first waiting follower
/// promotes itself and executes its own work, so a lost leader never strands
/// the queue.
///
/// Entries are tracked through weak references: once every participant of a
/// flight is gone, the mapping entry is dead and the next caller starts a
/// fresh flight.
pub(crate) struct Merger<K, T> {
    mapping: Mutex<HashMap<K, Weak<Slot<T>>>>,
}

struct Slot<T> {
    value: futures::lock::Mutex<Option<T>>,
}

impl<K, T> std::fmt::Debug for Merger<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merger").finish_non_exhaustive()
    }
}

impl<K, T> Merger<K, T>
where
    K: Clone + Eq + Hash,
    T: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            mapping: Mutex::new(HashMap::new()),
        }
    }

    /// Executes `func` for `key`, coalescing with any execution already in
    /// flight for the same key.
    ///
    /// `func` is only invoked if this caller ends up leading the flight;
    /// followers receive the leader's result without invoking their own
    /// work.
    pub(crate) async fn work<F, Fut>(&self, key: K, func: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let shared = {
            let mut mapping = self.mapping.lock();
            match mapping.get(&key).and_then(Weak::upgrade) {
                Some(shared) => shared,
                None => {
                    let shared = Arc::new(Slot {
                        value: futures::lock::Mutex::new(None),
                    });
                    mapping.insert(key.clone(), Arc::downgrade(&shared));
                    shared
                }
            }
        };

        // Leaders execute while holding the slot; followers block here until
        // a leader releases it.
        let mut slot = shared.value.lock().await;
        if let Some(value) = slot.as_ref() {
            return value.clone();
        }

        // Either we are the first caller, or every earlier leader was
        // cancelled before storing a result; run our own work.
        let value = func().await;
        *slot = Some(value.clone());
        drop(slot);

        self.mapping.lock().remove(&key);
        value
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::task::{Context, Poll, Waker};

    use futures::executor::block_on;
    use futures::join;

    use super::*;

    /// Yields once, waking itself so single-threaded executors re-poll.
    ///
    /// Work that suspends at least once is what lets followers join a flight
    /// before the leader completes.
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

    #[test]
    fn concurrent_callers_share_one_execution() {
        let merger: Merger<&str, u32> = Merger::new();
        let calls = AtomicU32::new(0);

        let run = |value: u32| {
            let calls = &calls;
            merger.work("key", move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    YieldOnce(false).await;
                    value
                }
            })
        };

        let (a, b, c) = block_on(async { join!(run(1), run(2), run(3)) });

        // The leader's value wins and is shared with every follower.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!((a, b, c), (1, 1, 1));
    }

    #[test]
    fn distinct_keys_do_not_coalesce() {
        let merger: Merger<&str, u32> = Merger::new();
        let calls = AtomicU32::new(0);

        let (a, b) = block_on(async {
            join!(
                merger.work("left", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async {
                        YieldOnce(false).await;
                        1
                    }
                }),
                merger.work("right", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async {
                        YieldOnce(false).await;
                        2
                    }
                }),
            )
        });

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!((a, b), (1, 2));
    }

    #[test]
    fn sequential_flights_each_execute() {
        let merger: Merger<&str, u32> = Merger::new();
        let calls = AtomicU32::new(0);

        for expected in 1..=3 {
            let value = block_on(merger.work("key", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { 0 }
            }));
            assert_eq!(value, 0);
            assert_eq!(calls.load(Ordering::SeqCst), expected);
        }
    }

    #[test]
    fn cancelled_leader_promotes_a_waiting_follower() {
        let merger: Merger<&str, u32> = Merger::new();
        let mut cx = Context::from_waker(Waker::noop());

        // The leader takes the slot and suspends inside its work.
        let mut leader = Box::pin(merger.work("key", || std::future::pending::<u32>()));
        assert_eq!(leader.as_mut().poll(&mut cx), Poll::Pending);

        // A follower joins the flight and waits on the slot.
        let mut follower = Box::pin(merger.work("key", || async { 7 }));
        assert_eq!(follower.as_mut().poll(&mut cx), Poll::Pending);

        // The leader is cancelled before storing a result; the follower must
        // run its own work instead of waiting forever.
        drop(leader);
        assert_eq!(follower.as_mut().poll(&mut cx), Poll::Ready(7));
    }

    #[test]
    fn dead_flight_entry_is_replaced() {
        let merger: Merger<&str, u32> = Merger::new();

        // A lone leader is cancelled mid-flight, leaving a dead weak entry.
        {
            let mut leader = Box::pin(merger.work("key", || std::future::pending::<u32>()));
            let mut cx = Context::from_waker(Waker::noop());
            assert_eq!(leader.as_mut().poll(&mut cx), Poll::Pending);
        }

        // The next caller starts a fresh flight.
        let value = block_on(merger.work("key", || async { 2 }));
        assert_eq!(value, 2);
    }
}
