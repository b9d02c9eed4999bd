// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::fiber::sync::waiter::{self, WaitList, Waiter};
use crate::fiber::{self, Awaiter, FiberHandle};
use core::ptr::NonNull;

/// A reusable rendezvous point for a fixed party of fibers.
///
/// Each generation, the first `parties - 1` callers of
/// [`wait`][Barrier::wait] suspend; the last one schedules them all and
/// continues without suspending.
pub struct Barrier {
    parties: usize,
    inner: weft_spin::Mutex<BarrierState>,
}

struct BarrierState {
    arrived: usize,
    waiters: WaitList,
}

// Safety: waiter nodes are pinned on suspended fiber stacks; every access is
// serialized by the spinlock.
unsafe impl Send for BarrierState {}

// === impl Barrier ===

impl Barrier {
    /// # Panics
    ///
    /// Panics if `parties` is zero.
    #[must_use]
    pub fn new(parties: usize) -> Self {
        assert!(parties != 0, "a barrier requires at least one party");
        Self {
            parties,
            inner: weft_spin::Mutex::new(BarrierState {
                arrived: 0,
                waiters: WaitList::new(),
            }),
        }
    }

    /// Suspends until all parties of the current generation have arrived.
    ///
    /// Precondition: called from a fiber.
    pub fn wait(&self) {
        let waiter = Waiter::new();
        let awaiter = ArriveAwaiter {
            barrier: self,
            waiter: &waiter,
        };
        fiber::suspend_with(&awaiter);
    }
}

impl Drop for Barrier {
    fn drop(&mut self) {
        let state = self.inner.get_mut();
        debug_assert!(
            state.waiters.is_empty(),
            "barrier destroyed with parked waiters"
        );
    }
}

struct ArriveAwaiter<'a> {
    barrier: &'a Barrier,
    waiter: &'a Waiter,
}

impl Awaiter for ArriveAwaiter<'_> {
    fn await_symmetric_suspend(&self, fiber: FiberHandle) -> FiberHandle {
        let handles = {
            let mut state = self.barrier.inner.lock();
            state.arrived += 1;
            if state.arrived != self.barrier.parties {
                self.waiter.set_handle(fiber);
                state.waiters.push_back(NonNull::from(self.waiter));
                return FiberHandle::invalid();
            }

            // Last arrival: open the next generation and release everyone.
            state.arrived = 0;
            waiter::drain(&mut state.waiters)
        };

        for handle in handles {
            handle.schedule();
        }
        // The closer continues immediately.
        fiber
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::{ManualLoop, SchedulerRef};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn nobody_passes_early() {
        let lp = Arc::new(ManualLoop::new());
        let sched: SchedulerRef = lp.clone();
        let barrier = Arc::new(Barrier::new(3));
        let entered = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let passed = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let (b, e, s, p) = (
                barrier.clone(),
                entered.clone(),
                second.clone(),
                passed.clone(),
            );
            fiber::go(&sched, move || {
                e.fetch_add(1, Ordering::SeqCst);
                b.wait();
                // The last party arrived before anyone got through.
                assert_eq!(e.load(Ordering::SeqCst), 3);

                // The barrier is reusable for the next generation.
                s.fetch_add(1, Ordering::SeqCst);
                b.wait();
                assert_eq!(s.load(Ordering::SeqCst), 3);

                p.fetch_add(1, Ordering::SeqCst);
            });
        }

        lp.run();
        assert_eq!(passed.load(Ordering::SeqCst), 3);
    }
}
