// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::fiber::sync::waiter::{self, WaitList, Waiter};
use crate::fiber::{self, Awaiter, FiberHandle};
use core::ptr::NonNull;

/// Counts outstanding work items; [`wait`][WaitGroup::wait] suspends until
/// the count returns to zero.
pub struct WaitGroup {
    inner: weft_spin::Mutex<WgState>,
}

struct WgState {
    count: usize,
    waiters: WaitList,
}

// Safety: waiter nodes are pinned on suspended fiber stacks; every access is
// serialized by the spinlock.
unsafe impl Send for WgState {}

// === impl WaitGroup ===

impl WaitGroup {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: weft_spin::Mutex::new(WgState {
                count: 0,
                waiters: WaitList::new(),
            }),
        }
    }

    /// Registers `n` outstanding work items.
    pub fn add(&self, n: usize) {
        self.inner.lock().count += n;
    }

    /// Marks one work item as finished; the transition to zero releases all
    /// waiters.
    ///
    /// # Panics
    ///
    /// Panics if there is nothing outstanding.
    pub fn done(&self) {
        let handles = {
            let mut state = self.inner.lock();
            state.count = state
                .count
                .checked_sub(1)
                .expect("WaitGroup::done without a matching add");
            if state.count != 0 {
                return;
            }
            waiter::drain(&mut state.waiters)
        };

        for handle in handles {
            handle.schedule();
        }
    }

    /// Suspends the calling fiber while work is outstanding.
    ///
    /// Precondition: called from a fiber.
    pub fn wait(&self) {
        let waiter = Waiter::new();
        let awaiter = WaitAwaiter {
            group: self,
            waiter: &waiter,
        };
        fiber::suspend_with(&awaiter);
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WaitGroup {
    fn drop(&mut self) {
        let state = self.inner.get_mut();
        debug_assert!(
            state.waiters.is_empty(),
            "wait group destroyed with parked waiters"
        );
    }
}

struct WaitAwaiter<'a> {
    group: &'a WaitGroup,
    waiter: &'a Waiter,
}

impl Awaiter for WaitAwaiter<'_> {
    fn await_symmetric_suspend(&self, fiber: FiberHandle) -> FiberHandle {
        let mut state = self.group.inner.lock();
        if state.count == 0 {
            return fiber;
        }

        self.waiter.set_handle(fiber);
        state.waiters.push_back(NonNull::from(self.waiter));
        FiberHandle::invalid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::{SchedulerRef, ThreadPool};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn wait_sees_all_work_done() {
        let pool = ThreadPool::with_launch(3);
        let sched: SchedulerRef = pool.clone();
        let group = Arc::new(WaitGroup::new());
        let work = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(AtomicUsize::new(0));

        group.add(5);
        for _ in 0..5 {
            let (g, w) = (group.clone(), work.clone());
            fiber::go(&sched, move || {
                w.fetch_add(1, Ordering::SeqCst);
                g.done();
            });
        }

        let (g, w, o) = (group.clone(), work.clone(), observed.clone());
        fiber::go(&sched, move || {
            g.wait();
            o.store(w.load(Ordering::SeqCst), Ordering::SeqCst);
        });

        while observed.load(Ordering::SeqCst) != 5 {
            std::thread::yield_now();
        }
        pool.stop();
    }
}
