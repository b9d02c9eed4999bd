// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::fiber::sync::waiter::{self, WaitList, Waiter};
use crate::fiber::{self, Awaiter, FiberHandle};
use core::ptr::NonNull;

/// A one-shot event for fibers: [`wait`][Event::wait] suspends until
/// [`fire`][Event::fire]; waiters arriving after the fact pass straight
/// through.
pub struct Event {
    inner: weft_spin::Mutex<EventState>,
}

struct EventState {
    fired: bool,
    waiters: WaitList,
}

// Safety: waiter nodes are pinned on suspended fiber stacks; every access is
// serialized by the spinlock.
unsafe impl Send for EventState {}

// === impl Event ===

impl Event {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: weft_spin::Mutex::new(EventState {
                fired: false,
                waiters: WaitList::new(),
            }),
        }
    }

    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.inner.lock().fired
    }

    /// Suspends the calling fiber until the event fires.
    ///
    /// Precondition: called from a fiber.
    pub fn wait(&self) {
        if self.is_fired() {
            return;
        }

        let waiter = Waiter::new();
        let awaiter = WaitAwaiter {
            event: self,
            waiter: &waiter,
        };
        fiber::suspend_with(&awaiter);
    }

    /// Fires the event and schedules every waiting fiber.
    pub fn fire(&self) {
        let handles = {
            let mut state = self.inner.lock();
            state.fired = true;
            waiter::drain(&mut state.waiters)
        };

        for handle in handles {
            handle.schedule();
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        let state = self.inner.get_mut();
        debug_assert!(
            state.waiters.is_empty(),
            "fiber event destroyed with parked waiters"
        );
    }
}

struct WaitAwaiter<'a> {
    event: &'a Event,
    waiter: &'a Waiter,
}

impl Awaiter for WaitAwaiter<'_> {
    fn await_symmetric_suspend(&self, fiber: FiberHandle) -> FiberHandle {
        let mut state = self.event.inner.lock();
        if state.fired {
            // Fired between the fast path and the suspension.
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
    use crate::sched::{ManualLoop, SchedulerRef};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn waiters_resume_after_fire() {
        let lp = Arc::new(ManualLoop::new());
        let sched: SchedulerRef = lp.clone();
        let event = Arc::new(Event::new());
        let through = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let (e, t) = (event.clone(), through.clone());
            fiber::go(&sched, move || {
                e.wait();
                t.fetch_add(1, Ordering::SeqCst);
            });
        }

        let e = event.clone();
        fiber::go(&sched, move || e.fire());

        lp.run();
        assert_eq!(through.load(Ordering::SeqCst), 2);

        // Late waiters pass straight through.
        let (e, t) = (event.clone(), through.clone());
        fiber::go(&sched, move || {
            e.wait();
            t.fetch_add(1, Ordering::SeqCst);
        });
        lp.run();
        assert_eq!(through.load(Ordering::SeqCst), 3);
    }
}
