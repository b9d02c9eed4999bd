// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::fiber::sync::mutex::{Mutex, MutexGuard, RawMutex};
use crate::fiber::sync::waiter::{WaitList, Waiter};
use crate::fiber::{self, Awaiter, FiberHandle};
use core::mem;
use core::ptr::NonNull;

/// A condition variable for fibers.
///
/// Notifying does not wake anyone directly: it *moves* waiters from the
/// condvar's queue onto the mutex's wait queue, so each one is resumed by a
/// later unlock, already holding the lock. There is no herd of woken
/// fibers racing to re-acquire.
///
/// All operations require the associated mutex: `wait` consumes its guard,
/// and the notify methods take a guard reference, which also pins down
/// *which* mutex a condvar belongs to (using one condvar with two mutexes is
/// a programming error).
pub struct Condvar {
    inner: weft_spin::Mutex<CvState>,
}

struct CvState {
    waiters: WaitList,
    /// The mutex the current waiters hold; cleared when the queue drains.
    mutex: Option<NonNull<RawMutex>>,
}

// Safety: the wait list and the mutex pointer are only touched under the
// spinlock; waiter nodes are pinned on suspended fiber stacks.
unsafe impl Send for CvState {}

// === impl Condvar ===

impl Condvar {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: weft_spin::Mutex::new(CvState {
                waiters: WaitList::new(),
                mutex: None,
            }),
        }
    }

    /// Atomically releases the guard and suspends the calling fiber until a
    /// notify hands the lock back to it.
    ///
    /// As with any condition variable, spurious resumption is possible in
    /// principle; re-check the predicate in a loop (see
    /// [`wait_while`][Condvar::wait_while]).
    ///
    /// Precondition: called from a fiber.
    pub fn wait<'a, T: ?Sized>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = MutexGuard::mutex(&guard);
        // The lock stays held until the awaiter below releases it, after the
        // waiter is safely enqueued.
        mem::forget(guard);

        let waiter = Waiter::new();
        let awaiter = WaitAwaiter {
            cv: self,
            raw: mutex.raw(),
            waiter: &waiter,
        };
        fiber::suspend_with(&awaiter);

        // Resumed via the mutex queue: the lock was handed to us.
        // Safety: see above.
        unsafe { mutex.guard_unchecked() }
    }

    /// Waits until `predicate` returns false.
    ///
    /// Precondition: called from a fiber.
    pub fn wait_while<'a, T: ?Sized, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        mut predicate: F,
    ) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        while predicate(&mut *guard) {
            guard = self.wait(guard);
        }
        guard
    }

    /// Moves the longest-waiting fiber onto the mutex's wait queue.
    pub fn notify_one<T: ?Sized>(&self, guard: &MutexGuard<'_, T>) {
        let raw = MutexGuard::mutex(guard).raw();
        let mut state = self.inner.lock();
        debug_assert_matched_mutex(&state, raw);

        if let Some(waiter) = state.waiters.pop_front() {
            raw.park_waiter(waiter);
        }
        if state.waiters.is_empty() {
            state.mutex = None;
        }
    }

    /// Moves every waiting fiber onto the mutex's wait queue.
    pub fn notify_all<T: ?Sized>(&self, guard: &MutexGuard<'_, T>) {
        let raw = MutexGuard::mutex(guard).raw();
        let mut state = self.inner.lock();
        debug_assert_matched_mutex(&state, raw);

        while let Some(waiter) = state.waiters.pop_front() {
            raw.park_waiter(waiter);
        }
        state.mutex = None;
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Condvar {
    fn drop(&mut self) {
        let state = self.inner.get_mut();
        debug_assert!(
            state.waiters.is_empty(),
            "condvar destroyed with parked waiters"
        );
    }
}

impl core::fmt::Debug for Condvar {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}

fn debug_assert_matched_mutex(state: &CvState, raw: &RawMutex) {
    debug_assert!(
        state
            .mutex
            .is_none_or(|mutex| core::ptr::eq(mutex.as_ptr(), raw)),
        "condvar used with more than one mutex"
    );
}

struct WaitAwaiter<'a> {
    cv: &'a Condvar,
    raw: &'a RawMutex,
    waiter: &'a Waiter,
}

impl Awaiter for WaitAwaiter<'_> {
    fn await_symmetric_suspend(&self, fiber: FiberHandle) -> FiberHandle {
        {
            let mut state = self.cv.inner.lock();
            debug_assert_matched_mutex(&state, self.raw);
            state.mutex = Some(NonNull::from(self.raw));
            self.waiter.set_handle(fiber);
            state.waiters.push_back(NonNull::from(self.waiter));
        }

        // Only now give the lock up; a notifier must hold it, so the waiter
        // above is visible to every possible notify.
        self.raw.unlock();
        FiberHandle::invalid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::{ManualLoop, SchedulerRef, ThreadPool};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Channel {
        queue: Mutex<VecDeque<u32>>,
        ready: Condvar,
    }

    #[test]
    fn producer_consumer() {
        let pool = ThreadPool::with_launch(2);
        let sched: SchedulerRef = pool.clone();
        let chan = Arc::new(Channel {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        });
        let sum = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let (c, s, d) = (chan.clone(), sum.clone(), done.clone());
        fiber::go(&sched, move || {
            for _ in 0..100 {
                let mut queue = c.queue.lock();
                queue = c.ready.wait_while(queue, |q| q.is_empty());
                let v = queue.pop_front().unwrap();
                s.fetch_add(v as usize, Ordering::SeqCst);
            }
            d.fetch_add(1, Ordering::SeqCst);
        });

        let c = chan.clone();
        fiber::go(&sched, move || {
            for i in 1..=100 {
                let mut queue = c.queue.lock();
                queue.push_back(i);
                c.ready.notify_one(&queue);
                drop(queue);
                fiber::yield_now();
            }
        });

        while done.load(Ordering::SeqCst) != 1 {
            std::thread::yield_now();
        }
        pool.stop();
        assert_eq!(sum.load(Ordering::SeqCst), 5050);
    }

    #[test]
    fn notify_all_releases_everyone() {
        let lp = Arc::new(ManualLoop::new());
        let sched: SchedulerRef = lp.clone();

        struct Gate {
            open: Mutex<bool>,
            cv: Condvar,
        }
        let gate = Arc::new(Gate {
            open: Mutex::new(false),
            cv: Condvar::new(),
        });
        let through = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let (g, t) = (gate.clone(), through.clone());
            fiber::go(&sched, move || {
                let guard = g.open.lock();
                let _guard = g.cv.wait_while(guard, |open| !*open);
                t.fetch_add(1, Ordering::SeqCst);
            });
        }

        let g = gate.clone();
        fiber::go(&sched, move || {
            let mut open = g.open.lock();
            *open = true;
            g.cv.notify_all(&open);
        });

        lp.run();
        assert_eq!(through.load(Ordering::SeqCst), 3);
    }
}
