// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::fiber::sync::waiter::{WaitList, Waiter};
use crate::fiber::{self, Awaiter, FiberHandle};
use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

/// A mutual exclusion primitive for fibers.
///
/// A contended [`lock`][Mutex::lock] suspends the calling fiber instead of
/// blocking the worker thread. Fairness is FIFO: each unlock hands the lock
/// directly to the longest-waiting fiber and schedules it, so the lock never
/// bounces through a re-acquisition race.
pub struct Mutex<T: ?Sized> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

/// An RAII fiber-mutex guard; unlocks on drop.
#[clippy::has_significant_drop]
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
}

/// Lock state + wait queue, shared with [`Condvar`](super::Condvar).
pub(super) struct RawMutex {
    state: weft_spin::Mutex<RawState>,
}

struct RawState {
    locked: bool,
    waiters: WaitList,
}

// Safety: the wait list holds pointers to stacks of suspended fibers; all
// access is serialized by the spinlock around the state.
unsafe impl Send for RawState {}

// Safety: the lock protocol hands exclusive data access to one fiber at a
// time.
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
// Safety: as above.
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

// === impl RawMutex ===

impl RawMutex {
    pub(super) const fn new() -> Self {
        Self {
            state: weft_spin::Mutex::new(RawState {
                locked: false,
                waiters: WaitList::new(),
            }),
        }
    }

    fn try_lock(&self) -> bool {
        let mut state = self.state.lock();
        if state.locked {
            false
        } else {
            state.locked = true;
            true
        }
    }

    /// Precondition: called from a fiber.
    fn lock(&self) {
        if self.try_lock() {
            return;
        }

        let waiter = Waiter::new();
        let awaiter = LockAwaiter {
            raw: self,
            waiter: &waiter,
        };
        fiber::suspend_with(&awaiter);
        // Resumed by an unlock: ownership was handed off, no re-acquisition.
    }

    pub(super) fn unlock(&self) {
        let next = {
            let mut state = self.state.lock();
            match state.waiters.pop_front() {
                // Hand the lock over: `locked` stays true for the successor.
                // Safety: popped under the state lock.
                Some(waiter) => Some(unsafe { Waiter::take_handle(waiter) }),
                None => {
                    state.locked = false;
                    None
                }
            }
        };

        if let Some(handle) = next {
            handle.schedule();
        }
    }

    /// Parks an already-filled waiter node, for the condvar's notify path.
    pub(super) fn park_waiter(&self, waiter: NonNull<Waiter>) {
        self.state.lock().waiters.push_back(waiter);
    }
}

impl Drop for RawMutex {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        debug_assert!(!state.locked, "fiber mutex destroyed while locked");
        debug_assert!(
            state.waiters.is_empty(),
            "fiber mutex destroyed with parked waiters"
        );
    }
}

struct LockAwaiter<'a> {
    raw: &'a RawMutex,
    waiter: &'a Waiter,
}

impl Awaiter for LockAwaiter<'_> {
    fn await_symmetric_suspend(&self, fiber: FiberHandle) -> FiberHandle {
        let mut state = self.raw.state.lock();
        if !state.locked {
            // The lock was released between the fast path and the
            // suspension; take it and resume the fiber on the spot.
            state.locked = true;
            return fiber;
        }

        self.waiter.set_handle(fiber);
        state.waiters.push_back(NonNull::from(self.waiter));
        FiberHandle::invalid()
    }
}

// === impl Mutex ===

impl<T> Mutex<T> {
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self {
            raw: RawMutex::new(),
            data: UnsafeCell::new(data),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Acquires the mutex, suspending the calling fiber while it is held
    /// elsewhere.
    ///
    /// Precondition: called from a fiber.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw.lock();
        MutexGuard { mutex: self }
    }

    /// Attempts to acquire the mutex without suspending.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.raw.try_lock().then_some(MutexGuard { mutex: self })
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Recreates a guard for a lock this fiber already owns.
    ///
    /// # Safety
    ///
    /// The calling fiber must logically hold the lock without a live guard.
    pub(super) unsafe fn guard_unchecked(&self) -> MutexGuard<'_, T> {
        MutexGuard { mutex: self }
    }

    pub(super) fn raw(&self) -> &RawMutex {
        &self.raw
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("Mutex").field("data", &&*guard).finish(),
            None => f.debug_struct("Mutex").field("data", &"<locked>").finish(),
        }
    }
}

// === impl MutexGuard ===

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    pub(super) fn mutex(guard: &Self) -> &'a Mutex<T> {
        guard.mutex
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard holds the lock.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard holds the lock.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.raw.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber;
    use crate::sched::{ManualLoop, SchedulerRef, ThreadPool};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn uncontended_lock_does_not_suspend() {
        let lp = Arc::new(ManualLoop::new());
        let sched: SchedulerRef = lp.clone();
        let mutex = Arc::new(Mutex::new(0));

        let m = mutex.clone();
        fiber::go(&sched, move || {
            *m.lock() += 1;
            *m.lock() += 1;
        });

        lp.run();
        assert_eq!(mutex.try_lock().map(|g| *g), Some(2));
    }

    #[test]
    fn contended_increments_stay_coherent() {
        let pool = ThreadPool::with_launch(4);
        let sched: SchedulerRef = pool.clone();
        let mutex = Arc::new(Mutex::new(0_u64));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let (m, d) = (mutex.clone(), done.clone());
            fiber::go(&sched, move || {
                for _ in 0..10_000 {
                    *m.lock() += 1;
                }
                d.fetch_add(1, Ordering::SeqCst);
            });
        }

        while done.load(Ordering::SeqCst) != 2 {
            std::thread::yield_now();
        }
        pool.stop();
        assert_eq!(mutex.try_lock().map(|g| *g), Some(20_000));
    }

    #[test]
    fn fifo_handoff_order() {
        let lp = Arc::new(ManualLoop::new());
        let sched: SchedulerRef = lp.clone();
        let mutex = Arc::new(Mutex::new(()));
        let order = Arc::new(weft_spin::Mutex::new(Vec::new()));

        // The holder takes the lock and yields so the others queue up in
        // submission order.
        let m = mutex.clone();
        fiber::go(&sched, move || {
            let guard = m.lock();
            fiber::yield_now();
            fiber::yield_now();
            fiber::yield_now();
            drop(guard);
        });

        for i in 0..3 {
            let (m, o) = (mutex.clone(), order.clone());
            fiber::go(&sched, move || {
                let _guard = m.lock();
                o.lock().push(i);
            });
        }

        lp.run();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
