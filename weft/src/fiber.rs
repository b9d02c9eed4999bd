// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Stackful fibers: cooperative lightweight threads scheduled as tasks.
//!
//! A fiber couples a [coroutine](coroutine::Coroutine) (body + cached stack
//! + machine context) with a scheduler. Running the fiber's task resumes the
//! coroutine; when the body suspends, the installed [`Awaiter`] decides what
//! happens next: reschedule, park in a synchronization primitive, or
//! symmetric-transfer straight into another fiber.
//!
//! Everything in [`self`]-style API (`yield_now`, `switch_to`,
//! `teleport_to`, `suspend_with`, `current_*`) requires fiber context.

mod awaiter;
mod coroutine;
mod handle;
mod stack_cache;
pub mod sync;

use crate::sched::SchedulerRef;
use crate::task::{Header, TaskRef, VTable};
use core::cell::{Cell, UnsafeCell};
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};

use awaiter::{SwitchAwaiter, YieldAwaiter};
use coroutine::{Body, Coroutine};

pub use awaiter::Awaiter;
pub use handle::FiberHandle;

/// Identifies a fiber among all fibers started during this process's
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId(u64);

impl FiberId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fiber-{}", self.0)
    }
}

/// The fiber object; a task whose `run` is one scheduling step.
#[repr(C)]
pub(crate) struct Fiber {
    header: Header,
    /// Retargeted by `teleport_to`; read when the handle is scheduled.
    scheduler: UnsafeCell<SchedulerRef>,
    coroutine: Coroutine,
    /// Installed right before suspending, taken by the step loop after the
    /// switch back.
    awaiter: Cell<Option<NonNull<dyn Awaiter>>>,
    /// Depth of live [`NoSwitchGuard`]s.
    no_switch: Cell<u32>,
    id: FiberId,
}

thread_local! {
    static CURRENT: Cell<Option<NonNull<Fiber>>> = const { Cell::new(None) };
}

// === impl Fiber ===

impl Fiber {
    const VTABLE: VTable = VTable {
        run: Self::step,
        drop: Self::drop_in_place,
    };

    fn spawn(scheduler: SchedulerRef, body: Body) {
        let mut fiber = Box::new(Fiber {
            header: Header::new(&Self::VTABLE),
            scheduler: UnsafeCell::new(scheduler),
            coroutine: Coroutine::new(body),
            awaiter: Cell::new(None),
            no_switch: Cell::new(0),
            id: FiberId::next(),
        });
        // Safety: the fiber is boxed; the coroutine will not move again.
        unsafe { fiber.coroutine.arm() };

        let fiber = NonNull::from(Box::leak(fiber));
        // Safety: freshly allocated, we are the unique owner.
        unsafe {
            tracing::trace!(id = %fiber.as_ref().id, "fiber started");
            Self::schedule(fiber);
        }
    }

    /// Submits the suspended fiber to its scheduler.
    ///
    /// # Safety
    ///
    /// The caller must own the unique handle to the suspended fiber.
    pub(crate) unsafe fn schedule(fiber: NonNull<Fiber>) {
        // Safety: only the handle owner reads the slot, and `teleport_to`
        // writes it strictly before the owning fiber suspends.
        let scheduler = unsafe { (*fiber.as_ref().scheduler.get()).clone() };
        // Safety: ownership moves into the task queue.
        scheduler.submit(unsafe { TaskRef::from_header(fiber.cast()) });
    }

    /// One scheduling step: resume the coroutine, then either destroy the
    /// completed fiber or consult the awaiter, possibly looping straight
    /// into the next fiber (symmetric transfer).
    unsafe fn step(header: NonNull<Header>) {
        let mut fiber = header.cast::<Fiber>();
        loop {
            let prev = CURRENT.replace(Some(fiber));
            // Safety: we own the fiber task; the coroutine is Inactive.
            unsafe { fiber.as_ref().coroutine.resume() };
            CURRENT.set(prev);

            // Safety: resume returned, so the coroutine is parked again and
            // the fiber is only reachable through us.
            let completed = unsafe { fiber.as_ref().coroutine.is_completed() };
            if completed {
                // Safety: a completed fiber has no outstanding handles.
                unsafe {
                    tracing::trace!(id = %fiber.as_ref().id, "fiber completed");
                    drop(Box::from_raw(fiber.as_ptr()));
                }
                return;
            }

            // Safety: a suspended fiber always installed an awaiter, which
            // stays alive until the fiber is resumed.
            let awaiter = unsafe {
                fiber
                    .as_ref()
                    .awaiter
                    .take()
                    .expect("fiber suspended without an awaiter")
            };
            // Safety: see above; after this call the fiber may already be
            // running elsewhere, so `fiber` must not be touched unless the
            // awaiter handed it back.
            let next = unsafe { awaiter.as_ref() }.await_symmetric_suspend(FiberHandle::new(fiber));

            match next.release() {
                Some(next_fiber) => fiber = next_fiber,
                None => return,
            }
        }
    }

    unsafe fn drop_in_place(header: NonNull<Header>) {
        // Safety: per the vtable contract; the fiber never ran or is parked
        // forever (its queue was dropped), so nothing references it.
        unsafe { drop(Box::from_raw(header.as_ptr().cast::<Fiber>())) }
    }
}

fn current() -> NonNull<Fiber> {
    CURRENT.get().expect("not in fiber context")
}

/// Starts a fiber executing `body` on `where_`.
pub fn go(where_: &SchedulerRef, body: impl FnOnce() + Send + 'static) {
    Fiber::spawn(where_.clone(), Box::new(body));
}

/// Starts a fiber on the current fiber's scheduler.
///
/// Precondition: called from a fiber.
pub fn go_here(body: impl FnOnce() + Send + 'static) {
    let scheduler = current_scheduler();
    Fiber::spawn(scheduler, Box::new(body));
}

/// The current fiber's id.
///
/// Precondition: called from a fiber.
#[must_use]
pub fn current_id() -> FiberId {
    // Safety: the pointer came from the running step loop.
    unsafe { current().as_ref().id }
}

/// The scheduler the current fiber is set on.
///
/// Precondition: called from a fiber.
#[must_use]
pub fn current_scheduler() -> SchedulerRef {
    let fiber = current();
    // Safety: only the running fiber itself touches the slot while active.
    unsafe { (*fiber.as_ref().scheduler.get()).clone() }
}

/// Suspends the current fiber, handing it to `awaiter` for later
/// resumption. For synchronization primitives; not for direct use.
///
/// Precondition: called from a fiber, outside any [`NoSwitchGuard`] scope.
pub fn suspend_with(awaiter: &dyn Awaiter) {
    let fiber = current();
    // Safety: we are the running fiber.
    let this = unsafe { fiber.as_ref() };
    assert_eq!(
        this.no_switch.get(),
        0,
        "context switch inside a NoSwitchGuard scope"
    );

    // Erase the borrow: the awaiter outlives the suspension, because the
    // step loop consumes it before the fiber can be resumed.
    // Safety: lifetime erasure only; see above.
    let awaiter: &'static (dyn Awaiter + 'static) = unsafe { core::mem::transmute(awaiter) };
    this.awaiter.set(Some(NonNull::from(awaiter)));

    this.coroutine.suspend();
}

/// Reschedules the current fiber, letting other tasks run.
///
/// Precondition: called from a fiber.
pub fn yield_now() {
    suspend_with(&YieldAwaiter);
}

/// Reschedules the current fiber and activates `next` if it is valid;
/// with an invalid handle this is equivalent to [`yield_now`].
///
/// Precondition: called from a fiber.
pub fn switch_to(next: FiberHandle) {
    if !next.is_valid() {
        drop(next);
        yield_now();
        return;
    }

    let awaiter = SwitchAwaiter::new(next);
    suspend_with(&awaiter);
}

/// Moves the current fiber onto another scheduler.
///
/// Precondition: called from a fiber.
pub fn teleport_to(where_: &SchedulerRef) {
    let fiber = current();
    // Safety: the running fiber owns its scheduler slot; the write is
    // published to the next handle owner by the suspension below.
    unsafe { *fiber.as_ref().scheduler.get() = where_.clone() };
    yield_now();
}

/// Forbids context switching in the current fiber until the end of the
/// scope. Suspending inside the scope is a programming error.
///
/// Precondition: created from a fiber.
pub struct NoSwitchGuard {
    fiber: NonNull<Fiber>,
}

// === impl NoSwitchGuard ===

impl NoSwitchGuard {
    #[must_use]
    pub fn new() -> Self {
        let fiber = current();
        // Safety: we are the running fiber.
        let this = unsafe { fiber.as_ref() };
        this.no_switch.set(this.no_switch.get() + 1);
        Self { fiber }
    }
}

impl Default for NoSwitchGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NoSwitchGuard {
    fn drop(&mut self) {
        // Safety: guards are scoped inside the fiber that created them.
        let this = unsafe { self.fiber.as_ref() };
        this.no_switch.set(this.no_switch.get() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::{ManualLoop, ThreadPool};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn body_runs_and_completes() {
        let lp = Arc::new(ManualLoop::new());
        let sched: SchedulerRef = lp.clone();
        let ran = Arc::new(AtomicUsize::new(0));

        let r = ran.clone();
        go(&sched, move || {
            r.fetch_add(1, Ordering::SeqCst);
        });

        lp.run();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn yield_interleaves() {
        let lp = Arc::new(ManualLoop::new());
        let sched: SchedulerRef = lp.clone();
        let log = Arc::new(weft_spin::Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let log = log.clone();
            go(&sched, move || {
                for i in 0..3 {
                    log.lock().push(format!("{tag}{i}"));
                    yield_now();
                }
            });
        }

        lp.run();

        let log = log.lock();
        assert_eq!(
            *log,
            vec!["a0", "b0", "a1", "b1", "a2", "b2"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn go_here_inherits_scheduler() {
        let lp = Arc::new(ManualLoop::new());
        let sched: SchedulerRef = lp.clone();
        let ran = Arc::new(AtomicUsize::new(0));

        let r = ran.clone();
        go(&sched, move || {
            let r = r.clone();
            go_here(move || {
                r.fetch_add(1, Ordering::SeqCst);
            });
        });

        lp.run();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ids_are_distinct() {
        let lp = Arc::new(ManualLoop::new());
        let sched: SchedulerRef = lp.clone();
        let ids = Arc::new(weft_spin::Mutex::new(Vec::new()));

        for _ in 0..2 {
            let ids = ids.clone();
            go(&sched, move || ids.lock().push(current_id()));
        }

        lp.run();
        let ids = ids.lock();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn teleport_moves_between_schedulers() {
        let pool_a = ThreadPool::with_launch(1);
        let pool_b = ThreadPool::with_launch(1);
        let hops = Arc::new(AtomicUsize::new(0));

        let (a, b): (SchedulerRef, SchedulerRef) = (pool_a.clone(), pool_b.clone());
        let h = hops.clone();
        go(&a, move || {
            let first = ThreadPool::current().unwrap();
            teleport_to(&b);
            let second = ThreadPool::current().unwrap();
            if !Arc::ptr_eq(&first, &second) {
                h.fetch_add(1, Ordering::SeqCst);
            }
        });

        while hops.load(Ordering::SeqCst) == 0 {
            std::thread::yield_now();
        }
        pool_a.stop();
        pool_b.stop();
        assert_eq!(hops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_switch_guard_scopes() {
        let lp = Arc::new(ManualLoop::new());
        let sched: SchedulerRef = lp.clone();
        let ran = Arc::new(AtomicUsize::new(0));

        let r = ran.clone();
        go(&sched, move || {
            {
                let _guard = NoSwitchGuard::new();
                r.fetch_add(1, Ordering::SeqCst);
            }
            // Suspension is legal again once the guard is gone.
            yield_now();
            r.fetch_add(1, Ordering::SeqCst);
        });

        lp.run();
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn switch_to_transfers_directly() {
        let lp = Arc::new(ManualLoop::new());
        let sched: SchedulerRef = lp.clone();
        let log = Arc::new(weft_spin::Mutex::new(Vec::new()));

        // A parks itself; B switches straight into A.
        let slot: Arc<weft_spin::Mutex<Option<FiberHandle>>> =
            Arc::new(weft_spin::Mutex::new(None));

        struct Park {
            slot: Arc<weft_spin::Mutex<Option<FiberHandle>>>,
        }
        impl Awaiter for Park {
            fn await_symmetric_suspend(&self, fiber: FiberHandle) -> FiberHandle {
                *self.slot.lock() = Some(fiber);
                FiberHandle::invalid()
            }
        }

        let (s, l) = (slot.clone(), log.clone());
        go(&sched, move || {
            l.lock().push("a:park");
            suspend_with(&Park { slot: s });
            l.lock().push("a:resumed");
        });

        let (s, l) = (slot.clone(), log.clone());
        go(&sched, move || {
            l.lock().push("b:switch");
            let a = s.lock().take().unwrap();
            switch_to(a);
            l.lock().push("b:resumed");
        });

        lp.run();

        let log = log.lock();
        assert_eq!(
            *log,
            ["a:park", "b:switch", "a:resumed", "b:resumed"]
                .map(String::from)
                .to_vec()
        );
    }
}
