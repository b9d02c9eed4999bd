// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The task object model.
//!
//! A *task* is a polymorphic one-shot computation. Every schedulable object
//! (closure tasks, future states, fibers) embeds a [`Header`] as its first
//! field; schedulers only ever see type-erased [`TaskRef`]s and interact with
//! the underlying object through the header's vtable. The header carries the
//! intrusive links that let lock-free MPSC queues hold tasks without
//! allocating.

use crate::sched::Schedule;
use core::fmt;
use core::ptr::NonNull;
use cordyceps::{Linked, mpsc_queue};
use static_assertions::assert_impl_all;

/// Intrusive header embedded as the first field of every schedulable object.
///
/// The embedding type must be `#[repr(C)]` with the header first, so a
/// pointer to the header is a pointer to the object.
#[derive(Debug)]
pub(crate) struct Header {
    /// Intrusive links used while the task sits in a scheduler queue.
    run_queue_links: mpsc_queue::Links<Header>,
    /// The vtable for the concrete task type behind this header.
    vtable: &'static VTable,
}

pub(crate) struct VTable {
    /// Run the task, consuming it. After this call the task's identity is
    /// invalid.
    pub(crate) run: unsafe fn(NonNull<Header>),
    /// Destroy the task without running it.
    pub(crate) drop: unsafe fn(NonNull<Header>),
}

/// An owning, type-erased pointer to a submitted task.
///
/// A `TaskRef` is the unit of exchange between submitters and schedulers:
/// exactly one exists per pending task, and [`run`][TaskRef::run] consumes
/// it. Dropping a `TaskRef` destroys the task without running it (this is
/// what a failed submission does with the task handed back to the caller).
pub struct TaskRef(NonNull<Header>);

// Safety: a TaskRef is the unique owner of the pending task, and every task
// type reachable through a header is Send.
unsafe impl Send for TaskRef {}
// Safety: TaskRef exposes no &self access to the task.
unsafe impl Sync for TaskRef {}

assert_impl_all!(TaskRef: Send, Sync);

// === impl Header ===

impl Header {
    pub(crate) const fn new(vtable: &'static VTable) -> Self {
        Self {
            run_queue_links: mpsc_queue::Links::new(),
            vtable,
        }
    }

    const fn new_stub() -> Self {
        Self {
            run_queue_links: mpsc_queue::Links::new_stub(),
            vtable: &STUB_VTABLE,
        }
    }
}

impl fmt::Debug for VTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VTable").finish_non_exhaustive()
    }
}

// Safety: tasks are pinned in memory from submission until `run`, and queue
// membership transfers the single ownership represented by `TaskRef`.
unsafe impl Linked<mpsc_queue::Links<Header>> for Header {
    type Handle = TaskRef;

    fn into_ptr(task: Self::Handle) -> NonNull<Self> {
        let ptr = task.0;
        // Enqueuing assigns ownership of the task to the queue; don't run
        // the drop-without-running path.
        core::mem::forget(task);
        ptr
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        TaskRef(ptr)
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<mpsc_queue::Links<Self>> {
        // Safety: `run_queue_links` is a field of the pointed-to header.
        unsafe { NonNull::new_unchecked(&raw mut (*ptr.as_ptr()).run_queue_links) }
    }
}

// === impl TaskRef ===

impl TaskRef {
    /// Wraps a header pointer, taking ownership of the task behind it.
    ///
    /// # Safety
    ///
    /// `ptr` must point to the `Header` of a live, pinned task object that
    /// no other `TaskRef` currently owns.
    pub(crate) unsafe fn from_header(ptr: NonNull<Header>) -> Self {
        Self(ptr)
    }

    /// Runs the task, consuming it.
    pub fn run(self) {
        let ptr = self.0;
        let run = {
            // Safety: we own the task, the header is live.
            let header = unsafe { ptr.as_ref() };
            header.vtable.run
        };
        core::mem::forget(self);
        // Safety: ownership is transferred into the vtable call.
        unsafe { run(ptr) }
    }
}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRef").field("addr", &self.0).finish()
    }
}

impl Drop for TaskRef {
    fn drop(&mut self) {
        tracing::trace!(task.addr = ?self.0, "TaskRef dropped without running");
        let drop_fn = {
            // Safety: we still own the task.
            let header = unsafe { self.0.as_ref() };
            header.vtable.drop
        };
        // Safety: ownership ends here.
        unsafe { drop_fn(self.0) }
    }
}

// === stub tasks ===

static STUB_VTABLE: VTable = VTable {
    run: stub_run,
    drop: stub_drop,
};

unsafe fn stub_run(ptr: NonNull<Header>) {
    unreachable!("stub task ({ptr:?}) must never be run");
}

unsafe fn stub_drop(ptr: NonNull<Header>) {
    // Queues drop their stub when they are dropped themselves.
    // Safety: stubs are always allocated via `TaskStub::allocate`.
    unsafe { drop(Box::from_raw(ptr.as_ptr().cast::<TaskStub>())) }
}

/// A placeholder task required by the intrusive MPSC queues; never run.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct TaskStub {
    header: Header,
}

impl TaskStub {
    /// Allocates a stub and returns it as a `TaskRef` suitable for
    /// `MpscQueue::new_with_stub`.
    pub(crate) fn allocate() -> TaskRef {
        let stub = Box::new(TaskStub {
            header: Header::new_stub(),
        });
        // Safety: freshly allocated, uniquely owned.
        unsafe { TaskRef::from_header(NonNull::from(Box::leak(stub)).cast()) }
    }
}

// === closure tasks ===

/// A heap-allocated closure task that frees itself after running.
#[repr(C)]
struct FnTask<F> {
    header: Header,
    f: Option<F>,
}

impl<F: FnOnce() + Send + 'static> FnTask<F> {
    const VTABLE: VTable = VTable {
        run: Self::run,
        drop: Self::drop,
    };

    fn allocate(f: F) -> TaskRef {
        let task = Box::new(FnTask {
            header: Header::new(&Self::VTABLE),
            f: Some(f),
        });
        // Safety: freshly allocated, uniquely owned, header is first field.
        unsafe { TaskRef::from_header(NonNull::from(Box::leak(task)).cast()) }
    }

    unsafe fn run(ptr: NonNull<Header>) {
        // Safety: per the vtable contract `ptr` points at an `FnTask<F>` we
        // now own exclusively.
        let mut this = unsafe { Box::from_raw(ptr.as_ptr().cast::<Self>()) };
        let f = this.f.take().expect("closure task run twice");
        drop(this);
        f();
    }

    unsafe fn drop(ptr: NonNull<Header>) {
        // Safety: same as in `run`, minus the call.
        unsafe { drop(Box::from_raw(ptr.as_ptr().cast::<Self>())) }
    }
}

/// Boxes `f` into a self-freeing task and submits it to `where_`.
pub fn submit<S, F>(where_: &S, f: F)
where
    S: Schedule + ?Sized,
    F: FnOnce() + Send + 'static,
{
    where_.submit(FnTask::allocate(f));
}

/// Boxes `f` into a self-freeing task without submitting it.
#[cfg(test)]
pub(crate) fn closure_task<F: FnOnce() + Send + 'static>(f: F) -> TaskRef {
    FnTask::allocate(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::Inline;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closure_task_runs_once() {
        static RAN: AtomicUsize = AtomicUsize::new(0);

        let task = FnTask::allocate(|| {
            RAN.fetch_add(1, Ordering::SeqCst);
        });
        task.run();
        assert_eq!(RAN.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_task_never_runs() {
        static RAN: AtomicUsize = AtomicUsize::new(0);

        let task = FnTask::allocate(|| {
            RAN.fetch_add(1, Ordering::SeqCst);
        });
        drop(task);
        assert_eq!(RAN.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn submit_runs_inline() {
        let ran = std::sync::Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        submit(&Inline, move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
