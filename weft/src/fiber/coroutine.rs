// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::fiber::stack_cache;
use core::cell::Cell;
use core::panic::AssertUnwindSafe;
use weft_context::ExecutionContext;

pub(crate) type Body = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Status {
    Inactive,
    Active,
    Completed,
}

/// A stackful computation: a body resumed on its own cached stack.
///
/// `resume` and `suspend` are the two sides of the same symmetric switch;
/// the status machine asserts they alternate correctly. When the body
/// returns, the final switch out leaves the coroutine `Completed` and the
/// stack goes back to the cache on drop.
pub(crate) struct Coroutine {
    body: Cell<Option<Body>>,
    stack: Option<weft_context::Stack>,
    context: ExecutionContext,
    status: Cell<Status>,
}

// === impl Coroutine ===

impl Coroutine {
    pub(crate) fn new(body: Body) -> Self {
        Self {
            body: Cell::new(Some(body)),
            stack: Some(stack_cache::acquire()),
            context: ExecutionContext::new(),
            status: Cell::new(Status::Inactive),
        }
    }

    /// Prepares the entry frame. Must be called once the coroutine has
    /// reached its final address, before the first [`resume`][Self::resume].
    ///
    /// # Safety
    ///
    /// The coroutine must not move afterwards.
    pub(crate) unsafe fn arm(&mut self) {
        let arg = core::ptr::from_mut(self).cast::<()>();
        let stack = self.stack.as_ref().expect("coroutine has no stack");
        // Safety: stack and self outlive the coroutine's execution.
        unsafe { self.context.setup(stack, coroutine_entry, arg) };
    }

    /// Switches from the scheduler side into the coroutine.
    pub(crate) fn resume(&self) {
        self.transition(Status::Inactive, Status::Active);
        // Safety: the slot holds either the armed entry frame or the state
        // saved by the last `suspend`.
        unsafe { self.context.switch_to_saved() };
    }

    /// Switches from inside the coroutine back to the scheduler side.
    pub(crate) fn suspend(&self) {
        self.transition(Status::Active, Status::Inactive);
        // Safety: the slot holds the scheduler-side state saved by `resume`.
        unsafe { self.context.switch_to_saved() };
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.status.get() == Status::Completed
    }

    /// Final switch out; the coroutine is never entered again.
    fn complete(&self) -> ! {
        self.transition(Status::Active, Status::Completed);
        // Safety: the slot holds the scheduler-side state saved by `resume`.
        unsafe { self.context.switch_to_saved() };
        unreachable!("resumed a completed coroutine");
    }

    fn transition(&self, from: Status, to: Status) {
        let status = self.status.get();
        assert_eq!(status, from, "wrong coroutine status");
        self.status.set(to);
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        debug_assert!(
            self.status.get() != Status::Active,
            "coroutine destroyed while running"
        );
        if let Some(stack) = self.stack.take() {
            stack_cache::release(stack);
        }
    }
}

unsafe extern "C" fn coroutine_entry(arg: *mut ()) -> ! {
    // Safety: `arm` passed a pointer to a pinned, live coroutine.
    let coroutine = unsafe { &*arg.cast::<Coroutine>() };

    let body = coroutine
        .body
        .take()
        .expect("coroutine entered a second time");

    // Panics must not cross the switch below; a panic escaping a fiber body
    // is fatal, like one escaping a pool task.
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(body)) {
        let msg = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");
        tracing::error!(panic = msg, "panic escaped a fiber body");
        std::process::abort();
    }

    coroutine.complete()
}
