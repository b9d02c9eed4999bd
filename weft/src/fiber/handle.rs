// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::fiber::Fiber;
use core::fmt;
use core::ptr::NonNull;

/// An exactly-once-use ownership token over a suspended fiber.
///
/// While a fiber is suspended, exactly one valid handle to it exists:
/// either in a scheduler queue or stashed inside an awaiter. A valid handle
/// must be [`schedule`][FiberHandle::schedule]d or transferred before it is
/// dropped; losing one loses the fiber.
#[must_use = "a valid FiberHandle must be scheduled or transferred"]
pub struct FiberHandle {
    fiber: Option<NonNull<Fiber>>,
}

// Safety: the handle is the unique owner of the suspended fiber; fibers hop
// between worker threads by design.
unsafe impl Send for FiberHandle {}

// === impl FiberHandle ===

impl FiberHandle {
    pub(crate) fn new(fiber: NonNull<Fiber>) -> Self {
        Self { fiber: Some(fiber) }
    }

    /// A handle that owns nothing ("yield back to the scheduler").
    pub fn invalid() -> Self {
        Self { fiber: None }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.fiber.is_some()
    }

    /// Submits the fiber to the scheduler it is set on.
    ///
    /// # Panics
    ///
    /// Panics if the handle is invalid.
    pub fn schedule(self) {
        let fiber = self.release_checked();
        // Safety: we owned the suspended fiber until this very call.
        unsafe { Fiber::schedule(fiber) };
    }

    /// Synonym for [`schedule`][FiberHandle::schedule].
    pub fn resume(self) {
        self.schedule();
    }

    pub(crate) fn release(mut self) -> Option<NonNull<Fiber>> {
        self.fiber.take()
    }

    fn release_checked(self) -> NonNull<Fiber> {
        self.release().expect("fiber is missing, but expected")
    }
}

impl Default for FiberHandle {
    fn default() -> Self {
        Self::invalid()
    }
}

impl fmt::Debug for FiberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberHandle")
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl Drop for FiberHandle {
    fn drop(&mut self) {
        debug_assert!(
            self.fiber.is_none(),
            "a valid FiberHandle was dropped; the fiber is lost"
        );
    }
}
