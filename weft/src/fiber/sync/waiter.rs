// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::fiber::FiberHandle;
use core::cell::Cell;
use core::marker::PhantomPinned;
use core::ptr::NonNull;
use cordyceps::{Linked, list};

/// A parked fiber's place in a primitive's wait queue.
///
/// Waiter nodes live on the stack of the suspended fiber, which stays alive
/// (and unmoved) for exactly as long as the node is linked: the fiber cannot
/// resume before some queue walk pops the node and schedules the stashed
/// handle.
pub(super) struct Waiter {
    links: list::Links<Waiter>,
    handle: Cell<FiberHandle>,
    _pin: PhantomPinned,
}

/// Queue of parked fibers, always guarded by the owning primitive's lock.
pub(super) type WaitList = cordyceps::List<Waiter>;

// === impl Waiter ===

impl Waiter {
    pub(super) fn new() -> Self {
        Self {
            links: list::Links::new(),
            handle: Cell::new(FiberHandle::invalid()),
            _pin: PhantomPinned,
        }
    }

    /// Stashes the suspended fiber's handle; done right before linking.
    pub(super) fn set_handle(&self, handle: FiberHandle) {
        self.handle.set(handle);
    }

    /// Takes the handle out of an unlinked node.
    ///
    /// # Safety
    ///
    /// `this` must have just been popped from a wait list whose lock the
    /// caller still holds (or otherwise be exclusively reachable).
    pub(super) unsafe fn take_handle(this: NonNull<Waiter>) -> FiberHandle {
        // Safety: the node is pinned on a suspended fiber's stack and only
        // the queue owner touches it, per the caller's guarantee.
        unsafe { this.as_ref().handle.take() }
    }
}

// Safety: waiter nodes are pinned while linked (the parked fiber cannot move
// its stack), and every access goes through the owning primitive's lock.
unsafe impl Linked<list::Links<Waiter>> for Waiter {
    type Handle = NonNull<Waiter>;

    fn into_ptr(handle: Self::Handle) -> NonNull<Self> {
        handle
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        ptr
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<list::Links<Self>> {
        // Safety: `links` is a field of the pointed-to waiter.
        unsafe { NonNull::new_unchecked(&raw mut (*ptr.as_ptr()).links) }
    }
}

/// Pops every waiter and returns the parked handles, for wake-all paths.
///
/// Must be called under the primitive's lock; the handles can then be
/// scheduled after the lock is released.
pub(super) fn drain(list: &mut WaitList) -> Vec<FiberHandle> {
    let mut handles = Vec::new();
    while let Some(waiter) = list.pop_front() {
        // Safety: just popped under the caller's lock.
        handles.push(unsafe { Waiter::take_handle(waiter) });
    }
    handles
}
