// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::future::Result;
use crate::sched::SchedulerRef;
use crate::sync::Rendezvous;
use crate::task::{Header, TaskRef, VTable};
use core::cell::UnsafeCell;
use core::ptr::NonNull;

/// The consumer's continuation, invoked with the produced result.
pub(crate) type Callback<V> = Box<dyn FnOnce(Result<V>) + Send + 'static>;

/// Shared rendezvous object between the producer (promise side) and the
/// consumer (callback side) of one future.
///
/// The state is itself a task: the party that arrives *second* submits it to
/// the stored scheduler, and running it moves the result into the callback.
/// The rendezvous flag provides the release/acquire edge that makes each
/// side's slot visible to the task.
///
/// Slot ownership:
/// - `result` is written by the producer before its arrival;
/// - `scheduler` and `callback` are written by the consumer before its
///   arrival (the consumer releases its future by installing the callback);
/// - the task reads all three after winning the rendezvous.
#[repr(C)]
pub(crate) struct FutureState<V> {
    header: Header,
    rendezvous: Rendezvous,
    scheduler: UnsafeCell<Option<SchedulerRef>>,
    callback: UnsafeCell<Option<Callback<V>>>,
    result: UnsafeCell<Option<Result<V>>>,
}

// Safety: the rendezvous protocol serializes all slot access (see above).
unsafe impl<V: Send> Send for FutureState<V> {}
// Safety: same protocol; `&FutureState` is only used through the unsafe
// associated functions below.
unsafe impl<V: Send> Sync for FutureState<V> {}

// === impl FutureState ===

impl<V: Send + 'static> FutureState<V> {
    const VTABLE: VTable = VTable {
        run: Self::run,
        drop: Self::drop_in_place,
    };

    /// Allocates a fresh state, co-owned by a future and a promise until the
    /// rendezvous transfers it to the scheduler.
    pub(crate) fn allocate() -> NonNull<Self> {
        let state = Box::new(Self {
            header: Header::new(&Self::VTABLE),
            rendezvous: Rendezvous::new(),
            scheduler: UnsafeCell::new(None),
            callback: UnsafeCell::new(None),
            result: UnsafeCell::new(None),
        });
        NonNull::from(Box::leak(state))
    }

    /// Places the state on a scheduler.
    ///
    /// # Safety
    ///
    /// Caller must be the consumer side, before its arrival.
    pub(crate) unsafe fn set_scheduler(this: NonNull<Self>, scheduler: SchedulerRef) {
        // Safety: the consumer owns this slot until it installs the callback.
        unsafe { *this.as_ref().scheduler.get() = Some(scheduler) };
    }

    /// The scheduler previously placed with [`set_scheduler`][Self::set_scheduler].
    ///
    /// # Safety
    ///
    /// Caller must be the consumer side, before its arrival.
    pub(crate) unsafe fn scheduler(this: NonNull<Self>) -> SchedulerRef {
        // Safety: consumer-owned slot, see `set_scheduler`.
        let slot = unsafe { &*this.as_ref().scheduler.get() };
        slot.clone().expect("future has no scheduler set")
    }

    /// Installs the callback; this is the consumer's arrival.
    ///
    /// # Safety
    ///
    /// Caller must be the consumer side and must not touch the state again:
    /// ownership of its half is published here. A scheduler must have been
    /// set.
    pub(crate) unsafe fn set_callback(this: NonNull<Self>, callback: Callback<V>) {
        // Safety: last consumer access before the arrival below.
        unsafe {
            debug_assert!((*this.as_ref().scheduler.get()).is_some());
            *this.as_ref().callback.get() = Some(callback);
        }
        // Safety: consumer arrival.
        unsafe { Self::try_schedule(this) };
    }

    /// Stores the result; this is the producer's arrival.
    ///
    /// # Safety
    ///
    /// Caller must be the producer side and must not touch the state again.
    pub(crate) unsafe fn set_result(this: NonNull<Self>, result: Result<V>) {
        // Safety: the producer owns this slot until its arrival below.
        unsafe { *this.as_ref().result.get() = Some(result) };
        // Safety: producer arrival.
        unsafe { Self::try_schedule(this) };
    }

    /// The second arrival transfers ownership to the scheduler.
    unsafe fn try_schedule(this: NonNull<Self>) {
        // Safety: `this` is live until the task runs; the arrival check
        // decides which party submits.
        unsafe {
            if this.as_ref().rendezvous.arrive() {
                let scheduler = (*this.as_ref().scheduler.get())
                    .clone()
                    .expect("rendezvous completed without a scheduler");
                scheduler.submit(TaskRef::from_header(this.cast()));
            }
        }
    }

    /// Task entry: deliver the result into the callback, then free the state.
    unsafe fn run(header: NonNull<Header>) {
        // Safety: per the vtable contract this is a `FutureState<V>` owned by
        // the scheduler; both slots were published before the rendezvous.
        let this = unsafe { Box::from_raw(header.as_ptr().cast::<Self>()) };
        let callback = this
            .callback
            .into_inner()
            .expect("future state run without a callback");
        let result = this
            .result
            .into_inner()
            .expect("future state run without a result");
        callback(result);
    }

    unsafe fn drop_in_place(header: NonNull<Header>) {
        // Safety: per the vtable contract, and ownership ends here.
        unsafe { drop(Box::from_raw(header.as_ptr().cast::<Self>())) }
    }
}
