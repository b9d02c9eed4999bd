// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::future::state::{Callback, FutureState};
use crate::future::{Error, Result};
use crate::sched::{Inline, SchedulerRef};
use core::fmt;
use core::ptr::NonNull;

/// A future value without a scheduler.
///
/// Move-only holder of the shared state; combinators release the state and
/// hand it to the value they return. Dropping a `SemiFuture` whose state is
/// still attached completes it against the inline scheduler with a no-op
/// callback (the value is sunk).
#[must_use = "futures do nothing unless consumed by a combinator or terminal"]
pub struct SemiFuture<V: Send + 'static> {
    state: Option<NonNull<FutureState<V>>>,
}

/// A future value placed on a scheduler: its callback will run there.
#[must_use = "futures do nothing unless consumed by a combinator or terminal"]
pub struct Future<V: Send + 'static> {
    inner: SemiFuture<V>,
}

/// The producer side of a contract.
///
/// Move-only; exactly one of `set_value` / `set_error` / `set_result` must
/// be called. Dropping a live promise completes the paired future with the
/// [`BROKEN_PROMISE`](crate::future::BROKEN_PROMISE) error.
#[must_use = "a dropped promise breaks its future"]
pub struct Promise<V: Send + 'static> {
    state: Option<NonNull<FutureState<V>>>,
}

// Safety: the state pointer is an owned half of the rendezvous object, which
// is itself Send/Sync for V: Send.
unsafe impl<V: Send + 'static> Send for SemiFuture<V> {}
// Safety: as above.
unsafe impl<V: Send + 'static> Send for Promise<V> {}

/// Creates a fresh future/promise pair over a new shared state.
///
/// The state outlives both halves until the last of producer and consumer
/// has published its half.
pub fn contract<V: Send + 'static>() -> (SemiFuture<V>, Promise<V>) {
    let state = FutureState::allocate();
    (
        SemiFuture { state: Some(state) },
        Promise { state: Some(state) },
    )
}

// === impl SemiFuture ===

impl<V: Send + 'static> SemiFuture<V> {
    /// Takes the state out; the holder becomes empty (and its drop inert).
    pub(crate) fn release(mut self) -> NonNull<FutureState<V>> {
        self.state.take().expect("future already released its state")
    }

    pub(crate) fn from_state(state: NonNull<FutureState<V>>) -> Self {
        Self { state: Some(state) }
    }

    /// Places this future on a scheduler.
    pub fn via(self, where_: &SchedulerRef) -> Future<V> {
        let state = self.release();
        // Safety: we are the consumer and have not arrived yet.
        unsafe { FutureState::set_scheduler(state, where_.clone()) };
        Future {
            inner: Self::from_state(state),
        }
    }

    /// Places this future on the inline scheduler.
    pub fn via_inline(self) -> Future<V> {
        self.via(&Inline::shared())
    }
}

impl<V: Send + 'static> Drop for SemiFuture<V> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            // Sink the eventual value: complete against Inline with a no-op.
            // Safety: we are the consumer; these are our last two accesses.
            unsafe {
                FutureState::set_scheduler(state, Inline::shared());
                FutureState::set_callback(state, Box::new(|_| ()));
            }
        }
    }
}

impl<V: Send + 'static> fmt::Debug for SemiFuture<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemiFuture")
            .field("armed", &self.state.is_some())
            .finish()
    }
}

// === impl Future ===

impl<V: Send + 'static> Future<V> {
    /// Forgets the scheduler placement, turning this back into a
    /// [`SemiFuture`] (useful for feeding concurrent combinators).
    pub fn into_semi(self) -> SemiFuture<V> {
        self.inner
    }

    pub(crate) fn release(self) -> NonNull<FutureState<V>> {
        self.inner.release()
    }

    /// The scheduler this future is placed on.
    pub(crate) fn scheduler(&self) -> SchedulerRef {
        let state = self.inner.state.expect("future already released its state");
        // Safety: we are the consumer and have not arrived yet.
        unsafe { FutureState::scheduler(state) }
    }

    /// Re-places this future on another scheduler.
    pub fn via(self, where_: &SchedulerRef) -> Future<V> {
        self.into_semi().via(where_)
    }

    /// Installs the final callback; it will run on this future's scheduler.
    pub(crate) fn set_callback(self, callback: impl FnOnce(Result<V>) + Send + 'static) {
        let state = self.release();
        let callback: Callback<V> = Box::new(callback);
        // Safety: consumer arrival; the state is released above.
        unsafe { FutureState::set_callback(state, callback) };
    }
}

impl<V: Send + 'static> fmt::Debug for Future<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("armed", &self.inner.state.is_some())
            .finish()
    }
}

// === impl Promise ===

impl<V: Send + 'static> Promise<V> {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state.is_some()
    }

    /// Completes the paired future with a result.
    pub fn set_result(mut self, result: Result<V>) {
        let state = self.state.take().expect("promise already used");
        // Safety: producer arrival; our last access.
        unsafe { FutureState::set_result(state, result) };
    }

    /// Completes the paired future with a value.
    pub fn set_value(self, value: V) {
        self.set_result(Ok(value));
    }

    /// Completes the paired future with an error.
    pub fn set_error(self, error: Error) {
        self.set_result(Err(error));
    }
}

impl<V: Send + 'static> Drop for Promise<V> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            // Safety: producer arrival; our last access.
            unsafe { FutureState::set_result(state, Err(Error::broken_promise())) };
        }
    }
}

impl<V: Send + 'static> fmt::Debug for Promise<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("armed", &self.state.is_some())
            .finish()
    }
}
