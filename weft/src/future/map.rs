// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Sequential combinators.
//!
//! All of them install a callback on the input future (so the user function
//! runs on the input's scheduler), feed a fresh contract and return its
//! future placed on the same scheduler.

use crate::future::error::catching;
use crate::future::{Future, SemiFuture, contract};
use crate::sched::SchedulerRef;

/// A value that can continue a pipeline: either a [`SemiFuture`] (which is
/// placed on the pipeline's scheduler) or a [`Future`] (which keeps its
/// own).
pub trait IntoFutureOn<V: Send + 'static>: Send + 'static {
    fn into_future_on(self, default: &SchedulerRef) -> Future<V>;
}

impl<V: Send + 'static> IntoFutureOn<V> for SemiFuture<V> {
    fn into_future_on(self, default: &SchedulerRef) -> Future<V> {
        self.via(default)
    }
}

impl<V: Send + 'static> IntoFutureOn<V> for Future<V> {
    fn into_future_on(self, _default: &SchedulerRef) -> Future<V> {
        self
    }
}

// === sequential combinators ===

impl<V: Send + 'static> Future<V> {
    /// Transforms the eventual value with `f` on this future's scheduler.
    ///
    /// Errors bypass `f` unchanged; a panic inside `f` becomes the error of
    /// the returned future.
    pub fn map<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(V) -> U + Send + 'static,
    {
        let where_ = self.scheduler();
        let (next, p) = contract::<U>();

        self.set_callback(move |res| match res {
            Ok(v) => p.set_result(catching(move || f(v))),
            Err(e) => p.set_error(e),
        });

        next.via(&where_)
    }

    /// Sequentially composes `f`'s future after this one.
    ///
    /// An inner `SemiFuture` is placed on this future's scheduler; an inner
    /// `Future` keeps the scheduler it was given. Errors bypass `f`.
    pub fn flat_map<U, Fut, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        Fut: IntoFutureOn<U>,
        F: FnOnce(V) -> Fut + Send + 'static,
    {
        let where_ = self.scheduler();
        let (next, p) = contract::<U>();

        let inner_sched = where_.clone();
        self.set_callback(move |res| match res {
            Ok(v) => match catching(move || f(v)) {
                Ok(inner) => inner
                    .into_future_on(&inner_sched)
                    .set_callback(move |r| p.set_result(r)),
                Err(e) => p.set_error(e),
            },
            Err(e) => p.set_error(e),
        });

        next.via(&where_)
    }

    /// Recovers from an error with `f`; values pass through unchanged.
    pub fn recover<F>(self, f: F) -> Future<V>
    where
        F: FnOnce(crate::future::Error) -> V + Send + 'static,
    {
        let where_ = self.scheduler();
        let (next, p) = contract::<V>();

        self.set_callback(move |res| match res {
            Ok(v) => p.set_value(v),
            Err(e) => p.set_result(catching(move || f(e))),
        });

        next.via(&where_)
    }

    /// Recovers from an error with a future produced by `f`.
    pub fn recover_with<Fut, F>(self, f: F) -> Future<V>
    where
        Fut: IntoFutureOn<V>,
        F: FnOnce(crate::future::Error) -> Fut + Send + 'static,
    {
        let where_ = self.scheduler();
        let (next, p) = contract::<V>();

        let inner_sched = where_.clone();
        self.set_callback(move |res| match res {
            Ok(v) => p.set_value(v),
            Err(e) => match catching(move || f(e)) {
                Ok(inner) => inner
                    .into_future_on(&inner_sched)
                    .set_callback(move |r| p.set_result(r)),
                Err(e) => p.set_error(e),
            },
        });

        next.via(&where_)
    }
}

impl<Fut: Send + 'static> Future<Fut> {
    /// Collapses a future of a future into one future.
    pub fn flatten<V>(self) -> Future<V>
    where
        V: Send + 'static,
        Fut: IntoFutureOn<V>,
    {
        self.flat_map(|inner| inner)
    }
}

// === invoke_with ===

/// Calling a carried callable with an argument tuple.
///
/// Implemented for closures of up to four arguments; `()` invokes a nullary
/// callable.
pub trait CallWith<Args> {
    type Output;

    fn call_with(self, args: Args) -> Self::Output;
}

macro_rules! impl_call_with {
    ($($arg:ident : $ty:ident),*) => {
        impl<F, R, $($ty,)*> CallWith<($($ty,)*)> for F
        where
            F: FnOnce($($ty),*) -> R,
        {
            type Output = R;

            fn call_with(self, ($($arg,)*): ($($ty,)*)) -> R {
                self($($arg),*)
            }
        }
    };
}

impl_call_with!();
impl_call_with!(a1: A1);
impl_call_with!(a1: A1, a2: A2);
impl_call_with!(a1: A1, a2: A2, a3: A3);
impl_call_with!(a1: A1, a2: A2, a3: A3, a4: A4);

impl<F: Send + 'static> Future<F> {
    /// Curries `args` into the carried callable.
    pub fn invoke_with<Args, R>(self, args: Args) -> Future<R>
    where
        Args: Send + 'static,
        F: CallWith<Args, Output = R>,
        R: Send + 'static,
    {
        self.map(move |f| f.call_with(args))
    }
}
