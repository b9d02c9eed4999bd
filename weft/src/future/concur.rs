// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Concurrent combinators: [`all`] joins heterogeneous futures into a tuple,
//! [`first`] races same-typed futures for the first success.
//!
//! Both drain their inputs through the inline scheduler: the shared state
//! below is updated wherever each input happens to complete, and the
//! combined result is delivered through a fresh contract.

use crate::future::{Promise, Result, SemiFuture, contract};
use crate::sync::Meeting;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weft_spin::Mutex;

/// Joins a tuple of futures: the output completes with the tuple of values
/// iff all inputs succeed, or with the first error observed, discarding
/// later completions.
///
/// Implemented for tuples of two to five [`SemiFuture`]s.
pub fn all<T: AllTuple>(futures: T) -> SemiFuture<T::Output> {
    T::join(futures)
}

/// A tuple of futures [`all`] can join.
pub trait AllTuple {
    type Output: Send + 'static;

    fn join(self) -> SemiFuture<Self::Output>;
}

/// Races an iterator of same-typed futures: the first *success* wins.
/// Errors accumulate; only when every input has failed does the last error
/// surface.
///
/// # Panics
///
/// Panics if `futures` is empty.
pub fn first<V, I>(futures: I) -> SemiFuture<V>
where
    V: Send + 'static,
    I: IntoIterator<Item = SemiFuture<V>>,
{
    let futures: Vec<_> = futures.into_iter().collect();
    assert!(!futures.is_empty(), "first() requires at least one future");

    let (winner, p) = contract::<V>();
    let shared = Arc::new(FirstShared {
        remaining: AtomicUsize::new(futures.len()),
        promise: Mutex::new(Some(p)),
    });

    for f in futures {
        let shared = shared.clone();
        f.via_inline().set_callback(move |res: Result<V>| match res {
            Ok(v) => {
                let won = shared.promise.lock().take();
                if let Some(p) = won {
                    p.set_value(v);
                }
            }
            Err(e) => {
                // The last loser surfaces its error, unless a success
                // already claimed the promise.
                if shared.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let left_over = shared.promise.lock().take();
                    if let Some(p) = left_over {
                        p.set_error(e);
                    }
                }
            }
        });
    }

    winner
}

struct FirstShared<V: Send + 'static> {
    remaining: AtomicUsize,
    promise: Mutex<Option<Promise<V>>>,
}

/// Pairwise join: the building block the tuple impls compose.
fn all2<A, B>(fa: SemiFuture<A>, fb: SemiFuture<B>) -> SemiFuture<(A, B)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    struct Shared<A: Send + 'static, B: Send + 'static> {
        left: Mutex<Option<A>>,
        right: Mutex<Option<B>>,
        both: Meeting,
        promise: Mutex<Option<Promise<(A, B)>>>,
    }

    impl<A: Send + 'static, B: Send + 'static> Shared<A, B> {
        /// Called by the last successful input.
        fn finish(&self) {
            let claimed = self.promise.lock().take();
            if let Some(p) = claimed {
                let a = self.left.lock().take().expect("left value missing");
                let b = self.right.lock().take().expect("right value missing");
                p.set_value((a, b));
            }
        }

        /// The first error claims the promise; later completions find it
        /// gone and are discarded.
        fn fail(&self, e: crate::future::Error) {
            let claimed = self.promise.lock().take();
            if let Some(p) = claimed {
                p.set_error(e);
            }
        }
    }

    let (joined, p) = contract::<(A, B)>();
    let shared = Arc::new(Shared {
        left: Mutex::new(None),
        right: Mutex::new(None),
        both: Meeting::new(2),
        promise: Mutex::new(Some(p)),
    });

    let s = shared.clone();
    fa.via_inline().set_callback(move |res: Result<A>| match res {
        Ok(v) => {
            *s.left.lock() = Some(v);
            if s.both.arrive() {
                s.finish();
            }
        }
        Err(e) => s.fail(e),
    });

    let s = shared;
    fb.via_inline().set_callback(move |res: Result<B>| match res {
        Ok(v) => {
            *s.right.lock() = Some(v);
            if s.both.arrive() {
                s.finish();
            }
        }
        Err(e) => s.fail(e),
    });

    joined
}

/// Infallible reshaping stage on the inline scheduler.
fn map_values<V, U, F>(f: SemiFuture<V>, reshape: F) -> SemiFuture<U>
where
    V: Send + 'static,
    U: Send + 'static,
    F: FnOnce(V) -> U + Send + 'static,
{
    let (next, p) = contract::<U>();
    f.via_inline()
        .set_callback(move |res: Result<V>| p.set_result(res.map(reshape)));
    next
}

impl<V0, V1> AllTuple for (SemiFuture<V0>, SemiFuture<V1>)
where
    V0: Send + 'static,
    V1: Send + 'static,
{
    type Output = (V0, V1);

    fn join(self) -> SemiFuture<Self::Output> {
        all2(self.0, self.1)
    }
}

impl<V0, V1, V2> AllTuple for (SemiFuture<V0>, SemiFuture<V1>, SemiFuture<V2>)
where
    V0: Send + 'static,
    V1: Send + 'static,
    V2: Send + 'static,
{
    type Output = (V0, V1, V2);

    fn join(self) -> SemiFuture<Self::Output> {
        let pair = all2(all2(self.0, self.1), self.2);
        map_values(pair, |((v0, v1), v2)| (v0, v1, v2))
    }
}

impl<V0, V1, V2, V3> AllTuple
    for (
        SemiFuture<V0>,
        SemiFuture<V1>,
        SemiFuture<V2>,
        SemiFuture<V3>,
    )
where
    V0: Send + 'static,
    V1: Send + 'static,
    V2: Send + 'static,
    V3: Send + 'static,
{
    type Output = (V0, V1, V2, V3);

    fn join(self) -> SemiFuture<Self::Output> {
        let pair = all2(all2(self.0, self.1), all2(self.2, self.3));
        map_values(pair, |((v0, v1), (v2, v3))| (v0, v1, v2, v3))
    }
}

impl<V0, V1, V2, V3, V4> AllTuple
    for (
        SemiFuture<V0>,
        SemiFuture<V1>,
        SemiFuture<V2>,
        SemiFuture<V3>,
        SemiFuture<V4>,
    )
where
    V0: Send + 'static,
    V1: Send + 'static,
    V2: Send + 'static,
    V3: Send + 'static,
    V4: Send + 'static,
{
    type Output = (V0, V1, V2, V3, V4);

    fn join(self) -> SemiFuture<Self::Output> {
        let quad = all2(all2(self.0, self.1), all2(self.2, self.3));
        let pair = all2(quad, self.4);
        map_values(pair, |(((v0, v1), (v2, v3)), v4)| (v0, v1, v2, v3, v4))
    }
}
