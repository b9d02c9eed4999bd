// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::future::error::catching;
use crate::future::{Error, Future, SemiFuture, contract};
use crate::sched::SchedulerRef;
use crate::task;

/// An already-completed future carrying the unit value.
pub fn just() -> SemiFuture<()> {
    value(())
}

/// An already-completed future carrying `v`.
pub fn value<V: Send + 'static>(v: V) -> SemiFuture<V> {
    let (f, p) = contract();
    p.set_value(v);
    f
}

/// An already-failed future carrying `e`.
pub fn failure<V: Send + 'static>(e: Error) -> SemiFuture<V> {
    let (f, p) = contract::<V>();
    p.set_error(e);
    f
}

/// Submits `fn_` to `where_`; the returned future is placed on the same
/// scheduler. A panic inside `fn_` becomes the future's error.
pub fn spawn<F, R>(where_: &SchedulerRef, fn_: F) -> Future<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (f, p) = contract::<R>();

    task::submit(where_, move || {
        p.set_result(catching(fn_));
    });

    f.via(where_)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_round_trips() {
        assert_eq!(value(17).get(), 17);
        just().get();
    }

    #[test]
    fn failure_surfaces() {
        let res = failure::<i32>(Error::new("nope")).try_get();
        assert_eq!(res.unwrap_err().message(), Some("nope"));
    }

    #[test]
    fn spawn_runs_on_scheduler() {
        let pool = crate::sched::ThreadPool::with_launch(2);
        let sched: SchedulerRef = pool.clone();

        let v = spawn(&sched, || 40 + 2).get();
        assert_eq!(v, 42);

        pool.stop();
    }

    #[test]
    fn spawn_captures_panics() {
        let pool = crate::sched::ThreadPool::with_launch(1);
        let sched: SchedulerRef = pool.clone();

        let res = spawn(&sched, || -> i32 { panic!("kaboom") }).try_get();
        assert_eq!(res.unwrap_err().message(), Some("kaboom"));

        pool.stop();
    }
}
