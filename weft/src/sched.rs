// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Schedulers: the capability of accepting tasks for later execution.
//!
//! [`Schedule`] is the *safe* capability: submission never fails.
//! [`TrySchedule`] is the *unsafe* capability: submission may fail, in
//! which case the task is handed back inside the error and the caller
//! decides its fate (usually: drop it). [`SafeScheduler`] turns any
//! `TrySchedule` into a `Schedule` by treating failure as fatal.

mod inline;
mod manual;
mod pool;
mod strand;

use crate::task::TaskRef;
use core::fmt;
use std::sync::Arc;

pub use inline::Inline;
pub use manual::{ManualLoop, RunLoop};
pub use pool::ThreadPool;
pub use strand::Strand;

/// The safe scheduler capability: accepts a task and guarantees it will be
/// run (or, for draining schedulers, destroyed) eventually.
pub trait Schedule: Send + Sync + 'static {
    /// Submits a task for later execution. Must not fail.
    fn submit(&self, task: TaskRef);
}

/// A shared handle to a scheduler. Pipelines and fibers store these.
pub type SchedulerRef = Arc<dyn Schedule>;

impl<S: Schedule + ?Sized> Schedule for Arc<S> {
    fn submit(&self, task: TaskRef) {
        (**self).submit(task);
    }
}

/// The unsafe scheduler capability: submission may fail.
pub trait TrySchedule: Send + Sync + 'static {
    /// Attempts to submit a task. On failure the task is returned inside
    /// the error, still unrun; dropping the error destroys it.
    fn try_submit(&self, task: TaskRef) -> Result<(), SubmitError>;
}

impl<S: TrySchedule + ?Sized> TrySchedule for Arc<S> {
    fn try_submit(&self, task: TaskRef) -> Result<(), SubmitError> {
        (**self).try_submit(task)
    }
}

/// A rejected submission, carrying the task back to the caller.
pub struct SubmitError {
    task: TaskRef,
    reason: &'static str,
}

/// Wraps an unsafe scheduler; a failed submission aborts the process.
#[derive(Debug)]
pub struct SafeScheduler<S> {
    underlying: S,
}

// === impl SubmitError ===

impl SubmitError {
    pub(crate) fn new(task: TaskRef, reason: &'static str) -> Self {
        Self { task, reason }
    }

    /// Recovers the unrun task.
    #[must_use]
    pub fn into_task(self) -> TaskRef {
        self.task
    }
}

impl fmt::Debug for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task submission failed: {}", self.reason)
    }
}

impl std::error::Error for SubmitError {}

// === impl SafeScheduler ===

impl<S: TrySchedule> SafeScheduler<S> {
    pub fn new(underlying: S) -> Self {
        Self { underlying }
    }

    pub fn underlying(&self) -> &S {
        &self.underlying
    }
}

impl<S: TrySchedule> Schedule for SafeScheduler<S> {
    fn submit(&self, task: TaskRef) {
        if let Err(error) = self.underlying.try_submit(task) {
            tracing::error!(%error, "submission through SafeScheduler failed");
            std::process::abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn safe_scheduler_forwards() {
        let pool = ThreadPool::with_launch(1);
        let safe = SafeScheduler::new(pool.clone());
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        task::submit(&safe, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        safe.underlying().stop();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
