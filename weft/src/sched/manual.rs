// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::sched::Schedule;
use crate::task::{Header, TaskRef, TaskStub};
use core::sync::atomic::{AtomicUsize, Ordering};
use cordyceps::MpscQueue;
use cordyceps::mpsc_queue::TryDequeueError;
use weft_spin::Backoff;

/// A single-threaded task queue, drained explicitly by its owner.
///
/// Submissions are accepted from any thread; `run*` must be driven from one
/// thread at a time. The loop must be empty when dropped.
pub struct ManualLoop {
    tasks: MpscQueue<Header>,
    len: AtomicUsize,
}

/// The earlier name of [`ManualLoop`].
pub type RunLoop = ManualLoop;

// === impl ManualLoop ===

impl ManualLoop {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: MpscQueue::new_with_stub(TaskStub::allocate()),
            len: AtomicUsize::new(0),
        }
    }

    /// Pops and runs up to `limit` tasks; returns the number completed.
    pub fn run_at_most(&self, limit: usize) -> usize {
        let mut ran = 0;
        while ran != limit && !self.is_empty() {
            let mut boff = Backoff::new();
            let task = loop {
                match self.tasks.try_dequeue() {
                    Ok(task) => break task,
                    // A submitter is between its tail swap and the link
                    // store; the task is already counted in `len`.
                    Err(TryDequeueError::Inconsistent | TryDequeueError::Empty) => boff.spin(),
                    Err(TryDequeueError::Busy) => unreachable!("ManualLoop is drained by one thread"),
                }
            };
            self.len.fetch_sub(1, Ordering::Relaxed);
            task.run();
            ran += 1;
        }
        ran
    }

    /// Runs one task; returns false if there was none.
    pub fn run_next(&self) -> bool {
        self.run_at_most(1) != 0
    }

    /// Drains the queue; returns the number of tasks completed.
    pub fn run(&self) -> usize {
        self.run_at_most(usize::MAX)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }
}

impl Default for ManualLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule for ManualLoop {
    fn submit(&self, task: TaskRef) {
        self.tasks.enqueue(task);
        self.len.fetch_add(1, Ordering::Release);
    }
}

impl Drop for ManualLoop {
    fn drop(&mut self) {
        debug_assert!(self.is_empty(), "ManualLoop contains tasks when destroyed");
    }
}
