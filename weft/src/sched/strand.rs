// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A scheduler decorator that serializes asynchronous critical sections
//! without explicit locks. Instead of moving a lock between threads it moves
//! the critical sections themselves onto a single runner, so the protected
//! data stays cache-hot. Submission is wait-free; only the submitter that
//! finds the strand idle pays the cost of scheduling the runner.

use crate::sched::{Schedule, SchedulerRef};
use crate::task::{self, Header, TaskRef, TaskStub};
use core::sync::atomic::{AtomicUsize, Ordering};
use cordyceps::MpscQueue;
use cordyceps::mpsc_queue::TryDequeueError;
use std::sync::{Arc, Weak};
use weft_spin::Backoff;

/// How many critical sections one runner invocation executes before handing
/// the underlying scheduler's thread back.
const BATCH_LIMIT: usize = 128;

/// Serializes tasks on top of an underlying safe scheduler.
///
/// Invariants:
/// - at most one runner task per strand is live on the underlying scheduler;
/// - critical sections execute in submission order, with a happens-before
///   edge from the end of each section to the start of the next;
/// - a submitter never blocks on another submitter.
pub struct Strand {
    underlying: SchedulerRef,
    /// Chain of pending critical sections. The enqueue side is a single
    /// pointer swap plus one link store, so submitters are wait-free; the
    /// runner is the only consumer.
    chain: MpscQueue<Header>,
    /// Sections submitted but not yet run. The 0 -> 1 transition elects the
    /// submitter that schedules the runner; the 1 -> 0 transition retires
    /// it. AcqRel on both sides orders section bodies across threads.
    pending: AtomicUsize,
    self_ref: Weak<Strand>,
}

// === impl Strand ===

impl Strand {
    #[must_use]
    pub fn new(underlying: SchedulerRef) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            underlying,
            chain: MpscQueue::new_with_stub(TaskStub::allocate()),
            pending: AtomicUsize::new(0),
            self_ref: self_ref.clone(),
        })
    }

    #[must_use]
    pub fn underlying(&self) -> &SchedulerRef {
        &self.underlying
    }

    fn schedule_runner(self: Arc<Self>) {
        let underlying = self.underlying.clone();
        task::submit(&underlying, move || self.run_batch());
    }

    fn run_batch(self: Arc<Self>) {
        let mut ran = 0;
        loop {
            let mut boff = Backoff::new();
            let section = loop {
                match self.chain.try_dequeue() {
                    Ok(section) => break section,
                    // `pending` proved a section was enqueued; a wait-free
                    // submitter is between its tail swap and the link store.
                    Err(TryDequeueError::Inconsistent | TryDequeueError::Empty) => boff.spin(),
                    Err(TryDequeueError::Busy) => {
                        unreachable!("a strand has at most one live runner")
                    }
                }
            };

            section.run();
            ran += 1;

            if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                // Chain drained; the next submitter becomes the new head.
                tracing::trace!(ran, "strand runner retired");
                return;
            }

            if ran == BATCH_LIMIT {
                // More sections pending: yield the worker thread and come
                // back. `pending` never hit zero, so no second runner can
                // have been scheduled.
                tracing::trace!(ran, "strand runner re-submitted");
                self.schedule_runner();
                return;
            }
        }
    }
}

impl Schedule for Strand {
    fn submit(&self, section: TaskRef) {
        self.chain.enqueue(section);
        if self.pending.fetch_add(1, Ordering::AcqRel) == 0 {
            let this = self
                .self_ref
                .upgrade()
                .expect("strand outlives its submitters");
            this.schedule_runner();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::{ManualLoop, ThreadPool};
    use std::cell::UnsafeCell;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    /// A counter without internal synchronization; the strand's mutual
    /// exclusion and ordering guarantees are what keep it coherent.
    struct RacyCounter(UnsafeCell<u64>);

    // Safety: incremented only inside strand critical sections.
    unsafe impl Sync for RacyCounter {}
    // Safety: plain u64 payload.
    unsafe impl Send for RacyCounter {}

    impl RacyCounter {
        fn bump(&self) {
            unsafe { *self.0.get() += 1 };
        }

        fn get(&self) -> u64 {
            unsafe { *self.0.get() }
        }
    }

    #[test]
    fn serializes_unsynchronized_increments() {
        let pool = ThreadPool::with_launch(4);
        let strand = Strand::new(pool.clone());
        let counter = Arc::new(RacyCounter(UnsafeCell::new(0)));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let strand = strand.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        let counter = counter.clone();
                        task::submit(&*strand, move || counter.bump());
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }

        pool.stop();
        assert_eq!(counter.get(), 1_000);
    }

    #[test]
    fn fifo_on_manual_loop() {
        let lp = Arc::new(ManualLoop::new());
        let strand = Strand::new(lp.clone() as SchedulerRef);
        let order = Arc::new(weft_spin::Mutex::new(Vec::new()));

        for i in 0..300 {
            let order = order.clone();
            task::submit(&*strand, move || order.lock().push(i));
        }

        // Drive the underlying loop until every section ran; the runner
        // re-submits itself after each batch.
        while lp.run() != 0 {}

        let order = order.lock();
        assert_eq!(order.len(), 300);
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn at_most_one_runner() {
        let pool = ThreadPool::with_launch(4);
        let strand = Strand::new(pool.clone());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        for _ in 0..500 {
            let inside = inside.clone();
            let overlaps = overlaps.clone();
            task::submit(&*strand, move || {
                if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                inside.fetch_sub(1, Ordering::SeqCst);
            });
        }

        pool.stop();
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
