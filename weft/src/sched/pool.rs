// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::sched::{Schedule, SubmitError, TrySchedule};
use crate::task::TaskRef;
use core::fmt;
use core::panic::AssertUnwindSafe;
use core::sync::atomic::{AtomicU8, Ordering};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

const CREATED: u8 = 0;
const STARTED: u8 = 1;
const STOPPED: u8 = 2;

/// A fixed-size pool of worker threads sharing one closable blocking queue.
///
/// Lifecycle: `new` → [`start`][ThreadPool::start] → [`stop`][ThreadPool::stop].
/// Submitting requires a started pool; `stop` closes the queue, lets the
/// workers drain it and joins them. Dropping a started pool without stopping
/// it is a programming error.
pub struct ThreadPool {
    queue: BlockingQueue,
    state: AtomicU8,
    worker_count: usize,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

thread_local! {
    static CURRENT_POOL: RefCell<Option<Arc<ThreadPool>>> = const { RefCell::new(None) };
}

// === impl ThreadPool ===

impl ThreadPool {
    /// Creates a pool with `min(workers, available_parallelism)` workers.
    ///
    /// # Panics
    ///
    /// Panics if `workers` is zero.
    #[must_use]
    pub fn new(workers: usize) -> Arc<Self> {
        assert!(workers != 0, "a thread pool requires at least one worker");

        let available = thread::available_parallelism().map_or(0, |n| n.get());
        let worker_count = if available == 0 || workers < available {
            workers
        } else {
            available
        };

        Arc::new(Self {
            queue: BlockingQueue::new(),
            state: AtomicU8::new(CREATED),
            worker_count,
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Creates a pool and immediately starts it.
    #[must_use]
    pub fn with_launch(workers: usize) -> Arc<Self> {
        let pool = Self::new(workers);
        pool.start();
        pool
    }

    /// The pool the calling worker thread belongs to, if any.
    #[must_use]
    pub fn current() -> Option<Arc<ThreadPool>> {
        CURRENT_POOL.with(|current| current.borrow().clone())
    }

    /// Spawns the worker threads.
    ///
    /// # Panics
    ///
    /// Panics if the pool has already been started.
    pub fn start(self: &Arc<Self>) {
        let prev = self
            .state
            .compare_exchange(CREATED, STARTED, Ordering::AcqRel, Ordering::Acquire);
        assert!(prev.is_ok(), "thread pool has already been started");

        tracing::debug!(workers = self.worker_count, "starting thread pool");

        let mut workers = self.workers.lock().unwrap();
        for index in 0..self.worker_count {
            let pool = self.clone();
            let handle = thread::Builder::new()
                .name(format!("weft-worker-{index}"))
                .spawn(move || pool.work_loop())
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }
    }

    /// Waits for all submitted tasks to complete and joins the workers.
    ///
    /// # Panics
    ///
    /// Panics if the pool is not started.
    pub fn stop(&self) {
        let prev = self
            .state
            .compare_exchange(STARTED, STOPPED, Ordering::AcqRel, Ordering::Acquire);
        assert!(prev.is_ok(), "stopping a thread pool that is not started");

        self.queue.close();

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in workers {
            handle.join().expect("worker thread panicked");
        }

        tracing::debug!("thread pool stopped");
    }

    fn work_loop(self: Arc<Self>) {
        tracing::trace!(worker = ?thread::current().name(), "worker started");
        CURRENT_POOL.with(|current| *current.borrow_mut() = Some(self.clone()));

        while let Some(task) = self.queue.pop() {
            // A panic escaping a task would poison the whole pool; treat it
            // as fatal, like the future layer treats its own panics as
            // errors and never lets them reach the worker.
            if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
                let msg = payload_str(&payload);
                tracing::error!(panic = msg, "panic escaped a pool task");
                std::process::abort();
            }
        }

        CURRENT_POOL.with(|current| *current.borrow_mut() = None);
        tracing::trace!(worker = ?thread::current().name(), "worker exited");
    }
}

fn payload_str(payload: &(dyn core::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

impl Schedule for ThreadPool {
    fn submit(&self, task: TaskRef) {
        assert_eq!(
            self.state.load(Ordering::Acquire),
            STARTED,
            "submitting to a thread pool that is not started"
        );
        let pushed = self.queue.push(task);
        debug_assert!(pushed.is_ok(), "queue closed under a started pool");
    }
}

impl TrySchedule for ThreadPool {
    fn try_submit(&self, task: TaskRef) -> Result<(), SubmitError> {
        if self.state.load(Ordering::Acquire) != STARTED {
            return Err(SubmitError::new(task, "thread pool is not started"));
        }
        self.queue
            .push(task)
            .map_err(|task| SubmitError::new(task, "thread pool queue is closed"))
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let state = self.state.load(Ordering::Acquire);
        assert!(
            state != STARTED,
            "thread pool was not stopped before destruction"
        );
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.worker_count)
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Non-intrusive FIFO guarded by a mutex and a condition variable.
struct BlockingQueue {
    inner: Mutex<QueueInner>,
    has_tasks: Condvar,
}

struct QueueInner {
    tasks: VecDeque<TaskRef>,
    waiters: u32,
    closed: bool,
}

// === impl BlockingQueue ===

impl BlockingQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                tasks: VecDeque::new(),
                waiters: 0,
                closed: false,
            }),
            has_tasks: Condvar::new(),
        }
    }

    /// Enqueues a task; hands it back if the queue has been closed.
    fn push(&self, task: TaskRef) -> Result<(), TaskRef> {
        let waiters = {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return Err(task);
            }
            inner.tasks.push_back(task);
            inner.waiters
        };

        if waiters != 0 {
            self.has_tasks.notify_one();
        }
        Ok(())
    }

    /// Blocks for the next task; `None` once the queue is closed and empty.
    fn pop(&self) -> Option<TaskRef> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(task) = inner.tasks.pop_front() {
                return Some(task);
            }
            if inner.closed {
                return None;
            }
            inner.waiters += 1;
            inner = self.has_tasks.wait(inner).unwrap();
            inner.waiters -= 1;
        }
    }

    fn close(&self) {
        let waiters = {
            let mut inner = self.inner.lock().unwrap();
            assert!(!inner.closed, "queue is already closed");
            inner.closed = true;
            inner.waiters
        };

        if waiters != 0 {
            self.has_tasks.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn all_tasks_run_before_stop_returns() {
        let pool = ThreadPool::with_launch(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..1_000 {
            let counter = counter.clone();
            task::submit(&pool, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 1_000);
    }

    #[test]
    fn current_is_set_inside_workers() {
        let pool = ThreadPool::with_launch(1);
        let seen = Arc::new(AtomicUsize::new(0));

        let (p, s) = (pool.clone(), seen.clone());
        task::submit(&pool, move || {
            if ThreadPool::current().is_some_and(|cur| Arc::ptr_eq(&cur, &p)) {
                s.fetch_add(1, Ordering::SeqCst);
            }
        });

        pool.stop();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(ThreadPool::current().is_none());
    }

    #[test]
    fn try_submit_fails_after_stop() {
        let pool = ThreadPool::with_launch(1);
        pool.stop();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let task = task::closure_task(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let err = pool.try_submit(task).unwrap_err();
        drop(err);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn submissions_from_workers() {
        let pool = ThreadPool::with_launch(2);
        let counter = Arc::new(AtomicUsize::new(0));

        let (p, c) = (pool.clone(), counter.clone());
        task::submit(&pool, move || {
            for _ in 0..10 {
                let c = c.clone();
                task::submit(&p, move || {
                    c.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        // Give the inner submissions time to land before closing.
        while counter.load(Ordering::SeqCst) != 10 {
            thread::yield_now();
        }
        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
