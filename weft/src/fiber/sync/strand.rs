// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::fiber::sync::Mutex;

/// Serialized critical sections for fibers.
///
/// [`combine`][Strand::combine] runs the closure in a critical section:
/// sections submitted from different fibers never overlap and admission is
/// FIFO-fair. Unlike the scheduler-level [`Strand`](crate::sched::Strand),
/// the caller stays in its own fiber and receives the closure's result.
pub struct Strand {
    serial: Mutex<()>,
}

// === impl Strand ===

impl Strand {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            serial: Mutex::new(()),
        }
    }

    /// Runs `section` exclusively against every other `combine` on this
    /// strand.
    ///
    /// Precondition: called from a fiber.
    pub fn combine<R>(&self, section: impl FnOnce() -> R) -> R {
        let _guard = self.serial.lock();
        section()
    }
}

impl Default for Strand {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber;
    use crate::sched::{SchedulerRef, ThreadPool};
    use std::cell::UnsafeCell;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Unsynced(UnsafeCell<u64>);
    // Safety: mutated only inside strand sections.
    unsafe impl Sync for Unsynced {}
    // Safety: plain u64 payload.
    unsafe impl Send for Unsynced {}

    #[test]
    fn combine_serializes() {
        let pool = ThreadPool::with_launch(4);
        let sched: SchedulerRef = pool.clone();
        let strand = Arc::new(Strand::new());
        let value = Arc::new(Unsynced(UnsafeCell::new(0)));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let (st, v, d) = (strand.clone(), value.clone(), done.clone());
            fiber::go(&sched, move || {
                for _ in 0..100 {
                    st.combine(|| unsafe { *v.0.get() += 1 });
                }
                d.fetch_add(1, Ordering::SeqCst);
            });
        }

        while done.load(Ordering::SeqCst) != 4 {
            std::thread::yield_now();
        }
        pool.stop();
        assert_eq!(unsafe { *value.0.get() }, 400);
    }
}
