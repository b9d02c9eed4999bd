// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::sched::{Schedule, SchedulerRef};
use crate::task::TaskRef;
use std::sync::{Arc, LazyLock};

/// Executes tasks immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

// === impl Inline ===

impl Inline {
    /// The process-wide inline scheduler handle.
    pub fn shared() -> SchedulerRef {
        static SHARED: LazyLock<SchedulerRef> = LazyLock::new(|| Arc::new(Inline));
        SHARED.clone()
    }
}

impl Schedule for Inline {
    fn submit(&self, task: TaskRef) {
        task.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_at_place() {
        let counter = std::sync::Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        task::submit(&Inline, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        // Ran on this very thread, before `submit` returned.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shared_is_inline() {
        let sched = Inline::shared();
        let ran = std::sync::Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        task::submit(&sched, move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
