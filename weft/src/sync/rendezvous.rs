// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::sync::atomic::{AtomicBool, Ordering};

/// A two-party arrival flag.
///
/// Each party calls [`arrive`][Rendezvous::arrive] exactly once; the second
/// arrival returns `true` and synchronizes with everything the first party
/// published before its own arrival.
#[derive(Debug, Default)]
pub struct Rendezvous {
    both: AtomicBool,
}

// === impl Rendezvous ===

impl Rendezvous {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            both: AtomicBool::new(false),
        }
    }

    /// Returns true if the rendezvous took place.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.both.load(Ordering::Acquire)
    }

    /// Announces this party's arrival; returns true for the second arrival.
    #[must_use]
    pub fn arrive(&self) -> bool {
        self.both
            .compare_exchange(false, true, Ordering::Release, Ordering::Acquire)
            .is_err()
    }

    /// In case of instance reuse.
    pub fn reset(&self) {
        self.both.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_arrival_wins() {
        let r = Rendezvous::new();
        assert!(!r.is_ready());
        assert!(!r.arrive());
        assert!(r.is_ready());
        assert!(r.arrive());

        r.reset();
        assert!(!r.arrive());
    }
}
