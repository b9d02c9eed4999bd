// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::thread::{self, Thread};
use weft_spin::Mutex;

/// A one-shot event for blocking a thread until another thread fires it.
///
/// After the waiter has observed the event as set, the firing side performs
/// no further access to the event's memory (the final unpark only touches a
/// cloned [`Thread`] handle), so the event may live on the waiter's stack.
#[derive(Debug, Default)]
pub struct Event {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    set: bool,
    waiter: Option<Thread>,
}

// === impl Event ===

impl Event {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                set: false,
                waiter: None,
            }),
        }
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.lock().set
    }

    /// Blocks the calling thread until [`fire`][Event::fire] has been called.
    ///
    /// Single waiter: a later registration replaces an earlier one.
    pub fn wait(&self) {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.set {
                    return;
                }
                inner.waiter = Some(thread::current());
            }
            thread::park();
        }
    }

    /// Fires the event, waking the waiter if there is one.
    ///
    /// # Panics
    ///
    /// Panics if the event is fired a second time.
    pub fn fire(&self) {
        let waiter = {
            let mut inner = self.inner.lock();
            assert!(!inner.set, "event was fired a second time");
            inner.set = true;
            inner.waiter.take()
        };

        // Past this point the event's memory is no longer touched.
        if let Some(waiter) = waiter {
            waiter.unpark();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fire_then_wait() {
        let ev = Event::new();
        ev.fire();
        assert!(ev.is_set());
        ev.wait();
    }

    #[test]
    fn wakes_blocked_waiter() {
        let ev = Arc::new(Event::new());
        let firer = {
            let ev = ev.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                ev.fire();
            })
        };

        ev.wait();
        assert!(ev.is_set());
        firer.join().unwrap();
    }
}
