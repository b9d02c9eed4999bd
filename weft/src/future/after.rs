// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::future::{Future, SemiFuture, contract};
use core::time::Duration;

impl<V: Send + 'static> SemiFuture<V> {
    /// Defers result delivery by `delay`.
    ///
    /// No timer reactor is attached yet, so a nonzero delay still delivers
    /// on the spot; a zero delay is the identity.
    pub fn after(self, delay: Duration) -> SemiFuture<V> {
        if delay.is_zero() {
            return self;
        }

        let (next, p) = contract::<V>();

        self.via_inline().set_callback(move |res| {
            let deliver = move || p.set_result(res);
            // Without a timer the deferred delivery runs immediately; a
            // timer wheel would take `deliver` and `delay` instead.
            deliver();
        });

        next
    }
}

impl<V: Send + 'static> Future<V> {
    /// Defers result delivery by `delay`, keeping this future's scheduler.
    pub fn after(self, delay: Duration) -> Future<V> {
        let where_ = self.scheduler();
        self.into_semi().after(delay).via(&where_)
    }
}
