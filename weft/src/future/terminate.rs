// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Terminal operations: the only places a pipeline's callback slot is filled
//! by the user-facing API.

use crate::future::{Future, Result, SemiFuture};
use crate::sync::Event;
use std::sync::Arc;
use weft_spin::Mutex;

struct GetState<V> {
    result: Mutex<Option<Result<V>>>,
    done: Event,
}

impl<V: Send + 'static> Future<V> {
    /// Blocks the calling thread until the future completes.
    pub fn try_get(self) -> Result<V> {
        let state = Arc::new(GetState {
            result: Mutex::new(None),
            done: Event::new(),
        });

        let s = state.clone();
        self.set_callback(move |res| {
            *s.result.lock() = Some(res);
            s.done.fire();
        });

        state.done.wait();
        state
            .result
            .lock()
            .take()
            .expect("future completed without a result")
    }

    /// Blocks the calling thread until the future completes; returns the
    /// value or re-raises the error into the caller's panic path.
    pub fn get(self) -> V {
        match self.try_get() {
            Ok(v) => v,
            Err(e) => e.throw(),
        }
    }

    /// Abandons the pipeline: both values and errors are silently dropped
    /// once produced.
    pub fn detach(self) {
        self.set_callback(|_| ());
    }
}

impl<V: Send + 'static> SemiFuture<V> {
    /// Blocks the calling thread until the future completes.
    pub fn try_get(self) -> Result<V> {
        self.via_inline().try_get()
    }

    /// Blocks the calling thread until the future completes; returns the
    /// value or re-raises the error into the caller's panic path.
    pub fn get(self) -> V {
        self.via_inline().get()
    }

    /// Abandons the pipeline: both values and errors are silently dropped
    /// once produced.
    pub fn detach(self) {
        self.via_inline().detach();
    }
}
