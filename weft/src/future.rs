// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Eager future pipelines.
//!
//! A future is a handle to a value that will be produced later. Pipelines
//! are built by method chaining: every combinator consumes its input future
//! and returns a new one, until a terminal operation ([`Future::get`],
//! [`Future::detach`]) installs the final callback.
//!
//! The shared state behind a future holds a result slot (filled by the
//! producer), a callback slot (filled by the consumer) and a scheduler;
//! whichever side arrives second submits the state as a task, and running it
//! delivers the result into the callback *on that scheduler*.
//!
//! Errors are opaque: any panic inside a user callable is captured into an
//! [`Error`] and flows past `map`/`flat_map` stages untouched until a
//! `recover` stage or a terminal observes it.

mod after;
mod concur;
mod error;
mod make;
mod map;
mod state;
mod terminate;
mod types;

pub use concur::{AllTuple, all, first};
pub use error::{BROKEN_PROMISE, Error, Result};
pub use make::{failure, just, spawn, value};
pub use map::{CallWith, IntoFutureOn};
pub use types::{Future, Promise, SemiFuture, contract};
