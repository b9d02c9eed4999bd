// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An asynchronous execution runtime.
//!
//! weft couples four subsystems:
//!
//! - **task dispatch** ([`task`], [`sched`]): a one-shot intrusive task
//!   object model, scheduler capabilities, a worker thread pool and a
//!   manually driven loop;
//! - **strand** ([`sched::Strand`]): a wait-free decorator that serializes
//!   critical sections on top of any scheduler, without locks;
//! - **fibers** ([`fiber`]): stackful cooperative threads scheduled as
//!   tasks, with synchronization primitives that suspend fibers instead of
//!   threads;
//! - **futures** ([`future`]): eager future pipelines, values produced by a
//!   [`Promise`][future::Promise], transformed by combinators, and delivered
//!   to a callback on a chosen scheduler.
//!
//! ```
//! use weft::future;
//! use weft::sched::{SchedulerRef, ThreadPool};
//!
//! let pool = ThreadPool::with_launch(2);
//! let sched: SchedulerRef = pool.clone();
//!
//! let v = future::just()
//!     .via(&sched)
//!     .map(|()| 1)
//!     .map(|x| x + 1)
//!     .get();
//! assert_eq!(v, 2);
//!
//! pool.stop();
//! ```

pub mod fiber;
pub mod future;
pub mod sched;
pub mod sync;
pub mod task;
