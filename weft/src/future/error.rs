// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::any::Any;
use core::fmt;
use core::panic::AssertUnwindSafe;
use std::panic;

/// The message carried by the error a dropped [`Promise`](super::Promise)
/// produces.
pub const BROKEN_PROMISE: &str = "broken promise";

/// An opaque failure carrier.
///
/// An `Error` is a type-erased "thrown object": the payload of a captured
/// panic, or any value handed to [`Error::new`]. It carries no structure
/// beyond its payload; callers that need typed failures encode them in the
/// payload and unpack with [`Error::downcast`] inside a `recover` stage.
pub struct Error {
    payload: Box<dyn Any + Send + 'static>,
}

/// Either a produced value or the [`Error`] that replaced it.
pub type Result<V> = core::result::Result<V, Error>;

// === impl Error ===

impl Error {
    /// Erases an arbitrary value into an error.
    #[must_use]
    pub fn new<T: Send + 'static>(payload: T) -> Self {
        Self {
            payload: Box::new(payload),
        }
    }

    /// Wraps the payload of a caught panic.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Self {
        Self { payload }
    }

    /// Re-raises the error into the host panic path.
    pub fn throw(self) -> ! {
        panic::resume_unwind(self.payload)
    }

    /// Whether the payload is a `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// Recovers the typed payload, or hands the error back.
    pub fn downcast<T: 'static>(self) -> core::result::Result<T, Self> {
        match self.payload.downcast::<T>() {
            Ok(payload) => Ok(*payload),
            Err(payload) => Err(Self { payload }),
        }
    }

    /// The payload as a string, when it is one (panic messages and the
    /// broken-promise error are).
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| self.payload.downcast_ref::<String>().map(String::as_str))
    }

    pub(crate) fn broken_promise() -> Self {
        Self::new(BROKEN_PROMISE)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => f.debug_tuple("Error").field(&msg).finish(),
            None => f.debug_tuple("Error").field(&"<opaque>").finish(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message().unwrap_or("<opaque error>"))
    }
}

/// Runs `f`, capturing a panic as the current error.
pub(crate) fn catching<R>(f: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(Error::from_panic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_payload_round_trips() {
        let e = Error::new(42_i32);
        assert!(e.is::<i32>());
        assert_eq!(e.downcast::<i32>().unwrap(), 42);
    }

    #[test]
    fn messages_surface() {
        assert_eq!(Error::broken_promise().message(), Some(BROKEN_PROMISE));
        assert_eq!(Error::new(7_u8).message(), None);
    }

    #[test]
    fn catching_captures_panics() {
        let res = catching(|| -> i32 { panic!("boom") });
        assert_eq!(res.unwrap_err().message(), Some("boom"));

        assert_eq!(catching(|| 5).unwrap(), 5);
    }

    #[test]
    fn throw_re_raises() {
        let caught = std::panic::catch_unwind(|| Error::new("again").throw());
        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"again"));
    }
}
