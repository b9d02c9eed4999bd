// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use weft_context::Stack;
use weft_spin::Mutex;

/// Stack size for fibers: 1 MiB plus the guard page.
pub(crate) const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// Process-wide LIFO of stacks released by completed fibers.
static CACHE: Mutex<Vec<Stack>> = Mutex::new(Vec::new());

pub(crate) fn acquire() -> Stack {
    if let Some(stack) = CACHE.lock().pop() {
        return stack;
    }
    Stack::allocate(DEFAULT_STACK_SIZE).expect("failed to allocate a fiber stack")
}

pub(crate) fn release(stack: Stack) {
    CACHE.lock().push(stack);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_stacks_are_usable() {
        // The cache is process-global and other tests hit it concurrently,
        // so only shape is asserted, not which mapping comes back.
        let first = acquire();
        assert!(first.size() >= DEFAULT_STACK_SIZE);
        release(first);

        let second = acquire();
        assert!(second.size() >= DEFAULT_STACK_SIZE);
        release(second);
    }
}
