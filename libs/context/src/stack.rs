// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::arch::STACK_ALIGNMENT;
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::io::Error;
use std::{fmt, ptr};

/// Address within (or one past) a stack mapping.
pub type StackPointer = NonZeroUsize;

/// Minimum usable size of a stack, excluding the guard page.
pub const MIN_STACK_SIZE: usize = 4096;

/// A stack mapping with one inaccessible guard page at its low end.
///
/// The whole region is reserved with `PROT_NONE` and everything above the
/// guard page is then made readable and writable, so an overflow runs into
/// the protected page and traps instead of scribbling over neighbouring
/// allocations.
pub struct Stack {
    top: StackPointer,
    mmap_len: usize,
}

// Safety: the mapping is process-global memory; ownership of the handle moves
// freely between threads.
unsafe impl Send for Stack {}

// === impl Stack ===

impl Stack {
    /// Maps a new stack with at least `size` usable bytes.
    ///
    /// # Errors
    ///
    /// Returns the `mmap`/`mprotect` error if the kernel refuses the mapping.
    pub fn allocate(size: usize) -> std::io::Result<Self> {
        // Apply minimum stack size.
        let size = size.max(MIN_STACK_SIZE);

        // Add a guard page to the requested size and round the total up to a
        // page boundary.
        let page_size = page_size();
        let mmap_len = size
            .checked_add(page_size + page_size - 1)
            .expect("integer overflow while calculating stack size")
            & !(page_size - 1);

        // OpenBSD requires MAP_STACK on anything that is used as a stack.
        cfg_if::cfg_if! {
            if #[cfg(target_os = "openbsd")] {
                let map_flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_STACK;
            } else {
                let map_flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE;
            }
        }

        // Safety: anonymous mapping, no existing memory is touched.
        unsafe {
            // Reserve address space for guard page + stack.
            let mmap = libc::mmap(ptr::null_mut(), mmap_len, libc::PROT_NONE, map_flags, -1, 0);
            if mmap == libc::MAP_FAILED {
                return Err(Error::last_os_error());
            }

            // Create the result here so the mapping is released if the
            // mprotect below fails.
            let out = Self {
                top: StackPointer::new(mmap as usize + mmap_len).unwrap(),
                mmap_len,
            };

            // Make everything except the guard page writable.
            if libc::mprotect(
                mmap.cast::<u8>().add(page_size).cast(),
                mmap_len - page_size,
                libc::PROT_READ | libc::PROT_WRITE,
            ) != 0
            {
                return Err(Error::last_os_error());
            }

            debug_assert_eq!(out.top.get() % STACK_ALIGNMENT, 0);
            Ok(out)
        }
    }

    /// Highest address of the stack; execution starts here and grows down.
    #[must_use]
    pub fn top(&self) -> StackPointer {
        self.top
    }

    /// Lowest address of the mapping, including the guard page.
    #[must_use]
    pub fn bottom(&self) -> StackPointer {
        StackPointer::new(self.top.get() - self.mmap_len).unwrap()
    }

    /// Usable bytes between the guard page and [`top`][Self::top].
    #[must_use]
    pub fn size(&self) -> usize {
        self.mmap_len - page_size()
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let mmap = self.top.get() - self.mmap_len;
        // Safety: we own the mapping and nothing runs on it anymore.
        let ret = unsafe { libc::munmap(mmap as _, self.mmap_len) };
        debug_assert_eq!(ret, 0);
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &format_args!("{:#x}", self.bottom()))
            .field("top", &format_args!("{:#x}", self.top))
            .finish()
    }
}

/// System page size, cached after the first query.
pub fn page_size() -> usize {
    static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

    let mut size = PAGE_SIZE.load(Ordering::Relaxed);
    if size == 0 {
        // Safety: plain sysconf query.
        #[expect(clippy::cast_sign_loss, reason = "page size is positive")]
        {
            size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        }
        assert!(size.is_power_of_two());
        PAGE_SIZE.store(size, Ordering::Relaxed);
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let stack = Stack::allocate(MIN_STACK_SIZE).unwrap();

        assert_eq!(stack.top().get() % STACK_ALIGNMENT, 0);
        assert!(stack.size() >= MIN_STACK_SIZE);
        // The guard page sits between bottom and the usable region.
        assert_eq!(
            stack.top().get() - stack.size() - page_size(),
            stack.bottom().get()
        );
    }

    #[test]
    fn usable_region_is_writable() {
        let stack = Stack::allocate(MIN_STACK_SIZE).unwrap();

        // Touch the first and last usable bytes.
        let lowest = (stack.bottom().get() + page_size()) as *mut u8;
        let highest = (stack.top().get() - 1) as *mut u8;
        unsafe {
            lowest.write(0xAA);
            highest.write(0xBB);
            assert_eq!(lowest.read(), 0xAA);
            assert_eq!(highest.read(), 0xBB);
        }
    }
}
