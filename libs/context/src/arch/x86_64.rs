// Copyright 2026 the weft authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::arch::Entry;
use core::arch::naked_asm;

pub const STACK_ALIGNMENT: usize = 16;

/// Saved frame layout, low to high: r15, r14, r13, r12, rbx, rbp, return
/// address. `switch_context` pushes and pops exactly these, so a fresh frame
/// only has to park the entry function and its argument in two of the
/// callee-saved slots and point the return address at the trampoline.
const FRAME_WORDS: usize = 7;

const R13_ARG: usize = 2;
const RBX_ENTRY: usize = 4;
const RET_ADDR: usize = 6;

/// Builds the initial frame for a fresh context at `top` and returns the
/// stack pointer to store in its slot.
///
/// # Safety
///
/// `top` must be the 16-aligned top of a writable stack with room for the
/// frame.
pub unsafe fn init_stack(top: usize, entry: Entry, arg: *mut ()) -> usize {
    let sp = top - FRAME_WORDS * 8;
    let frame = sp as *mut usize;

    // Safety: the frame lies within the usable stack region per the caller.
    unsafe {
        for word in 0..FRAME_WORDS {
            frame.add(word).write(0);
        }
        frame.add(R13_ARG).write(arg as usize);
        frame.add(RBX_ENTRY).write(entry as usize);
        frame.add(RET_ADDR).write(stack_entry_trampoline as usize);
    }

    sp
}

/// First instruction stream a fresh context executes: `switch_context`'s
/// epilogue returned here with the entry function in `rbx` and its argument
/// in `r13` (see `init_stack`).
#[unsafe(naked)]
unsafe extern "C" fn stack_entry_trampoline() {
    naked_asm! {
        // Argument for the entry function.
        "mov rdi, r13",
        // Terminate the frame-pointer chain so backtraces stop here.
        "xor ebp, ebp",
        // The ABI wants rsp % 16 == 0 at the call site.
        "and rsp, -16",
        "call rbx",
        // The entry function never returns.
        "ud2",
    }
}

/// Saves the callee-saved register state of the caller into `*from` and
/// resumes the state read from `*to`.
///
/// `from` and `to` may point at the same slot: the resume target is read
/// before the saved state is published.
///
/// # Safety
///
/// `*to` must hold a stack pointer produced by `init_stack` or by an earlier
/// `switch_context` save, and the stack it points into must still be live.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(from: *mut usize, to: *const usize) {
    naked_asm! {
        // Callee-saved registers the System V ABI makes us preserve. rbx and
        // rbp cannot be clobber-listed, and a naked function could not use a
        // clobber list anyway, so the whole set is pushed by hand.
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        // Read the resume target before storing, `from` and `to` may alias.
        "mov rax, [rsi]",
        "mov [rdi], rsp",
        "mov rsp, rax",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    }
}
