//! Reading the registers a walk starts from.
//!
//! These are `#[inline(always)]` so the values belong to the caller's frame
//! and not to a frame of their own.

use core::arch::asm;

#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn stack_pointer() -> u64 {
    let mut out: u64;
    unsafe {
        asm!(
            "mov {out}, rsp",
            out = out(reg) out,
            options(nomem, nostack, preserves_flags)
        );
    }
    out
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn frame_pointer() -> u64 {
    let mut out: u64;
    unsafe {
        asm!(
            "mov {out}, rbp",
            out = out(reg) out,
            options(nomem, nostack, preserves_flags)
        );
    }
    out
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn program_counter() -> u64 {
    let mut out: u64;
    unsafe {
        asm!(
            "lea {out}, [rip]",
            out = out(reg) out,
            options(nomem, nostack, preserves_flags),
        );
    }
    out
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn stack_pointer() -> u64 {
    let mut out: u64;
    unsafe {
        asm!(
            "mov {out}, sp",
            out = out(reg) out,
            options(nomem, nostack, preserves_flags)
        );
    }
    out
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn frame_pointer() -> u64 {
    let mut out: u64;
    unsafe {
        asm!(
            "mov {out}, x29",
            out = out(reg) out,
            options(nomem, nostack, preserves_flags)
        );
    }
    out
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn program_counter() -> u64 {
    let mut out: u64;
    unsafe {
        asm!(
            "adr {out}, .",
            out = out(reg) out,
            options(nomem, nostack, preserves_flags),
        );
    }
    out
}
