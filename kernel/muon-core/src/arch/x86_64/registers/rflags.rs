//! RFLAGS register access.

/// Reads the RFLAGS register.
#[inline]
#[must_use]
pub fn read() -> u64 {
    let flags: u64;
    // SAFETY: Pushing and popping RFLAGS has no lasting side effects.
    unsafe {
        core::arch::asm!("pushfq", "pop {}", out(reg) flags, options(nomem, preserves_flags));
    }
    flags
}
