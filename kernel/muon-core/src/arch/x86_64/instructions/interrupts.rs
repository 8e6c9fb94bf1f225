//! Interrupt flag and CPU parking instructions.

/// Enables maskable interrupts (`sti`).
///
/// # Safety
///
/// The caller must ensure the IDT and interrupt controllers are set up;
/// otherwise the next interrupt lands in uninitialized gates.
#[inline]
pub unsafe fn enable() {
    // SAFETY: Caller contract.
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack, preserves_flags));
    }
}

/// Disables maskable interrupts (`cli`).
#[inline]
pub fn disable() {
    // SAFETY: Masking interrupts is always safe in ring 0.
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack, preserves_flags));
    }
}

/// Returns `true` if maskable interrupts are currently enabled.
#[inline]
#[must_use]
pub fn are_enabled() -> bool {
    crate::arch::x86_64::registers::rflags::read() & (1 << 9) != 0
}

/// Halts the CPU until the next interrupt (`hlt`).
#[inline]
pub fn hlt() {
    // SAFETY: `hlt` merely parks the CPU; it resumes on the next interrupt.
    unsafe {
        core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
    }
}
