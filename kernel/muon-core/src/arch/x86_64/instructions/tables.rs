//! Descriptor table load instructions (`lgdt`, `lidt`).

use crate::arch::x86_64::structures::gdt::DescriptorTablePointer;

/// Loads a GDT (`lgdt`).
///
/// # Safety
///
/// `ptr` must describe a valid GDT that lives for as long as it is active.
#[inline]
pub unsafe fn lgdt(ptr: &DescriptorTablePointer) {
    // SAFETY: Caller contract.
    unsafe {
        core::arch::asm!("lgdt [{}]", in(reg) ptr, options(readonly, nostack, preserves_flags));
    }
}

/// Loads an IDT (`lidt`).
///
/// # Safety
///
/// `ptr` must describe a valid IDT that lives for as long as it is active.
#[inline]
pub unsafe fn lidt(ptr: &DescriptorTablePointer) {
    // SAFETY: Caller contract.
    unsafe {
        core::arch::asm!("lidt [{}]", in(reg) ptr, options(readonly, nostack, preserves_flags));
    }
}
