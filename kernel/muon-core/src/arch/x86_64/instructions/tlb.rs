//! TLB invalidation.

use crate::addr::VirtAddr;

/// Invalidates the TLB entry for a single page (`invlpg`).
#[inline]
pub fn flush(addr: VirtAddr) {
    // SAFETY: Invalidating a TLB entry has no effect other than forcing the
    // next access to re-walk the page tables.
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) addr.as_u64(), options(nostack, preserves_flags));
    }
}

/// Flushes the entire TLB (except global entries) by reloading CR3.
#[inline]
pub fn flush_all() {
    let cr3 = crate::arch::x86_64::registers::control::read_cr3();
    // SAFETY: Writing back the current CR3 value only flushes the TLB.
    unsafe { crate::arch::x86_64::registers::control::write_cr3(cr3) };
}
