//! Segment register loads.

use crate::arch::x86_64::structures::gdt::SegmentSelector;

/// Sets the code segment register via a far return.
///
/// # Safety
///
/// `selector` must reference a valid 64-bit code descriptor in the
/// currently loaded GDT.
#[inline]
pub unsafe fn set_cs(selector: SegmentSelector) {
    // SAFETY: Caller contract. The push/retfq pair reloads CS with the new
    // selector while continuing at the next instruction.
    unsafe {
        core::arch::asm!(
            "push {sel}",
            "lea {tmp}, [55f + rip]",
            "push {tmp}",
            "retfq",
            "55:",
            sel = in(reg) u64::from(selector.bits()),
            tmp = lateout(reg) _,
            options(preserves_flags),
        );
    }
}

macro_rules! segment_load {
    ($(#[$attr:meta])* $name:ident, $reg:literal) => {
        $(#[$attr])*
        #[inline]
        pub unsafe fn $name(selector: SegmentSelector) {
            // SAFETY: Caller contract.
            unsafe {
                core::arch::asm!(
                    concat!("mov ", $reg, ", {0:x}"),
                    in(reg) selector.bits(),
                    options(nostack, preserves_flags),
                );
            }
        }
    };
}

segment_load! {
    /// Loads the data segment register.
    ///
    /// # Safety
    ///
    /// `selector` must reference a valid data descriptor (or null).
    load_ds, "ds"
}
segment_load! {
    /// Loads the extra segment register.
    ///
    /// # Safety
    ///
    /// `selector` must reference a valid data descriptor (or null).
    load_es, "es"
}
segment_load! {
    /// Loads the FS segment register.
    ///
    /// # Safety
    ///
    /// `selector` must reference a valid data descriptor (or null).
    load_fs, "fs"
}
segment_load! {
    /// Loads the GS segment register.
    ///
    /// # Safety
    ///
    /// `selector` must reference a valid data descriptor (or null).
    load_gs, "gs"
}
segment_load! {
    /// Loads the stack segment register.
    ///
    /// # Safety
    ///
    /// `selector` must reference a valid data descriptor (or null).
    load_ss, "ss"
}

/// Loads the task register (`ltr`).
///
/// # Safety
///
/// `selector` must reference a valid TSS descriptor in the current GDT.
#[inline]
pub unsafe fn load_tss(selector: SegmentSelector) {
    // SAFETY: Caller contract.
    unsafe {
        core::arch::asm!("ltr {0:x}", in(reg) selector.bits(), options(nostack, preserves_flags));
    }
}
