//! x86_64 kernel bring-up: descriptor tables and interrupt plumbing.

pub mod gdt;
pub mod idt;
pub mod interrupts;

/// Installs the GDT/TSS and the IDT, in that order.
///
/// # Safety
///
/// Must run exactly once, before interrupts are enabled.
pub unsafe fn init_tables() {
    // SAFETY: Caller contract.
    unsafe {
        gdt::init();
        idt::init();
    }
}
