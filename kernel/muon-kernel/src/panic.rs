//! Panic handling and the terminal halt.

use core::panic::PanicInfo;

/// Disables interrupts and parks the CPU permanently.
pub fn halt_forever() -> ! {
    muon_core::arch::x86_64::instructions::interrupts::disable();
    loop {
        muon_core::arch::x86_64::instructions::interrupts::hlt();
    }
}

/// Rust panics are kernel-fatal: dump the message and location, then halt.
#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo<'_>) -> ! {
    muon_core::kfatal!("KERNEL PANIC: {}", info.message());
    if let Some(location) = info.location() {
        muon_core::kfatal!("  at {}:{}", location.file(), location.line());
    }
    halt_forever()
}
