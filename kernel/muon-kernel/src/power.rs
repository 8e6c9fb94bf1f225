//! Shutdown capability.
//!
//! An ACPI collaborator may register real poweroff/reboot routines at
//! init. Without one, [`poweroff`] degrades to a halt and [`reboot`]
//! falls back to the keyboard-controller reset pulse; neither ever
//! panics or returns.

use core::sync::atomic::{AtomicPtr, Ordering};

/// A registered power routine; must not return.
pub type PowerFn = fn() -> !;

static POWEROFF_FN: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());
static REBOOT_FN: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Registers the collaborator-provided poweroff routine.
pub fn register_poweroff(f: PowerFn) {
    POWEROFF_FN.store(f as *mut (), Ordering::Release);
}

/// Registers the collaborator-provided reboot routine.
pub fn register_reboot(f: PowerFn) {
    REBOOT_FN.store(f as *mut (), Ordering::Release);
}

fn registered(slot: &AtomicPtr<()>) -> Option<PowerFn> {
    let ptr = slot.load(Ordering::Acquire);
    if ptr.is_null() {
        return None;
    }
    // SAFETY: Only valid `PowerFn` pointers are stored.
    Some(unsafe { core::mem::transmute::<*mut (), PowerFn>(ptr) })
}

/// Powers the machine off, or halts forever when no collaborator is
/// registered.
pub fn poweroff() -> ! {
    if let Some(f) = registered(&POWEROFF_FN) {
        f();
    }
    muon_core::kwarn!("power: no poweroff routine registered; halting");
    crate::panic::halt_forever()
}

/// Reboots the machine: the registered routine when present, otherwise
/// the 8042 reset pulse, otherwise a halt.
pub fn reboot() -> ! {
    if let Some(f) = registered(&REBOOT_FN) {
        f();
    }

    muon_core::arch::x86_64::instructions::interrupts::disable();
    // Pulse the keyboard controller's CPU-reset line.
    let port = muon_core::arch::x86_64::Port::<u8>::new(0x64);
    for _ in 0..32 {
        // SAFETY: Writing 0xFE to the 8042 command port asserts reset;
        // on success this instruction never completes.
        unsafe { port.write(0xFE) };
    }
    crate::panic::halt_forever()
}
