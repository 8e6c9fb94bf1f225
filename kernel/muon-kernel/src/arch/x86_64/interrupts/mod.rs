//! Kernel interrupt state: the PIC pair and the IRQ handler table.

pub mod exceptions;

use muon_core::sync::IrqSpinLock;
use muon_drivers::pic::{Pic, PioBus};

use crate::irq::{HandlerTable, IrqError, IrqHandler};

/// The legacy controller pair.
static PIC: IrqSpinLock<Pic<PioBus>> = IrqSpinLock::new(Pic::new(PioBus));

/// Registered IRQ handlers, one slot per line.
static HANDLERS: HandlerTable = HandlerTable::new();

/// Remaps the PIC away from the exception vectors and masks every line.
///
/// # Safety
///
/// Must run with interrupts disabled, exactly once.
pub unsafe fn init_pic() {
    PIC.lock().remap();
}

/// Registers a handler and unmasks its line.
pub fn register_irq(irq: u8, handler: IrqHandler) -> Result<(), IrqError> {
    HANDLERS.register(irq, handler)?;
    PIC.lock().enable(irq);
    Ok(())
}

/// Masks a line and removes its handler.
pub fn unregister_irq(irq: u8) {
    PIC.lock().disable(irq);
    HANDLERS.unregister(irq);
}

/// Entry point from the IDT stubs for the PIC vector range. Runs in
/// interrupt context.
pub(crate) fn irq_entry(irq: u8) {
    crate::irq::dispatch(&mut PIC.lock(), &HANDLERS, irq);
}
