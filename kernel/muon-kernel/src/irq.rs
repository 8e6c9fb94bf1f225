//! Hardware IRQ dispatch.
//!
//! A fixed table of handler slots, one per legacy IRQ line. The dispatch
//! path consults the PIC's spurious predicate first: a spurious arrival
//! invokes no handler and sends no end-of-interrupt (the PIC driver
//! already acknowledged the cascade where required). A genuine arrival
//! runs the registered handler, then issues EOI.
//!
//! Dispatch is generic over the PIC bus so the policy is testable against
//! a simulated controller.

use core::sync::atomic::{AtomicPtr, Ordering};

use muon_drivers::pic::{IRQ_LINES, Pic, PicBus};

/// IRQ handler signature: receives the IRQ line number (0..15).
pub type IrqHandler = fn(u8);

/// Errors from handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqError {
    /// The line number is outside 0..15.
    InvalidLine,
    /// Another handler already owns this line.
    AlreadyRegistered,
}

/// The registered-handler table for the 16 legacy lines.
pub struct HandlerTable {
    slots: [AtomicPtr<()>; IRQ_LINES as usize],
}

impl HandlerTable {
    /// Creates a table with every slot empty.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [const { AtomicPtr::new(core::ptr::null_mut()) }; IRQ_LINES as usize],
        }
    }

    /// Registers a handler for an IRQ line.
    pub fn register(&self, irq: u8, handler: IrqHandler) -> Result<(), IrqError> {
        if irq >= IRQ_LINES {
            return Err(IrqError::InvalidLine);
        }
        self.slots[irq as usize]
            .compare_exchange(
                core::ptr::null_mut(),
                handler as *mut (),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| IrqError::AlreadyRegistered)
    }

    /// Removes the handler for an IRQ line.
    pub fn unregister(&self, irq: u8) {
        if irq < IRQ_LINES {
            self.slots[irq as usize].store(core::ptr::null_mut(), Ordering::Release);
        }
    }

    fn handler(&self, irq: u8) -> Option<IrqHandler> {
        let ptr = self.slots[irq as usize].load(Ordering::Acquire);
        if ptr.is_null() {
            return None;
        }
        // SAFETY: Only valid `IrqHandler` pointers are stored.
        Some(unsafe { core::mem::transmute::<*mut (), IrqHandler>(ptr) })
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatches one IRQ arrival: spurious filtering, handler lookup, EOI.
pub fn dispatch<B: PicBus>(pic: &mut Pic<B>, handlers: &HandlerTable, irq: u8) {
    if irq >= IRQ_LINES {
        return;
    }
    if pic.is_spurious(irq) {
        // No handler, no EOI. The PIC driver sent the master a cascade
        // EOI for the slave case already.
        return;
    }
    if let Some(handler) = handlers.handler(irq) {
        handler(irq);
    }
    pic.end_of_interrupt(irq);
}
