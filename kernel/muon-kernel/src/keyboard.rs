//! Keyboard wiring: IRQ-side scancode capture, task-side decoding.

use muon_core::sync::IrqSpinLock;
use muon_drivers::keyboard::{Decoder, ScancodeQueue, flush_controller, read_scancode};

/// The IRQ-to-task scancode ring.
static SCANCODES: ScancodeQueue = ScancodeQueue::new();

/// Consumer-side decode state (modifiers, caps lock).
static DECODER: IrqSpinLock<Decoder> = IrqSpinLock::new(Decoder::new());

/// Keyboard IRQ handler: one port read, one ring push. A full ring drops
/// the byte.
fn on_keyboard(_irq: u8) {
    let _ = SCANCODES.push(read_scancode());
}

/// Drains the controller FIFO and registers the keyboard IRQ.
pub fn init() {
    flush_controller();
    crate::arch::x86_64::interrupts::register_irq(1, on_keyboard)
        .expect("keyboard IRQ registered twice");
    muon_core::kinfo!("keyboard: PS/2 on IRQ 1");
}

/// Non-blocking: decodes buffered scancodes until one yields a character.
pub fn try_getchar() -> Option<char> {
    let mut decoder = DECODER.lock();
    while let Some(scancode) = SCANCODES.pop() {
        if let Some(c) = decoder.feed(scancode) {
            return Some(c);
        }
    }
    None
}

/// Blocking read of the next decoded character, parking the CPU between
/// interrupts.
pub fn getchar() -> char {
    loop {
        if let Some(c) = try_getchar() {
            return c;
        }
        muon_core::arch::x86_64::instructions::interrupts::hlt();
    }
}

/// Raw scancode access for consumers that do their own decoding.
pub fn try_get_scancode() -> Option<u8> {
    SCANCODES.pop()
}
