//! Timer wiring and the uptime facade.
//!
//! The PIT runs at 1000 Hz. The IRQ handler body does exactly what an
//! interrupt handler may: bump the tick counter, do the slice accounting,
//! and raise the reschedule flag — every tenth tick unconditionally, and
//! whenever the current slice runs out. All actual scheduling happens at
//! task-level safe points.

use muon_drivers::pit;

/// Ticks between unconditional reschedule requests (10 ms at 1000 Hz).
const RESCHED_INTERVAL: u64 = 10;

/// Timer IRQ handler.
fn on_timer(_irq: u8) {
    let ticks = pit::record_tick();
    if ticks % RESCHED_INTERVAL == 0 {
        crate::proc::request_reschedule();
    }
    crate::proc::scheduler_tick();
}

/// Arms the PIT at 1000 Hz and registers the timer IRQ.
///
/// # Panics
///
/// Panics if IRQ 0 already has a handler; the timer is wired exactly
/// once during boot.
pub fn init() {
    // SAFETY: IRQ 0 is still masked; nothing observes a skewed rate.
    unsafe { pit::init(pit::TICK_HZ) };
    crate::arch::x86_64::interrupts::register_irq(0, on_timer)
        .expect("timer IRQ registered twice");
    muon_core::kinfo!("time: PIT armed at {} Hz", pit::TICK_HZ);
}

/// Monotonic ticks (milliseconds) since the timer was armed.
#[must_use]
pub fn ticks() -> u64 {
    pit::ticks()
}

/// Busy-waits for `ms` milliseconds, parking the CPU between ticks.
pub fn sleep_ms(ms: u64) {
    let deadline = ticks() + ms;
    while ticks() < deadline {
        muon_core::arch::x86_64::instructions::interrupts::hlt();
    }
}
