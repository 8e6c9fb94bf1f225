//! 8254 PIT (Programmable Interval Timer) driver.
//!
//! Channel 0 in square-wave mode drives the scheduler heartbeat at
//! 1000 Hz. The IRQ handler body lives in the kernel and stays tiny; this
//! module programs the hardware and owns the monotonic tick counter.

use core::sync::atomic::{AtomicU64, Ordering};

/// PIT oscillator frequency: 1,193,182 Hz.
const PIT_FREQUENCY: u32 = 1_193_182;

/// Channel 0 data port.
const CHANNEL0_DATA: u16 = 0x40;
/// Mode/command register.
const PIT_CMD: u16 = 0x43;

/// Channel 0, lobyte/hibyte access, mode 3 (square wave), binary.
const CMD_CHANNEL0_SQUARE_WAVE: u8 = 0x36;

/// The timer frequency this kernel runs at.
pub const TICK_HZ: u32 = 1000;

/// Monotonic tick counter, incremented from the timer IRQ.
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Programs channel 0 to fire at `frequency` Hz in square-wave mode.
///
/// # Safety
///
/// Must run before the timer IRQ line is unmasked; reprogramming a live
/// timer skews the tick rate.
#[cfg(target_arch = "x86_64")]
pub unsafe fn init(frequency: u32) {
    let divisor = (PIT_FREQUENCY / frequency).clamp(1, 65_535);

    let cmd = muon_core::arch::x86_64::Port::<u8>::new(PIT_CMD);
    let data = muon_core::arch::x86_64::Port::<u8>::new(CHANNEL0_DATA);

    // SAFETY: Fixed PIT ports; the caller keeps the IRQ masked meanwhile.
    unsafe {
        cmd.write(CMD_CHANNEL0_SQUARE_WAVE);
        data.write(divisor as u8);
        data.write((divisor >> 8) as u8);
    }
}

/// Records one timer tick. Called from the timer IRQ handler only.
///
/// Returns the new tick count.
pub fn record_tick() -> u64 {
    TICKS.fetch_add(1, Ordering::Relaxed) + 1
}

/// The monotonic tick count since boot.
#[must_use]
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_count_monotonically() {
        let before = ticks();
        let a = record_tick();
        let b = record_tick();
        assert_eq!(b, a + 1);
        assert!(ticks() >= before + 2);
    }
}
