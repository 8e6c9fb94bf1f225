//! Log sinks: early serial, the timestamped full logger, and the optional
//! console capability.
//!
//! The boot stub calls [`init_early_serial`] before anything else so
//! bring-up messages and panics always reach COM1. Once the timer runs,
//! [`init_full_logger`] upgrades leveled output with an uptime prefix.
//! An outer console collaborator (framebuffer renderer, for instance) may
//! register a mirror sink; when absent, output is serial-only.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicPtr, Ordering};

use muon_core::log::LogLevel;
use muon_core::sync::IrqSpinLock;
use muon_drivers::uart16550::{COM1, SerialWriter, Uart16550};

/// The COM1 writer behind an interrupt-safe lock so concurrent lines do
/// not interleave mid-character.
static SERIAL: IrqSpinLock<SerialWriter> = IrqSpinLock::new(SerialWriter(Uart16550::new(COM1)));

/// Optional console mirror registered by an outer collaborator.
type ConsoleSink = fn(&str);

static CONSOLE_SINK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Registers a console mirror for raw log output.
pub fn register_console(sink: ConsoleSink) {
    CONSOLE_SINK.store(sink as *mut (), Ordering::Release);
}

fn mirror_to_console(text: &str) {
    let ptr = CONSOLE_SINK.load(Ordering::Acquire);
    if !ptr.is_null() {
        // SAFETY: Only valid `ConsoleSink` pointers are stored.
        let sink: ConsoleSink = unsafe { core::mem::transmute(ptr) };
        sink(text);
    }
}

/// Raw print sink: serial, mirrored to the console when registered.
fn print_sink(args: fmt::Arguments<'_>) {
    // Ignore fmt errors; the UART writer is infallible.
    let _ = SERIAL.lock().write_fmt(args);

    // The console mirror needs a rendered buffer; format into a small
    // stack buffer, truncating oversized records.
    let ptr = CONSOLE_SINK.load(Ordering::Acquire);
    if !ptr.is_null() {
        let mut buf = FixedBuf::new();
        let _ = buf.write_fmt(args);
        mirror_to_console(buf.as_str());
    }
}

/// Early leveled sink: level tag only, no timestamp.
fn early_log_sink(level: LogLevel, args: fmt::Arguments<'_>) {
    muon_core::kprint!("[{}] {}\n", level.name(), args);
}

/// Full leveled sink: uptime ticks plus level tag.
fn full_log_sink(level: LogLevel, args: fmt::Arguments<'_>) {
    let ticks = crate::time::ticks();
    muon_core::kprint!("[{ticks:>8}] [{}] {}\n", level.name(), args);
}

/// Brings up COM1 and installs the raw and early leveled sinks.
///
/// Safe to call exactly once, before interrupts are enabled.
pub fn init_early_serial() {
    // SAFETY: Single-threaded early boot; nothing else drives COM1.
    unsafe {
        SERIAL.lock().0.init();
        muon_core::log::set_print_fn(print_sink);
        muon_core::log::set_log_fn(early_log_sink);
    }
}

/// Switches leveled output to the timestamped sink (the PIT must be
/// running for the prefix to advance).
pub fn init_full_logger() {
    // SAFETY: `full_log_sink` is callable from any context.
    unsafe { muon_core::log::set_log_fn(full_log_sink) };
}

/// A bounded formatting buffer for the console mirror.
struct FixedBuf {
    buf: [u8; 256],
    len: usize,
}

impl FixedBuf {
    const fn new() -> Self {
        Self {
            buf: [0; 256],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl fmt::Write for FixedBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let take = s.len().min(self.buf.len() - self.len);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}
