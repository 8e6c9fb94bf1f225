//! PS/2 keyboard driver.
//!
//! The IRQ side is a two-step affair: read one byte from the data port,
//! push it into a lock-free single-producer/single-consumer ring. All
//! decoding — set-1 scancode tables, modifier tracking, caps-lock state —
//! happens in the consumer path, never in the interrupt handler.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Keyboard data port.
pub const DATA_PORT: u16 = 0x60;
/// Keyboard status port.
pub const STATUS_PORT: u16 = 0x64;

/// Status bit: output buffer full (a byte is waiting in the data port).
pub const STATUS_OUTPUT_FULL: u8 = 1 << 0;

/// Capacity of the scancode ring.
const QUEUE_SIZE: usize = 256;

/// A lock-free SPSC byte ring.
///
/// The IRQ handler is the only producer, task-side consumers the only
/// reader. The producer advances its index only when the next slot is not
/// the consumer index; a full ring silently drops the byte. No locks, so
/// the IRQ path can never contend with task-side code.
pub struct ScancodeQueue {
    buf: [core::cell::UnsafeCell<u8>; QUEUE_SIZE],
    head: AtomicUsize,
    tail: AtomicUsize,
}

// SAFETY: Head/tail indices are atomic; each slot is written only by the
// producer before publishing via `head` and read only by the consumer
// before releasing via `tail`.
unsafe impl Sync for ScancodeQueue {}

impl ScancodeQueue {
    /// Creates an empty ring.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [const { core::cell::UnsafeCell::new(0) }; QUEUE_SIZE],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Producer side: enqueues a byte, dropping it when the ring is full.
    ///
    /// Returns `false` when the byte was dropped.
    pub fn push(&self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % QUEUE_SIZE;
        if next == self.tail.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: Only the producer writes slots between tail and head.
        unsafe { *self.buf[head].get() = byte };
        self.head.store(next, Ordering::Release);
        true
    }

    /// Consumer side: dequeues the oldest byte, if any.
    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: The slot was published by the producer's Release store.
        let byte = unsafe { *self.buf[tail].get() };
        self.tail.store((tail + 1) % QUEUE_SIZE, Ordering::Release);
        Some(byte)
    }

    /// Whether a byte is waiting.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.tail.load(Ordering::Relaxed) != self.head.load(Ordering::Acquire)
    }
}

impl Default for ScancodeQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads one scancode byte from the data port. IRQ-handler side.
#[cfg(target_arch = "x86_64")]
#[must_use]
pub fn read_scancode() -> u8 {
    // SAFETY: Fixed PS/2 data port; reading pops the controller's buffer.
    unsafe { muon_core::arch::x86_64::Port::<u8>::new(DATA_PORT).read() }
}

/// Drains any bytes the controller buffered before the IRQ was wired up.
#[cfg(target_arch = "x86_64")]
pub fn flush_controller() {
    let status = muon_core::arch::x86_64::Port::<u8>::new(STATUS_PORT);
    let data = muon_core::arch::x86_64::Port::<u8>::new(DATA_PORT);
    // SAFETY: Fixed PS/2 ports; bounded by the controller's tiny FIFO.
    unsafe {
        while status.read() & STATUS_OUTPUT_FULL != 0 {
            let _ = data.read();
        }
    }
}

// ---------------------------------------------------------------------------
// Consumer-side decoding (set 1, US layout)
// ---------------------------------------------------------------------------

/// Release flag: set-1 break codes are the make code with bit 7 set.
const RELEASE_BIT: u8 = 0x80;

const SC_LSHIFT: u8 = 0x2A;
const SC_RSHIFT: u8 = 0x36;
const SC_LCTRL: u8 = 0x1D;
const SC_LALT: u8 = 0x38;
const SC_CAPSLOCK: u8 = 0x3A;

/// Set-1 make code to ASCII, unshifted.
#[rustfmt::skip]
const PLAIN_MAP: [u8; 128] = [
    0, 0, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08,
    b'\t', b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n',
    0, b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`',
    0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0,
    b'*', 0, b' ', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, b'-', 0, 0, 0, b'+', 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0,
];

/// Set-1 make code to ASCII with shift held.
#[rustfmt::skip]
const SHIFT_MAP: [u8; 128] = [
    0, 0, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08,
    b'\t', b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n',
    0, b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~',
    0, b'|', b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0,
    b'*', 0, b' ', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, b'-', 0, 0, 0, b'+', 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0,
];

/// Consumer-side scancode decoder: modifier and lock-key state machine.
#[derive(Debug, Default)]
pub struct Decoder {
    shift: bool,
    ctrl: bool,
    alt: bool,
    capslock: bool,
}

impl Decoder {
    /// Creates a decoder with no modifiers active.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            shift: false,
            ctrl: false,
            alt: false,
            capslock: false,
        }
    }

    /// Feeds one scancode; returns the decoded character for printable
    /// make codes, `None` for modifiers, releases, and unmapped keys.
    pub fn feed(&mut self, scancode: u8) -> Option<char> {
        if scancode & RELEASE_BIT != 0 {
            match scancode & !RELEASE_BIT {
                SC_LSHIFT | SC_RSHIFT => self.shift = false,
                SC_LCTRL => self.ctrl = false,
                SC_LALT => self.alt = false,
                _ => {}
            }
            return None;
        }

        match scancode {
            SC_LSHIFT | SC_RSHIFT => {
                self.shift = true;
                return None;
            }
            SC_LCTRL => {
                self.ctrl = true;
                return None;
            }
            SC_LALT => {
                self.alt = true;
                return None;
            }
            SC_CAPSLOCK => {
                self.capslock = !self.capslock;
                return None;
            }
            _ => {}
        }

        let map = if self.shift { &SHIFT_MAP } else { &PLAIN_MAP };
        let mut byte = map[scancode as usize & 0x7F];
        if byte == 0 {
            return None;
        }

        // Caps lock inverts letter case; shift+caps cancels out.
        if self.capslock && byte.is_ascii_lowercase() {
            byte = byte.to_ascii_uppercase();
        } else if self.capslock && byte.is_ascii_uppercase() {
            byte = byte.to_ascii_lowercase();
        }

        Some(byte as char)
    }

    /// Whether a shift key is held.
    #[must_use]
    pub fn shift(&self) -> bool {
        self.shift
    }

    /// Whether the control key is held.
    #[must_use]
    pub fn ctrl(&self) -> bool {
        self.ctrl
    }

    /// Whether the alt key is held.
    #[must_use]
    pub fn alt(&self) -> bool {
        self.alt
    }

    /// Whether caps lock is latched on.
    #[must_use]
    pub fn capslock(&self) -> bool {
        self.capslock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_is_fifo() {
        let q = ScancodeQueue::new();
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(q.push(3));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn full_ring_drops_new_bytes() {
        let q = ScancodeQueue::new();
        // One slot is sacrificed to distinguish full from empty.
        for i in 0..QUEUE_SIZE - 1 {
            assert!(q.push(i as u8), "push {i} failed early");
        }
        assert!(!q.push(0xFF), "full ring must drop");
        // The oldest byte is intact.
        assert_eq!(q.pop(), Some(0));
    }

    #[test]
    fn ring_wraps_around() {
        let q = ScancodeQueue::new();
        for round in 0..3 {
            for i in 0..200 {
                assert!(q.push((round + i) as u8));
            }
            for i in 0..200 {
                assert_eq!(q.pop(), Some((round + i) as u8));
            }
        }
    }

    #[test]
    fn plain_letters_decode_lowercase() {
        let mut d = Decoder::new();
        assert_eq!(d.feed(0x10), Some('q'));
        assert_eq!(d.feed(0x1E), Some('a'));
        assert_eq!(d.feed(0x2C), Some('z'));
    }

    #[test]
    fn shift_makes_uppercase_and_symbols() {
        let mut d = Decoder::new();
        assert_eq!(d.feed(SC_LSHIFT), None);
        assert_eq!(d.feed(0x1E), Some('A'));
        assert_eq!(d.feed(0x02), Some('!'));
        // Release shift: back to lowercase.
        assert_eq!(d.feed(SC_LSHIFT | RELEASE_BIT), None);
        assert_eq!(d.feed(0x1E), Some('a'));
    }

    #[test]
    fn capslock_inverts_letters_only() {
        let mut d = Decoder::new();
        d.feed(SC_CAPSLOCK);
        assert_eq!(d.feed(0x1E), Some('A'));
        // Numbers are unaffected by caps lock.
        assert_eq!(d.feed(0x02), Some('1'));
        // Shift plus caps lock yields lowercase.
        d.feed(SC_LSHIFT);
        assert_eq!(d.feed(0x1E), Some('a'));
        d.feed(SC_LSHIFT | RELEASE_BIT);
        // Toggle caps lock off again.
        d.feed(SC_CAPSLOCK);
        assert_eq!(d.feed(0x1E), Some('a'));
    }

    #[test]
    fn modifier_state_is_queryable() {
        let mut d = Decoder::new();
        d.feed(SC_LCTRL);
        d.feed(SC_LALT);
        assert!(d.ctrl());
        assert!(d.alt());
        d.feed(SC_LCTRL | RELEASE_BIT);
        assert!(!d.ctrl());
        assert!(d.alt());
    }

    #[test]
    fn releases_produce_no_characters() {
        let mut d = Decoder::new();
        assert_eq!(d.feed(0x1E | RELEASE_BIT), None);
    }
}
