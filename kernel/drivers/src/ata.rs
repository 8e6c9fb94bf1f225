//! PIO ATA disk driver, read-only.
//!
//! Probes up to four drives (two legacy channels, master/slave each) with
//! IDENTIFY and serves 28-bit LBA reads, one sector per command, polling
//! the status register under a hard iteration-count timeout. No write
//! command exists in this interface.

use core::fmt;

use bitflags::bitflags;

/// Primary channel I/O base.
pub const PRIMARY_IO: u16 = 0x1F0;
/// Primary channel control port.
pub const PRIMARY_CTRL: u16 = 0x3F6;
/// Secondary channel I/O base.
pub const SECONDARY_IO: u16 = 0x170;
/// Secondary channel control port.
pub const SECONDARY_CTRL: u16 = 0x376;

/// Bytes per sector.
pub const SECTOR_SIZE: usize = 512;

/// Status polls before a command is declared timed out.
const POLL_TIMEOUT: u32 = 100_000;

/// IDENTIFY DEVICE command.
const CMD_IDENTIFY: u8 = 0xEC;
/// READ SECTORS (PIO, LBA28) command.
const CMD_READ_PIO: u8 = 0x20;

/// Highest LBA addressable with 28-bit commands.
const LBA28_LIMIT: u64 = 1 << 28;

bitflags! {
    /// ATA status register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Error occurred.
        const ERR = 1 << 0;
        /// Data request: the drive is ready to transfer words.
        const DRQ = 1 << 3;
        /// Drive ready.
        const RDY = 1 << 6;
        /// Drive busy.
        const BSY = 1 << 7;
    }
}

/// Errors from the read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtaError {
    /// No drive answered at this position.
    NoDevice,
    /// The request runs past the end of the device (or past LBA-28 reach).
    OutOfRange,
    /// The status poll timed out.
    Timeout,
    /// The drive reported an error condition.
    DeviceError,
}

impl fmt::Display for AtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevice => write!(f, "no such drive"),
            Self::OutOfRange => write!(f, "read beyond end of device"),
            Self::Timeout => write!(f, "drive status poll timed out"),
            Self::DeviceError => write!(f, "drive reported an error"),
        }
    }
}

/// Identity and location of one drive position.
#[derive(Debug, Clone, Copy)]
pub struct AtaDrive {
    /// Channel I/O base port.
    pub io_base: u16,
    /// Channel control port.
    pub ctrl: u16,
    /// Master (true) or slave (false) on its channel.
    pub master: bool,
    /// Whether a drive answered IDENTIFY here.
    pub present: bool,
    /// Total addressable sectors.
    pub sectors: u64,
    /// Model string (byte-swapped from the identify data, space-trimmed).
    pub model: [u8; 40],
    /// Serial-number string (byte-swapped, space-trimmed).
    pub serial: [u8; 20],
}

impl AtaDrive {
    const fn absent(io_base: u16, ctrl: u16, master: bool) -> Self {
        Self {
            io_base,
            ctrl,
            master,
            present: false,
            sectors: 0,
            model: [0; 40],
            serial: [0; 20],
        }
    }

    /// The model string as text.
    #[must_use]
    pub fn model_str(&self) -> &str {
        str_until_nul(&self.model)
    }

    /// The serial string as text.
    #[must_use]
    pub fn serial_str(&self) -> &str {
        str_until_nul(&self.serial)
    }
}

fn str_until_nul(bytes: &[u8]) -> &str {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    core::str::from_utf8(&bytes[..len]).unwrap_or("?")
}

/// Decodes an ATA identify string field: each 16-bit word carries two
/// characters high-byte first. Trailing spaces are trimmed to NULs.
pub fn decode_identify_string(words: &[u16], out: &mut [u8]) {
    for (i, word) in words.iter().enumerate() {
        if 2 * i + 1 >= out.len() {
            break;
        }
        out[2 * i] = (word >> 8) as u8;
        out[2 * i + 1] = (word & 0xFF) as u8;
    }
    // Trim trailing spaces.
    for slot in out.iter_mut().rev() {
        if *slot == b' ' || *slot == 0 {
            *slot = 0;
        } else {
            break;
        }
    }
}

/// Extracts size and identity from a raw IDENTIFY block.
///
/// The sector count comes from words 60..61 (LBA-28); when word 83 bit 10
/// advertises LBA-48, the 48-bit count in words 100..103 is used for
/// sizing instead (reads remain LBA-28 only).
pub fn parse_identify(data: &[u16; 256], drive: &mut AtaDrive) {
    drive.sectors = u64::from(data[60]) | u64::from(data[61]) << 16;
    if data[83] & (1 << 10) != 0 {
        drive.sectors = u64::from(data[100])
            | u64::from(data[101]) << 16
            | u64::from(data[102]) << 32
            | u64::from(data[103]) << 48;
    }
    decode_identify_string(&data[27..47], &mut drive.model);
    decode_identify_string(&data[10..20], &mut drive.serial);
}

/// Validates a read request against a drive's geometry and the LBA-28
/// command reach.
pub fn check_read_range(sectors: u64, lba: u64, count: u32) -> Result<(), AtaError> {
    let end = lba
        .checked_add(u64::from(count))
        .ok_or(AtaError::OutOfRange)?;
    if end > sectors {
        return Err(AtaError::OutOfRange);
    }
    // The read path issues LBA-28 commands only; larger drives are sized
    // correctly but their tail is out of reach.
    if end > LBA28_LIMIT {
        return Err(AtaError::OutOfRange);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Port-level driver
// ---------------------------------------------------------------------------

#[cfg(target_arch = "x86_64")]
mod pio {
    use super::*;
    use muon_core::arch::x86_64::Port;

    fn status(io_base: u16) -> Status {
        // SAFETY: Reading the fixed status port has no data side effects.
        Status::from_bits_truncate(unsafe { Port::<u8>::new(io_base + 7).read() })
    }

    /// Waits until BSY clears and RDY sets, or the poll budget runs out.
    fn wait_ready(io_base: u16) -> Result<(), AtaError> {
        for _ in 0..POLL_TIMEOUT {
            let s = status(io_base);
            if s.contains(Status::ERR) {
                return Err(AtaError::DeviceError);
            }
            if !s.contains(Status::BSY) && s.contains(Status::RDY) {
                return Ok(());
            }
        }
        Err(AtaError::Timeout)
    }

    /// Waits for DRQ, or the poll budget runs out.
    fn wait_drq(io_base: u16) -> Result<(), AtaError> {
        for _ in 0..POLL_TIMEOUT {
            let s = status(io_base);
            if s.contains(Status::ERR) {
                return Err(AtaError::DeviceError);
            }
            if s.contains(Status::DRQ) {
                return Ok(());
            }
        }
        Err(AtaError::Timeout)
    }

    /// Pulses SRST on a channel's control port.
    pub(super) fn soft_reset(ctrl: u16) {
        let port = Port::<u8>::new(ctrl);
        // SAFETY: Fixed control port; the SRST pulse resets both drives on
        // the channel.
        unsafe {
            port.write(0x04);
            io_settle(ctrl);
            port.write(0x00);
            io_settle(ctrl);
        }
    }

    /// Reads the alternate-status port four times: the canonical 400 ns
    /// settle delay.
    fn io_settle(ctrl: u16) {
        let alt = Port::<u8>::new(ctrl);
        for _ in 0..4 {
            // SAFETY: Alternate status reads have no side effects.
            let _ = unsafe { alt.read() };
        }
    }

    /// Selects a drive on its channel and waits out the select delay.
    fn select(io_base: u16, master: bool, lba_bits: u8) {
        let value = if master { 0xE0 } else { 0xF0 } | (lba_bits & 0x0F);
        // SAFETY: Fixed drive/head port.
        unsafe { Port::<u8>::new(io_base + 6).write(value) };
        for _ in 0..4 {
            let _ = status(io_base);
        }
    }

    /// Issues IDENTIFY at a drive position; fills in `drive` on success.
    pub(super) fn identify(drive: &mut AtaDrive) -> bool {
        let io = drive.io_base;
        select(io, drive.master, 0);

        // SAFETY: Fixed command-block ports, zeroed per the IDENTIFY
        // protocol.
        unsafe {
            Port::<u8>::new(io + 2).write(0);
            Port::<u8>::new(io + 3).write(0);
            Port::<u8>::new(io + 4).write(0);
            Port::<u8>::new(io + 5).write(0);
            Port::<u8>::new(io + 7).write(CMD_IDENTIFY);
        }

        // Status 0 means nothing is attached at all.
        if status(io).is_empty() {
            return false;
        }

        // Wait for BSY to clear; an error here means ATAPI or nothing.
        let mut cleared = false;
        for _ in 0..POLL_TIMEOUT {
            let s = status(io);
            if s.contains(Status::ERR) {
                return false;
            }
            if !s.contains(Status::BSY) {
                cleared = true;
                break;
            }
        }
        if !cleared {
            return false;
        }

        // ATAPI devices park a signature in the LBA mid/high registers.
        // SAFETY: Fixed LBA ports.
        let (mid, high) = unsafe {
            (
                Port::<u8>::new(io + 4).read(),
                Port::<u8>::new(io + 5).read(),
            )
        };
        if mid != 0 || high != 0 {
            return false;
        }

        if wait_drq(io).is_err() {
            return false;
        }

        let mut data = [0u16; 256];
        // SAFETY: DRQ is set; the drive serves exactly 256 words.
        unsafe {
            let port = Port::<u16>::new(io);
            for word in &mut data {
                *word = port.read();
            }
        }

        parse_identify(&data, drive);
        drive.present = true;
        true
    }

    /// Reads `count` sectors starting at `lba` into `buf`, one LBA-28
    /// command per sector.
    pub(super) fn read_sectors(
        drive: &AtaDrive,
        lba: u32,
        count: u32,
        buf: &mut [u8],
    ) -> Result<(), AtaError> {
        debug_assert!(buf.len() >= count as usize * SECTOR_SIZE);
        let io = drive.io_base;

        for i in 0..count {
            let sector = lba + i;
            select(io, drive.master, (sector >> 24) as u8);
            wait_ready(io)?;

            // SAFETY: Fixed command-block ports; one-sector LBA-28 read.
            unsafe {
                Port::<u8>::new(io + 2).write(1);
                Port::<u8>::new(io + 3).write(sector as u8);
                Port::<u8>::new(io + 4).write((sector >> 8) as u8);
                Port::<u8>::new(io + 5).write((sector >> 16) as u8);
                Port::<u8>::new(io + 7).write(CMD_READ_PIO);
            }

            wait_drq(io)?;

            let offset = i as usize * SECTOR_SIZE;
            // SAFETY: DRQ is set; the drive serves 256 words per sector.
            unsafe {
                let port = Port::<u16>::new(io);
                for j in 0..SECTOR_SIZE / 2 {
                    let word = port.read();
                    buf[offset + 2 * j] = word as u8;
                    buf[offset + 2 * j + 1] = (word >> 8) as u8;
                }
            }
        }
        Ok(())
    }
}

/// The four legacy drive positions.
pub struct AtaController {
    drives: [AtaDrive; 4],
}

impl AtaController {
    /// Creates the controller with all positions vacant.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            drives: [
                AtaDrive::absent(PRIMARY_IO, PRIMARY_CTRL, true),
                AtaDrive::absent(PRIMARY_IO, PRIMARY_CTRL, false),
                AtaDrive::absent(SECONDARY_IO, SECONDARY_CTRL, true),
                AtaDrive::absent(SECONDARY_IO, SECONDARY_CTRL, false),
            ],
        }
    }

    /// Resets both channels and probes every drive position.
    ///
    /// Returns the number of drives that answered.
    #[cfg(target_arch = "x86_64")]
    pub fn probe(&mut self) -> usize {
        pio::soft_reset(PRIMARY_CTRL);
        pio::soft_reset(SECONDARY_CTRL);

        let mut found = 0;
        for drive in &mut self.drives {
            if pio::identify(drive) {
                found += 1;
            }
        }
        found
    }

    /// Whether a drive is present at `index` (0..3).
    #[must_use]
    pub fn present(&self, index: usize) -> bool {
        index < 4 && self.drives[index].present
    }

    /// Drive info at `index`, if present.
    #[must_use]
    pub fn drive(&self, index: usize) -> Option<&AtaDrive> {
        self.drives.get(index).filter(|d| d.present)
    }

    /// Reads `count` sectors from drive `index` starting at `lba`.
    #[cfg(target_arch = "x86_64")]
    pub fn read(
        &self,
        index: usize,
        lba: u64,
        count: u32,
        buf: &mut [u8],
    ) -> Result<(), AtaError> {
        let drive = self.drive(index).ok_or(AtaError::NoDevice)?;
        if count == 0 {
            return Ok(());
        }
        if buf.len() < count as usize * SECTOR_SIZE {
            return Err(AtaError::OutOfRange);
        }
        check_read_range(drive.sectors, lba, count)?;
        pio::read_sectors(drive, lba as u32, count, buf)
    }
}

impl Default for AtaController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_strings_are_byte_swapped_and_trimmed() {
        // "QEMU HARDDISK" packed two chars per word, high byte first,
        // space padded.
        let text = b"QEMU HARDDISK                           ";
        let mut words = [0u16; 20];
        for (i, word) in words.iter_mut().enumerate() {
            *word = u16::from(text[2 * i]) << 8 | u16::from(text[2 * i + 1]);
        }

        let mut out = [0u8; 40];
        decode_identify_string(&words, &mut out);
        assert_eq!(str_until_nul(&out), "QEMU HARDDISK");
    }

    #[test]
    fn parse_identify_uses_lba28_count() {
        let mut data = [0u16; 256];
        data[60] = 0x5678;
        data[61] = 0x0012;
        let mut drive = AtaDrive::absent(PRIMARY_IO, PRIMARY_CTRL, true);
        parse_identify(&data, &mut drive);
        assert_eq!(drive.sectors, 0x0012_5678);
    }

    #[test]
    fn parse_identify_prefers_lba48_when_advertised() {
        let mut data = [0u16; 256];
        data[60] = 0xFFFF;
        data[61] = 0x0FFF;
        data[83] = 1 << 10;
        data[100] = 0x0000;
        data[101] = 0x0001; // 0x10000 sectors
        let mut drive = AtaDrive::absent(PRIMARY_IO, PRIMARY_CTRL, true);
        parse_identify(&data, &mut drive);
        assert_eq!(drive.sectors, 0x1_0000);
    }

    #[test]
    fn read_range_is_checked_against_geometry() {
        assert_eq!(check_read_range(100, 0, 100), Ok(()));
        assert_eq!(check_read_range(100, 99, 1), Ok(()));
        assert_eq!(check_read_range(100, 100, 1), Err(AtaError::OutOfRange));
        assert_eq!(check_read_range(100, 0, 101), Err(AtaError::OutOfRange));
        assert_eq!(
            check_read_range(u64::MAX, u64::MAX, 1),
            Err(AtaError::OutOfRange)
        );
    }

    #[test]
    fn lba28_command_reach_is_enforced() {
        // A big LBA-48 drive is sized but only the first 2^28 sectors are
        // readable.
        let big = 1 << 30;
        assert_eq!(check_read_range(big, 0, 1), Ok(()));
        assert_eq!(
            check_read_range(big, LBA28_LIMIT, 1),
            Err(AtaError::OutOfRange)
        );
        assert_eq!(check_read_range(big, LBA28_LIMIT - 1, 1), Ok(()));
    }
}
