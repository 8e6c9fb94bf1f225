//! Page table structures.
//!
//! A page table is a 512-entry array of 64-bit entries. A virtual address
//! selects one entry per level via bits [47:39], [38:30], [29:21], [20:12].

use core::fmt;

use crate::addr::PhysAddr;

bitflags::bitflags! {
    /// Flag bits of a page table entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageTableFlags: u64 {
        /// The entry maps a frame or references a lower-level table.
        const PRESENT       = 1 << 0;
        /// Writes are allowed through this entry.
        const WRITABLE      = 1 << 1;
        /// Ring-3 accesses are allowed through this entry.
        const USER          = 1 << 2;
        /// Write-through caching.
        const WRITE_THROUGH = 1 << 3;
        /// Caching disabled.
        const NO_CACHE      = 1 << 4;
        /// Set by the CPU on access.
        const ACCESSED      = 1 << 5;
        /// Set by the CPU on write (leaf entries only).
        const DIRTY         = 1 << 6;
        /// The entry maps a huge page (2 MiB in a PD, 1 GiB in a PDPT).
        const HUGE_PAGE     = 1 << 7;
        /// Not flushed from the TLB on address-space switch.
        const GLOBAL        = 1 << 8;
        /// Instruction fetches through this entry fault (requires EFER.NXE).
        const NO_EXECUTE    = 1 << 63;
    }
}

/// Mask of the physical address field: bits 12..51.
const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// A single 64-bit page table entry.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    /// Creates an empty (not present) entry.
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Creates an entry mapping `addr` with `flags`.
    #[inline]
    pub fn new(addr: PhysAddr, flags: PageTableFlags) -> Self {
        debug_assert!(addr.is_aligned(4096), "page table entries map frames");
        Self((addr.as_u64() & ADDR_MASK) | flags.bits())
    }

    /// Creates an entry from its raw bit representation.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bit representation.
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns `true` if the present bit is set.
    #[inline]
    pub const fn is_present(self) -> bool {
        self.0 & PageTableFlags::PRESENT.bits() != 0
    }

    /// Returns `true` if the huge-page bit is set.
    #[inline]
    pub const fn is_huge(self) -> bool {
        self.0 & PageTableFlags::HUGE_PAGE.bits() != 0
    }

    /// Returns the physical address field (bits 12..51).
    #[inline]
    pub fn address(self) -> PhysAddr {
        PhysAddr::new_truncate(self.0 & ADDR_MASK)
    }

    /// Returns the flag bits.
    #[inline]
    pub fn flags(self) -> PageTableFlags {
        PageTableFlags::from_bits_truncate(self.0)
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("addr", &self.address())
            .field("flags", &self.flags())
            .finish()
    }
}

/// The number of entries in a page table.
pub const ENTRY_COUNT: usize = 512;

/// A node of the 4-level paging tree.
#[repr(C, align(4096))]
pub struct PageTable {
    /// The 512 entries of this table.
    pub entries: [PageTableEntry; ENTRY_COUNT],
}

impl PageTable {
    /// Creates a table with all entries empty.
    pub const fn new() -> Self {
        Self {
            entries: [PageTableEntry::empty(); ENTRY_COUNT],
        }
    }

    /// Clears all entries.
    pub fn zero(&mut self) {
        self.entries = [PageTableEntry::empty(); ENTRY_COUNT];
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_encodes_address_and_flags() {
        let entry = PageTableEntry::new(
            PhysAddr::new(0x1234_5000),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
        );
        assert!(entry.is_present());
        assert!(!entry.is_huge());
        assert_eq!(entry.address().as_u64(), 0x1234_5000);
        assert_eq!(
            entry.flags(),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE
        );
    }

    #[test]
    fn nx_bit_does_not_disturb_address() {
        let entry = PageTableEntry::new(
            PhysAddr::new(0x7F000),
            PageTableFlags::PRESENT | PageTableFlags::NO_EXECUTE,
        );
        assert_eq!(entry.address().as_u64(), 0x7F000);
        assert!(entry.flags().contains(PageTableFlags::NO_EXECUTE));
    }

    #[test]
    fn table_is_page_sized() {
        assert_eq!(core::mem::size_of::<PageTable>(), 4096);
        assert_eq!(core::mem::align_of::<PageTable>(), 4096);
    }
}
