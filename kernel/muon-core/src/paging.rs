//! Typed page and frame abstractions.
//!
//! [`Page`] is a page-aligned virtual address, [`PhysFrame`] a frame-aligned
//! physical address. This kernel maps 4 KiB pages exclusively; huge pages
//! installed by the bootloader are recognised during table walks but never
//! created.

use core::fmt;
use core::ops::Add;

use crate::addr::{PhysAddr, VirtAddr};

/// The size of a page/frame in bytes (4 KiB).
pub const PAGE_SIZE: u64 = 4096;

/// A 4 KiB virtual memory page.
///
/// The contained [`VirtAddr`] is guaranteed to be page-aligned.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Page {
    start: VirtAddr,
}

impl Page {
    /// Returns the page that contains the given virtual address (aligns down).
    #[inline]
    pub fn containing_address(addr: VirtAddr) -> Self {
        Self {
            start: addr.align_down(PAGE_SIZE),
        }
    }

    /// Returns the start address of this page.
    #[inline]
    pub const fn start_address(&self) -> VirtAddr {
        self.start
    }
}

impl Add<u64> for Page {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self {
        Page::containing_address(self.start + rhs * PAGE_SIZE)
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({:#x})", self.start.as_u64())
    }
}

/// A 4 KiB physical memory frame.
///
/// The contained [`PhysAddr`] is guaranteed to be frame-aligned. A frame is
/// identified by its index: physical address >> 12.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysFrame {
    start: PhysAddr,
}

impl PhysFrame {
    /// Returns the frame that contains the given physical address (aligns
    /// down).
    #[inline]
    pub fn containing_address(addr: PhysAddr) -> Self {
        Self {
            start: addr.align_down(PAGE_SIZE),
        }
    }

    /// Returns the frame with the given index (physical address >> 12).
    #[inline]
    pub fn from_index(index: u64) -> Self {
        Self {
            start: PhysAddr::new_truncate(index * PAGE_SIZE),
        }
    }

    /// Returns the start address of this frame.
    #[inline]
    pub const fn start_address(&self) -> PhysAddr {
        self.start
    }

    /// Returns the frame index (physical address >> 12).
    #[inline]
    pub const fn index(&self) -> u64 {
        self.start.as_u64() / PAGE_SIZE
    }
}

impl Add<u64> for PhysFrame {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self {
        PhysFrame::containing_address(self.start + rhs * PAGE_SIZE)
    }
}

impl fmt::Debug for PhysFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysFrame({:#x})", self.start.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_aligns_down() {
        let page = Page::containing_address(VirtAddr::new(0x1FFF));
        assert_eq!(page.start_address().as_u64(), 0x1000);
    }

    #[test]
    fn frame_index_round_trip() {
        let frame = PhysFrame::from_index(42);
        assert_eq!(frame.start_address().as_u64(), 42 * PAGE_SIZE);
        assert_eq!(frame.index(), 42);
    }

    #[test]
    fn page_addition_steps_by_page_size() {
        let page = Page::containing_address(VirtAddr::new(0x4000));
        assert_eq!((page + 3).start_address().as_u64(), 0x7000);
    }
}
