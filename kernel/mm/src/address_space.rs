//! Per-process address spaces.
//!
//! Each address space owns a root table whose upper half (entries 256..511)
//! is copied by value from the kernel root, so every process sees the same
//! kernel mappings. The lower half (entries 0..255) is private.
//!
//! Destruction walks only the lower half, freeing every present
//! intermediate table and finally the root. The shared kernel half is
//! never touched. Tables emptied by earlier `unmap` calls are not
//! reclaimed before destruction; the intended workload never unmaps before
//! destroying.

use muon_core::addr::{PhysAddr, VirtAddr};
use muon_core::arch::x86_64::structures::paging::{ENTRY_COUNT, PageTable, PageTableFlags};
use muon_core::paging::{Page, PhysFrame};

use crate::mapper::PageTableMapper;
use crate::{PAGE_SIZE, VmmError};

/// Number of root entries in the private lower half.
const LOWER_HALF_ENTRIES: usize = 256;

/// A process address space backed by its own root table.
pub struct AddressSpace {
    root: PhysAddr,
    mapper: PageTableMapper,
}

impl AddressSpace {
    /// Creates a new address space: a fresh zeroed root with the kernel
    /// upper half copied in.
    ///
    /// # Safety
    ///
    /// `kernel_root` must point to the kernel's root table, and `mapper`
    /// must carry the live HHDM offset. `alloc` must return HHDM-reachable
    /// frames.
    pub unsafe fn new(
        kernel_root: PhysAddr,
        mapper: PageTableMapper,
        hhdm_offset: u64,
        alloc: &mut dyn FnMut() -> Option<PhysFrame>,
    ) -> Result<Self, VmmError> {
        let frame = alloc().ok_or(VmmError::OutOfMemory)?;
        let root = frame.start_address();

        // SAFETY: Both tables are HHDM-reachable; the new frame is
        // exclusively ours.
        unsafe {
            let new_root = (hhdm_offset + root.as_u64()) as *mut u64;
            let kernel = (hhdm_offset + kernel_root.as_u64()) as *const u64;

            core::ptr::write_bytes(new_root, 0, LOWER_HALF_ENTRIES);
            core::ptr::copy_nonoverlapping(
                kernel.add(LOWER_HALF_ENTRIES),
                new_root.add(LOWER_HALF_ENTRIES),
                ENTRY_COUNT - LOWER_HALF_ENTRIES,
            );
        }

        Ok(Self { root, mapper })
    }

    /// Physical address of this space's root table (for CR3).
    #[must_use]
    pub const fn root_phys(&self) -> PhysAddr {
        self.root
    }

    /// Maps one page into the private lower half. The user flag is always
    /// added.
    pub fn map_page(
        &mut self,
        virt: VirtAddr,
        phys: PhysAddr,
        flags: PageTableFlags,
        alloc: &mut dyn FnMut() -> Option<PhysFrame>,
    ) -> Result<(), VmmError> {
        // SAFETY: `self.root` is a valid root owned by this space.
        unsafe {
            self.mapper.map(
                self.root,
                Page::containing_address(virt),
                PhysFrame::containing_address(phys),
                flags | PageTableFlags::USER,
                alloc,
            )
        }
    }

    /// Unmaps one page, returning the frame that was mapped.
    pub fn unmap_page(&mut self, virt: VirtAddr) -> Result<PhysFrame, VmmError> {
        // SAFETY: `self.root` is a valid root owned by this space.
        unsafe { self.mapper.unmap(self.root, Page::containing_address(virt)) }
    }

    /// Translates a virtual address in this space (0 when unmapped).
    #[must_use]
    pub fn virt_to_phys(&self, virt: VirtAddr) -> u64 {
        // SAFETY: `self.root` is a valid root owned by this space.
        unsafe { self.mapper.translate(self.root, virt) }.map_or(0, PhysAddr::as_u64)
    }

    /// Destroys the address space.
    ///
    /// Walks the lower half only, handing every present PDPT, PD, and PT
    /// frame to `dealloc`, then the root itself. Leaf data frames are the
    /// owner's responsibility, not this walk's.
    pub fn destroy(self, hhdm_offset: u64, dealloc: &mut dyn FnMut(PhysFrame)) {
        // SAFETY: All tables below a valid root are HHDM-reachable; the
        // lower half is exclusively owned by this space.
        unsafe {
            let root = &*((hhdm_offset + self.root.as_u64()) as *const PageTable);
            for pml4e in &root.entries[..LOWER_HALF_ENTRIES] {
                if !pml4e.is_present() {
                    continue;
                }
                let pdpt = &*((hhdm_offset + pml4e.address().as_u64()) as *const PageTable);
                for pdpte in &pdpt.entries {
                    if !pdpte.is_present() || pdpte.is_huge() {
                        continue;
                    }
                    let pd = &*((hhdm_offset + pdpte.address().as_u64()) as *const PageTable);
                    for pde in &pd.entries {
                        if !pde.is_present() || pde.is_huge() {
                            continue;
                        }
                        dealloc(PhysFrame::containing_address(pde.address()));
                    }
                    dealloc(PhysFrame::containing_address(pdpte.address()));
                }
                dealloc(PhysFrame::containing_address(pml4e.address()));
            }
        }
        dealloc(PhysFrame::containing_address(self.root));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pmm::FrameBitmap;
    use crate::PhysMemoryRegion;
    use core::alloc::Layout;

    struct FakePhys {
        ptr: *mut u8,
        layout: Layout,
    }

    impl FakePhys {
        fn new(frames: usize) -> Self {
            let layout = Layout::from_size_align(frames * PAGE_SIZE, PAGE_SIZE).unwrap();
            let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
            assert!(!ptr.is_null());
            Self { ptr, layout }
        }
    }

    impl Drop for FakePhys {
        fn drop(&mut self) {
            unsafe { std::alloc::dealloc(self.ptr, self.layout) };
        }
    }

    fn setup(frames: usize) -> (FakePhys, FrameBitmap, PhysAddr, PageTableMapper) {
        let phys = FakePhys::new(frames);
        let hhdm = phys.ptr as u64;
        let regions = [PhysMemoryRegion {
            start: PhysAddr::new(0),
            size: (frames * PAGE_SIZE) as u64,
            usable: true,
        }];
        let mut pmm = unsafe { FrameBitmap::new(&regions, hhdm) }.unwrap();
        let kernel_root = pmm.alloc_page().unwrap().start_address();
        let mapper = PageTableMapper::new(hhdm);
        (phys, pmm, kernel_root, mapper)
    }

    #[test]
    fn upper_half_is_copied_lower_half_is_zero() {
        let (phys, mut pmm, kernel_root, mapper) = setup(64);
        let hhdm = phys.ptr as u64;

        // Plant a recognizable kernel upper-half entry.
        unsafe {
            let kernel = &mut *((hhdm + kernel_root.as_u64()) as *mut PageTable);
            kernel.entries[300] = muon_core::arch::x86_64::structures::paging::PageTableEntry::new(
                PhysAddr::new(0x5000),
                PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
            );
        }

        let space = unsafe {
            AddressSpace::new(kernel_root, mapper, hhdm, &mut || pmm.alloc_page().ok())
        }
        .unwrap();

        unsafe {
            let root = &*((hhdm + space.root_phys().as_u64()) as *const PageTable);
            assert_eq!(root.entries[300].address().as_u64(), 0x5000);
            for entry in &root.entries[..256] {
                assert!(!entry.is_present());
            }
        }
    }

    #[test]
    fn same_virt_maps_to_distinct_frames_per_space() {
        let (phys, mut pmm, kernel_root, mapper) = setup(128);
        let hhdm = phys.ptr as u64;
        let virt = VirtAddr::new(0x40_0000);

        let mut space1 = unsafe {
            AddressSpace::new(kernel_root, mapper, hhdm, &mut || pmm.alloc_page().ok())
        }
        .unwrap();
        let mut space2 = unsafe {
            AddressSpace::new(kernel_root, mapper, hhdm, &mut || pmm.alloc_page().ok())
        }
        .unwrap();

        let frame1 = pmm.alloc_page().unwrap();
        let frame2 = pmm.alloc_page().unwrap();
        // Distinct byte patterns in each frame (visible through the HHDM).
        unsafe {
            core::ptr::write_bytes((hhdm + frame1.start_address().as_u64()) as *mut u8, 0x11, 16);
            core::ptr::write_bytes((hhdm + frame2.start_address().as_u64()) as *mut u8, 0x22, 16);
        }

        space1
            .map_page(virt, frame1.start_address(), PageTableFlags::WRITABLE, &mut || {
                pmm.alloc_page().ok()
            })
            .unwrap();
        space2
            .map_page(virt, frame2.start_address(), PageTableFlags::WRITABLE, &mut || {
                pmm.alloc_page().ok()
            })
            .unwrap();

        // Each space translates the same virtual address to its own frame,
        // with no cross-contamination.
        let phys1 = space1.virt_to_phys(virt);
        let phys2 = space2.virt_to_phys(virt);
        assert_eq!(phys1, frame1.start_address().as_u64());
        assert_eq!(phys2, frame2.start_address().as_u64());
        unsafe {
            assert_eq!(*((hhdm + phys1) as *const u8), 0x11);
            assert_eq!(*((hhdm + phys2) as *const u8), 0x22);
        }
    }

    #[test]
    fn destroy_frees_exactly_what_construction_and_mapping_allocated() {
        let (phys, mut pmm, kernel_root, mapper) = setup(128);
        let hhdm = phys.ptr as u64;

        let used_before = pmm.used_frames();
        let mut space = unsafe {
            AddressSpace::new(kernel_root, mapper, hhdm, &mut || pmm.alloc_page().ok())
        }
        .unwrap();

        // Map two pages in the lower half (sharing intermediates).
        let data1 = pmm.alloc_page().unwrap();
        let data2 = pmm.alloc_page().unwrap();
        space
            .map_page(
                VirtAddr::new(0x1000),
                data1.start_address(),
                PageTableFlags::WRITABLE,
                &mut || pmm.alloc_page().ok(),
            )
            .unwrap();
        space
            .map_page(
                VirtAddr::new(0x2000),
                data2.start_address(),
                PageTableFlags::WRITABLE,
                &mut || pmm.alloc_page().ok(),
            )
            .unwrap();

        // Root + PDPT + PD + PT + two data frames.
        assert_eq!(pmm.used_frames(), used_before + 6);

        space.destroy(hhdm, &mut |frame| pmm.free_page(frame));
        // The table frames (root + 3 intermediates) are back; data frames
        // remain owned by us.
        assert_eq!(pmm.used_frames(), used_before + 2);
        pmm.free_page(data1);
        pmm.free_page(data2);
        assert_eq!(pmm.used_frames(), used_before);
    }

    #[test]
    fn destroy_never_touches_kernel_half() {
        let (phys, mut pmm, kernel_root, mapper) = setup(128);
        let hhdm = phys.ptr as u64;

        // Give the kernel root a present upper-half entry pointing at a
        // table frame that must survive destruction.
        let kernel_table = pmm.alloc_page().unwrap();
        unsafe {
            let kernel = &mut *((hhdm + kernel_root.as_u64()) as *mut PageTable);
            kernel.entries[400] = muon_core::arch::x86_64::structures::paging::PageTableEntry::new(
                kernel_table.start_address(),
                PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
            );
        }

        let space = unsafe {
            AddressSpace::new(kernel_root, mapper, hhdm, &mut || pmm.alloc_page().ok())
        }
        .unwrap();
        space.destroy(hhdm, &mut |frame| pmm.free_page(frame));

        assert!(pmm.is_allocated(kernel_table));
    }
}
