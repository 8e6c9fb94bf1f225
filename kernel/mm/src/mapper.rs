//! Page table walking and mapping through the HHDM.
//!
//! All page table frames are dereferenced as `hhdm_offset + phys`, so the
//! same code runs against real page tables in the kernel and against plain
//! buffers in host tests.
//!
//! # TLB flush decoupling
//!
//! The architecture-specific `invlpg` is registered at boot via
//! [`register_tlb_flush`]. Before registration (early boot, host tests)
//! flushes are no-ops.

use core::sync::atomic::{AtomicPtr, Ordering};

use muon_core::addr::{PhysAddr, VirtAddr};
use muon_core::arch::x86_64::structures::paging::{PageTable, PageTableEntry, PageTableFlags};
use muon_core::paging::{Page, PhysFrame};

use crate::{PAGE_SIZE, VmmError};

/// Registered TLB flush function. No-op until boot registers `invlpg`.
static TLB_FLUSH_FN: AtomicPtr<()> = AtomicPtr::new(nop_flush as fn(VirtAddr) as *mut ());

fn nop_flush(_virt: VirtAddr) {}

/// Registers the architecture's single-page TLB flush.
pub fn register_tlb_flush(f: fn(VirtAddr)) {
    TLB_FLUSH_FN.store(f as *mut (), Ordering::Release);
}

/// Invalidates the TLB entry for `virt` through the registered callback.
#[inline]
pub fn flush_page(virt: VirtAddr) {
    let ptr = TLB_FLUSH_FN.load(Ordering::Acquire);
    // SAFETY: Only valid `fn(VirtAddr)` pointers are stored.
    let f: fn(VirtAddr) = unsafe { core::mem::transmute(ptr) };
    f(virt);
}

/// Flags applied to every intermediate (non-leaf) entry the mapper creates.
///
/// Writable and user are set permissively so the leaf entry alone decides
/// the effective permission.
const INTERMEDIATE_FLAGS: PageTableFlags = PageTableFlags::PRESENT
    .union(PageTableFlags::WRITABLE)
    .union(PageTableFlags::USER);

/// Walks and builds 4-level page tables via the HHDM.
#[derive(Debug, Clone, Copy)]
pub struct PageTableMapper {
    hhdm_offset: u64,
}

impl PageTableMapper {
    /// Creates a mapper using the given HHDM offset.
    #[must_use]
    pub const fn new(hhdm_offset: u64) -> Self {
        Self { hhdm_offset }
    }

    /// Returns a mutable reference to the page table at `phys`.
    ///
    /// # Safety
    ///
    /// `phys` must point to a valid, frame-aligned page table reachable
    /// through the HHDM, and no other reference to it may be live.
    unsafe fn table_at(&self, phys: PhysAddr) -> &mut PageTable {
        // SAFETY: Caller contract.
        unsafe { &mut *((self.hhdm_offset + phys.as_u64()) as *mut PageTable) }
    }

    /// Reads the entry for `index` in the table at `table_phys`, allocating
    /// and installing a fresh zeroed table when the entry is absent.
    ///
    /// # Safety
    ///
    /// `table_phys` must point to a valid page table; `alloc` must return
    /// frames reachable through the HHDM.
    unsafe fn ensure_table(
        &self,
        table_phys: PhysAddr,
        index: usize,
        alloc: &mut dyn FnMut() -> Option<PhysFrame>,
    ) -> Result<PhysAddr, VmmError> {
        // SAFETY: Caller contract.
        let table = unsafe { self.table_at(table_phys) };
        let entry = table.entries[index];
        if entry.is_present() {
            return Ok(entry.address());
        }

        let frame = alloc().ok_or(VmmError::OutOfMemory)?;
        let phys = frame.start_address();
        // SAFETY: The frame was just allocated for us and is HHDM-reachable.
        // Zeroing it ensures no stale bits read as present entries.
        unsafe {
            core::ptr::write_bytes((self.hhdm_offset + phys.as_u64()) as *mut u8, 0, PAGE_SIZE);
        }
        table.entries[index] = PageTableEntry::new(phys, INTERMEDIATE_FLAGS);
        Ok(phys)
    }

    /// Maps `page` to `frame` with `flags` in the tree rooted at `root`,
    /// then invalidates the TLB entry for the page.
    ///
    /// Missing intermediate tables are allocated from `alloc` and zeroed.
    /// The present bit is always added to `flags`.
    ///
    /// # Safety
    ///
    /// - `root` must point to a valid root page table.
    /// - Remapping an address that is in use elsewhere can break aliasing
    ///   assumptions; the caller is responsible for the mapping's sanity.
    pub unsafe fn map(
        &self,
        root: PhysAddr,
        page: Page,
        frame: PhysFrame,
        flags: PageTableFlags,
        alloc: &mut dyn FnMut() -> Option<PhysFrame>,
    ) -> Result<(), VmmError> {
        let virt = page.start_address();
        // SAFETY: Caller contract.
        let pdpt = unsafe { self.ensure_table(root, virt.pml4_index(), alloc)? };
        // SAFETY: `ensure_table` returned a valid table.
        let pd = unsafe { self.ensure_table(pdpt, virt.pdpt_index(), alloc)? };
        // SAFETY: Same.
        let pt_phys = unsafe { self.ensure_table(pd, virt.pd_index(), alloc)? };

        // SAFETY: Same.
        let pt = unsafe { self.table_at(pt_phys) };
        pt.entries[virt.pt_index()] =
            PageTableEntry::new(frame.start_address(), flags | PageTableFlags::PRESENT);

        flush_page(virt);
        Ok(())
    }

    /// Clears the leaf entry for `page` and invalidates its TLB entry.
    ///
    /// Returns the frame that was mapped. Empty intermediate tables are not
    /// reclaimed.
    ///
    /// # Safety
    ///
    /// `root` must point to a valid root page table.
    pub unsafe fn unmap(&self, root: PhysAddr, page: Page) -> Result<PhysFrame, VmmError> {
        let virt = page.start_address();
        // SAFETY: Caller contract.
        let pt_phys = unsafe { self.walk_to_pt(root, virt) }.ok_or(VmmError::NotMapped)?;
        // SAFETY: `walk_to_pt` returned a valid table.
        let pt = unsafe { self.table_at(pt_phys) };
        let entry = pt.entries[virt.pt_index()];
        if !entry.is_present() {
            return Err(VmmError::NotMapped);
        }

        pt.entries[virt.pt_index()] = PageTableEntry::empty();
        flush_page(virt);
        Ok(PhysFrame::containing_address(entry.address()))
    }

    /// Walks to the page table covering `virt`, without mutating anything.
    ///
    /// Returns `None` if any entry along the path is absent or maps a huge
    /// page.
    ///
    /// # Safety
    ///
    /// `root` must point to a valid root page table.
    unsafe fn walk_to_pt(&self, root: PhysAddr, virt: VirtAddr) -> Option<PhysAddr> {
        let mut table_phys = root;
        for index in [virt.pml4_index(), virt.pdpt_index(), virt.pd_index()] {
            // SAFETY: Caller contract / previous level was present.
            let table = unsafe { self.table_at(table_phys) };
            let entry = table.entries[index];
            if !entry.is_present() || entry.is_huge() {
                return None;
            }
            table_phys = entry.address();
        }
        Some(table_phys)
    }

    /// Translates `virt` to its physical address, including the page
    /// offset. Returns `None` if any entry along the path is absent.
    ///
    /// Huge-page entries installed by the bootloader (2 MiB and 1 GiB) are
    /// translated; this kernel itself only creates 4 KiB leaves.
    ///
    /// # Safety
    ///
    /// `root` must point to a valid root page table.
    #[must_use]
    pub unsafe fn translate(&self, root: PhysAddr, virt: VirtAddr) -> Option<PhysAddr> {
        // SAFETY: Caller contract.
        let pml4 = unsafe { self.table_at(root) };
        let pml4e = pml4.entries[virt.pml4_index()];
        if !pml4e.is_present() {
            return None;
        }

        // SAFETY: Present entry references a valid table.
        let pdpt = unsafe { self.table_at(pml4e.address()) };
        let pdpte = pdpt.entries[virt.pdpt_index()];
        if !pdpte.is_present() {
            return None;
        }
        if pdpte.is_huge() {
            let base = pdpte.address().as_u64();
            return Some(PhysAddr::new_truncate(
                base + (virt.as_u64() & 0x3FFF_FFFF),
            ));
        }

        // SAFETY: Same.
        let pd = unsafe { self.table_at(pdpte.address()) };
        let pde = pd.entries[virt.pd_index()];
        if !pde.is_present() {
            return None;
        }
        if pde.is_huge() {
            let base = pde.address().as_u64();
            return Some(PhysAddr::new_truncate(base + (virt.as_u64() & 0x1F_FFFF)));
        }

        // SAFETY: Same.
        let pt = unsafe { self.table_at(pde.address()) };
        let pte = pt.entries[virt.pt_index()];
        if !pte.is_present() {
            return None;
        }
        Some(PhysAddr::new_truncate(
            pte.address().as_u64() | virt.page_offset(),
        ))
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

        fn hhdm(&self) -> u64 {
            self.ptr as u64
        }
    }

    impl Drop for FakePhys {
        fn drop(&mut self) {
            unsafe { std::alloc::dealloc(self.ptr, self.layout) };
        }
    }

    fn setup(frames: usize) -> (FakePhys, FrameBitmap, PageTableMapper) {
        let phys = FakePhys::new(frames);
        let regions = [PhysMemoryRegion {
            start: PhysAddr::new(0),
            size: (frames * PAGE_SIZE) as u64,
            usable: true,
        }];
        let pmm = unsafe { FrameBitmap::new(&regions, phys.hhdm()) }.unwrap();
        let mapper = PageTableMapper::new(phys.hhdm());
        (phys, pmm, mapper)
    }

    #[test]
    fn map_then_translate_round_trips() {
        let (_phys, mut pmm, mapper) = setup(64);
        let root = pmm.alloc_page().unwrap().start_address();

        let page = Page::containing_address(VirtAddr::new(0x4000_0000_0000));
        let frame = pmm.alloc_page().unwrap();
        unsafe {
            mapper
                .map(
                    root,
                    page,
                    frame,
                    PageTableFlags::WRITABLE,
                    &mut || pmm.alloc_page().ok(),
                )
                .unwrap();
        }

        // Translation includes the page offset.
        let virt = page.start_address() + 0x123;
        let phys = unsafe { mapper.translate(root, virt) }.unwrap();
        assert_eq!(
            phys.as_u64(),
            frame.start_address().as_u64() | 0x123
        );
    }

    #[test]
    fn translate_unmapped_is_none() {
        let (_phys, mut pmm, mapper) = setup(64);
        let root = pmm.alloc_page().unwrap().start_address();
        assert!(unsafe { mapper.translate(root, VirtAddr::new(0xDEAD_B000)) }.is_none());
    }

    #[test]
    fn unmap_clears_the_leaf_only() {
        let (_phys, mut pmm, mapper) = setup(64);
        let root = pmm.alloc_page().unwrap().start_address();

        let page = Page::containing_address(VirtAddr::new(0x1234_5000));
        let frame = pmm.alloc_page().unwrap();
        let used_before_map = pmm.used_frames();
        unsafe {
            mapper
                .map(root, page, frame, PageTableFlags::WRITABLE, &mut || {
                    pmm.alloc_page().ok()
                })
                .unwrap();
        }
        // Three intermediate tables were allocated.
        assert_eq!(pmm.used_frames(), used_before_map + 3);

        let unmapped = unsafe { mapper.unmap(root, page) }.unwrap();
        assert_eq!(unmapped, frame);
        assert!(unsafe { mapper.translate(root, page.start_address()) }.is_none());
        // Intermediate tables are not reclaimed.
        assert_eq!(pmm.used_frames(), used_before_map + 3);

        // Unmapping again reports not-mapped.
        assert_eq!(
            unsafe { mapper.unmap(root, page) },
            Err(VmmError::NotMapped)
        );
    }

    #[test]
    fn map_reuses_existing_intermediates() {
        let (_phys, mut pmm, mapper) = setup(64);
        let root = pmm.alloc_page().unwrap().start_address();

        let page_a = Page::containing_address(VirtAddr::new(0x7000));
        let page_b = Page::containing_address(VirtAddr::new(0x8000));
        let frame_a = pmm.alloc_page().unwrap();
        let frame_b = pmm.alloc_page().unwrap();

        unsafe {
            mapper
                .map(root, page_a, frame_a, PageTableFlags::WRITABLE, &mut || {
                    pmm.alloc_page().ok()
                })
                .unwrap();
        }
        let after_first = pmm.used_frames();
        unsafe {
            mapper
                .map(root, page_b, frame_b, PageTableFlags::WRITABLE, &mut || {
                    pmm.alloc_page().ok()
                })
                .unwrap();
        }
        // Same PT: no new tables allocated.
        assert_eq!(pmm.used_frames(), after_first);
    }

    #[test]
    fn huge_page_translation_uses_large_offset() {
        let (_phys, mut pmm, mapper) = setup(64);
        let root = pmm.alloc_page().unwrap().start_address();

        // Hand-install a 2 MiB huge entry at PD level.
        let virt = VirtAddr::new(0x4020_0000);
        let pdpt = pmm.alloc_page().unwrap().start_address();
        let pd = pmm.alloc_page().unwrap().start_address();
        unsafe {
            let root_table = &mut *((mapper.hhdm_offset + root.as_u64()) as *mut PageTable);
            root_table.entries[virt.pml4_index()] =
                PageTableEntry::new(pdpt, INTERMEDIATE_FLAGS);
            let pdpt_table = &mut *((mapper.hhdm_offset + pdpt.as_u64()) as *mut PageTable);
            pdpt_table.entries[virt.pdpt_index()] =
                PageTableEntry::new(pd, INTERMEDIATE_FLAGS);
            let pd_table = &mut *((mapper.hhdm_offset + pd.as_u64()) as *mut PageTable);
            pd_table.entries[virt.pd_index()] = PageTableEntry::new(
                PhysAddr::new(0x4000_0000),
                PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::HUGE_PAGE,
            );
        }

        let phys = unsafe { mapper.translate(root, virt + 0x1234) }.unwrap();
        assert_eq!(phys.as_u64(), 0x4000_0000 + (virt.as_u64() & 0x1F_FFFF) + 0x1234);
    }
}
