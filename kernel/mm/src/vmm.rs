//! The kernel's virtual memory manager.
//!
//! Owns the kernel root page table (inherited from the bootloader) and the
//! virtual region backing the kernel heap. Per-process address spaces are
//! handled separately in [`crate::address_space`]; they share the kernel's
//! upper half.

use muon_core::addr::{PhysAddr, VirtAddr};
use muon_core::arch::x86_64::structures::paging::PageTableFlags;
use muon_core::paging::{Page, PhysFrame};

use crate::mapper::PageTableMapper;
use crate::{PAGE_SIZE, VmmError};

/// Base of the kernel heap region.
///
/// PML4 slot 384: above the HHDM (slot 256 onward) even for the maximum
/// 64 TiB direct map, below the kernel image mapping at the top of memory.
pub const HEAP_BASE: VirtAddr = VirtAddr::new(0xFFFF_C000_0000_0000);

/// Initial heap mapping: 64 frames (256 KiB).
pub const INITIAL_HEAP_FRAMES: usize = 64;

/// Minimum frames added per heap growth step.
pub const MIN_GROW_FRAMES: usize = 4;

/// The kernel virtual memory manager.
pub struct Vmm {
    root: PhysAddr,
    mapper: PageTableMapper,
    /// Next unmapped heap address (grows linearly from [`HEAP_BASE`]).
    heap_top: VirtAddr,
}

impl Vmm {
    /// Creates the kernel VMM over the given root table.
    ///
    /// # Safety
    ///
    /// `root` must be the active kernel root page table and `hhdm_offset`
    /// the bootloader-installed direct-map offset.
    #[must_use]
    pub const unsafe fn new(root: PhysAddr, hhdm_offset: u64) -> Self {
        Self {
            root,
            mapper: PageTableMapper::new(hhdm_offset),
            heap_top: HEAP_BASE,
        }
    }

    /// Physical address of the kernel root page table.
    #[must_use]
    pub const fn root_phys(&self) -> PhysAddr {
        self.root
    }

    /// The mapper for this VMM's HHDM offset.
    #[must_use]
    pub const fn mapper(&self) -> PageTableMapper {
        self.mapper
    }

    /// Maps one page in the kernel address space.
    pub fn map_page(
        &mut self,
        virt: VirtAddr,
        phys: PhysAddr,
        flags: PageTableFlags,
        alloc: &mut dyn FnMut() -> Option<PhysFrame>,
    ) -> Result<(), VmmError> {
        // SAFETY: `self.root` is the kernel root by construction.
        unsafe {
            self.mapper.map(
                self.root,
                Page::containing_address(virt),
                PhysFrame::containing_address(phys),
                flags,
                alloc,
            )
        }
    }

    /// Unmaps one page from the kernel address space.
    ///
    /// Returns the frame that was mapped. Intermediate tables are not
    /// reclaimed.
    pub fn unmap_page(&mut self, virt: VirtAddr) -> Result<PhysFrame, VmmError> {
        // SAFETY: `self.root` is the kernel root by construction.
        unsafe { self.mapper.unmap(self.root, Page::containing_address(virt)) }
    }

    /// Translates a kernel virtual address.
    ///
    /// Returns 0 when any entry along the walk is absent, else the physical
    /// address including the page offset.
    #[must_use]
    pub fn virt_to_phys(&self, virt: VirtAddr) -> u64 {
        // SAFETY: `self.root` is the kernel root by construction.
        unsafe { self.mapper.translate(self.root, virt) }.map_or(0, PhysAddr::as_u64)
    }

    /// Maps the initial heap region and returns `(base, bytes)`.
    pub fn map_initial_heap(
        &mut self,
        alloc: &mut dyn FnMut() -> Option<PhysFrame>,
    ) -> Result<(VirtAddr, usize), VmmError> {
        debug_assert!(self.heap_top == HEAP_BASE, "heap already mapped");
        self.grow_heap(INITIAL_HEAP_FRAMES * PAGE_SIZE, alloc)
    }

    /// Extends the heap region by at least `min_bytes` (rounded up to whole
    /// frames, minimum [`MIN_GROW_FRAMES`]).
    ///
    /// Returns the base and size of the newly mapped span. On allocation
    /// failure partway through, pages mapped so far stay mapped and the
    /// error is reported; the heap never hands them out because the caller
    /// only extends its block list on success.
    pub fn grow_heap(
        &mut self,
        min_bytes: usize,
        alloc: &mut dyn FnMut() -> Option<PhysFrame>,
    ) -> Result<(VirtAddr, usize), VmmError> {
        let frames = min_bytes.div_ceil(PAGE_SIZE).max(MIN_GROW_FRAMES);
        let base = self.heap_top;

        for _ in 0..frames {
            let frame = alloc().ok_or(VmmError::OutOfMemory)?;
            // SAFETY: The heap region is exclusively managed by this VMM;
            // `heap_top` never aliases an existing mapping.
            unsafe {
                self.mapper.map(
                    self.root,
                    Page::containing_address(self.heap_top),
                    frame,
                    PageTableFlags::WRITABLE | PageTableFlags::GLOBAL | PageTableFlags::NO_EXECUTE,
                    alloc,
                )?;
            }
            self.heap_top = self.heap_top + PAGE_SIZE as u64;
        }

        Ok((base, frames * PAGE_SIZE))
    }

    /// Current heap-region high-water mark.
    #[must_use]
    pub const fn heap_top(&self) -> VirtAddr {
        self.heap_top
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

    fn setup(frames: usize) -> (FakePhys, FrameBitmap, Vmm) {
        let phys = FakePhys::new(frames);
        let hhdm = phys.ptr as u64;
        let regions = [PhysMemoryRegion {
            start: PhysAddr::new(0),
            size: (frames * PAGE_SIZE) as u64,
            usable: true,
        }];
        let mut pmm = unsafe { FrameBitmap::new(&regions, hhdm) }.unwrap();
        let root = pmm.alloc_page().unwrap().start_address();
        let vmm = unsafe { Vmm::new(root, hhdm) };
        (phys, pmm, vmm)
    }

    #[test]
    fn map_unmap_translate() {
        let (_phys, mut pmm, mut vmm) = setup(64);
        let frame = pmm.alloc_page().unwrap();
        let virt = VirtAddr::new(0xFFFF_C800_0000_0000);

        vmm.map_page(
            virt,
            frame.start_address(),
            PageTableFlags::WRITABLE,
            &mut || pmm.alloc_page().ok(),
        )
        .unwrap();

        assert_eq!(
            vmm.virt_to_phys(virt + 0xABC),
            frame.start_address().as_u64() | 0xABC
        );

        vmm.unmap_page(virt).unwrap();
        assert_eq!(vmm.virt_to_phys(virt), 0);
    }

    #[test]
    fn initial_heap_is_64_contiguous_pages() {
        let (_phys, mut pmm, mut vmm) = setup(128);
        let (base, bytes) = vmm
            .map_initial_heap(&mut || pmm.alloc_page().ok())
            .unwrap();
        assert_eq!(base, HEAP_BASE);
        assert_eq!(bytes, INITIAL_HEAP_FRAMES * PAGE_SIZE);

        for i in 0..INITIAL_HEAP_FRAMES {
            let virt = base + (i * PAGE_SIZE) as u64;
            assert_ne!(vmm.virt_to_phys(virt), 0, "heap page {i} not mapped");
        }
        assert_eq!(
            vmm.heap_top(),
            HEAP_BASE + (INITIAL_HEAP_FRAMES * PAGE_SIZE) as u64
        );
    }

    #[test]
    fn grow_heap_has_minimum_step() {
        let (_phys, mut pmm, mut vmm) = setup(128);
        vmm.map_initial_heap(&mut || pmm.alloc_page().ok()).unwrap();

        let used = pmm.used_frames();
        let (base, bytes) = vmm.grow_heap(1, &mut || pmm.alloc_page().ok()).unwrap();
        assert_eq!(base, HEAP_BASE + (INITIAL_HEAP_FRAMES * PAGE_SIZE) as u64);
        assert_eq!(bytes, MIN_GROW_FRAMES * PAGE_SIZE);
        // At least the data frames came from the allocator.
        assert!(pmm.used_frames() >= used + MIN_GROW_FRAMES as u64);
    }

    #[test]
    fn grow_heap_out_of_memory() {
        let (_phys, mut pmm, mut vmm) = setup(16);
        // Drain the allocator.
        while pmm.alloc_page().is_ok() {}
        let result = vmm.grow_heap(PAGE_SIZE, &mut || pmm.alloc_page().ok());
        assert_eq!(result.unwrap_err(), VmmError::OutOfMemory);
    }
}
