//! Global memory management state.
//!
//! The frame allocator and VMM live behind interrupt-safe locks with a
//! documented single-initialization lifecycle: [`init`] runs once during
//! boot, everything else goes through the accessor functions. The heap is
//! the global allocator; its growth callback maps pages through the VMM.

use core::sync::atomic::{AtomicU64, Ordering};

use muon_core::addr::{PhysAddr, VirtAddr};
use muon_core::arch::x86_64::registers::control;
use muon_core::arch::x86_64::structures::paging::PageTableFlags;
use muon_core::paging::PhysFrame;
use muon_core::sync::IrqSpinLock;
use muon_mm::address_space::AddressSpace;
use muon_mm::heap::KernelHeap;
use muon_mm::pmm::FrameBitmap;
use muon_mm::vmm::Vmm;
use muon_mm::{PhysMemoryRegion, PmmError, VmmError};

use crate::boot::BootInfo;

static PMM: IrqSpinLock<Option<FrameBitmap>> = IrqSpinLock::new(None);
static VMM: IrqSpinLock<Option<Vmm>> = IrqSpinLock::new(None);
static HHDM_OFFSET: AtomicU64 = AtomicU64::new(0);

/// The kernel heap, serving every `alloc` user in the kernel.
#[global_allocator]
static HEAP: KernelHeap = KernelHeap::new();

/// The Higher Half Direct Map offset recorded at boot.
#[must_use]
pub fn hhdm_offset() -> u64 {
    HHDM_OFFSET.load(Ordering::Relaxed)
}

/// Records the HHDM base. First thing the boot path does; [`init`]
/// stores the same value again harmlessly.
pub fn record_hhdm(offset: u64) {
    HHDM_OFFSET.store(offset, Ordering::Relaxed);
}

/// Translates a physical address through the HHDM.
#[must_use]
pub fn phys_to_virt(phys: PhysAddr) -> VirtAddr {
    VirtAddr::new_truncate(hhdm_offset() + phys.as_u64())
}

/// Brings up the frame allocator, the VMM over the bootloader-installed
/// root table, and the kernel heap, in that order.
///
/// # Panics
///
/// Panics when no usable region can hold the frame bitmap or the initial
/// heap cannot be mapped; the kernel cannot run without either.
pub fn init(boot_info: &BootInfo) {
    HHDM_OFFSET.store(boot_info.hhdm_offset, Ordering::Relaxed);

    let regions: &[PhysMemoryRegion] = boot_info.memory_map.as_slice();
    // SAFETY: The memory map and HHDM offset come straight from the
    // bootloader handoff; init runs exactly once.
    let pmm = unsafe { FrameBitmap::new(regions, boot_info.hhdm_offset) }
        .unwrap_or_else(|e| panic!("PMM init failed: {e}"));
    muon_core::kinfo!(
        "pmm: {} MiB usable, {} KiB reserved at init",
        pmm.total_bytes() / (1024 * 1024),
        pmm.used_frames() * 4,
    );
    *PMM.lock() = Some(pmm);

    // The bootloader's root table stays the kernel root for the whole
    // uptime; its upper half is what every process shares.
    let root = control::current_page_table();
    // SAFETY: `root` is the live root table and the HHDM offset is real.
    let vmm = unsafe { Vmm::new(root, boot_info.hhdm_offset) };
    *VMM.lock() = Some(vmm);
    muon_mm::mapper::register_tlb_flush(muon_core::arch::x86_64::instructions::tlb::flush);

    // Map and hand over the initial heap.
    let (heap_base, heap_size) = {
        let mut vmm = VMM.lock();
        let mut pmm = PMM.lock();
        let pmm = pmm.as_mut().expect("PMM initialized above");
        vmm.as_mut()
            .expect("VMM initialized above")
            .map_initial_heap(&mut || pmm.alloc_page().ok())
            .unwrap_or_else(|e| panic!("heap init failed: {e}"))
    };
    // SAFETY: The region was just mapped writable and is unused.
    unsafe { HEAP.init(heap_base.as_u64() as usize, heap_size) };
    HEAP.register_grow_fn(grow_heap);
    muon_core::kinfo!(
        "heap: {} KiB initial at {heap_base}",
        heap_size / 1024
    );
}

/// Heap growth callback: maps at least `min_bytes` of fresh pages at the
/// heap region's end. Runs without the heap lock held.
fn grow_heap(min_bytes: usize) -> Option<usize> {
    let mut vmm = VMM.lock();
    let mut pmm = PMM.lock();
    let pmm = pmm.as_mut()?;
    let (_, bytes) = vmm
        .as_mut()?
        .grow_heap(min_bytes, &mut || pmm.alloc_page().ok())
        .ok()?;
    Some(bytes)
}

/// Allocates one physical frame.
pub fn alloc_frame() -> Result<PhysFrame, PmmError> {
    PMM.lock().as_mut().ok_or(PmmError::OutOfMemory)?.alloc_page()
}

/// Allocates `count` physically contiguous frames.
pub fn alloc_contiguous(count: u64) -> Result<PhysFrame, PmmError> {
    PMM.lock()
        .as_mut()
        .ok_or(PmmError::OutOfMemory)?
        .alloc_contiguous(count)
}

/// Returns one frame to the pool.
pub fn free_frame(frame: PhysFrame) {
    if let Some(pmm) = PMM.lock().as_mut() {
        pmm.free_page(frame);
    }
}

/// Returns `count` consecutive frames to the pool.
pub fn free_frames(frame: PhysFrame, count: u64) {
    if let Some(pmm) = PMM.lock().as_mut() {
        pmm.free_pages(frame, count);
    }
}

/// Frames currently allocated or reserved.
#[must_use]
pub fn used_frames() -> u64 {
    PMM.lock().as_ref().map_or(0, FrameBitmap::used_frames)
}

/// Free bytes in the physical pool.
#[must_use]
pub fn free_memory() -> u64 {
    PMM.lock().as_ref().map_or(0, FrameBitmap::free_bytes)
}

/// Total usable bytes in the physical pool.
#[must_use]
pub fn total_memory() -> u64 {
    PMM.lock().as_ref().map_or(0, FrameBitmap::total_bytes)
}

/// The kernel root page table.
#[must_use]
pub fn kernel_root() -> PhysAddr {
    VMM.lock()
        .as_ref()
        .map_or(PhysAddr::zero(), Vmm::root_phys)
}

/// Maps one kernel page.
pub fn map_page(virt: VirtAddr, phys: PhysAddr, flags: PageTableFlags) -> Result<(), VmmError> {
    let mut vmm = VMM.lock();
    let mut pmm = PMM.lock();
    let pmm = pmm.as_mut().ok_or(VmmError::OutOfMemory)?;
    vmm.as_mut()
        .ok_or(VmmError::OutOfMemory)?
        .map_page(virt, phys, flags, &mut || pmm.alloc_page().ok())
}

/// Unmaps one kernel page, returning the frame that was mapped.
pub fn unmap_page(virt: VirtAddr) -> Result<PhysFrame, VmmError> {
    VMM.lock()
        .as_mut()
        .ok_or(VmmError::NotMapped)?
        .unmap_page(virt)
}

/// Translates a kernel virtual address (0 when unmapped).
#[must_use]
pub fn virt_to_phys(virt: VirtAddr) -> u64 {
    VMM.lock().as_ref().map_or(0, |vmm| vmm.virt_to_phys(virt))
}

/// Creates a process address space sharing the kernel upper half.
pub fn create_address_space() -> Result<AddressSpace, VmmError> {
    let vmm = VMM.lock();
    let vmm = vmm.as_ref().ok_or(VmmError::OutOfMemory)?;
    let mapper = vmm.mapper();
    let kernel_root = vmm.root_phys();
    let mut pmm = PMM.lock();
    let pmm = pmm.as_mut().ok_or(VmmError::OutOfMemory)?;
    // SAFETY: `kernel_root` is the live kernel root; the mapper carries the
    // boot HHDM offset.
    unsafe { AddressSpace::new(kernel_root, mapper, hhdm_offset(), &mut || pmm.alloc_page().ok()) }
}

/// Destroys a process address space, returning its table frames.
pub fn destroy_address_space(space: AddressSpace) {
    let mut pmm = PMM.lock();
    if let Some(pmm) = pmm.as_mut() {
        space.destroy(hhdm_offset(), &mut |frame| pmm.free_page(frame));
    }
}

/// Heap bytes currently handed out.
#[must_use]
pub fn heap_used() -> usize {
    HEAP.used_bytes()
}

/// Heap bytes currently free.
#[must_use]
pub fn heap_free() -> usize {
    HEAP.free_bytes()
}
