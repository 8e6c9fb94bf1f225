//! Boot information and the kernel initialization sequence.
//!
//! The boot stub (one per supported bootloader; Limine today) converts
//! protocol responses into a [`BootInfo`] and calls [`kernel_init`],
//! which brings the subsystems up in dependency order and then hands the
//! CPU to whatever long-running task the outer program supplies.

use muon_core::addr::{PhysAddr, VirtAddr};
use muon_mm::PhysMemoryRegion;
use planck_noalloc::vec::ArrayVec;

/// Maximum memory-map entries carried in [`BootInfo`].
pub const MAX_MEMORY_REGIONS: usize = 64;

/// Linear framebuffer description from the bootloader handoff.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferInfo {
    /// Virtual address of the framebuffer (HHDM-mapped by the loader).
    pub address: u64,
    /// Width in pixels.
    pub width: u64,
    /// Height in pixels.
    pub height: u64,
    /// Bytes per scanline.
    pub pitch: u64,
    /// Bits per pixel.
    pub bpp: u16,
    /// Red channel (mask size, shift).
    pub red_mask: (u8, u8),
    /// Green channel (mask size, shift).
    pub green_mask: (u8, u8),
    /// Blue channel (mask size, shift).
    pub blue_mask: (u8, u8),
}

/// Everything the kernel consumes from the bootloader handoff.
pub struct BootInfo {
    /// Higher Half Direct Map base offset.
    pub hhdm_offset: u64,
    /// Physical memory map, reduced to base/size/usable.
    pub memory_map: ArrayVec<PhysMemoryRegion, MAX_MEMORY_REGIONS>,
    /// Framebuffer, when the loader provided one (a missing framebuffer
    /// only degrades the console collaborator).
    pub framebuffer: Option<FramebufferInfo>,
    /// Physical load address of the kernel image.
    pub kernel_phys_base: PhysAddr,
    /// Virtual base address of the kernel image.
    pub kernel_virt_base: VirtAddr,
    /// Physical address of the ACPI RSDP, when provided.
    pub rsdp_addr: Option<u64>,
    /// Bootloader name string.
    pub bootloader_name: &'static str,
    /// Bootloader version string.
    pub bootloader_version: &'static str,
}

/// Brings the kernel up and never returns.
///
/// The order is load-bearing: HHDM first (everything dereferences
/// physical memory through it), descriptor tables and the PIC before
/// interrupts are enabled, the memory stack before anything allocates,
/// the timer before anything sleeps, the process table before anything
/// schedules, and the disk/filesystem last.
pub fn kernel_init(boot_info: &BootInfo, main: fn() -> !) -> ! {
    muon_core::kinfo!(
        "muon: booted by {} {}",
        boot_info.bootloader_name,
        boot_info.bootloader_version
    );
    muon_core::kinfo!(
        "muon: hhdm at {:#x}, kernel at {} / {}",
        boot_info.hhdm_offset,
        boot_info.kernel_phys_base,
        boot_info.kernel_virt_base
    );

    crate::mm::record_hhdm(boot_info.hhdm_offset);

    // SAFETY: Single-shot early-boot calls, interrupts still disabled.
    unsafe {
        crate::arch::x86_64::init_tables();
        crate::arch::x86_64::interrupts::init_pic();
        // Every line is masked; enabling the flag is safe and lets
        // spurious arrivals be filtered properly from here on.
        muon_core::arch::x86_64::instructions::interrupts::enable();
    }

    crate::mm::init(boot_info);
    crate::time::init();
    crate::log::init_full_logger();
    crate::keyboard::init();
    crate::proc::init();
    crate::disk::init();
    crate::fs::mount_root();

    muon_core::kinfo!(
        "muon: up — {} MiB free, {} processes",
        crate::mm::free_memory() / (1024 * 1024),
        crate::proc::process_count(),
    );

    main()
}
