//! Limine boot stub for the Muon kernel.
//!
//! Declares the protocol requests, converts the responses into the
//! kernel's [`BootInfo`], brings up early serial logging, and enters
//! [`kernel_init`]. The long-running task handed to the kernel is a
//! plain idle loop: run the scheduler when asked, park otherwise.

#![no_std]
#![no_main]

mod requests;

use muon_core::addr::{PhysAddr, VirtAddr};
use muon_kernel::boot::{BootInfo, FramebufferInfo, MAX_MEMORY_REGIONS};
use muon_kernel::kernel_init;
use muon_mm::PhysMemoryRegion;
use planck_noalloc::vec::ArrayVec;

use limine::memmap::MemMapEntryType;
use requests::REQUESTS;

/// Limine entry point: responses are filled in, the CPU is in long mode
/// with the HHDM installed, interrupts are off.
#[unsafe(no_mangle)]
extern "C" fn _start() -> ! {
    muon_kernel::log::init_early_serial();

    assert!(
        REQUESTS.base_revision.is_supported(),
        "bootloader does not support the requested Limine revision"
    );

    let hhdm = REQUESTS
        .hhdm
        .response()
        .expect("no HHDM response")
        .hhdm_base;

    let memmap = REQUESTS.memmap.response().expect("no memory map response");
    let mut memory_map: ArrayVec<PhysMemoryRegion, MAX_MEMORY_REGIONS> = ArrayVec::new();
    for entry in memmap.entries() {
        if memory_map.len() == MAX_MEMORY_REGIONS {
            muon_kernel::kwarn!("boot: memory map truncated to {MAX_MEMORY_REGIONS} entries");
            break;
        }
        memory_map.push(PhysMemoryRegion {
            start: PhysAddr::new_truncate(entry.base),
            size: entry.length,
            usable: entry.type_ == MemMapEntryType::Usable,
        });
    }

    let exec = REQUESTS
        .executable_address
        .response()
        .expect("no executable address response");

    let framebuffer = REQUESTS
        .framebuffer
        .response()
        .and_then(|r| r.first())
        .map(|fb| FramebufferInfo {
            address: fb.address() as u64,
            width: fb.width(),
            height: fb.height(),
            pitch: fb.pitch(),
            bpp: fb.bpp(),
            red_mask: fb.red_mask(),
            green_mask: fb.green_mask(),
            blue_mask: fb.blue_mask(),
        });

    let (bootloader_name, bootloader_version) = REQUESTS
        .bootloader_info
        .response()
        .map_or(("unknown", "?"), |info| (info.name(), info.version()));

    let boot_info = BootInfo {
        hhdm_offset: hhdm,
        memory_map,
        framebuffer,
        kernel_phys_base: PhysAddr::new_truncate(exec.phys_base),
        kernel_virt_base: VirtAddr::new_truncate(exec.virt_base),
        rsdp_addr: REQUESTS.rsdp.response().map(|r| r.address),
        bootloader_name,
        bootloader_version,
    };

    kernel_init(&boot_info, idle_main)
}

/// The implicit kernel task's forever-loop: schedule when the timer asks,
/// park in between.
fn idle_main() -> ! {
    loop {
        muon_kernel::proc::maybe_schedule();
        muon_core::arch::x86_64::instructions::interrupts::hlt();
    }
}
