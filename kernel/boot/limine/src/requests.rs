//! The Limine request block.
//!
//! One static structure in the `.requests` section, bracketed by the
//! protocol's start/end markers so the bootloader can find it.

use limine::{
    BaseRevision, BootloaderInfoRequest, ExecutableAddressRequest, FramebufferRequest,
    HhdmRequest, MemMapRequest, RequestsEndMarker, RequestsStartMarker, RsdpRequest,
};

/// Every request this kernel makes of the bootloader.
#[repr(C, align(8))]
pub struct LimineRequests {
    _start_marker: RequestsStartMarker,
    /// Protocol base revision handshake.
    pub base_revision: BaseRevision,
    /// Bootloader name and version.
    pub bootloader_info: BootloaderInfoRequest,
    /// Higher Half Direct Map offset.
    pub hhdm: HhdmRequest,
    /// Physical memory map.
    pub memmap: MemMapRequest,
    /// Linear framebuffer.
    pub framebuffer: FramebufferRequest,
    /// Kernel physical/virtual load addresses.
    pub executable_address: ExecutableAddressRequest,
    /// ACPI RSDP location.
    pub rsdp: RsdpRequest,
    _end_marker: RequestsEndMarker,
}

impl LimineRequests {
    const fn new() -> Self {
        Self {
            _start_marker: RequestsStartMarker::new(),
            base_revision: BaseRevision::new(),
            bootloader_info: BootloaderInfoRequest::new(),
            hhdm: HhdmRequest::new(),
            memmap: MemMapRequest::new(),
            framebuffer: FramebufferRequest::new(),
            executable_address: ExecutableAddressRequest::new(),
            rsdp: RsdpRequest::new(),
            _end_marker: RequestsEndMarker::new(),
        }
    }
}

#[used]
#[unsafe(link_section = ".requests")]
pub static REQUESTS: LimineRequests = LimineRequests::new();
