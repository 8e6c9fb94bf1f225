//! Response structures written by the Limine bootloader.
//!
//! Every request embeds a [`Response<T>`] slot: a pointer the bootloader
//! fills in before handing off. Responses live in bootloader-reclaimable
//! memory and must be consumed before that memory is reused.

use core::cell::UnsafeCell;
use core::ffi::{CStr, c_char};
use core::ptr::NonNull;

use crate::framebuffer::{Framebuffer, FramebufferIter, RawFramebuffer};
use crate::memmap::{MemMapEntry, MemMapIter};

/// A response slot inside a request structure.
///
/// Starts out null; the bootloader writes the response pointer before the
/// kernel gains control.
#[repr(transparent)]
pub struct Response<T>(UnsafeCell<*const T>);

impl<T> Response<T> {
    /// Creates an empty (null) response slot.
    pub(crate) const fn empty() -> Self {
        Self(UnsafeCell::new(core::ptr::null()))
    }

    /// Returns the response if the bootloader provided one.
    pub(crate) fn get(&self) -> Option<&T> {
        // SAFETY: The bootloader writes the pointer exactly once before the
        // kernel starts; afterwards the slot is read-only. A non-null pointer
        // references a valid response structure for the kernel's lifetime
        // (until bootloader-reclaimable memory is reused).
        unsafe { (*self.0.get()).as_ref() }
    }
}

// SAFETY: The slot is written only by the bootloader before kernel entry and
// read-only afterwards, so shared access from kernel code is safe.
unsafe impl<T: Sync> Sync for Response<T> {}

/// Response to the Bootloader Info request.
#[repr(C)]
pub struct BootloaderInfoResponse {
    /// Response revision.
    pub revision: u64,
    name: *const c_char,
    version: *const c_char,
}

// SAFETY: Read-only data written once by the bootloader.
unsafe impl Sync for BootloaderInfoResponse {}

impl BootloaderInfoResponse {
    /// The bootloader's name (e.g. "Limine").
    ///
    /// Returns an empty string if the bytes are not valid UTF-8.
    #[must_use]
    pub fn name(&self) -> &str {
        // SAFETY: The bootloader provides a NUL-terminated string that lives
        // for the kernel's lifetime.
        unsafe { CStr::from_ptr(self.name) }.to_str().unwrap_or("")
    }

    /// The bootloader's version string.
    #[must_use]
    pub fn version(&self) -> &str {
        // SAFETY: Same as `name`.
        unsafe { CStr::from_ptr(self.version) }
            .to_str()
            .unwrap_or("")
    }
}

/// Response to the HHDM request.
#[repr(C)]
pub struct HhdmResponse {
    /// Response revision.
    pub revision: u64,
    /// Virtual base address of the Higher Half Direct Map.
    pub hhdm_base: u64,
}

// SAFETY: Plain read-only data.
unsafe impl Sync for HhdmResponse {}

/// Response to the Memory Map request.
#[repr(C)]
pub struct MemMapResponse {
    /// Response revision.
    pub revision: u64,
    entry_count: u64,
    entries: NonNull<NonNull<MemMapEntry>>,
}

// SAFETY: The entry array is written once by the bootloader and never
// mutated afterwards.
unsafe impl Sync for MemMapResponse {}

impl MemMapResponse {
    /// The number of memory map entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entry_count as usize
    }

    /// Returns an iterator over the memory map entries.
    #[must_use]
    pub fn entries(&self) -> MemMapIter<'_> {
        MemMapIter::new(self.entry_count as usize, self.entries)
    }
}

/// Response to the Framebuffer request.
#[repr(C)]
pub struct FramebufferResponse {
    /// Response revision.
    pub revision: u64,
    framebuffer_count: u64,
    framebuffers: NonNull<NonNull<RawFramebuffer>>,
}

// SAFETY: The framebuffer list is written once by the bootloader.
unsafe impl Sync for FramebufferResponse {}

impl FramebufferResponse {
    /// The number of available framebuffers.
    #[must_use]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffer_count as usize
    }

    /// Returns an iterator over the available framebuffers.
    #[must_use]
    pub fn framebuffers(&self) -> FramebufferIter<'_> {
        FramebufferIter::new(self.framebuffer_count as usize, self.framebuffers)
    }

    /// Convenience accessor for the first framebuffer, if any.
    #[must_use]
    pub fn first(&self) -> Option<Framebuffer<'_>> {
        self.framebuffers().next()
    }
}

/// Response to the Executable Address request.
#[repr(C)]
pub struct ExecutableAddressResponse {
    /// Response revision.
    pub revision: u64,
    /// Physical base address of the kernel image.
    pub phys_base: u64,
    /// Virtual base address of the kernel image.
    pub virt_base: u64,
}

// SAFETY: Plain read-only data.
unsafe impl Sync for ExecutableAddressResponse {}

/// Response to the RSDP request.
#[repr(C)]
pub struct RsdpResponse {
    /// Response revision.
    pub revision: u64,
    /// Address of the RSDP structure (physical on base revision >= 3).
    pub address: u64,
}

// SAFETY: Plain read-only data.
unsafe impl Sync for RsdpResponse {}
