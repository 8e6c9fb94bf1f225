//! Framebuffer structures provided by the bootloader.

use core::ptr::NonNull;

/// Raw framebuffer structure as laid out by the protocol (revision 0
/// fields only; video-mode lists from revision 1 are not consumed).
#[repr(C)]
pub struct RawFramebuffer {
    address: *mut u8,
    width: u64,
    height: u64,
    pitch: u64,
    bpp: u16,
    memory_model: u8,
    red_mask_size: u8,
    red_mask_shift: u8,
    green_mask_size: u8,
    green_mask_shift: u8,
    blue_mask_size: u8,
    blue_mask_shift: u8,
    unused: [u8; 7],
    edid_size: u64,
    edid: *mut u8,
}

/// Linear RGB memory model discriminant.
pub const MEMORY_MODEL_RGB: u8 = 1;

/// A safe view over a bootloader-provided framebuffer.
#[derive(Clone, Copy)]
pub struct Framebuffer<'a> {
    raw: &'a RawFramebuffer,
}

impl Framebuffer<'_> {
    /// Virtual address of the framebuffer memory (already HHDM-mapped by
    /// the bootloader).
    #[must_use]
    pub fn address(&self) -> *mut u8 {
        self.raw.address
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u64 {
        self.raw.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u64 {
        self.raw.height
    }

    /// Bytes per scanline.
    #[must_use]
    pub fn pitch(&self) -> u64 {
        self.raw.pitch
    }

    /// Bits per pixel.
    #[must_use]
    pub fn bpp(&self) -> u16 {
        self.raw.bpp
    }

    /// Memory model discriminant ([`MEMORY_MODEL_RGB`] for linear RGB).
    #[must_use]
    pub fn memory_model(&self) -> u8 {
        self.raw.memory_model
    }

    /// Red channel (mask size, mask shift).
    #[must_use]
    pub fn red_mask(&self) -> (u8, u8) {
        (self.raw.red_mask_size, self.raw.red_mask_shift)
    }

    /// Green channel (mask size, mask shift).
    #[must_use]
    pub fn green_mask(&self) -> (u8, u8) {
        (self.raw.green_mask_size, self.raw.green_mask_shift)
    }

    /// Blue channel (mask size, mask shift).
    #[must_use]
    pub fn blue_mask(&self) -> (u8, u8) {
        (self.raw.blue_mask_size, self.raw.blue_mask_shift)
    }
}

/// An iterator over the bootloader's framebuffer list.
pub struct FramebufferIter<'a> {
    framebuffers: &'a [NonNull<RawFramebuffer>],
    index: usize,
}

impl FramebufferIter<'_> {
    pub(crate) fn new(
        count: usize,
        framebuffers: NonNull<NonNull<RawFramebuffer>>,
    ) -> FramebufferIter<'static> {
        // SAFETY: The bootloader provides a valid pointer to an array of
        // `count` NonNull<RawFramebuffer> pointers.
        let slice = unsafe { core::slice::from_raw_parts(framebuffers.as_ptr(), count) };
        FramebufferIter {
            framebuffers: slice,
            index: 0,
        }
    }
}

impl<'a> Iterator for FramebufferIter<'a> {
    type Item = Framebuffer<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.framebuffers.len() {
            return None;
        }
        let ptr = self.framebuffers[self.index];
        self.index += 1;
        // SAFETY: Each pointer in the bootloader-provided list references a
        // valid framebuffer structure for the kernel's lifetime.
        Some(Framebuffer {
            raw: unsafe { ptr.as_ref() },
        })
    }
}
