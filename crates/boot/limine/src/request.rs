//! Request structures for the Limine boot protocol.
//!
//! Each request type has a unique 4-part ID that the bootloader uses to
//! identify and process the request. All requests follow the same pattern:
//!
//! 1. Create a static request structure with the `.new()` constructor
//! 2. Place it in the `.requests` section using `#[unsafe(link_section)]`
//! 3. Mark it with `#[used]` to prevent the linker from removing it
//! 4. After boot, call `.response()` to get the filled-in response

use core::cell::UnsafeCell;

use crate::response::{self as res, Response};

/// Macro to generate Limine IDs.
///
/// Each request ID consists of a shared 2-word magic number followed by a
/// request-specific 2-word identifier.
macro_rules! limine_id {
    ($part1:expr, $part2: expr) => {
        [
            0xc7b1_dd30_df4c_8b88u64,
            0x0a82_e883_a194_f07bu64,
            $part1,
            $part2,
        ]
    };
}

/// Declares a plain request type: ID constant, `new`/`with_revision`
/// constructors, and a typed `response()` accessor.
macro_rules! limine_request {
    (
        $(#[$attr:meta])*
        $name:ident => $resp:ident, id: ($part1:expr, $part2:expr)
    ) => {
        $(#[$attr])*
        #[repr(C, align(8))]
        pub struct $name {
            id: [u64; 4],
            revision: u64,
            response: Response<res::$resp>,
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// The Limine ID for this request.
            pub const ID: [u64; 4] = limine_id!($part1, $part2);

            /// Creates a new request with revision 0 (the only defined one).
            #[must_use]
            pub const fn new() -> Self {
                Self {
                    id: Self::ID,
                    revision: 0,
                    response: Response::empty(),
                }
            }

            /// Returns a reference to the response if the bootloader
            /// provided one.
            #[must_use]
            pub fn response(&self) -> Option<&res::$resp> {
                self.response.get()
            }
        }
    };
}

/// Marker placed at the start of the requests structure.
///
/// Used by the bootloader to speed up searching for requests. If a start
/// marker is used, an end marker must also be used.
#[repr(C, align(8))]
pub struct RequestsStartMarker([u64; 4]);

impl Default for RequestsStartMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestsStartMarker {
    /// The Limine ID for the Requests Start Marker.
    pub const ID: [u64; 4] = [
        0xf6b8_f4b3_9de7_d1ae,
        0xfab9_1a69_40fc_b9cf,
        0x785c_6ed0_15d3_e316,
        0x181e_920a_7852_b9d9,
    ];

    /// Creates a new `RequestsStartMarker`.
    #[must_use]
    pub const fn new() -> Self {
        Self(Self::ID)
    }
}

/// Marker placed at the end of the requests structure.
#[repr(C, align(8))]
pub struct RequestsEndMarker([u64; 2]);

impl Default for RequestsEndMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestsEndMarker {
    /// The Limine ID for the Requests End Marker.
    pub const ID: [u64; 2] = [0xadc0_e053_1bb1_0d03, 0x9572_709f_3176_4c62];

    /// Creates a new `RequestsEndMarker`.
    #[must_use]
    pub const fn new() -> Self {
        Self(Self::ID)
    }
}

/// Structure representing the base revision of the Limine protocol.
#[repr(C, align(8))]
pub struct BaseRevision(UnsafeCell<[u64; 3]>);

impl Default for BaseRevision {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseRevision {
    /// The Limine ID for the Base Revision.
    pub const ID: [u64; 2] = [0xf956_2b2d_5c95_a6c8, 0x6a7b_3849_4453_6bdc];

    /// Creates a new `BaseRevision` with the recommended base revision (3).
    #[must_use]
    pub const fn new() -> Self {
        Self::with_base_revision(3)
    }

    /// Creates a new `BaseRevision` with the specified base revision.
    #[must_use]
    pub const fn with_base_revision(revision: u64) -> Self {
        Self(UnsafeCell::new([Self::ID[0], Self::ID[1], revision]))
    }

    /// Returns the requested revision word.
    ///
    /// The bootloader overwrites this with 0 when the requested revision is
    /// supported.
    #[must_use]
    pub fn revision(&self) -> u64 {
        // SAFETY: The bootloader writes to this cell before control is passed
        // to the kernel, and no concurrent writes occur after that point.
        unsafe { (*self.0.get())[2] }
    }

    /// Checks if the requested revision is supported by the bootloader.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.revision() == 0
    }
}

// SAFETY: BaseRevision is only written by the bootloader before the kernel
// starts, and is only read (never written) by the kernel afterward.
unsafe impl Sync for BaseRevision {}

limine_request! {
    /// Request for the bootloader name and version strings.
    BootloaderInfoRequest => BootloaderInfoResponse,
    id: (0xf550_38d8_e2a1_202f, 0x2794_26fc_f5f5_9740)
}

limine_request! {
    /// Request for the Higher Half Direct Map offset.
    ///
    /// The HHDM maps all physical memory at a fixed virtual offset, so the
    /// kernel can dereference any physical address by addition alone.
    HhdmRequest => HhdmResponse,
    id: (0x48dc_f1cb_8ad2_b852, 0x6398_4e95_9a98_244b)
}

limine_request! {
    /// Request for the physical memory map.
    MemMapRequest => MemMapResponse,
    id: (0x67cf_3d9d_378a_806f, 0xe304_acdf_c50c_3c62)
}

limine_request! {
    /// Request for framebuffer information.
    FramebufferRequest => FramebufferResponse,
    id: (0x9d58_27dc_d881_dd75, 0xa314_8604_f6fa_b11b)
}

limine_request! {
    /// Request for the physical and virtual base addresses of the loaded
    /// kernel executable.
    ExecutableAddressRequest => ExecutableAddressResponse,
    id: (0x71ba_7686_3cc5_5f63, 0xb264_4a48_c516_a487)
}

limine_request! {
    /// Request for the ACPI RSDP (Root System Description Pointer) address.
    RsdpRequest => RsdpResponse,
    id: (0xc5e7_7b6b_397e_7b43, 0x2763_7845_accd_cf3c)
}
