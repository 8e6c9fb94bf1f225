//! Rust bindings with safe abstractions for the Limine bootloader protocol.
//!
//! The Limine protocol works through a request-response mechanism:
//! 1. The kernel declares static request structures in a special section
//! 2. The bootloader fills in the corresponding response structures before
//!    passing control to the kernel
//! 3. The kernel queries the responses to get information about the system
//!
//! This crate covers the subset of the protocol the Muon kernel consumes:
//! base revision, bootloader info, HHDM, memory map, framebuffer,
//! executable address, and RSDP.
//!
//! # Usage
//!
//! ```no_run
//! use limine::*;
//!
//! #[used]
//! #[unsafe(link_section = ".requests")]
//! static BASE_REVISION: BaseRevision = BaseRevision::new();
//!
//! #[used]
//! #[unsafe(link_section = ".requests")]
//! static MEMMAP_REQUEST: MemMapRequest = MemMapRequest::new();
//!
//! fn kernel_main() {
//!     assert!(BASE_REVISION.is_supported());
//!     if let Some(memmap) = MEMMAP_REQUEST.response() {
//!         for entry in memmap.entries() {
//!             // Process memory map entries
//!         }
//!     }
//! }
//! ```

#![no_std]

mod request;
mod response;

pub mod framebuffer;
pub mod memmap;

pub use request::*;
pub use response::*;
