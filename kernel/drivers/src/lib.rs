//! Legacy device drivers for the Muon kernel.
//!
//! Everything here talks to fixed ISA-era hardware: the 8259 PIC pair, the
//! 8254 PIT, the PS/2 keyboard, PIO ATA, and the 16550 UART. Register
//! access goes through small bus traits where behavior is worth testing
//! (PIC spurious detection, ATA identify parsing); the remaining drivers
//! poke ports directly.

#![cfg_attr(not(test), no_std)]

pub mod ata;
pub mod keyboard;
pub mod pic;
pub mod pit;
pub mod uart16550;
