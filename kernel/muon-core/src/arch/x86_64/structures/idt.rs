//! Interrupt Descriptor Table (IDT) structures.
//!
//! The IDT has 256 gates: vectors 0..31 are CPU exceptions with fixed
//! meanings, the rest are free for software use (this kernel routes the
//! remapped legacy PIC to 32..47).

use core::mem::size_of;
use core::ops::{Index, IndexMut};

use crate::addr::VirtAddr;
use crate::arch::x86_64::structures::gdt::DescriptorTablePointer;

/// Handler function for interrupts without an error code.
#[cfg(target_os = "none")]
pub type HandlerFunc = extern "x86-interrupt" fn(InterruptStackFrame);

/// Handler function for interrupts that push an error code.
#[cfg(target_os = "none")]
pub type HandlerFuncWithErrCode = extern "x86-interrupt" fn(InterruptStackFrame, u64);

/// Diverging handler function without an error code (e.g. machine check).
#[cfg(target_os = "none")]
pub type DivergingHandlerFunc = extern "x86-interrupt" fn(InterruptStackFrame) -> !;

/// Diverging handler function with an error code (e.g. double fault).
#[cfg(target_os = "none")]
pub type DivergingHandlerFuncWithErrCode =
    extern "x86-interrupt" fn(InterruptStackFrame, u64) -> !;

/// The five words the CPU pushes on vector entry.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct InterruptStackFrame {
    /// Instruction pointer at the time of the interrupt.
    pub instruction_pointer: VirtAddr,
    /// Code segment selector.
    pub code_segment: u64,
    /// RFLAGS.
    pub cpu_flags: u64,
    /// Stack pointer at the time of the interrupt.
    pub stack_pointer: VirtAddr,
    /// Stack segment selector.
    pub stack_segment: u64,
}

/// Options of an IDT entry (bits 32..47 of the raw entry).
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct EntryOptions(u16);

impl EntryOptions {
    /// Interrupt gate type (0xE), not present, DPL 0, no IST.
    #[inline]
    const fn minimal() -> Self {
        Self(0x0E00)
    }

    /// Present interrupt gate, DPL 0, no IST.
    #[inline]
    fn new() -> Self {
        let mut opts = Self::minimal();
        opts.set_present(true);
        opts
    }

    /// Sets the IST index (0 = no IST, 1..7 = IST1..IST7).
    #[inline]
    pub fn set_ist_index(&mut self, index: u8) -> &mut Self {
        debug_assert!(index < 8, "IST index must be 0-7");
        self.0 = (self.0 & !0x07) | (u16::from(index) & 0x07);
        self
    }

    /// Sets the descriptor privilege level (0..3).
    #[inline]
    pub fn set_dpl(&mut self, dpl: u8) -> &mut Self {
        debug_assert!(dpl < 4, "DPL must be 0-3");
        self.0 = (self.0 & !0x6000) | ((u16::from(dpl) & 0x03) << 13);
        self
    }

    /// Sets the present bit.
    #[inline]
    pub fn set_present(&mut self, present: bool) -> &mut Self {
        if present {
            self.0 |= 1 << 15;
        } else {
            self.0 &= !(1 << 15);
        }
        self
    }
}

/// A single IDT gate (16 bytes).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct IdtEntry {
    offset_low: u16,
    segment_selector: u16,
    options: EntryOptions,
    offset_mid: u16,
    offset_high: u32,
    _reserved: u32,
}

impl IdtEntry {
    /// Creates a not-present gate.
    pub const fn missing() -> Self {
        Self {
            offset_low: 0,
            segment_selector: 0,
            options: EntryOptions::minimal(),
            offset_mid: 0,
            offset_high: 0,
            _reserved: 0,
        }
    }

    /// Sets a handler function (no error code) and returns the entry
    /// options for further configuration.
    #[cfg(target_os = "none")]
    pub fn set_handler(&mut self, handler: HandlerFunc) -> &mut EntryOptions {
        self.set_handler_addr(handler as u64)
    }

    /// Sets a handler function that takes an error code.
    #[cfg(target_os = "none")]
    pub fn set_handler_with_err_code(
        &mut self,
        handler: HandlerFuncWithErrCode,
    ) -> &mut EntryOptions {
        self.set_handler_addr(handler as u64)
    }

    /// Sets a diverging handler function (no error code).
    #[cfg(target_os = "none")]
    pub fn set_diverging_handler(&mut self, handler: DivergingHandlerFunc) -> &mut EntryOptions {
        self.set_handler_addr(handler as u64)
    }

    /// Sets a diverging handler function that takes an error code.
    #[cfg(target_os = "none")]
    pub fn set_diverging_handler_with_err_code(
        &mut self,
        handler: DivergingHandlerFuncWithErrCode,
    ) -> &mut EntryOptions {
        self.set_handler_addr(handler as u64)
    }

    /// Installs a raw handler address with the kernel code selector and
    /// present interrupt-gate options.
    ///
    /// The typed setters above are preferred; this is the form they share.
    pub fn set_handler_addr(&mut self, addr: u64) -> &mut EntryOptions {
        self.offset_low = addr as u16;
        self.offset_mid = (addr >> 16) as u16;
        self.offset_high = (addr >> 32) as u32;
        // Kernel code segment at GDT slot 1.
        self.segment_selector = 0x08;
        self.options = EntryOptions::new();
        &mut self.options
    }
}

/// The Interrupt Descriptor Table.
///
/// Exception vectors are named fields so handlers with the wrong signature
/// fail to compile; the remaining 224 vectors are indexable.
#[repr(C, align(16))]
pub struct InterruptDescriptorTable {
    /// Vector 0: #DE.
    pub divide_error: IdtEntry,
    /// Vector 1: #DB.
    pub debug: IdtEntry,
    /// Vector 2: NMI.
    pub non_maskable_interrupt: IdtEntry,
    /// Vector 3: #BP.
    pub breakpoint: IdtEntry,
    /// Vector 4: #OF.
    pub overflow: IdtEntry,
    /// Vector 5: #BR.
    pub bound_range_exceeded: IdtEntry,
    /// Vector 6: #UD.
    pub invalid_opcode: IdtEntry,
    /// Vector 7: #NM.
    pub device_not_available: IdtEntry,
    /// Vector 8: #DF (pushes an error code, always zero).
    pub double_fault: IdtEntry,
    /// Vector 9: legacy coprocessor segment overrun.
    pub coprocessor_segment_overrun: IdtEntry,
    /// Vector 10: #TS (pushes an error code).
    pub invalid_tss: IdtEntry,
    /// Vector 11: #NP (pushes an error code).
    pub segment_not_present: IdtEntry,
    /// Vector 12: #SS (pushes an error code).
    pub stack_segment_fault: IdtEntry,
    /// Vector 13: #GP (pushes an error code).
    pub general_protection_fault: IdtEntry,
    /// Vector 14: #PF (pushes an error code; CR2 holds the address).
    pub page_fault: IdtEntry,
    reserved_1: IdtEntry,
    /// Vector 16: #MF.
    pub x87_floating_point: IdtEntry,
    /// Vector 17: #AC (pushes an error code).
    pub alignment_check: IdtEntry,
    /// Vector 18: #MC.
    pub machine_check: IdtEntry,
    /// Vector 19: #XM.
    pub simd_floating_point: IdtEntry,
    /// Vector 20: #VE.
    pub virtualization: IdtEntry,
    /// Vector 21: #CP (pushes an error code).
    pub cp_protection_exception: IdtEntry,
    reserved_2: [IdtEntry; 6],
    /// Vector 28: #HV.
    pub hv_injection_exception: IdtEntry,
    /// Vector 29: #VC (pushes an error code).
    pub vmm_communication_exception: IdtEntry,
    /// Vector 30: #SX (pushes an error code).
    pub security_exception: IdtEntry,
    reserved_3: IdtEntry,
    /// Vectors 32..255: hardware and software interrupts.
    pub interrupts: [IdtEntry; 224],
}

impl InterruptDescriptorTable {
    /// Creates an IDT with every gate missing.
    pub const fn new() -> Self {
        Self {
            divide_error: IdtEntry::missing(),
            debug: IdtEntry::missing(),
            non_maskable_interrupt: IdtEntry::missing(),
            breakpoint: IdtEntry::missing(),
            overflow: IdtEntry::missing(),
            bound_range_exceeded: IdtEntry::missing(),
            invalid_opcode: IdtEntry::missing(),
            device_not_available: IdtEntry::missing(),
            double_fault: IdtEntry::missing(),
            coprocessor_segment_overrun: IdtEntry::missing(),
            invalid_tss: IdtEntry::missing(),
            segment_not_present: IdtEntry::missing(),
            stack_segment_fault: IdtEntry::missing(),
            general_protection_fault: IdtEntry::missing(),
            page_fault: IdtEntry::missing(),
            reserved_1: IdtEntry::missing(),
            x87_floating_point: IdtEntry::missing(),
            alignment_check: IdtEntry::missing(),
            machine_check: IdtEntry::missing(),
            simd_floating_point: IdtEntry::missing(),
            virtualization: IdtEntry::missing(),
            cp_protection_exception: IdtEntry::missing(),
            reserved_2: [IdtEntry::missing(); 6],
            hv_injection_exception: IdtEntry::missing(),
            vmm_communication_exception: IdtEntry::missing(),
            security_exception: IdtEntry::missing(),
            reserved_3: IdtEntry::missing(),
            interrupts: [IdtEntry::missing(); 224],
        }
    }

    /// Returns the pointer structure describing this table.
    #[must_use]
    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: self as *const _ as u64,
        }
    }

    /// Loads this IDT (`lidt`).
    ///
    /// # Safety
    ///
    /// The table must live for as long as it is the active IDT.
    pub unsafe fn load(&'static self) {
        // SAFETY: Caller contract; the pointer references this static table.
        unsafe { crate::arch::x86_64::instructions::tables::lidt(&self.pointer()) };
    }
}

impl Default for InterruptDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<u8> for InterruptDescriptorTable {
    type Output = IdtEntry;

    /// Indexes vectors 32..255.
    ///
    /// # Panics
    ///
    /// Panics for exception vectors (0..31); those have named fields.
    fn index(&self, vector: u8) -> &IdtEntry {
        assert!(vector >= 32, "exception vectors have named fields");
        &self.interrupts[vector as usize - 32]
    }
}

impl IndexMut<u8> for InterruptDescriptorTable {
    fn index_mut(&mut self, vector: u8) -> &mut IdtEntry {
        assert!(vector >= 32, "exception vectors have named fields");
        &mut self.interrupts[vector as usize - 32]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idt_has_256_sixteen_byte_gates() {
        assert_eq!(size_of::<IdtEntry>(), 16);
        assert_eq!(size_of::<InterruptDescriptorTable>(), 256 * 16);
    }

    #[test]
    fn handler_addr_is_split_across_entry() {
        let mut entry = IdtEntry::missing();
        entry.set_handler_addr(0x1122_3344_5566_7788);
        assert_eq!(entry.offset_low, 0x7788);
        assert_eq!(entry.offset_mid, 0x5566);
        assert_eq!(entry.offset_high, 0x1122_3344);
        assert_eq!(entry.segment_selector, 0x08);
    }

    #[test]
    fn entry_options_bits() {
        let mut opts = EntryOptions::new();
        // Present interrupt gate.
        assert_eq!(opts.0, 0x8E00);
        opts.set_dpl(3);
        assert_eq!(opts.0 & 0x6000, 0x6000);
        opts.set_ist_index(1);
        assert_eq!(opts.0 & 0x07, 1);
    }

    #[test]
    fn interrupt_index_maps_to_vector() {
        let mut idt = InterruptDescriptorTable::new();
        idt[32].set_handler_addr(0xDEAD_B000);
        assert_eq!(idt.interrupts[0].offset_low, 0xB000);
    }
}
