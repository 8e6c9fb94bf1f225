//! Global Descriptor Table (GDT) and Task State Segment (TSS) structures.
//!
//! Segmentation is vestigial in long mode, but the GDT still defines
//! privilege levels and hosts the TSS descriptor. The kernel's layout is
//! fixed: null, kernel code (0x08), kernel data (0x10), user code (0x18),
//! user data (0x20), TSS (0x28, two slots).

use core::mem::size_of;

/// A segment selector: GDT index in bits 3..15, requested privilege level
/// in bits 0..1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct SegmentSelector(u16);

impl SegmentSelector {
    /// Creates a selector from a descriptor index and privilege level.
    #[must_use]
    pub const fn new(index: u16, rpl: u8) -> Self {
        Self(index << 3 | rpl as u16)
    }

    /// Returns the raw selector value.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }
}

bitflags::bitflags! {
    /// Bits of a user (code/data) segment descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescriptorFlags: u64 {
        /// Set by the CPU on first use (pre-set to avoid a GDT write).
        const ACCESSED       = 1 << 40;
        /// Data: writable. Code: readable.
        const WRITABLE       = 1 << 41;
        /// Code segment (bit 43) vs data segment.
        const EXECUTABLE     = 1 << 43;
        /// User descriptor type (code/data as opposed to system).
        const USER_SEGMENT   = 1 << 44;
        /// Descriptor privilege level bit 0.
        const DPL_RING_3     = 3 << 45;
        /// Segment present.
        const PRESENT        = 1 << 47;
        /// 64-bit code segment.
        const LONG_MODE      = 1 << 53;
        /// 32-bit default operation size (data segments).
        const DEFAULT_SIZE   = 1 << 54;
        /// 4 KiB granularity for the (ignored) limit.
        const GRANULARITY    = 1 << 55;
        /// Limit bits 0..15 all set.
        const LIMIT_0_15     = 0xFFFF;
        /// Limit bits 16..19 all set.
        const LIMIT_16_19    = 0xF << 48;
    }
}

impl DescriptorFlags {
    /// Bits shared by all present code/data descriptors.
    const COMMON: Self = Self::from_bits_truncate(
        Self::USER_SEGMENT.bits()
            | Self::PRESENT.bits()
            | Self::WRITABLE.bits()
            | Self::ACCESSED.bits()
            | Self::LIMIT_0_15.bits()
            | Self::LIMIT_16_19.bits()
            | Self::GRANULARITY.bits(),
    );
}

/// A GDT descriptor: either a single-slot code/data descriptor or a
/// two-slot system descriptor (TSS).
#[derive(Debug, Clone, Copy)]
pub enum Descriptor {
    /// A 8-byte code or data descriptor.
    UserSegment(u64),
    /// A 16-byte system descriptor (low word, high word).
    SystemSegment(u64, u64),
}

impl Descriptor {
    /// 64-bit ring-0 code descriptor.
    #[must_use]
    pub const fn kernel_code_segment() -> Self {
        Self::UserSegment(
            DescriptorFlags::COMMON.bits()
                | DescriptorFlags::EXECUTABLE.bits()
                | DescriptorFlags::LONG_MODE.bits(),
        )
    }

    /// Ring-0 data descriptor.
    #[must_use]
    pub const fn kernel_data_segment() -> Self {
        Self::UserSegment(DescriptorFlags::COMMON.bits() | DescriptorFlags::DEFAULT_SIZE.bits())
    }

    /// 64-bit ring-3 code descriptor.
    #[must_use]
    pub const fn user_code_segment() -> Self {
        Self::UserSegment(
            DescriptorFlags::COMMON.bits()
                | DescriptorFlags::EXECUTABLE.bits()
                | DescriptorFlags::LONG_MODE.bits()
                | DescriptorFlags::DPL_RING_3.bits(),
        )
    }

    /// Ring-3 data descriptor.
    #[must_use]
    pub const fn user_data_segment() -> Self {
        Self::UserSegment(
            DescriptorFlags::COMMON.bits()
                | DescriptorFlags::DEFAULT_SIZE.bits()
                | DescriptorFlags::DPL_RING_3.bits(),
        )
    }

    /// Available 64-bit TSS descriptor for the given TSS.
    #[must_use]
    pub fn tss_segment(tss: &'static TaskStateSegment) -> Self {
        let base = tss as *const _ as u64;
        let limit = (size_of::<TaskStateSegment>() - 1) as u64;

        let mut low = DescriptorFlags::PRESENT.bits();
        low |= limit & 0xFFFF;
        low |= (base & 0xFF_FFFF) << 16;
        low |= ((base >> 24) & 0xFF) << 56;
        // Type: available 64-bit TSS (0x9) in bits 40..43.
        low |= 0x9 << 40;

        let high = base >> 32;

        Self::SystemSegment(low, high)
    }
}

/// The Task State Segment.
///
/// In long mode the TSS holds only stack pointers (RSP0..2 for privilege
/// transitions, IST1..7 for interrupt stacks) and the I/O map base.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed(4))]
pub struct TaskStateSegment {
    reserved_1: u32,
    /// Stack pointers loaded on a privilege-level transition to rings 0..2.
    pub privilege_stack_table: [u64; 3],
    reserved_2: u64,
    /// Interrupt Stack Table entries (1-indexed in the IDT).
    pub interrupt_stack_table: [u64; 7],
    reserved_3: u64,
    reserved_4: u16,
    /// Offset of the I/O permission bitmap from the TSS base.
    pub iomap_base: u16,
}

impl TaskStateSegment {
    /// Creates a TSS with all stack pointers zeroed and an empty I/O map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reserved_1: 0,
            privilege_stack_table: [0; 3],
            reserved_2: 0,
            interrupt_stack_table: [0; 7],
            reserved_3: 0,
            reserved_4: 0,
            iomap_base: size_of::<TaskStateSegment>() as u16,
        }
    }
}

impl Default for TaskStateSegment {
    fn default() -> Self {
        Self::new()
    }
}

/// Pointer structure consumed by `lgdt`/`lidt`.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed(2))]
pub struct DescriptorTablePointer {
    /// Table size in bytes, minus one.
    pub limit: u16,
    /// Virtual address of the table.
    pub base: u64,
}

/// Maximum number of 8-byte GDT slots.
const MAX_ENTRIES: usize = 8;

/// A Global Descriptor Table.
pub struct GlobalDescriptorTable {
    table: [u64; MAX_ENTRIES],
    len: usize,
}

impl GlobalDescriptorTable {
    /// Creates a GDT containing only the mandatory null descriptor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            table: [0; MAX_ENTRIES],
            len: 1,
        }
    }

    /// Appends a descriptor and returns its ring-matched selector.
    ///
    /// # Panics
    ///
    /// Panics if the table is full.
    pub fn append(&mut self, descriptor: Descriptor) -> SegmentSelector {
        let index = self.len;
        match descriptor {
            Descriptor::UserSegment(bits) => {
                assert!(self.len < MAX_ENTRIES, "GDT full");
                self.table[self.len] = bits;
                self.len += 1;
                let rpl = if bits & DescriptorFlags::DPL_RING_3.bits()
                    == DescriptorFlags::DPL_RING_3.bits()
                {
                    3
                } else {
                    0
                };
                SegmentSelector::new(index as u16, rpl)
            }
            Descriptor::SystemSegment(low, high) => {
                assert!(self.len + 1 < MAX_ENTRIES, "GDT full");
                self.table[self.len] = low;
                self.table[self.len + 1] = high;
                self.len += 2;
                SegmentSelector::new(index as u16, 0)
            }
        }
    }

    /// Returns the pointer structure describing this table.
    #[must_use]
    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (self.len * size_of::<u64>() - 1) as u16,
            base: self.table.as_ptr() as u64,
        }
    }

    /// Loads this GDT (`lgdt`).
    ///
    /// # Safety
    ///
    /// The table must live for as long as it is the active GDT, and segment
    /// registers must be reloaded afterwards to take effect.
    pub unsafe fn load(&'static self) {
        // SAFETY: Caller contract; the pointer references this static table.
        unsafe { crate::arch::x86_64::instructions::tables::lgdt(&self.pointer()) };
    }
}

impl Default for GlobalDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_follow_the_fixed_layout() {
        let mut gdt = GlobalDescriptorTable::new();
        let kcode = gdt.append(Descriptor::kernel_code_segment());
        let kdata = gdt.append(Descriptor::kernel_data_segment());
        let ucode = gdt.append(Descriptor::user_code_segment());
        let udata = gdt.append(Descriptor::user_data_segment());
        assert_eq!(kcode.bits(), 0x08);
        assert_eq!(kdata.bits(), 0x10);
        assert_eq!(ucode.bits(), 0x18 | 3);
        assert_eq!(udata.bits(), 0x20 | 3);
    }

    #[test]
    fn tss_descriptor_occupies_two_slots() {
        static TSS: TaskStateSegment = TaskStateSegment::new();
        let mut gdt = GlobalDescriptorTable::new();
        gdt.append(Descriptor::kernel_code_segment());
        gdt.append(Descriptor::kernel_data_segment());
        gdt.append(Descriptor::user_code_segment());
        gdt.append(Descriptor::user_data_segment());
        let tss_sel = gdt.append(Descriptor::tss_segment(&TSS));
        assert_eq!(tss_sel.bits(), 0x28);
        // Five single slots plus a two-slot TSS.
        assert_eq!(gdt.pointer().limit, (7 * 8 - 1) as u16);
    }

    #[test]
    fn tss_descriptor_encodes_base() {
        static TSS: TaskStateSegment = TaskStateSegment::new();
        let base = &TSS as *const _ as u64;
        let Descriptor::SystemSegment(low, high) = Descriptor::tss_segment(&TSS) else {
            panic!("TSS descriptor must be a system segment");
        };
        assert_eq!(high, base >> 32);
        assert_eq!((low >> 16) & 0xFF_FFFF, base & 0xFF_FFFF);
        assert_eq!((low >> 56) & 0xFF, (base >> 24) & 0xFF);
        assert_eq!(low & 0xFFFF, (size_of::<TaskStateSegment>() - 1) as u64);
    }
}
