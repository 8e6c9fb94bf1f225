//! GDT and TSS installation.
//!
//! Fixed layout: null, kernel code (0x08), kernel data (0x10), user code
//! (0x18), user data (0x20), TSS (0x28, two slots). The user descriptors
//! exist for completeness of the table; no user process is ever entered.

use muon_core::arch::x86_64::structures::gdt::{
    Descriptor, GlobalDescriptorTable, SegmentSelector, TaskStateSegment,
};
use muon_core::sync::LazyLock;

/// Dedicated double-fault stack size (16 KiB).
const DOUBLE_FAULT_STACK_SIZE: usize = 16384;

/// IST slot used by the double-fault gate (1-indexed in the IDT).
pub const DOUBLE_FAULT_IST_INDEX: u8 = 1;

/// Backing storage for the double-fault stack. Only its address matters.
#[repr(align(16))]
#[allow(dead_code)] // the array is only ever taken by address
struct AlignedStack([u8; DOUBLE_FAULT_STACK_SIZE]);

static DOUBLE_FAULT_STACK: AlignedStack = AlignedStack([0; DOUBLE_FAULT_STACK_SIZE]);

static TSS: LazyLock<TaskStateSegment> = LazyLock::new(|| {
    let mut tss = TaskStateSegment::new();
    // IST entries are 1-indexed in the IDT but 0-indexed in the TSS.
    tss.interrupt_stack_table[(DOUBLE_FAULT_IST_INDEX - 1) as usize] = {
        let base = core::ptr::addr_of!(DOUBLE_FAULT_STACK) as u64;
        base + DOUBLE_FAULT_STACK_SIZE as u64
    };
    tss
});

/// Cached selectors from GDT construction.
pub struct Selectors {
    /// Kernel code segment selector (0x08).
    pub kernel_code: SegmentSelector,
    /// Kernel data segment selector (0x10).
    pub kernel_data: SegmentSelector,
    /// User code segment selector (0x18 | 3).
    pub user_code: SegmentSelector,
    /// User data segment selector (0x20 | 3).
    pub user_data: SegmentSelector,
    /// TSS selector (0x28).
    pub tss: SegmentSelector,
}

static GDT: LazyLock<(GlobalDescriptorTable, Selectors)> = LazyLock::new(|| {
    let mut gdt = GlobalDescriptorTable::new();
    let kernel_code = gdt.append(Descriptor::kernel_code_segment());
    let kernel_data = gdt.append(Descriptor::kernel_data_segment());
    let user_code = gdt.append(Descriptor::user_code_segment());
    let user_data = gdt.append(Descriptor::user_data_segment());
    let tss = gdt.append(Descriptor::tss_segment(LazyLock::force(&TSS)));
    (
        gdt,
        Selectors {
            kernel_code,
            kernel_data,
            user_code,
            user_data,
            tss,
        },
    )
});

/// The cached selectors.
pub fn selectors() -> &'static Selectors {
    &LazyLock::force(&GDT).1
}

/// Loads the GDT, reloads every segment register, and loads the TSS.
///
/// # Safety
///
/// Must run exactly once during early boot.
pub unsafe fn init() {
    use muon_core::arch::x86_64::instructions::segmentation::{
        load_ds, load_es, load_fs, load_gs, load_ss, load_tss, set_cs,
    };

    let (gdt, selectors) = LazyLock::force(&GDT);

    // SAFETY: The GDT above is valid and static; the selector reloads
    // match its layout (code in CS, data in DS/SS, null elsewhere).
    unsafe {
        gdt.load();
        set_cs(selectors.kernel_code);
        load_ds(selectors.kernel_data);
        load_ss(selectors.kernel_data);
        load_es(SegmentSelector::new(0, 0));
        load_fs(SegmentSelector::new(0, 0));
        load_gs(SegmentSelector::new(0, 0));
        load_tss(selectors.tss);
    }
}
