//! IDT construction and loading.
//!
//! All 256 gates are populated: the 32 exception vectors route to the
//! typed handlers in [`super::interrupts::exceptions`], and every
//! remaining vector gets a macro-generated stub that funnels into the
//! common dispatcher — the PIC range (32..47) goes to IRQ dispatch,
//! anything else is logged and ignored.

use muon_core::arch::x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame};
use muon_core::sync::LazyLock;

use super::gdt::DOUBLE_FAULT_IST_INDEX;
use super::interrupts::exceptions;
use muon_drivers::pic::{MASTER_VECTOR_BASE, SLAVE_VECTOR_BASE};

/// Number of non-exception vectors (32..255).
const NUM_STUBS: usize = 224;

/// Common dispatcher behind every non-exception stub.
fn dispatch_vector(vector: u8) {
    if (MASTER_VECTOR_BASE..SLAVE_VECTOR_BASE + 8).contains(&vector) {
        super::interrupts::irq_entry(vector - MASTER_VECTOR_BASE);
    } else {
        muon_core::kwarn!("ignoring unexpected interrupt vector {vector}");
    }
}

/// Stub signature matching a no-error-code IDT gate.
type StubFn = extern "x86-interrupt" fn(InterruptStackFrame);

/// Generates a stub for vector `offset + 32`.
macro_rules! make_stub {
    ($offset:expr) => {{
        extern "x86-interrupt" fn stub(_frame: InterruptStackFrame) {
            dispatch_vector($offset + 32);
        }
        stub as StubFn
    }};
}

macro_rules! stub_row {
    ($base:expr) => {
        [
            make_stub!($base),
            make_stub!($base + 1),
            make_stub!($base + 2),
            make_stub!($base + 3),
            make_stub!($base + 4),
            make_stub!($base + 5),
            make_stub!($base + 6),
            make_stub!($base + 7),
            make_stub!($base + 8),
            make_stub!($base + 9),
            make_stub!($base + 10),
            make_stub!($base + 11),
            make_stub!($base + 12),
            make_stub!($base + 13),
            make_stub!($base + 14),
            make_stub!($base + 15),
        ]
    };
}

/// One stub per vector 32..255; `STUBS[i]` serves vector `i + 32`.
static STUBS: [[StubFn; 16]; NUM_STUBS / 16] = [
    stub_row!(0),
    stub_row!(16),
    stub_row!(32),
    stub_row!(48),
    stub_row!(64),
    stub_row!(80),
    stub_row!(96),
    stub_row!(112),
    stub_row!(128),
    stub_row!(144),
    stub_row!(160),
    stub_row!(176),
    stub_row!(192),
    stub_row!(208),
];

static IDT: LazyLock<InterruptDescriptorTable> = LazyLock::new(|| {
    let mut idt = InterruptDescriptorTable::new();

    idt.divide_error.set_handler(exceptions::divide_error);
    idt.debug.set_handler(exceptions::debug);
    idt.non_maskable_interrupt.set_handler(exceptions::nmi);
    idt.breakpoint.set_handler(exceptions::breakpoint);
    idt.overflow.set_handler(exceptions::overflow);
    idt.bound_range_exceeded
        .set_handler(exceptions::bound_range_exceeded);
    idt.invalid_opcode.set_handler(exceptions::invalid_opcode);
    idt.device_not_available
        .set_handler(exceptions::device_not_available);
    idt.double_fault
        .set_diverging_handler_with_err_code(exceptions::double_fault)
        .set_ist_index(DOUBLE_FAULT_IST_INDEX);
    idt.coprocessor_segment_overrun
        .set_handler(exceptions::coprocessor_segment_overrun);
    idt.invalid_tss
        .set_handler_with_err_code(exceptions::invalid_tss);
    idt.segment_not_present
        .set_handler_with_err_code(exceptions::segment_not_present);
    idt.stack_segment_fault
        .set_handler_with_err_code(exceptions::stack_fault);
    idt.general_protection_fault
        .set_handler_with_err_code(exceptions::general_protection);
    idt.page_fault.set_handler_with_err_code(exceptions::page_fault);
    idt.x87_floating_point
        .set_handler(exceptions::x87_floating_point);
    idt.alignment_check
        .set_handler_with_err_code(exceptions::alignment_check);
    idt.machine_check
        .set_diverging_handler(exceptions::machine_check);
    idt.simd_floating_point
        .set_handler(exceptions::simd_floating_point);
    idt.virtualization.set_handler(exceptions::virtualization);
    idt.cp_protection_exception
        .set_handler_with_err_code(exceptions::control_protection);
    idt.hv_injection_exception
        .set_handler(exceptions::hv_injection);
    idt.vmm_communication_exception
        .set_handler_with_err_code(exceptions::vmm_communication);
    idt.security_exception
        .set_handler_with_err_code(exceptions::security);

    for (i, row) in STUBS.iter().enumerate() {
        for (j, &stub) in row.iter().enumerate() {
            let vector = (i * 16 + j) as u8 + 32;
            idt[vector].set_handler(stub);
        }
    }

    idt
});

/// Loads the IDT.
///
/// # Safety
///
/// Must run after [`super::gdt::init`] (the gates reference the kernel
/// code selector) and before interrupts are enabled.
pub unsafe fn init() {
    // SAFETY: The IDT is a static built above; loading it is the caller's
    // single-shot contract.
    unsafe { IDT.load() };
}
