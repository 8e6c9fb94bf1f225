//! CPU exception entry points.
//!
//! Each handler decodes its vector into an [`Exception`] value and hands
//! it to [`fatal`], which dumps the decoded cause and the interrupt frame
//! to the debug channel and halts. Debug and breakpoint are the two
//! non-fatal exceptions: they log and resume.

#![allow(missing_docs)]

use muon_core::arch::x86_64::registers::control;
use muon_core::arch::x86_64::structures::idt::InterruptStackFrame;

use crate::exception::{Exception, PageFaultCause};

/// Terminal failure path for unhandled exceptions: disables interrupts,
/// dumps everything we know, and parks the CPU for good.
fn fatal(exception: Exception, frame: &InterruptStackFrame) -> ! {
    muon_core::arch::x86_64::instructions::interrupts::disable();

    muon_core::kfatal!("CPU EXCEPTION: {exception}");
    if let Exception::PageFault { address, cause } = exception {
        muon_core::kfatal!("  Faulting Address (CR2): {address:#018x}");
        muon_core::kfatal!("  Cause: {cause}");
    }
    if let Some(code) = exception.error_code() {
        muon_core::kfatal!("  Error Code: {code:#x}");
    }
    muon_core::kfatal!("  RIP:    {:#018x}", frame.instruction_pointer.as_u64());
    muon_core::kfatal!("  CS:     {:#06x}", frame.code_segment);
    muon_core::kfatal!("  RFLAGS: {:#018x}", frame.cpu_flags);
    muon_core::kfatal!("  RSP:    {:#018x}", frame.stack_pointer.as_u64());
    muon_core::kfatal!("  SS:     {:#06x}", frame.stack_segment);

    crate::panic::halt_forever();
}

pub extern "x86-interrupt" fn divide_error(frame: InterruptStackFrame) {
    fatal(Exception::DivideError, &frame);
}

pub extern "x86-interrupt" fn debug(frame: InterruptStackFrame) {
    muon_core::kwarn!(
        "debug exception at {:#x}",
        frame.instruction_pointer.as_u64()
    );
}

pub extern "x86-interrupt" fn nmi(frame: InterruptStackFrame) {
    fatal(Exception::NonMaskableInterrupt, &frame);
}

pub extern "x86-interrupt" fn breakpoint(frame: InterruptStackFrame) {
    muon_core::kwarn!(
        "breakpoint at {:#x}",
        frame.instruction_pointer.as_u64()
    );
}

pub extern "x86-interrupt" fn overflow(frame: InterruptStackFrame) {
    fatal(Exception::Overflow, &frame);
}

pub extern "x86-interrupt" fn bound_range_exceeded(frame: InterruptStackFrame) {
    fatal(Exception::BoundRangeExceeded, &frame);
}

pub extern "x86-interrupt" fn invalid_opcode(frame: InterruptStackFrame) {
    fatal(Exception::InvalidOpcode, &frame);
}

pub extern "x86-interrupt" fn device_not_available(frame: InterruptStackFrame) {
    fatal(Exception::DeviceNotAvailable, &frame);
}

pub extern "x86-interrupt" fn double_fault(frame: InterruptStackFrame, error_code: u64) -> ! {
    fatal(Exception::DoubleFault { error_code }, &frame);
}

pub extern "x86-interrupt" fn coprocessor_segment_overrun(frame: InterruptStackFrame) {
    fatal(Exception::CoprocessorSegmentOverrun, &frame);
}

pub extern "x86-interrupt" fn invalid_tss(frame: InterruptStackFrame, error_code: u64) {
    fatal(Exception::InvalidTss { error_code }, &frame);
}

pub extern "x86-interrupt" fn segment_not_present(frame: InterruptStackFrame, error_code: u64) {
    fatal(Exception::SegmentNotPresent { error_code }, &frame);
}

pub extern "x86-interrupt" fn stack_fault(frame: InterruptStackFrame, error_code: u64) {
    fatal(Exception::StackFault { error_code }, &frame);
}

pub extern "x86-interrupt" fn general_protection(frame: InterruptStackFrame, error_code: u64) {
    fatal(Exception::GeneralProtection { error_code }, &frame);
}

pub extern "x86-interrupt" fn page_fault(frame: InterruptStackFrame, error_code: u64) {
    let address = control::read_cr2().as_u64();
    let cause = PageFaultCause::from_error_code(error_code);
    fatal(Exception::PageFault { address, cause }, &frame);
}

pub extern "x86-interrupt" fn x87_floating_point(frame: InterruptStackFrame) {
    fatal(Exception::X87FloatingPoint, &frame);
}

pub extern "x86-interrupt" fn alignment_check(frame: InterruptStackFrame, error_code: u64) {
    fatal(Exception::AlignmentCheck { error_code }, &frame);
}

pub extern "x86-interrupt" fn machine_check(frame: InterruptStackFrame) -> ! {
    fatal(Exception::MachineCheck, &frame);
}

pub extern "x86-interrupt" fn simd_floating_point(frame: InterruptStackFrame) {
    fatal(Exception::SimdFloatingPoint, &frame);
}

pub extern "x86-interrupt" fn virtualization(frame: InterruptStackFrame) {
    fatal(Exception::Virtualization, &frame);
}

pub extern "x86-interrupt" fn control_protection(frame: InterruptStackFrame, error_code: u64) {
    fatal(Exception::ControlProtection { error_code }, &frame);
}

pub extern "x86-interrupt" fn hv_injection(frame: InterruptStackFrame) {
    fatal(Exception::HvInjection, &frame);
}

pub extern "x86-interrupt" fn vmm_communication(frame: InterruptStackFrame, error_code: u64) {
    fatal(Exception::VmmCommunication { error_code }, &frame);
}

pub extern "x86-interrupt" fn security(frame: InterruptStackFrame, error_code: u64) {
    fatal(Exception::Security { error_code }, &frame);
}
