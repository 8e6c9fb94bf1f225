//! CPU exception decoding.
//!
//! Exceptions are modeled as a sum type with per-variant data rather than
//! bare vector numbers: the variants that push an error code carry it, and
//! the page fault additionally carries the faulting address and its
//! decoded cause bits.

use core::fmt;

/// Decoded page-fault error-code bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFaultCause {
    /// Bit 0: the fault was a protection violation on a present page
    /// (clear means the page was not present).
    pub present: bool,
    /// Bit 1: the access was a write (clear means read).
    pub write: bool,
    /// Bit 2: the access came from user mode (clear means kernel mode).
    pub user: bool,
}

impl PageFaultCause {
    /// Decodes the CPU-pushed error code.
    #[must_use]
    pub fn from_error_code(code: u64) -> Self {
        Self {
            present: code & 1 != 0,
            write: code & 2 != 0,
            user: code & 4 != 0,
        }
    }
}

impl fmt::Display for PageFaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            if self.present {
                "Protection violation"
            } else {
                "Non-present page"
            },
            if self.write { "Write" } else { "Read" },
            if self.user { "User mode" } else { "Kernel mode" },
        )
    }
}

/// A decoded CPU exception (vectors 0..31).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    /// Vector 0: #DE.
    DivideError,
    /// Vector 1: #DB.
    Debug,
    /// Vector 2: NMI.
    NonMaskableInterrupt,
    /// Vector 3: #BP.
    Breakpoint,
    /// Vector 4: #OF.
    Overflow,
    /// Vector 5: #BR.
    BoundRangeExceeded,
    /// Vector 6: #UD.
    InvalidOpcode,
    /// Vector 7: #NM.
    DeviceNotAvailable,
    /// Vector 8: #DF. The pushed error code is always zero.
    DoubleFault {
        /// CPU-pushed error code.
        error_code: u64,
    },
    /// Vector 9: legacy coprocessor segment overrun.
    CoprocessorSegmentOverrun,
    /// Vector 10: #TS.
    InvalidTss {
        /// Selector error code.
        error_code: u64,
    },
    /// Vector 11: #NP.
    SegmentNotPresent {
        /// Selector error code.
        error_code: u64,
    },
    /// Vector 12: #SS.
    StackFault {
        /// Selector error code.
        error_code: u64,
    },
    /// Vector 13: #GP.
    GeneralProtection {
        /// Selector error code (0 when not segment-related).
        error_code: u64,
    },
    /// Vector 14: #PF.
    PageFault {
        /// CR2 at the time of the fault.
        address: u64,
        /// Decoded error-code bits.
        cause: PageFaultCause,
    },
    /// Vector 16: #MF.
    X87FloatingPoint,
    /// Vector 17: #AC.
    AlignmentCheck {
        /// CPU-pushed error code.
        error_code: u64,
    },
    /// Vector 18: #MC.
    MachineCheck,
    /// Vector 19: #XM.
    SimdFloatingPoint,
    /// Vector 20: #VE.
    Virtualization,
    /// Vector 21: #CP.
    ControlProtection {
        /// CPU-pushed error code.
        error_code: u64,
    },
    /// Vector 28: #HV.
    HvInjection,
    /// Vector 29: #VC.
    VmmCommunication {
        /// CPU-pushed error code.
        error_code: u64,
    },
    /// Vector 30: #SX.
    Security {
        /// CPU-pushed error code.
        error_code: u64,
    },
    /// Vectors 15, 22..27, 31: reserved.
    Reserved(u8),
}

impl Exception {
    /// Human-readable exception name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DivideError => "Division Error",
            Self::Debug => "Debug",
            Self::NonMaskableInterrupt => "Non-Maskable Interrupt",
            Self::Breakpoint => "Breakpoint",
            Self::Overflow => "Overflow",
            Self::BoundRangeExceeded => "Bound Range Exceeded",
            Self::InvalidOpcode => "Invalid Opcode",
            Self::DeviceNotAvailable => "Device Not Available",
            Self::DoubleFault { .. } => "Double Fault",
            Self::CoprocessorSegmentOverrun => "Coprocessor Segment Overrun",
            Self::InvalidTss { .. } => "Invalid TSS",
            Self::SegmentNotPresent { .. } => "Segment Not Present",
            Self::StackFault { .. } => "Stack-Segment Fault",
            Self::GeneralProtection { .. } => "General Protection Fault",
            Self::PageFault { .. } => "Page Fault",
            Self::X87FloatingPoint => "x87 FPU Error",
            Self::AlignmentCheck { .. } => "Alignment Check",
            Self::MachineCheck => "Machine Check",
            Self::SimdFloatingPoint => "SIMD Floating-Point",
            Self::Virtualization => "Virtualization",
            Self::ControlProtection { .. } => "Control Protection",
            Self::HvInjection => "Hypervisor Injection",
            Self::VmmCommunication { .. } => "VMM Communication",
            Self::Security { .. } => "Security",
            Self::Reserved(_) => "Reserved",
        }
    }

    /// The CPU-pushed error code, for the variants that carry one.
    #[must_use]
    pub fn error_code(&self) -> Option<u64> {
        match *self {
            Self::DoubleFault { error_code }
            | Self::InvalidTss { error_code }
            | Self::SegmentNotPresent { error_code }
            | Self::StackFault { error_code }
            | Self::GeneralProtection { error_code }
            | Self::AlignmentCheck { error_code }
            | Self::ControlProtection { error_code }
            | Self::VmmCommunication { error_code }
            | Self::Security { error_code } => Some(error_code),
            Self::PageFault { cause, .. } => Some(
                u64::from(cause.present)
                    | u64::from(cause.write) << 1
                    | u64::from(cause.user) << 2,
            ),
            _ => None,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageFault { address, cause } => {
                write!(f, "{} at {address:#x} ({cause})", self.name())
            }
            _ => match self.error_code() {
                Some(code) => write!(f, "{} (error code {code:#x})", self.name()),
                None => f.write_str(self.name()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_fault_cause_decodes_the_low_bits() {
        let cause = PageFaultCause::from_error_code(0b000);
        assert!(!cause.present && !cause.write && !cause.user);
        let cause = PageFaultCause::from_error_code(0b111);
        assert!(cause.present && cause.write && cause.user);
    }

    #[test]
    fn kernel_read_of_missing_page_formats_canonically() {
        let cause = PageFaultCause::from_error_code(0);
        assert_eq!(
            format!("{cause}"),
            "Non-present page, Read, Kernel mode"
        );
    }

    #[test]
    fn user_write_protection_violation_formats_canonically() {
        let cause = PageFaultCause::from_error_code(0b111);
        assert_eq!(
            format!("{cause}"),
            "Protection violation, Write, User mode"
        );
    }

    #[test]
    fn page_fault_display_includes_address_and_cause() {
        let exception = Exception::PageFault {
            address: 0xDEAD_BEEF_000,
            cause: PageFaultCause::from_error_code(0),
        };
        let text = format!("{exception}");
        assert!(text.contains("Page Fault"));
        assert!(text.contains("0xdeadbeef000"));
        assert!(text.contains("Non-present page, Read, Kernel mode"));
    }

    #[test]
    fn error_code_carriers_match_the_architecture() {
        // The ten error-code-pushing exceptions report their code.
        assert_eq!(
            Exception::DoubleFault { error_code: 0 }.error_code(),
            Some(0)
        );
        assert_eq!(
            Exception::GeneralProtection { error_code: 0x10 }.error_code(),
            Some(0x10)
        );
        assert_eq!(
            Exception::Security { error_code: 1 }.error_code(),
            Some(1)
        );
        // And the others do not.
        assert_eq!(Exception::DivideError.error_code(), None);
        assert_eq!(Exception::MachineCheck.error_code(), None);
    }
}
