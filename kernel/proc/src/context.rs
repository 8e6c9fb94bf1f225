//! Saved execution contexts and the context-switch primitive.
//!
//! A suspended task's callee-saved registers and return address live as a
//! [`SwitchFrame`] on its own kernel stack; the PCB's [`SavedContext`]
//! records only the resulting stack pointer. Switching pushes the frame of
//! the outgoing task, stashes its stack pointer, loads the incoming one,
//! and restores with a sequence of pops and a `ret` — so execution resumes
//! inside whoever last called [`switch`], or inside the entry trampoline
//! for a task that has never run.

use muon_core::addr::VirtAddr;

/// The saved-context storage in a PCB: the kernel stack pointer at which a
/// [`SwitchFrame`] is parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct SavedContext {
    /// Stack pointer to resume from (0 until first suspension).
    pub rsp: u64,
}

impl SavedContext {
    /// An empty context (for slots that have never been suspended).
    #[must_use]
    pub const fn empty() -> Self {
        Self { rsp: 0 }
    }
}

/// The register frame [`switch`] pushes and pops, in stack order
/// (ascending addresses).
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct SwitchFrame {
    /// Callee-saved r15.
    pub r15: u64,
    /// Callee-saved r14.
    pub r14: u64,
    /// Callee-saved r13.
    pub r13: u64,
    /// Callee-saved r12 (carries the entry pointer for a fresh task).
    pub r12: u64,
    /// Callee-saved rbp.
    pub rbp: u64,
    /// Callee-saved rbx.
    pub rbx: u64,
    /// Return address popped by the final `ret`.
    pub rip: u64,
}

impl SwitchFrame {
    /// Builds the initial frame for a task that has never run: the final
    /// `ret` of [`switch`] enters `trampoline`, which finds `entry` in r12.
    #[must_use]
    pub fn initial(trampoline: u64, entry: u64) -> Self {
        Self {
            r12: entry,
            rip: trampoline,
            ..Self::default()
        }
    }
}

/// Plants an initial [`SwitchFrame`] at the top of a fresh kernel stack.
///
/// `stack_top` is the exclusive upper end of the writable stack span.
/// Returns the [`SavedContext`] to store in the PCB.
///
/// # Safety
///
/// The [`size_of::<SwitchFrame>`] bytes below `stack_top` must be mapped,
/// writable, and unused.
pub unsafe fn plant_initial_frame(
    stack_top: VirtAddr,
    trampoline: u64,
    entry: u64,
) -> SavedContext {
    let frame_addr = stack_top - core::mem::size_of::<SwitchFrame>() as u64;
    // SAFETY: Caller contract.
    unsafe {
        core::ptr::write(
            frame_addr.as_mut_ptr::<SwitchFrame>(),
            SwitchFrame::initial(trampoline, entry),
        );
    }
    SavedContext {
        rsp: frame_addr.as_u64(),
    }
}

/// Switches execution contexts.
///
/// Pushes the callee-saved registers of the caller, stores the resulting
/// stack pointer into `old` (skipped when `old` is null — the "first
/// switch" and exit cases, where the outgoing state is discarded), then
/// loads the stack pointer from `new` and pops its way into the incoming
/// task.
///
/// # Safety
///
/// - `new` must hold a stack pointer produced by a previous save through
///   this function or by [`plant_initial_frame`].
/// - `old`, when non-null, must point to writable saved-context storage
///   that stays valid until the outgoing task is resumed.
/// - Must not be called from interrupt context.
#[cfg(all(target_os = "none", target_arch = "x86_64"))]
#[unsafe(naked)]
pub unsafe extern "C" fn switch(old: *mut SavedContext, new: *const SavedContext) {
    // rdi = old, rsi = new.
    core::arch::naked_asm!(
        "push rbx",
        "push rbp",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "test rdi, rdi",
        "jz 2f",
        "mov [rdi], rsp",
        "2:",
        "mov rsp, [rsi]",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbp",
        "pop rbx",
        "ret",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_frame_lands_below_stack_top() {
        let mut stack = vec![0u8; 4096];
        let top = VirtAddr::new(stack.as_mut_ptr() as u64 + 4096);

        let ctx = unsafe { plant_initial_frame(top, 0x1111_2222, 0x3333_4444) };
        assert_eq!(
            ctx.rsp,
            top.as_u64() - core::mem::size_of::<SwitchFrame>() as u64
        );

        let frame = unsafe { &*(ctx.rsp as *const SwitchFrame) };
        assert_eq!(frame.rip, 0x1111_2222);
        assert_eq!(frame.r12, 0x3333_4444);
        assert_eq!(frame.rbx, 0);
        assert_eq!(frame.rbp, 0);
    }

    #[test]
    fn switch_frame_is_seven_words() {
        // The pop sequence in `switch` restores exactly this layout.
        assert_eq!(core::mem::size_of::<SwitchFrame>(), 7 * 8);
        assert_eq!(core::mem::offset_of!(SwitchFrame, r15), 0);
        assert_eq!(core::mem::offset_of!(SwitchFrame, rip), 48);
    }
}
