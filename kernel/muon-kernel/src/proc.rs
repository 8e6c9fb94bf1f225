//! Process creation and the cooperative scheduler.
//!
//! The process table lives behind one interrupt-safe lock. `schedule()`
//! takes the lock only to pick the next task and fetch the two context
//! pointers, then releases it before the register switch — no lock is
//! ever held across a suspension. The timer IRQ requests rescheduling by
//! setting an atomic flag that non-IRQ code polls at safe points.

use core::sync::atomic::{AtomicBool, Ordering};

use muon_core::sync::IrqSpinLock;
use muon_proc::ProcError;
use muon_proc::context;
use muon_proc::table::{ProcState, ProcessTable, SchedAction};

/// Kernel stack size for new tasks: 4 frames (16 KiB).
pub const KERNEL_STACK_PAGES: u64 = 4;

static TABLE: IrqSpinLock<ProcessTable> = IrqSpinLock::new(ProcessTable::new());

/// Set from the timer IRQ; cleared by `schedule()`.
static RESCHED_WANTED: AtomicBool = AtomicBool::new(false);

/// Installs the implicit kernel task (PID 0) as the running process.
pub fn init() {
    TABLE.lock().init_kernel_task(crate::mm::kernel_root());
    muon_core::kinfo!("proc: kernel task installed as pid 0");
}

/// Creates a kernel task that runs `entry` and exits when it returns.
///
/// Allocates a contiguous kernel stack through the frame allocator,
/// reachable via the HHDM, and plants a switch frame whose final `ret`
/// enters the trampoline with the entry pointer parked in r12.
pub fn create(name: &str, entry: fn()) -> Result<u64, ProcError> {
    let frames = crate::mm::alloc_contiguous(KERNEL_STACK_PAGES)
        .map_err(|_| ProcError::OutOfMemory)?;
    let base = crate::mm::phys_to_virt(frames.start_address());
    let top = base + KERNEL_STACK_PAGES * muon_mm::PAGE_SIZE as u64;

    let mut table = TABLE.lock();
    let slot = match table.allocate(name, crate::mm::kernel_root(), base, top) {
        Ok(slot) => slot,
        Err(e) => {
            drop(table);
            crate::mm::free_frames(frames, KERNEL_STACK_PAGES);
            return Err(e);
        }
    };

    // SAFETY: The stack span was just allocated and mapped via the HHDM.
    table.pcb_mut(slot).context =
        unsafe { context::plant_initial_frame(top, trampoline as usize as u64, entry as usize as u64) };
    table.make_ready(slot);
    let pid = table.pcb(slot).pid;
    drop(table);

    muon_core::kdebug!("proc: created '{name}' as pid {pid}");
    Ok(pid)
}

/// First instructions of every new task: recover the entry pointer from
/// r12 (planted by [`create`]) and hand it to [`task_main`].
#[unsafe(naked)]
extern "C" fn trampoline() {
    core::arch::naked_asm!("mov rdi, r12", "call {main}", main = sym task_main)
}

/// Runs a task's entry function and exits on return.
extern "C" fn task_main(entry: u64) -> ! {
    // SAFETY: `entry` was a `fn()` smuggled through the switch frame.
    let entry: fn() = unsafe { core::mem::transmute(entry) };
    entry();
    exit(0)
}

/// Round-robin scheduling. Must only be called outside interrupt context.
///
/// Clears the reschedule request, rotates the ready queue, and performs
/// the context switch when a different task is due. Returns (eventually)
/// when this task is scheduled again.
pub fn schedule() {
    RESCHED_WANTED.store(false, Ordering::Release);

    // Pick under the lock; switch after releasing it.
    let (action, old, new) = {
        let mut table = TABLE.lock();
        match table.schedule_select() {
            SchedAction::Switch { from, to } => {
                // A task that just exited has no outgoing state to save.
                let old = if matches!(table.pcb(from).state, ProcState::Unused) {
                    core::ptr::null_mut()
                } else {
                    &raw mut table.pcb_mut(from).context
                };
                let new = &raw const table.pcb(to).context;
                (SchedAction::Switch { from, to }, old, new)
            }
            other => (other, core::ptr::null_mut(), core::ptr::null()),
        }
    };

    if matches!(action, SchedAction::Switch { .. }) {
        // SAFETY: Both pointers reference PCB slots in the static table;
        // `new` was produced by a previous save or by `plant_initial_frame`.
        unsafe { context::switch(old, new) };
    }
}

/// Cooperatively gives up the CPU.
pub fn yield_now() {
    {
        let mut table = TABLE.lock();
        let current = table.current();
        table.pcb_mut(current).time_slice = 0;
    }
    schedule();
}

/// Blocks the current task until [`unblock`] names it.
pub fn block() {
    TABLE.lock().block_current();
    schedule();
}

/// Makes a blocked task runnable again.
pub fn unblock(pid: u64) {
    let mut table = TABLE.lock();
    if let Some(slot) = table.find_by_pid(pid) {
        table.unblock(slot);
    }
}

/// Terminates the current task. Frees its kernel stack, releases the
/// slot, and never returns.
pub fn exit(code: i32) -> ! {
    {
        let mut table = TABLE.lock();
        if let Some((base, _top)) = table.exit_current(code) {
            let phys = muon_core::addr::PhysAddr::new_truncate(
                base.as_u64() - crate::mm::hhdm_offset(),
            );
            crate::mm::free_frames(
                muon_core::paging::PhysFrame::containing_address(phys),
                KERNEL_STACK_PAGES,
            );
        }
    }

    schedule();

    // Only reachable for the kernel task or an empty ready queue.
    loop {
        muon_core::arch::x86_64::instructions::interrupts::hlt();
    }
}

/// Timer-IRQ hook: burn one tick of the current slice and request a
/// reschedule when it empties. Does no scheduling work itself.
pub fn scheduler_tick() {
    if TABLE.lock().tick() {
        RESCHED_WANTED.store(true, Ordering::Release);
    }
}

/// Requests a reschedule at the next safe point (timer side).
pub fn request_reschedule() {
    RESCHED_WANTED.store(true, Ordering::Release);
}

/// Non-IRQ safe point: runs the scheduler if one was requested.
pub fn maybe_schedule() {
    if RESCHED_WANTED.load(Ordering::Acquire) {
        schedule();
    }
}

/// Total context switches so far.
#[must_use]
pub fn context_switches() -> u64 {
    TABLE.lock().context_switches()
}

/// Number of live processes.
#[must_use]
pub fn process_count() -> usize {
    TABLE.lock().live_count()
}

/// PID of the currently running task.
#[must_use]
pub fn current_pid() -> u64 {
    let table = TABLE.lock();
    table.pcb(table.current()).pid
}
