//! The fixed process table and ready queue.
//!
//! Up to [`MAX_PROCESSES`] PCBs live in a static array; everything that
//! would be a pointer in a C kernel is a typed [`SlotId`] index into that
//! array, including the ready queue's intrusive next links. Exactly one
//! PCB is in state [`ProcState::Running`] at any instant; a PCB is linked
//! into the ready queue iff its state is [`ProcState::Ready`].
//!
//! This module decides *which* task runs next; the actual register switch
//! is the kernel's job, driven by the [`SchedAction`] this module returns.

use muon_core::addr::{PhysAddr, VirtAddr};

use crate::ProcError;
use crate::context::SavedContext;

/// Capacity of the process table.
pub const MAX_PROCESSES: usize = 64;

/// Fresh time slice in timer ticks (10 ms at 1000 Hz).
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Maximum process name length in bytes.
pub const NAME_LEN: usize = 24;

/// Typed index of a PCB in the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(usize);

impl SlotId {
    /// The implicit kernel task's slot.
    pub const KERNEL: SlotId = SlotId(0);

    /// Returns the raw table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Slot is free.
    Unused,
    /// Slot is claimed but not yet runnable.
    Created,
    /// Linked into the ready queue.
    Ready,
    /// Currently executing.
    Running,
    /// Waiting for an explicit unblock.
    Blocked,
    /// Exited; slot about to be reclaimed.
    Zombie,
}

/// A process control block.
#[derive(Debug, Clone, Copy)]
pub struct Pcb {
    /// Process identifier; 0 is the initial kernel task.
    pub pid: u64,
    /// Lifecycle state.
    pub state: ProcState,
    /// CPU affinity (single-CPU kernel: always 0).
    pub cpu: u32,
    /// Root table of the process's address space.
    pub addr_space_root: PhysAddr,
    /// Exclusive upper end of the kernel stack.
    pub kstack_top: VirtAddr,
    /// Base (lowest address) of the kernel stack.
    pub kstack_base: VirtAddr,
    /// Remaining timer ticks before a reschedule is requested.
    pub time_slice: u32,
    /// Where the task's switch frame is parked while suspended.
    pub context: SavedContext,
    /// Process name, NUL-padded.
    pub name: [u8; NAME_LEN],
    /// Exit code recorded by `exit`.
    pub exit_code: i32,
    /// Next PCB in the ready queue.
    pub next: Option<SlotId>,
    /// Parent slot (the creator), if any.
    pub parent: Option<SlotId>,
}

impl Pcb {
    const fn unused() -> Self {
        Self {
            pid: 0,
            state: ProcState::Unused,
            cpu: 0,
            addr_space_root: PhysAddr::zero(),
            kstack_top: VirtAddr::zero(),
            kstack_base: VirtAddr::zero(),
            time_slice: 0,
            context: SavedContext::empty(),
            name: [0; NAME_LEN],
            exit_code: 0,
            next: None,
            parent: None,
        }
    }

    /// The name as a string slice.
    #[must_use]
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("?")
    }
}

/// What the caller of [`ProcessTable::schedule_select`] must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedAction {
    /// Ready queue empty: keep running the current task.
    KeepRunning,
    /// The queue head was the current task: slice reset, nothing to switch.
    SliceReset,
    /// Perform a context switch between these two slots.
    Switch {
        /// Outgoing task.
        from: SlotId,
        /// Incoming task (already marked running and set current).
        to: SlotId,
    },
}

/// The process table, ready queue, and scheduling state.
pub struct ProcessTable {
    slots: [Pcb; MAX_PROCESSES],
    current: SlotId,
    next_pid: u64,
    ready_head: Option<SlotId>,
    ready_tail: Option<SlotId>,
    context_switches: u64,
}

impl ProcessTable {
    /// Creates an empty table. [`init_kernel_task`](Self::init_kernel_task)
    /// must run before scheduling.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [Pcb::unused(); MAX_PROCESSES],
            current: SlotId::KERNEL,
            next_pid: 1,
            ready_head: None,
            ready_tail: None,
            context_switches: 0,
        }
    }

    /// Installs the implicit kernel task (PID 0) in slot 0 as the currently
    /// running process.
    pub fn init_kernel_task(&mut self, kernel_root: PhysAddr) {
        let pcb = &mut self.slots[0];
        debug_assert!(matches!(pcb.state, ProcState::Unused));
        pcb.pid = 0;
        pcb.state = ProcState::Running;
        pcb.addr_space_root = kernel_root;
        pcb.time_slice = DEFAULT_TIME_SLICE;
        pcb.name[..6].copy_from_slice(b"kernel");
        self.current = SlotId::KERNEL;
    }

    /// The currently running slot.
    #[must_use]
    pub const fn current(&self) -> SlotId {
        self.current
    }

    /// Shared access to a PCB.
    #[must_use]
    pub fn pcb(&self, slot: SlotId) -> &Pcb {
        &self.slots[slot.0]
    }

    /// Exclusive access to a PCB.
    pub fn pcb_mut(&mut self, slot: SlotId) -> &mut Pcb {
        &mut self.slots[slot.0]
    }

    /// Looks a process up by PID.
    #[must_use]
    pub fn find_by_pid(&self, pid: u64) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|p| !matches!(p.state, ProcState::Unused) && p.pid == pid)
            .map(SlotId)
    }

    /// Number of live (non-unused) processes.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|p| !matches!(p.state, ProcState::Unused))
            .count()
    }

    /// Total context switches performed.
    #[must_use]
    pub const fn context_switches(&self) -> u64 {
        self.context_switches
    }

    /// Claims a free slot for a new process and fills in everything except
    /// the saved context, which the caller plants once the kernel stack
    /// exists. The slot is left in [`ProcState::Created`]; call
    /// [`make_ready`](Self::make_ready) to enqueue it.
    ///
    /// Slot 0 is never handed out; PIDs are allocated monotonically.
    pub fn allocate(
        &mut self,
        name: &str,
        addr_space_root: PhysAddr,
        kstack_base: VirtAddr,
        kstack_top: VirtAddr,
    ) -> Result<SlotId, ProcError> {
        let index = self.slots[1..]
            .iter()
            .position(|p| matches!(p.state, ProcState::Unused))
            .map(|i| i + 1)
            .ok_or(ProcError::TableFull)?;

        let parent = self.current;
        let pid = self.next_pid;
        self.next_pid += 1;

        let pcb = &mut self.slots[index];
        *pcb = Pcb::unused();
        pcb.pid = pid;
        pcb.state = ProcState::Created;
        pcb.addr_space_root = addr_space_root;
        pcb.kstack_base = kstack_base;
        pcb.kstack_top = kstack_top;
        pcb.time_slice = DEFAULT_TIME_SLICE;
        pcb.parent = Some(parent);
        let len = name.len().min(NAME_LEN);
        pcb.name[..len].copy_from_slice(&name.as_bytes()[..len]);

        Ok(SlotId(index))
    }

    /// Marks a created or blocked process ready and appends it to the
    /// ready queue.
    pub fn make_ready(&mut self, slot: SlotId) {
        debug_assert!(matches!(
            self.slots[slot.0].state,
            ProcState::Created | ProcState::Blocked | ProcState::Running
        ));
        self.slots[slot.0].state = ProcState::Ready;
        self.enqueue(slot);
    }

    fn enqueue(&mut self, slot: SlotId) {
        debug_assert!(self.slots[slot.0].next.is_none());
        self.slots[slot.0].next = None;
        match self.ready_tail {
            Some(tail) => self.slots[tail.0].next = Some(slot),
            None => self.ready_head = Some(slot),
        }
        self.ready_tail = Some(slot);
    }

    fn dequeue(&mut self) -> Option<SlotId> {
        let head = self.ready_head?;
        self.ready_head = self.slots[head.0].next;
        if self.ready_head.is_none() {
            self.ready_tail = None;
        }
        self.slots[head.0].next = None;
        Some(head)
    }

    /// Round-robin selection, run with the scheduler lock held:
    ///
    /// 1. Pop the queue head; if the queue is empty the caller keeps
    ///    running.
    /// 2. If the head is the current task, reset its slice and re-enqueue.
    /// 3. Otherwise demote the still-running current task to the tail,
    ///    promote the head to running, and report the switch to perform.
    pub fn schedule_select(&mut self) -> SchedAction {
        let Some(next) = self.dequeue() else {
            return SchedAction::KeepRunning;
        };

        if next == self.current {
            // Still running; it just goes around the rotation again.
            self.slots[next.0].time_slice = DEFAULT_TIME_SLICE;
            self.enqueue(next);
            return SchedAction::SliceReset;
        }

        let from = self.current;
        if matches!(self.slots[from.0].state, ProcState::Running) {
            self.make_ready(from);
        }

        let to_pcb = &mut self.slots[next.0];
        to_pcb.state = ProcState::Running;
        to_pcb.time_slice = DEFAULT_TIME_SLICE;
        self.current = next;
        self.context_switches += 1;

        SchedAction::Switch { from, to: next }
    }

    /// Timer-tick accounting: burns one tick of the current slice.
    /// Returns `true` when the slice is exhausted and a reschedule should
    /// be requested.
    pub fn tick(&mut self) -> bool {
        let pcb = &mut self.slots[self.current.0];
        if pcb.time_slice > 0 {
            pcb.time_slice -= 1;
        }
        pcb.time_slice == 0
    }

    /// Marks the current task blocked. The caller must schedule afterward.
    pub fn block_current(&mut self) {
        if self.current != SlotId::KERNEL {
            self.slots[self.current.0].state = ProcState::Blocked;
        }
    }

    /// Unblocks a process: moves it from blocked to ready exactly once.
    pub fn unblock(&mut self, slot: SlotId) {
        if matches!(self.slots[slot.0].state, ProcState::Blocked) {
            self.make_ready(slot);
        }
    }

    /// Terminates the current task (never the kernel task): records the
    /// exit code, transitions through zombie, releases the slot, and
    /// returns the kernel stack span to free.
    ///
    /// The caller must schedule afterward and never return here.
    pub fn exit_current(&mut self, exit_code: i32) -> Option<(VirtAddr, VirtAddr)> {
        if self.current == SlotId::KERNEL {
            return None;
        }
        let pcb = &mut self.slots[self.current.0];
        pcb.exit_code = exit_code;
        pcb.state = ProcState::Zombie;
        let stack = (pcb.kstack_base, pcb.kstack_top);
        *pcb = Pcb::unused();
        Some(stack)
    }

    /// True if the slot is linked somewhere in the ready queue.
    #[must_use]
    pub fn in_ready_queue(&self, slot: SlotId) -> bool {
        let mut cursor = self.ready_head;
        while let Some(s) = cursor {
            if s == slot {
                return true;
            }
            cursor = self.slots[s.0].next;
        }
        false
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_tasks(n: usize) -> (ProcessTable, Vec<SlotId>) {
        let mut table = ProcessTable::new();
        table.init_kernel_task(PhysAddr::new(0x1000));
        let mut slots = Vec::new();
        for i in 0..n {
            let slot = table
                .allocate(
                    &format!("task{i}"),
                    PhysAddr::new(0x1000),
                    VirtAddr::new(0x10000),
                    VirtAddr::new(0x14000),
                )
                .unwrap();
            table.make_ready(slot);
            slots.push(slot);
        }
        (table, slots)
    }

    #[test]
    fn kernel_task_is_pid_zero_and_running() {
        let mut table = ProcessTable::new();
        table.init_kernel_task(PhysAddr::new(0x1000));
        let kernel = table.pcb(SlotId::KERNEL);
        assert_eq!(kernel.pid, 0);
        assert!(matches!(kernel.state, ProcState::Running));
        assert_eq!(kernel.name(), "kernel");
        assert_eq!(table.current(), SlotId::KERNEL);
    }

    #[test]
    fn pids_are_monotonic() {
        let (table, slots) = table_with_tasks(3);
        assert_eq!(table.pcb(slots[0]).pid, 1);
        assert_eq!(table.pcb(slots[1]).pid, 2);
        assert_eq!(table.pcb(slots[2]).pid, 3);
    }

    #[test]
    fn exactly_one_running_process() {
        let (mut table, _slots) = table_with_tasks(4);
        for _ in 0..10 {
            table.schedule_select();
            let running = table
                .slots
                .iter()
                .filter(|p| matches!(p.state, ProcState::Running))
                .count();
            assert_eq!(running, 1);
        }
    }

    #[test]
    fn round_robin_is_fair() {
        // With N equal tasks, across M*N scheduling events each task runs
        // exactly M times.
        let (mut table, slots) = table_with_tasks(4);
        let mut runs = std::collections::HashMap::new();

        for _ in 0..4 * 5 {
            match table.schedule_select() {
                SchedAction::Switch { to, .. } => {
                    *runs.entry(to.index()).or_insert(0) += 1;
                }
                other => panic!("unexpected action {other:?}"),
            }
        }

        // The kernel task re-enters the rotation after the first switch, so
        // count only the worker slots: each must have run the same number
        // of times give or take the kernel's share.
        let counts: Vec<_> = slots.iter().map(|s| runs[&s.index()]).collect();
        assert!(counts.iter().all(|&c| c == counts[0]), "unfair: {counts:?}");
    }

    #[test]
    fn two_workers_alternate_strictly() {
        // Two yielding tasks interleave A, B, A, B... (with the kernel
        // task rotating between them), and every rotation is a counted
        // context switch.
        let (mut table, slots) = table_with_tasks(2);
        let mut transcript = String::new();

        for _ in 0..12 {
            if let SchedAction::Switch { to, .. } = table.schedule_select() {
                if to == slots[0] {
                    transcript.push('A');
                } else if to == slots[1] {
                    transcript.push('B');
                }
            }
        }

        assert!(
            transcript.starts_with("ABABABAB"),
            "transcript was {transcript:?}"
        );
        assert_eq!(table.context_switches(), 12);
    }

    #[test]
    fn empty_queue_keeps_current_running() {
        let mut table = ProcessTable::new();
        table.init_kernel_task(PhysAddr::new(0x1000));
        assert_eq!(table.schedule_select(), SchedAction::KeepRunning);
        assert_eq!(table.current(), SlotId::KERNEL);
    }

    #[test]
    fn queue_head_equal_to_current_resets_slice() {
        let mut table = ProcessTable::new();
        table.init_kernel_task(PhysAddr::new(0x1000));
        table.pcb_mut(SlotId::KERNEL).time_slice = 1;

        // Force the degenerate rotation where the queue head is the task
        // already running.
        table.enqueue(SlotId::KERNEL);

        assert_eq!(table.schedule_select(), SchedAction::SliceReset);
        assert_eq!(table.pcb(SlotId::KERNEL).time_slice, DEFAULT_TIME_SLICE);
        assert!(matches!(
            table.pcb(SlotId::KERNEL).state,
            ProcState::Running
        ));
        // Re-enqueued for the next rotation.
        assert!(table.in_ready_queue(SlotId::KERNEL));
    }

    #[test]
    fn blocked_task_leaves_the_queue_until_unblocked() {
        let (mut table, slots) = table_with_tasks(2);

        // Run the first worker.
        let SchedAction::Switch { to, .. } = table.schedule_select() else {
            panic!("expected switch");
        };
        assert_eq!(to, slots[0]);

        // Block it; it must not be in the ready queue.
        table.block_current();
        assert!(!table.in_ready_queue(slots[0]));
        assert!(matches!(table.pcb(slots[0]).state, ProcState::Blocked));

        // Unblock: present exactly once.
        table.unblock(slots[0]);
        assert!(table.in_ready_queue(slots[0]));
        table.unblock(slots[0]);
        let mut occurrences = 0;
        let mut cursor = table.ready_head;
        while let Some(s) = cursor {
            if s == slots[0] {
                occurrences += 1;
            }
            cursor = table.slots[s.index()].next;
        }
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn tick_exhausts_the_slice() {
        let (mut table, _slots) = table_with_tasks(1);
        for _ in 0..DEFAULT_TIME_SLICE - 1 {
            assert!(!table.tick());
        }
        assert!(table.tick());
        // Further ticks keep reporting exhaustion without underflow.
        assert!(table.tick());
    }

    #[test]
    fn exit_releases_the_slot_and_reports_the_stack() {
        let (mut table, slots) = table_with_tasks(1);
        let SchedAction::Switch { .. } = table.schedule_select() else {
            panic!("expected switch");
        };
        assert_eq!(table.current(), slots[0]);

        let stack = table.exit_current(7).unwrap();
        assert_eq!(stack.0, VirtAddr::new(0x10000));
        assert_eq!(stack.1, VirtAddr::new(0x14000));
        assert!(matches!(table.pcb(slots[0]).state, ProcState::Unused));

        // The slot is immediately reusable.
        let reused = table
            .allocate(
                "again",
                PhysAddr::new(0x1000),
                VirtAddr::new(0x20000),
                VirtAddr::new(0x24000),
            )
            .unwrap();
        assert_eq!(reused, slots[0]);
    }

    #[test]
    fn kernel_task_cannot_exit() {
        let mut table = ProcessTable::new();
        table.init_kernel_task(PhysAddr::new(0x1000));
        assert!(table.exit_current(0).is_none());
        assert!(matches!(
            table.pcb(SlotId::KERNEL).state,
            ProcState::Running
        ));
    }

    #[test]
    fn table_full_is_reported() {
        let mut table = ProcessTable::new();
        table.init_kernel_task(PhysAddr::new(0x1000));
        for i in 0..MAX_PROCESSES - 1 {
            table
                .allocate(
                    &format!("t{i}"),
                    PhysAddr::new(0x1000),
                    VirtAddr::new(0x10000),
                    VirtAddr::new(0x14000),
                )
                .unwrap();
        }
        assert_eq!(
            table.allocate(
                "overflow",
                PhysAddr::new(0x1000),
                VirtAddr::new(0x10000),
                VirtAddr::new(0x14000),
            ),
            Err(ProcError::TableFull)
        );
    }
}
