//! 8259 PIC (Programmable Interrupt Controller) driver.
//!
//! Remaps the cascaded master/slave pair away from the CPU exception
//! vectors (master base 0x20, slave base 0x28), tracks the IRQ masks, and
//! detects spurious interrupts on lines 7 and 15 via the in-service
//! register.
//!
//! The driver is generic over a [`PicBus`] so the spurious-interrupt logic
//! can be exercised against a simulated controller; the kernel
//! instantiates it over [`PioBus`].

/// Master PIC command/status port.
const PIC1_CMD: u16 = 0x20;
/// Master PIC data/mask port.
const PIC1_DATA: u16 = 0x21;
/// Slave PIC command/status port.
const PIC2_CMD: u16 = 0xA0;
/// Slave PIC data/mask port.
const PIC2_DATA: u16 = 0xA1;

/// ICW1: initialization with ICW4 to follow.
const ICW1_INIT: u8 = 0x11;
/// ICW4: 8086 mode.
const ICW4_8086: u8 = 0x01;
/// OCW2: non-specific end of interrupt.
const EOI: u8 = 0x20;
/// OCW3: read the in-service register on the next command-port read.
const READ_ISR: u8 = 0x0B;

/// Vector base for the master PIC (IRQ 0..7 -> 0x20..0x27).
pub const MASTER_VECTOR_BASE: u8 = 0x20;
/// Vector base for the slave PIC (IRQ 8..15 -> 0x28..0x2F).
pub const SLAVE_VECTOR_BASE: u8 = 0x28;

/// Number of IRQ lines across both controllers.
pub const IRQ_LINES: u8 = 16;

/// Register access to the two controllers.
///
/// One method per physical port, plus the conventional POST-port write
/// used as a settle delay between initialization words.
pub trait PicBus {
    /// Writes the master command port.
    fn write_master_cmd(&mut self, value: u8);
    /// Reads the master command/status port.
    fn read_master_cmd(&mut self) -> u8;
    /// Writes the master data port.
    fn write_master_data(&mut self, value: u8);
    /// Reads the master data port.
    fn read_master_data(&mut self) -> u8;
    /// Writes the slave command port.
    fn write_slave_cmd(&mut self, value: u8);
    /// Reads the slave command/status port.
    fn read_slave_cmd(&mut self) -> u8;
    /// Writes the slave data port.
    fn write_slave_data(&mut self, value: u8);
    /// Reads the slave data port.
    fn read_slave_data(&mut self) -> u8;
    /// Small I/O delay (the controllers need time between ICWs).
    fn io_wait(&mut self) {}
}

/// Real port I/O to the legacy controllers.
#[derive(Debug, Default)]
pub struct PioBus;

#[cfg(target_arch = "x86_64")]
impl PicBus for PioBus {
    fn write_master_cmd(&mut self, value: u8) {
        // SAFETY: Fixed legacy PIC port.
        unsafe { muon_core::arch::x86_64::Port::<u8>::new(PIC1_CMD).write(value) }
    }
    fn read_master_cmd(&mut self) -> u8 {
        // SAFETY: Fixed legacy PIC port.
        unsafe { muon_core::arch::x86_64::Port::<u8>::new(PIC1_CMD).read() }
    }
    fn write_master_data(&mut self, value: u8) {
        // SAFETY: Fixed legacy PIC port.
        unsafe { muon_core::arch::x86_64::Port::<u8>::new(PIC1_DATA).write(value) }
    }
    fn read_master_data(&mut self) -> u8 {
        // SAFETY: Fixed legacy PIC port.
        unsafe { muon_core::arch::x86_64::Port::<u8>::new(PIC1_DATA).read() }
    }
    fn write_slave_cmd(&mut self, value: u8) {
        // SAFETY: Fixed legacy PIC port.
        unsafe { muon_core::arch::x86_64::Port::<u8>::new(PIC2_CMD).write(value) }
    }
    fn read_slave_cmd(&mut self) -> u8 {
        // SAFETY: Fixed legacy PIC port.
        unsafe { muon_core::arch::x86_64::Port::<u8>::new(PIC2_CMD).read() }
    }
    fn write_slave_data(&mut self, value: u8) {
        // SAFETY: Fixed legacy PIC port.
        unsafe { muon_core::arch::x86_64::Port::<u8>::new(PIC2_DATA).write(value) }
    }
    fn read_slave_data(&mut self) -> u8 {
        // SAFETY: Fixed legacy PIC port.
        unsafe { muon_core::arch::x86_64::Port::<u8>::new(PIC2_DATA).read() }
    }
    fn io_wait(&mut self) {
        // SAFETY: Port 0x80 is the POST diagnostic port; writing 0 is
        // harmless and takes roughly a microsecond.
        unsafe { muon_core::arch::x86_64::Port::<u8>::new(0x80).write(0) }
    }
}

/// The cascaded controller pair with its shadowed IRQ masks.
pub struct Pic<B: PicBus> {
    bus: B,
    mask_master: u8,
    mask_slave: u8,
}

impl<B: PicBus> Pic<B> {
    /// Creates the driver with all lines masked (matching
    /// [`remap`](Self::remap)'s end state).
    pub const fn new(bus: B) -> Self {
        Self {
            bus,
            mask_master: 0xFF,
            mask_slave: 0xFF,
        }
    }

    /// Runs the ICW1..ICW4 initialization sequence, moving the master to
    /// vector [`MASTER_VECTOR_BASE`] and the slave to
    /// [`SLAVE_VECTOR_BASE`], then masks every line.
    pub fn remap(&mut self) {
        // ICW1: begin initialization, cascade mode.
        self.bus.write_master_cmd(ICW1_INIT);
        self.bus.io_wait();
        self.bus.write_slave_cmd(ICW1_INIT);
        self.bus.io_wait();

        // ICW2: vector offsets.
        self.bus.write_master_data(MASTER_VECTOR_BASE);
        self.bus.io_wait();
        self.bus.write_slave_data(SLAVE_VECTOR_BASE);
        self.bus.io_wait();

        // ICW3: slave on master line 2; slave cascade identity 2.
        self.bus.write_master_data(1 << 2);
        self.bus.io_wait();
        self.bus.write_slave_data(2);
        self.bus.io_wait();

        // ICW4: 8086 mode.
        self.bus.write_master_data(ICW4_8086);
        self.bus.io_wait();
        self.bus.write_slave_data(ICW4_8086);
        self.bus.io_wait();

        // Everything stays masked until a driver registers.
        self.mask_master = 0xFF;
        self.mask_slave = 0xFF;
        self.bus.write_master_data(self.mask_master);
        self.bus.write_slave_data(self.mask_slave);
    }

    /// Unmasks an IRQ line. Unmasking a slave line also unmasks the
    /// cascade (master line 2).
    pub fn enable(&mut self, irq: u8) {
        debug_assert!(irq < IRQ_LINES);
        if irq < 8 {
            self.mask_master &= !(1 << irq);
            self.bus.write_master_data(self.mask_master);
        } else {
            self.mask_slave &= !(1 << (irq - 8));
            self.bus.write_slave_data(self.mask_slave);
            if self.mask_master & (1 << 2) != 0 {
                self.mask_master &= !(1 << 2);
                self.bus.write_master_data(self.mask_master);
            }
        }
    }

    /// Masks an IRQ line.
    pub fn disable(&mut self, irq: u8) {
        debug_assert!(irq < IRQ_LINES);
        if irq < 8 {
            self.mask_master |= 1 << irq;
            self.bus.write_master_data(self.mask_master);
        } else {
            self.mask_slave |= 1 << (irq - 8);
            self.bus.write_slave_data(self.mask_slave);
        }
    }

    /// Signals end-of-interrupt: the slave for lines 8..15, then always the
    /// master (the cascade line participated either way).
    pub fn end_of_interrupt(&mut self, irq: u8) {
        debug_assert!(irq < IRQ_LINES);
        if irq >= 8 {
            self.bus.write_slave_cmd(EOI);
        }
        self.bus.write_master_cmd(EOI);
    }

    /// Checks whether an IRQ 7 or 15 arrival is spurious.
    ///
    /// A spurious vector is raised by the controller itself with no line
    /// actually in service, so the corresponding in-service bit is clear.
    /// No EOI is owed for the spurious line; for the slave case (IRQ 15)
    /// the master still saw the cascade raise line 2 and gets its EOI
    /// here. Lines other than 7 and 15 are never spurious.
    pub fn is_spurious(&mut self, irq: u8) -> bool {
        match irq {
            7 => {
                self.bus.write_master_cmd(READ_ISR);
                let isr = self.bus.read_master_cmd();
                isr & 0x80 == 0
            }
            15 => {
                self.bus.write_slave_cmd(READ_ISR);
                let isr = self.bus.read_slave_cmd();
                if isr & 0x80 == 0 {
                    self.bus.write_master_cmd(EOI);
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Current (master, slave) mask bytes.
    #[must_use]
    pub fn masks(&self) -> (u8, u8) {
        (self.mask_master, self.mask_slave)
    }

    /// The underlying bus (used by dispatch-layer tests to inspect a
    /// simulated controller).
    #[must_use]
    pub fn bus(&self) -> &B {
        &self.bus
    }
}
