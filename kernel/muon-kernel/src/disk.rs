//! Disk probing and the block-device bridge to the filesystem layer.

use muon_core::sync::IrqSpinLock;
use muon_drivers::ata::{AtaController, SECTOR_SIZE};
use muon_fs::{BlockDevice, FsError};

static ATA: IrqSpinLock<AtaController> = IrqSpinLock::new(AtaController::new());

/// Probes all four legacy drive positions and logs what answered.
pub fn init() {
    let found = ATA.lock().probe();
    let ata = ATA.lock();
    for index in 0..4 {
        if let Some(drive) = ata.drive(index) {
            muon_core::kinfo!(
                "ata{index}: {} ({} MiB)",
                drive.model_str(),
                drive.sectors * SECTOR_SIZE as u64 / (1024 * 1024),
            );
        }
    }
    if found == 0 {
        muon_core::kwarn!("ata: no drives detected");
    }
}

/// Whether a drive answered at `index` (0..3).
#[must_use]
pub fn drive_present(index: usize) -> bool {
    ATA.lock().present(index)
}

/// A [`BlockDevice`] view of one ATA drive position.
#[derive(Debug, Clone, Copy)]
pub struct AtaBlockDevice {
    index: usize,
}

impl AtaBlockDevice {
    /// Wraps drive position `index` (0..3).
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self { index }
    }
}

impl BlockDevice for AtaBlockDevice {
    fn read_sectors(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<(), FsError> {
        ATA.lock()
            .read(self.index, lba, count, buf)
            .map_err(|e| {
                muon_core::kerr!("ata{}: read of lba {lba} failed: {e}", self.index);
                FsError::Io
            })
    }

    fn sector_count(&self) -> u64 {
        ATA.lock().drive(self.index).map_or(0, |d| d.sectors)
    }
}
