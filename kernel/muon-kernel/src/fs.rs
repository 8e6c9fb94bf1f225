//! The mounted filesystem and the file API handed to outer collaborators.
//!
//! All operations are read-only; any write attempt at the node layer
//! answers "operation not supported".

use alloc::sync::Arc;

use muon_core::sync::IrqSpinLock;
use muon_fs::fat::Fat16;
use muon_fs::vfs::{DirEntry, Node, Vfs};
use muon_fs::FsError;

use crate::disk::AtaBlockDevice;

static VFS: IrqSpinLock<Vfs> = IrqSpinLock::new(Vfs::new());

/// Probes every present drive for a FAT-16 filesystem at LBA 0 and
/// mounts the first hit as root.
///
/// Returns `true` when a root was mounted.
pub fn mount_root() -> bool {
    for index in 0..4 {
        if !crate::disk::drive_present(index) {
            continue;
        }
        let dev = AtaBlockDevice::new(index);
        if !Fat16::detect(&dev, 0) {
            continue;
        }
        match Fat16::mount(dev, 0) {
            Ok(fat) => {
                muon_core::kinfo!(
                    "fs: FAT16 on ata{index} ({} clusters of {} bytes)",
                    fat.cluster_count(),
                    fat.cluster_size(),
                );
                VFS.lock().mount_root(Fat16::root(&fat));
                return true;
            }
            Err(e) => {
                muon_core::kerr!("fs: mounting ata{index} failed: {e}");
            }
        }
    }
    muon_core::kwarn!("fs: no filesystem found; file operations disabled");
    false
}

/// Opens a path relative to the mounted root.
pub fn open(path: &str) -> Result<Arc<Node>, FsError> {
    VFS.lock().open(path)
}

/// Closes a node handle.
pub fn close(node: Arc<Node>) {
    VFS.lock().close(node);
}

/// Reads from an open node. See [`Node::read`] for the truncation rules.
pub fn read(node: &Node, offset: u64, size: u64, buf: &mut [u8]) -> Result<usize, FsError> {
    node.read(offset, size, buf)
}

/// Enumerates a directory entry by index.
pub fn readdir(node: &Node, index: usize) -> Result<Option<DirEntry>, FsError> {
    node.readdir(index)
}

/// Looks up one name in a directory node.
pub fn finddir(node: &Node, name: &str) -> Result<Arc<Node>, FsError> {
    node.finddir(name)
}

/// The mounted root directory, if any.
pub fn root() -> Option<Arc<Node>> {
    VFS.lock().root()
}
