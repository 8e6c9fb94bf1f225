//! The virtual filesystem node layer.
//!
//! A [`Node`] is an opaque handle to a filesystem object: its metadata
//! plus a capability set ([`FileOps`]) implemented by the owning
//! filesystem. Concrete filesystems never build `Node`s themselves; they
//! answer lookups with [`NodeInit`] records and this layer attaches the
//! capability pointer.
//!
//! Everything is read-only. Any write-shaped operation answers
//! [`FsError::NotSupported`].

use alloc::string::String;
use alloc::sync::Arc;

use crate::FsError;

/// What a filesystem object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Pipe.
    Pipe,
    /// Symbolic link.
    Symlink,
    /// Mount point.
    MountPoint,
}

/// One directory entry, as produced by [`Node::readdir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name.
    pub name: String,
    /// Inode number of the entry.
    pub inode: u64,
}

/// The data a filesystem returns for a resolved object; the VFS turns it
/// into a [`Node`] by attaching the filesystem's [`FileOps`].
#[derive(Debug, Clone)]
pub struct NodeInit {
    /// Entry name.
    pub name: String,
    /// Object kind.
    pub kind: NodeKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Inode number.
    pub inode: u64,
    /// Implementation-private handle (the FAT driver stores the start
    /// cluster here).
    pub handle: u64,
}

/// The capability set a filesystem implements per node.
///
/// Methods receive the node's private handle rather than the node itself,
/// so implementations stay free of `Node` construction.
pub trait FileOps: Send + Sync {
    /// Reads up to `buf.len()` bytes at `offset` of the object behind
    /// `handle` (a file). Returns the number of bytes read; reads past
    /// end-of-file return a truncated count.
    fn read(&self, handle: u64, size: u64, offset: u64, buf: &mut [u8])
    -> Result<usize, FsError>;

    /// Returns the `index`-th entry of the directory behind `handle`, or
    /// `None` past the last entry.
    fn readdir(&self, handle: u64, index: usize) -> Result<Option<DirEntry>, FsError>;

    /// Looks `name` up in the directory behind `handle`.
    fn finddir(&self, handle: u64, name: &str) -> Result<Option<NodeInit>, FsError>;

    /// Hook invoked when a node is opened.
    fn open(&self, _handle: u64) -> Result<(), FsError> {
        Ok(())
    }

    /// Hook invoked when a node is closed.
    fn close(&self, _handle: u64) {}
}

/// An opaque handle to a filesystem object.
pub struct Node {
    /// Entry name.
    pub name: String,
    /// Object kind.
    pub kind: NodeKind,
    /// Size in bytes.
    pub size: u64,
    /// Inode number.
    pub inode: u64,
    /// Implementation-private handle.
    pub handle: u64,
    ops: Arc<dyn FileOps>,
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("inode", &self.inode)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Builds a node from a filesystem's [`NodeInit`] and its capability
    /// set.
    #[must_use]
    pub fn from_init(init: NodeInit, ops: Arc<dyn FileOps>) -> Self {
        Self {
            name: init.name,
            kind: init.kind,
            size: init.size,
            inode: init.inode,
            handle: init.handle,
            ops,
        }
    }

    /// Whether this node is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory | NodeKind::MountPoint)
    }

    /// Whether this node is a regular file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File)
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads `size` bytes at `offset` into `buf`. Only files can be read.
    ///
    /// The request is clamped against the file size here, so reads past
    /// end-of-file return a truncated count (0 at or beyond the end) and
    /// filesystems below only ever see satisfiable requests.
    pub fn read(&self, offset: u64, size: u64, buf: &mut [u8]) -> Result<usize, FsError> {
        if !self.is_file() {
            return Err(FsError::NotAFile);
        }
        if offset >= self.size {
            return Ok(0);
        }
        let size = size.min(self.size - offset).min(buf.len() as u64);
        self.ops.read(self.handle, size, offset, buf)
    }

    /// Any write attempt: unsupported, by construction.
    pub fn write(&self, _offset: u64, _buf: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotSupported)
    }

    /// Returns the `index`-th directory entry, or `None` past the end.
    pub fn readdir(&self, index: usize) -> Result<Option<DirEntry>, FsError> {
        if !self.is_dir() {
            return Err(FsError::NotADirectory);
        }
        self.ops.readdir(self.handle, index)
    }

    /// Looks up a single name in this directory.
    pub fn finddir(&self, name: &str) -> Result<Arc<Node>, FsError> {
        if !self.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let init = self.ops.finddir(self.handle, name)?.ok_or(FsError::NotFound)?;
        Ok(Arc::new(Node::from_init(init, self.ops.clone())))
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.ops.close(self.handle);
    }
}

/// The mount state: this kernel mounts exactly one root filesystem.
pub struct Vfs {
    root: Option<Arc<Node>>,
}

impl Vfs {
    /// Creates an unmounted VFS.
    #[must_use]
    pub const fn new() -> Self {
        Self { root: None }
    }

    /// Installs the root node.
    pub fn mount_root(&mut self, root: Arc<Node>) {
        self.root = Some(root);
    }

    /// The mounted root, if any.
    #[must_use]
    pub fn root(&self) -> Option<Arc<Node>> {
        self.root.clone()
    }

    /// Resolves an absolute path to a node.
    ///
    /// Components are split on `/`; empty components and `.` are
    /// identity. Resolution fails with [`FsError::NotFound`] when a
    /// component is missing and [`FsError::NotADirectory`] when a
    /// non-final component is not a directory.
    pub fn resolve(&self, path: &str) -> Result<Arc<Node>, FsError> {
        let mut current = self.root.clone().ok_or(FsError::NotFound)?;

        for component in path.split('/') {
            if component.is_empty() || component == "." {
                continue;
            }
            current = current.finddir(component)?;
        }

        Ok(current)
    }

    /// Opens a path: resolution plus the filesystem's open hook.
    pub fn open(&self, path: &str) -> Result<Arc<Node>, FsError> {
        let node = self.resolve(path)?;
        node.ops.open(node.handle)?;
        Ok(node)
    }

    /// Closes a node handle. The close hook runs when the last reference
    /// drops; this exists as the explicit counterpart to [`open`](Self::open).
    pub fn close(&self, node: Arc<Node>) {
        drop(node);
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;

    /// A toy filesystem: handle 0 is the root directory holding `a`
    /// (file) and `sub` (directory, handle 2) holding `b` (file).
    struct ToyFs;

    impl ToyFs {
        fn entries(handle: u64) -> Vec<NodeInit> {
            match handle {
                0 => vec![
                    NodeInit {
                        name: "a".to_string(),
                        kind: NodeKind::File,
                        size: 5,
                        inode: 10,
                        handle: 1,
                    },
                    NodeInit {
                        name: "sub".to_string(),
                        kind: NodeKind::Directory,
                        size: 0,
                        inode: 20,
                        handle: 2,
                    },
                ],
                2 => vec![NodeInit {
                    name: "b".to_string(),
                    kind: NodeKind::File,
                    size: 3,
                    inode: 30,
                    handle: 3,
                }],
                _ => vec![],
            }
        }
    }

    impl FileOps for ToyFs {
        fn read(
            &self,
            handle: u64,
            size: u64,
            offset: u64,
            buf: &mut [u8],
        ) -> Result<usize, FsError> {
            let data: &[u8] = match handle {
                1 => b"alpha",
                3 => b"bee",
                _ => return Err(FsError::InvalidArgument),
            };
            if offset >= data.len() as u64 {
                return Ok(0);
            }
            let take = (data.len() as u64 - offset).min(size) as usize;
            buf[..take].copy_from_slice(&data[offset as usize..offset as usize + take]);
            Ok(take)
        }

        fn readdir(&self, handle: u64, index: usize) -> Result<Option<DirEntry>, FsError> {
            Ok(Self::entries(handle).get(index).map(|init| DirEntry {
                name: init.name.clone(),
                inode: init.inode,
            }))
        }

        fn finddir(&self, handle: u64, name: &str) -> Result<Option<NodeInit>, FsError> {
            Ok(Self::entries(handle).into_iter().find(|e| e.name == name))
        }
    }

    fn mounted() -> Vfs {
        let ops: Arc<dyn FileOps> = Arc::new(ToyFs);
        let root = Node::from_init(
            NodeInit {
                name: "/".to_string(),
                kind: NodeKind::Directory,
                size: 0,
                inode: 0,
                handle: 0,
            },
            ops,
        );
        let mut vfs = Vfs::new();
        vfs.mount_root(Arc::new(root));
        vfs
    }

    #[test]
    fn resolve_walks_components() {
        let vfs = mounted();
        let node = vfs.resolve("/sub/b").unwrap();
        assert_eq!(node.name, "b");
        assert!(node.is_file());
        assert_eq!(node.size(), 3);
    }

    #[test]
    fn resolve_treats_dot_and_empty_as_identity() {
        let vfs = mounted();
        let node = vfs.resolve("/./sub//./b").unwrap();
        assert_eq!(node.name, "b");
        let root = vfs.resolve("/").unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn resolve_equals_stepwise_finddir() {
        let vfs = mounted();
        let direct = vfs.resolve("/sub/b").unwrap();
        let stepped = vfs
            .root()
            .unwrap()
            .finddir("sub")
            .unwrap()
            .finddir("b")
            .unwrap();
        assert_eq!(direct.inode, stepped.inode);
        assert_eq!(direct.handle, stepped.handle);
    }

    #[test]
    fn missing_component_is_not_found() {
        let vfs = mounted();
        assert_eq!(vfs.resolve("/nope").unwrap_err(), FsError::NotFound);
        assert_eq!(vfs.resolve("/sub/nope").unwrap_err(), FsError::NotFound);
    }

    #[test]
    fn file_component_mid_path_is_not_a_directory() {
        let vfs = mounted();
        assert_eq!(vfs.resolve("/a/b").unwrap_err(), FsError::NotADirectory);
    }

    #[test]
    fn reads_truncate_at_end_of_file() {
        let vfs = mounted();
        let node = vfs.open("/a").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(node.read(0, 16, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"alpha");
        assert_eq!(node.read(5, 1, &mut buf).unwrap(), 0);
        assert_eq!(node.read(3, 10, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ha");
    }

    #[test]
    fn writes_are_not_supported() {
        let vfs = mounted();
        let node = vfs.open("/a").unwrap();
        assert_eq!(node.write(0, b"x").unwrap_err(), FsError::NotSupported);
    }

    #[test]
    fn readdir_enumerates_then_ends() {
        let vfs = mounted();
        let root = vfs.root().unwrap();
        assert_eq!(root.readdir(0).unwrap().unwrap().name, "a");
        assert_eq!(root.readdir(1).unwrap().unwrap().name, "sub");
        assert!(root.readdir(2).unwrap().is_none());
    }

    #[test]
    fn directory_ops_on_files_fail() {
        let vfs = mounted();
        let node = vfs.resolve("/a").unwrap();
        assert_eq!(node.readdir(0).unwrap_err(), FsError::NotADirectory);
        assert_eq!(node.finddir("x").unwrap_err(), FsError::NotADirectory);
        let root = vfs.root().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(root.read(0, 4, &mut buf).unwrap_err(), FsError::NotAFile);
    }
}
