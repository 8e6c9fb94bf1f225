//! Read-only FAT-16 filesystem.
//!
//! Mounting validates the boot sector, derives the region layout from the
//! BIOS parameter block, and caches the entire primary FAT in the heap;
//! after that, every operation is a cluster-chain walk over the cached
//! table plus sector reads from the underlying device.
//!
//! Only reading is implemented. There is no dirty state anywhere in this
//! module.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::vfs::{DirEntry, FileOps, Node, NodeInit, NodeKind};
use crate::{BlockDevice, FsError, SECTOR_SIZE};

/// First FAT entry value that terminates a cluster chain.
const END_OF_CHAIN: u16 = 0xFFF8;

/// Deleted-entry marker in `name[0]`.
const ENTRY_DELETED: u8 = 0xE5;

/// End-of-directory marker in `name[0]`.
const ENTRY_END: u8 = 0x00;

/// Attribute pattern of a long-filename continuation entry.
const ATTR_LFN: u8 = 0x0F;

/// Bytes per on-disk directory entry.
const DIR_ENTRY_SIZE: usize = 32;

bitflags! {
    /// Directory entry attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirAttributes: u8 {
        /// Read-only (meaningless here; everything is).
        const READ_ONLY    = 0x01;
        /// Hidden entry.
        const HIDDEN       = 0x02;
        /// System entry.
        const SYSTEM       = 0x04;
        /// Volume label pseudo-entry.
        const VOLUME_LABEL = 0x08;
        /// Subdirectory.
        const DIRECTORY    = 0x10;
        /// Archive bit.
        const ARCHIVE      = 0x20;
    }
}

/// A raw 32-byte directory entry.
struct RawDirEntry<'a>(&'a [u8]);

impl RawDirEntry<'_> {
    fn first_byte(&self) -> u8 {
        self.0[0]
    }

    fn attributes(&self) -> DirAttributes {
        DirAttributes::from_bits_truncate(self.0[11])
    }

    fn is_lfn(&self) -> bool {
        self.0[11] & ATTR_LFN == ATTR_LFN
    }

    fn cluster_low(&self) -> u16 {
        u16::from_le_bytes([self.0[26], self.0[27]])
    }

    fn file_size(&self) -> u32 {
        u32::from_le_bytes([self.0[28], self.0[29], self.0[30], self.0[31]])
    }

    /// Decodes the space-padded 8.3 name: padding stripped, a dot inserted
    /// when the extension is non-empty, everything lowercased.
    fn decoded_name(&self) -> String {
        let mut out = String::new();
        for &b in self.0[0..8].iter().take_while(|&&b| b != b' ') {
            out.push(b.to_ascii_lowercase() as char);
        }
        if self.0[8] != b' ' {
            out.push('.');
            for &b in self.0[8..11].iter().take_while(|&&b| b != b' ') {
                out.push(b.to_ascii_lowercase() as char);
            }
        }
        out
    }

    fn to_init(&self) -> NodeInit {
        let cluster = u64::from(self.cluster_low());
        let kind = if self.attributes().contains(DirAttributes::DIRECTORY) {
            NodeKind::Directory
        } else {
            NodeKind::File
        };
        NodeInit {
            name: self.decoded_name(),
            kind,
            size: u64::from(self.file_size()),
            inode: cluster,
            handle: cluster,
        }
    }
}

/// ASCII-casefold name comparison. Bytes outside A–Z/a–z compare as-is.
fn names_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes()
            .zip(b.bytes())
            .all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

/// A mounted FAT-16 filesystem over a block device.
pub struct Fat16<D: BlockDevice> {
    dev: D,
    partition_lba: u64,
    sectors_per_cluster: u32,
    root_entries: u32,
    /// First FAT sector, relative to the partition.
    fat_start: u32,
    /// First root-directory sector.
    root_start: u32,
    /// Sectors occupied by the fixed root directory.
    root_sectors: u32,
    /// First data-area sector (cluster 2 starts here).
    data_start: u32,
    /// Number of data clusters; valid cluster numbers are
    /// `2..cluster_count + 2`.
    cluster_count: u32,
    /// The cached primary FAT.
    fat: Vec<u16>,
}

impl<D: BlockDevice + 'static> Fat16<D> {
    /// Checks whether the sector at `partition_lba` looks like a FAT-16
    /// boot sector: 0x55AA signature, 512-byte sectors, one or two FATs,
    /// and a non-empty root directory.
    pub fn detect(dev: &D, partition_lba: u64) -> bool {
        let mut sector = [0u8; SECTOR_SIZE];
        if dev.read_sectors(partition_lba, 1, &mut sector).is_err() {
            return false;
        }
        Self::check_boot_sector(&sector).is_ok()
    }

    fn check_boot_sector(sector: &[u8; SECTOR_SIZE]) -> Result<(), FsError> {
        if sector[510] != 0x55 || sector[511] != 0xAA {
            return Err(FsError::BadMedia);
        }
        let bytes_per_sector = u16::from_le_bytes([sector[11], sector[12]]);
        let num_fats = sector[16];
        let root_entries = u16::from_le_bytes([sector[17], sector[18]]);
        if bytes_per_sector as usize != SECTOR_SIZE {
            return Err(FsError::BadMedia);
        }
        if num_fats == 0 || num_fats > 2 {
            return Err(FsError::BadMedia);
        }
        if root_entries == 0 {
            return Err(FsError::BadMedia);
        }
        Ok(())
    }

    /// Mounts the filesystem: validates the boot sector, derives the
    /// layout, and caches the primary FAT.
    pub fn mount(dev: D, partition_lba: u64) -> Result<Arc<Self>, FsError> {
        let mut sector = [0u8; SECTOR_SIZE];
        dev.read_sectors(partition_lba, 1, &mut sector)?;
        Self::check_boot_sector(&sector)?;

        let sectors_per_cluster = u32::from(sector[13]);
        let reserved_sectors = u32::from(u16::from_le_bytes([sector[14], sector[15]]));
        let num_fats = u32::from(sector[16]);
        let root_entries = u32::from(u16::from_le_bytes([sector[17], sector[18]]));
        let total_16 = u32::from(u16::from_le_bytes([sector[19], sector[20]]));
        let sectors_per_fat = u32::from(u16::from_le_bytes([sector[22], sector[23]]));
        let total_32 = u32::from_le_bytes([sector[32], sector[33], sector[34], sector[35]]);

        if sectors_per_cluster == 0 || sectors_per_fat == 0 {
            return Err(FsError::BadMedia);
        }
        let total_sectors = if total_16 != 0 { total_16 } else { total_32 };

        let fat_start = reserved_sectors;
        let root_start = fat_start + num_fats * sectors_per_fat;
        let root_sectors =
            (root_entries * DIR_ENTRY_SIZE as u32).div_ceil(SECTOR_SIZE as u32);
        let data_start = root_start + root_sectors;
        if data_start >= total_sectors {
            return Err(FsError::BadMedia);
        }
        let cluster_count = (total_sectors - data_start) / sectors_per_cluster;

        // Cache the primary FAT.
        let fat_bytes = sectors_per_fat as usize * SECTOR_SIZE;
        let mut raw = vec![0u8; fat_bytes];
        dev.read_sectors(partition_lba + u64::from(fat_start), sectors_per_fat, &mut raw)?;
        let fat = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Arc::new(Self {
            dev,
            partition_lba,
            sectors_per_cluster,
            root_entries,
            fat_start,
            root_start,
            root_sectors,
            data_start,
            cluster_count,
            fat,
        }))
    }

    /// The root directory node of a mounted filesystem. The root lives in
    /// its own fixed region and is addressed by the reserved handle 0.
    pub fn root(fs: &Arc<Self>) -> Arc<Node> {
        let ops: Arc<dyn FileOps> = fs.clone();
        Arc::new(Node::from_init(
            NodeInit {
                name: String::from("/"),
                kind: NodeKind::Directory,
                size: 0,
                inode: 0,
                handle: 0,
            },
            ops,
        ))
    }

    /// Number of data clusters.
    #[must_use]
    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    /// Bytes per cluster.
    #[must_use]
    pub fn cluster_size(&self) -> usize {
        self.sectors_per_cluster as usize * SECTOR_SIZE
    }

    fn read_partition_sectors(
        &self,
        lba: u32,
        count: u32,
        buf: &mut [u8],
    ) -> Result<(), FsError> {
        self.dev
            .read_sectors(self.partition_lba + u64::from(lba), count, buf)
    }

    fn is_valid_cluster(&self, cluster: u16) -> bool {
        (2..self.cluster_count + 2).contains(&u32::from(cluster))
    }

    /// First sector of a data cluster.
    fn cluster_to_lba(&self, cluster: u16) -> u32 {
        debug_assert!(self.is_valid_cluster(cluster));
        self.data_start + (u32::from(cluster) - 2) * self.sectors_per_cluster
    }

    /// Follows the cached FAT one step. `None` terminates the walk: chain
    /// end markers, and out-of-range values treated as end.
    fn next_cluster(&self, cluster: u16) -> Option<u16> {
        if !self.is_valid_cluster(cluster) {
            return None;
        }
        let value = *self.fat.get(cluster as usize)?;
        if value >= END_OF_CHAIN || !self.is_valid_cluster(value) {
            return None;
        }
        Some(value)
    }

    /// Walks the live entries of a directory, calling `visit` on each.
    /// Stops early when `visit` returns `Some`.
    fn scan_dir<R>(
        &self,
        handle: u64,
        mut visit: impl FnMut(&RawDirEntry<'_>) -> Option<R>,
    ) -> Result<Option<R>, FsError> {
        let mut sector_buf = vec![0u8; SECTOR_SIZE];

        if handle == 0 {
            // Fixed root region, bounded by the BPB's entry count.
            let mut remaining = self.root_entries as usize;
            for sector in self.root_start..self.root_start + self.root_sectors {
                self.read_partition_sectors(sector, 1, &mut sector_buf)?;
                for raw in sector_buf.chunks_exact(DIR_ENTRY_SIZE).take(remaining) {
                    match Self::classify(raw) {
                        EntryClass::End => return Ok(None),
                        EntryClass::Skip => {}
                        EntryClass::Live => {
                            if let Some(r) = visit(&RawDirEntry(raw)) {
                                return Ok(Some(r));
                            }
                        }
                    }
                }
                remaining = remaining.saturating_sub(SECTOR_SIZE / DIR_ENTRY_SIZE);
            }
            return Ok(None);
        }

        // Subdirectory: follow the cluster chain.
        let mut cluster = handle as u16;
        if !self.is_valid_cluster(cluster) {
            return Ok(None);
        }
        loop {
            let lba = self.cluster_to_lba(cluster);
            for sector in lba..lba + self.sectors_per_cluster {
                self.read_partition_sectors(sector, 1, &mut sector_buf)?;
                for raw in sector_buf.chunks_exact(DIR_ENTRY_SIZE) {
                    match Self::classify(raw) {
                        EntryClass::End => return Ok(None),
                        EntryClass::Skip => {}
                        EntryClass::Live => {
                            if let Some(r) = visit(&RawDirEntry(raw)) {
                                return Ok(Some(r));
                            }
                        }
                    }
                }
            }
            match self.next_cluster(cluster) {
                Some(next) => cluster = next,
                None => return Ok(None),
            }
        }
    }

    fn classify(raw: &[u8]) -> EntryClass {
        let entry = RawDirEntry(raw);
        if entry.first_byte() == ENTRY_END {
            return EntryClass::End;
        }
        if entry.first_byte() == ENTRY_DELETED
            || entry.is_lfn()
            || entry.attributes().contains(DirAttributes::VOLUME_LABEL)
        {
            return EntryClass::Skip;
        }
        EntryClass::Live
    }
}

enum EntryClass {
    Live,
    Skip,
    End,
}

impl<D: BlockDevice + 'static> FileOps for Fat16<D> {
    fn read(
        &self,
        handle: u64,
        size: u64,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, FsError> {
        let cluster_size = self.cluster_size() as u64;
        let mut cluster = handle as u16;
        let mut skip = offset;

        // Skip whole clusters in front of the requested window.
        while skip >= cluster_size {
            match self.next_cluster(cluster) {
                Some(next) => cluster = next,
                None => return Ok(0),
            }
            skip -= cluster_size;
        }

        let mut cluster_buf = vec![0u8; cluster_size as usize];
        let mut copied = 0usize;

        while (copied as u64) < size {
            if !self.is_valid_cluster(cluster) {
                break;
            }
            self.read_partition_sectors(
                self.cluster_to_lba(cluster),
                self.sectors_per_cluster,
                &mut cluster_buf,
            )?;

            let start = skip as usize;
            let take = (cluster_size as usize - start).min(size as usize - copied);
            buf[copied..copied + take].copy_from_slice(&cluster_buf[start..start + take]);
            copied += take;
            skip = 0;

            match self.next_cluster(cluster) {
                Some(next) => cluster = next,
                None => break,
            }
        }

        Ok(copied)
    }

    fn readdir(&self, handle: u64, index: usize) -> Result<Option<DirEntry>, FsError> {
        let mut seen = 0usize;
        self.scan_dir(handle, |entry| {
            if seen == index {
                Some(DirEntry {
                    name: entry.decoded_name(),
                    inode: u64::from(entry.cluster_low()),
                })
            } else {
                seen += 1;
                None
            }
        })
    }

    fn finddir(&self, handle: u64, name: &str) -> Result<Option<NodeInit>, FsError> {
        self.scan_dir(handle, |entry| {
            let decoded = entry.decoded_name();
            names_match(&decoded, name).then(|| entry.to_init())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::Vfs;

    /// An in-memory disk.
    struct MemDisk {
        data: Vec<u8>,
    }

    impl BlockDevice for MemDisk {
        fn read_sectors(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<(), FsError> {
            let start = lba as usize * SECTOR_SIZE;
            let len = count as usize * SECTOR_SIZE;
            if start + len > self.data.len() {
                return Err(FsError::Io);
            }
            buf[..len].copy_from_slice(&self.data[start..start + len]);
            Ok(())
        }

        fn sector_count(&self) -> u64 {
            (self.data.len() / SECTOR_SIZE) as u64
        }
    }

    // Image geometry: 512-byte sectors, 2 sectors per cluster (1 KiB),
    // 1 reserved sector, 2 FATs x 4 sectors, 32 root entries (2 sectors).
    // Layout: boot 0 | FAT1 1..5 | FAT2 5..9 | root 9..11 | data 11..
    const SPC: usize = 2;
    const CLUSTER: usize = SPC * SECTOR_SIZE;
    const TOTAL_SECTORS: usize = 1024;
    const DATA_START: usize = 11;

    fn dirent(name: &[u8; 11], attr: u8, cluster: u16, size: u32) -> [u8; 32] {
        let mut e = [0u8; 32];
        e[..11].copy_from_slice(name);
        e[11] = attr;
        e[26..28].copy_from_slice(&cluster.to_le_bytes());
        e[28..32].copy_from_slice(&size.to_le_bytes());
        e
    }

    fn write_cluster(data: &mut [u8], cluster: usize, content: &[u8]) {
        let offset = (DATA_START + (cluster - 2) * SPC) * SECTOR_SIZE;
        data[offset..offset + content.len()].copy_from_slice(content);
    }

    fn big_file_contents() -> Vec<u8> {
        (0..3000u32).map(|i| (i % 251) as u8).collect()
    }

    /// Builds a small valid FAT-16 volume:
    /// - `/hello.txt`  13 bytes, cluster 2
    /// - `/big.bin`    3000 bytes, chain 3 -> 4 -> 5
    /// - `/docs/`      directory at cluster 6, containing `note.txt`
    ///   (cluster 7, "nested")
    /// plus a volume label, a deleted entry, and an LFN entry that
    /// enumeration must skip.
    fn build_image() -> MemDisk {
        let mut data = vec![0u8; TOTAL_SECTORS * SECTOR_SIZE];

        // Boot sector.
        data[0] = 0xEB;
        data[1] = 0x3C;
        data[2] = 0x90;
        data[3..11].copy_from_slice(b"MSWIN4.1");
        data[11..13].copy_from_slice(&512u16.to_le_bytes());
        data[13] = SPC as u8;
        data[14..16].copy_from_slice(&1u16.to_le_bytes()); // reserved
        data[16] = 2; // FATs
        data[17..19].copy_from_slice(&32u16.to_le_bytes()); // root entries
        data[19..21].copy_from_slice(&(TOTAL_SECTORS as u16).to_le_bytes());
        data[21] = 0xF8; // media descriptor
        data[22..24].copy_from_slice(&4u16.to_le_bytes()); // sectors per FAT
        data[54..62].copy_from_slice(b"FAT16   ");
        data[510] = 0x55;
        data[511] = 0xAA;

        // Primary FAT.
        let fat_entries: &[(usize, u16)] = &[
            (0, 0xFFF8),
            (1, 0xFFFF),
            (2, 0xFFFF), // hello.txt: single cluster
            (3, 4),      // big.bin: 3 -> 4 -> 5
            (4, 5),
            (5, 0xFFFF),
            (6, 0xFFFF), // docs directory
            (7, 0xFFFF), // note.txt
        ];
        for &(i, v) in fat_entries {
            let off = SECTOR_SIZE + i * 2;
            data[off..off + 2].copy_from_slice(&v.to_le_bytes());
        }

        // Root directory (sector 9): volume label, live entries, one
        // deleted and one LFN entry interleaved.
        let entries = [
            dirent(b"MYVOL      ", 0x08, 0, 0),
            dirent(b"HELLO   TXT", 0x20, 2, 13),
            dirent(b"\xE5OST    TXT", 0x20, 0, 0),
            dirent(b"BOGUS   LFN", ATTR_LFN, 0, 0),
            dirent(b"BIG     BIN", 0x20, 3, 3000),
            dirent(b"DOCS       ", 0x10, 6, 0),
        ];
        let root_off = 9 * SECTOR_SIZE;
        for (i, e) in entries.iter().enumerate() {
            data[root_off + i * 32..root_off + (i + 1) * 32].copy_from_slice(e);
        }

        // File contents.
        write_cluster(&mut data, 2, b"Hello, world!");
        let big = big_file_contents();
        write_cluster(&mut data, 3, &big[..CLUSTER]);
        write_cluster(&mut data, 4, &big[CLUSTER..2 * CLUSTER]);
        write_cluster(&mut data, 5, &big[2 * CLUSTER..]);

        // The docs directory cluster.
        let mut docs = [0u8; 64];
        docs[..32].copy_from_slice(&dirent(b"NOTE    TXT", 0x20, 7, 6));
        write_cluster(&mut data, 6, &docs);
        write_cluster(&mut data, 7, b"nested");

        MemDisk { data }
    }

    fn mounted() -> Vfs {
        let fs = Fat16::mount(build_image(), 0).unwrap();
        let mut vfs = Vfs::new();
        vfs.mount_root(Fat16::root(&fs));
        vfs
    }

    #[test]
    fn detect_accepts_the_image_and_rejects_garbage() {
        let disk = build_image();
        assert!(Fat16::detect(&disk, 0));

        let mut bad = build_image();
        bad.data[510] = 0;
        assert!(!Fat16::detect(&bad, 0));

        let mut bad = build_image();
        bad.data[16] = 3; // three FATs
        assert!(!Fat16::detect(&bad, 0));

        let mut bad = build_image();
        bad.data[17..19].copy_from_slice(&0u16.to_le_bytes()); // no root
        assert!(!Fat16::detect(&bad, 0));
    }

    #[test]
    fn mount_derives_the_layout() {
        let fs = Fat16::mount(build_image(), 0).unwrap();
        assert_eq!(fs.fat_start, 1);
        assert_eq!(fs.root_start, 9);
        assert_eq!(fs.root_sectors, 2);
        assert_eq!(fs.data_start, 11);
        assert_eq!(fs.cluster_count, (TOTAL_SECTORS as u32 - 11) / 2);
        assert_eq!(fs.cluster_size(), CLUSTER);
    }

    #[test]
    fn hello_txt_reads_back() {
        let vfs = mounted();
        let node = vfs.open("/hello.txt").unwrap();
        assert_eq!(node.size(), 13);

        let mut buf = [0u8; 32];
        assert_eq!(node.read(0, 13, &mut buf).unwrap(), 13);
        assert_eq!(&buf[..13], b"Hello, world!");

        assert_eq!(node.read(7, 6, &mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"world!");
    }

    #[test]
    fn reading_past_end_of_file_truncates() {
        let vfs = mounted();
        let node = vfs.open("/hello.txt").unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(node.read(13, 5, &mut buf).unwrap(), 0);
        assert_eq!(node.read(10, 64, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"ld!");
    }

    #[test]
    fn multi_cluster_file_equals_chain_concatenation() {
        let vfs = mounted();
        let node = vfs.open("/big.bin").unwrap();
        assert_eq!(node.size(), 3000);

        let mut buf = vec![0u8; 3000];
        assert_eq!(node.read(0, 3000, &mut buf).unwrap(), 3000);
        assert_eq!(buf, big_file_contents());

        // A window crossing a cluster boundary.
        let mut window = vec![0u8; 200];
        assert_eq!(node.read(CLUSTER as u64 - 100, 200, &mut window).unwrap(), 200);
        assert_eq!(window, &big_file_contents()[CLUSTER - 100..CLUSTER + 100]);
    }

    #[test]
    fn readdir_skips_label_deleted_and_lfn_entries() {
        let vfs = mounted();
        let root = vfs.root().unwrap();
        let names: Vec<String> = (0..)
            .map_while(|i| root.readdir(i).unwrap())
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["hello.txt", "big.bin", "docs"]);
    }

    #[test]
    fn names_are_lowercased_and_compared_case_insensitively() {
        let vfs = mounted();
        let node = vfs.resolve("/HeLLo.TxT").unwrap();
        assert_eq!(node.name, "hello.txt");
    }

    #[test]
    fn subdirectory_resolution_matches_stepwise_walk() {
        let vfs = mounted();
        let direct = vfs.resolve("/docs/note.txt").unwrap();
        let stepped = vfs
            .root()
            .unwrap()
            .finddir("docs")
            .unwrap()
            .finddir("note.txt")
            .unwrap();
        assert_eq!(direct.inode, stepped.inode);
        assert_eq!(direct.size(), 6);

        let mut buf = [0u8; 8];
        assert_eq!(direct.read(0, 6, &mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"nested");
    }

    #[test]
    fn directory_reads_and_file_finddirs_fail() {
        let vfs = mounted();
        let root = vfs.root().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(root.read(0, 4, &mut buf).unwrap_err(), FsError::NotAFile);

        let file = vfs.resolve("/hello.txt").unwrap();
        assert_eq!(
            file.finddir("x").unwrap_err(),
            FsError::NotADirectory
        );
    }

    #[test]
    fn out_of_range_start_cluster_reads_nothing() {
        // Craft an entry pointing at a cluster beyond the data area.
        let mut disk = build_image();
        let root_off = 9 * SECTOR_SIZE;
        let bogus = dirent(b"BROKEN  BIN", 0x20, 0xFFF0u16 as u16, 100);
        data_patch(&mut disk.data, root_off + 6 * 32, &bogus);

        let fs = Fat16::mount(disk, 0).unwrap();
        let mut vfs = Vfs::new();
        vfs.mount_root(Fat16::root(&fs));

        let node = vfs.resolve("/broken.bin").unwrap();
        let mut buf = [0u8; 100];
        // Invalid chain start behaves as an immediate end of chain.
        assert_eq!(node.read(0, 100, &mut buf).unwrap(), 0);
    }

    fn data_patch(data: &mut [u8], offset: usize, bytes: &[u8]) {
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    #[test]
    fn fat16_detection_requires_512_byte_sectors() {
        let mut disk = build_image();
        disk.data[11..13].copy_from_slice(&1024u16.to_le_bytes());
        assert!(!Fat16::detect(&disk, 0));
        assert!(Fat16::mount(disk, 0).is_err());
    }
}
