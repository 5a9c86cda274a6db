use super::consts::*;
use super::store::ByteStore;
use bytes::{Bytes, BytesMut};
use fixedbitset::FixedBitSet;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use zerocopy::{FromBytes, LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// Raw compound file header (512 bytes)
///
/// Field layout follows [MS-CFB] 2.2. Everything after the first 109 DIFAT
/// entries is only present in version 4 files as sector padding.
#[allow(dead_code)]
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawHeader {
    magic: [u8; 8],
    clsid: [u8; 16],
    minor_version: U16<LE>,
    major_version: U16<LE>,
    byte_order: U16<LE>,
    sector_shift: U16<LE>,
    mini_sector_shift: U16<LE>,
    reserved: [u8; 6],
    num_dir_sectors: U32<LE>,
    num_fat_sectors: U32<LE>,
    first_dir_sector: U32<LE>,
    transaction_signature: U32<LE>,
    mini_stream_cutoff: U32<LE>,
    first_minifat_sector: U32<LE>,
    num_minifat_sectors: U32<LE>,
    first_difat_sector: U32<LE>,
    num_difat_sectors: U32<LE>,
    difat: [U32<LE>; HEADER_DIFAT_ENTRIES],
}

/// Raw OLE directory entry structure (128 bytes)
///
/// This represents the on-disk format of a directory entry.
#[allow(dead_code)]
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawDirectoryEntry {
    /// Entry name in UTF-16LE (64 bytes, null-padded)
    name: [u8; 64],
    /// Length of name in bytes (including null terminator)
    name_len: U16<LE>,
    /// Entry type (1 = storage, 2 = stream, 5 = root)
    entry_type: u8,
    /// Node color (0 = red, 1 = black)
    node_color: u8,
    /// Left sibling SID
    sid_left: U32<LE>,
    /// Right sibling SID
    sid_right: U32<LE>,
    /// Child SID
    sid_child: U32<LE>,
    /// CLSID (16 bytes)
    clsid: [u8; 16],
    /// State bits
    state_bits: U32<LE>,
    /// Creation time (FILETIME)
    creation_time: U64<LE>,
    /// Modified time (FILETIME)
    modified_time: U64<LE>,
    /// Starting sector
    start_sector: U32<LE>,
    /// Stream size
    stream_size: U64<LE>,
}

/// Error types for compound file parsing
#[derive(Debug, Error)]
pub enum OleError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Not an OLE file")]
    NotOleFile,
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Corrupted file: {0}")]
    CorruptedFile(String),
    #[error("Stream not found: {0}")]
    StreamNotFound(String),
    #[error("Not a stream: {0}")]
    NotAStream(String),
    #[error("Not a storage: {0}")]
    NotAStorage(String),
}

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Root,
    Storage,
    Stream,
}

/// Represents an OLE directory entry (stream or storage)
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Storage ID (index in directory)
    pub sid: u32,
    /// Entry name (UTF-16 decoded to UTF-8)
    pub name: String,
    pub kind: EntryKind,
    /// CLSID of this entry, empty when all zero
    pub clsid: String,
    /// First sector of the stream
    pub start_sector: u32,
    /// Size of the stream in bytes
    pub size: u64,
    sid_left: u32,
    sid_right: u32,
    sid_child: u32,
}

impl DirectoryEntry {
    #[inline]
    pub fn is_stream(&self) -> bool {
        self.kind == EntryKind::Stream
    }

    #[inline]
    pub fn is_storage(&self) -> bool {
        matches!(self.kind, EntryKind::Storage | EntryKind::Root)
    }
}

/// An OLE2 structured storage image held entirely in memory.
///
/// The whole file is read once at open time; afterwards every stream read is
/// a slice of (or a copy assembled from) the resident image, so reads take
/// `&self` and one `CompoundFile` can be shared read-only behind an `Arc`.
#[derive(Debug)]
pub struct CompoundFile {
    data: Bytes,
    /// Sector size (512 or 4096 bytes)
    sector_size: usize,
    /// Mini sector size (typically 64 bytes)
    mini_sector_size: usize,
    /// Streams smaller than this live in the mini stream
    mini_stream_cutoff: u32,
    /// File Allocation Table - maps sector to next sector in chain
    fat: Vec<u32>,
    /// Mini FAT - for streams smaller than cutoff size
    minifat: Vec<u32>,
    ministream: Bytes,
    /// All directory entries indexed by SID. Entries outside the tree are `None`.
    entries: Vec<Option<DirectoryEntry>>,
    /// In-order child SIDs per storage SID
    children: Vec<Vec<u32>>,
}

impl CompoundFile {
    /// Open a compound file from a path, reading it fully into memory.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, OleError> {
        let data = fs::read(path)?;
        Self::from_bytes(data)
    }

    /// Open a compound file by reading `reader` to the end.
    pub fn open<R: Read>(mut reader: R) -> Result<Self, OleError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(data)
    }

    /// Parse a compound file image.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self, OleError> {
        let data = data.into();

        if data.len() < MINIMAL_OLEFILE_SIZE || &data[0..8] != MAGIC {
            return Err(OleError::NotOleFile);
        }

        let header = RawHeader::read_from_bytes(&data[..HEADER_SIZE])
            .map_err(|_| OleError::InvalidFormat("Failed to parse header".to_string()))?;

        // Validate byte order (must be little-endian)
        if header.byte_order.get() != 0xFFFE {
            return Err(OleError::InvalidFormat("Invalid byte order".to_string()));
        }

        let sector_size = match header.sector_shift.get() {
            9 => SECTOR_SIZE_V3,
            12 => SECTOR_SIZE_V4,
            shift => {
                return Err(OleError::InvalidFormat(format!(
                    "Unsupported sector shift {}",
                    shift
                )));
            },
        };

        // Validate sector size matches DLL version
        let major_version = header.major_version.get();
        if (major_version == 3 && sector_size != SECTOR_SIZE_V3)
            || (major_version == 4 && sector_size != SECTOR_SIZE_V4)
        {
            return Err(OleError::InvalidFormat("Sector size mismatch".to_string()));
        }

        let mini_sector_shift = header.mini_sector_shift.get();
        if mini_sector_shift == 0 || mini_sector_shift as usize >= sector_size.trailing_zeros() as usize {
            return Err(OleError::InvalidFormat(format!(
                "Invalid mini sector shift {}",
                mini_sector_shift
            )));
        }

        let mut file = CompoundFile {
            data,
            sector_size,
            mini_sector_size: 1usize << mini_sector_shift,
            mini_stream_cutoff: header.mini_stream_cutoff.get(),
            fat: Vec::new(),
            minifat: Vec::new(),
            ministream: Bytes::new(),
            entries: Vec::new(),
            children: Vec::new(),
        };

        file.load_fat(&header)?;
        file.load_directory(header.first_dir_sector.get())?;
        if header.num_minifat_sectors.get() > 0 {
            file.load_minifat(header.first_minifat_sector.get())?;
        }
        file.load_ministream()?;

        debug!(
            sector_size = file.sector_size,
            fat_entries = file.fat.len(),
            minifat_entries = file.minifat.len(),
            directory_entries = file.entries.len(),
            "Opened compound file"
        );

        Ok(file)
    }

    /// Total size of the underlying image in bytes
    pub fn file_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Load the File Allocation Table (FAT)
    ///
    /// The first 109 FAT sector indexes are stored in the header, additional
    /// indexes are stored in DIFAT sectors.
    fn load_fat(&mut self, header: &RawHeader) -> Result<(), OleError> {
        let mut fat_sectors: Vec<u32> = header
            .difat
            .iter()
            .map(|v| v.get())
            .take_while(|&s| s != FREESECT && s != ENDOFCHAIN)
            .collect();

        let num_difat_sectors = header.num_difat_sectors.get();
        if num_difat_sectors > 0 {
            let entries_per_sector = (self.sector_size / 4) - 1; // -1 for next DIFAT pointer
            let mut difat_sector = header.first_difat_sector.get();
            let mut seen = FixedBitSet::with_capacity(self.sector_count());

            for _ in 0..num_difat_sectors {
                if difat_sector == ENDOFCHAIN || difat_sector == FREESECT {
                    break;
                }
                self.mark_visited(&mut seen, difat_sector, "DIFAT")?;

                let sector_data = self.sector(difat_sector)?;
                let ids = read_u32_table(sector_data);
                fat_sectors.extend(
                    ids[..entries_per_sector]
                        .iter()
                        .copied()
                        .take_while(|&s| s != FREESECT && s != ENDOFCHAIN),
                );
                difat_sector = ids[entries_per_sector];
            }
        }

        let entries_per_sector = self.sector_size / 4;
        let mut fat = Vec::with_capacity(fat_sectors.len() * entries_per_sector);
        for &sector_id in &fat_sectors {
            fat.extend(read_u32_table(self.sector(sector_id)?));
        }
        self.fat = fat;

        Ok(())
    }

    /// Load the Mini FAT (for small streams)
    fn load_minifat(&mut self, first_minifat_sector: u32) -> Result<(), OleError> {
        let minifat_data = self.read_fat_chain(first_minifat_sector)?;
        self.minifat = read_u32_table(&minifat_data);
        Ok(())
    }

    /// The mini stream is the root entry's own stream, addressed through the FAT.
    fn load_ministream(&mut self) -> Result<(), OleError> {
        let root = self.root()?;
        let (start, size) = (root.start_sector, root.size);
        if start == ENDOFCHAIN || size == 0 {
            return Ok(());
        }
        let ministream = self.read_fat_chain(start)?;
        if (ministream.len() as u64) < size {
            return Err(OleError::CorruptedFile("Mini stream truncated".to_string()));
        }
        self.ministream = ministream.slice(..size as usize);
        Ok(())
    }

    /// Load directory entries and build the storage tree
    fn load_directory(&mut self, first_dir_sector: u32) -> Result<(), OleError> {
        let dir_data = self.read_fat_chain(first_dir_sector)?;

        let num_entries = dir_data.len() / DIRENTRY_SIZE;
        if num_entries == 0 {
            return Err(OleError::CorruptedFile("Empty directory".to_string()));
        }

        self.entries = vec![None; num_entries];
        self.children = vec![Vec::new(); num_entries];

        let root = self.parse_directory_entry(&dir_data[..DIRENTRY_SIZE], 0)?;
        if root.kind != EntryKind::Root {
            return Err(OleError::CorruptedFile(
                "First directory entry is not the root".to_string(),
            ));
        }
        let root_child = root.sid_child;
        self.entries[0] = Some(root);

        self.build_storage_tree(root_child, &dir_data)?;

        Ok(())
    }

    /// Parse a single directory entry from 128 bytes
    fn parse_directory_entry(&self, data: &[u8], sid: u32) -> Result<DirectoryEntry, OleError> {
        let raw = RawDirectoryEntry::read_from_bytes(data)
            .map_err(|_| OleError::InvalidFormat("Failed to parse directory entry".to_string()))?;

        let kind = match raw.entry_type {
            STGTY_ROOT => EntryKind::Root,
            STGTY_STORAGE => EntryKind::Storage,
            STGTY_STREAM => EntryKind::Stream,
            other => {
                return Err(OleError::CorruptedFile(format!(
                    "Directory entry {} has invalid type {}",
                    sid, other
                )));
            },
        };

        let name_len = raw.name_len.get() as usize;
        let name = decode_utf16le(&raw.name[0..name_len.saturating_sub(2).min(64)]);

        // 512-byte sector files only use the low 32 bits of the size
        let size = if self.sector_size == SECTOR_SIZE_V3 {
            raw.stream_size.get() & 0xFFFFFFFF
        } else {
            raw.stream_size.get()
        };

        Ok(DirectoryEntry {
            sid,
            name,
            kind,
            clsid: format_clsid(&raw.clsid),
            start_sector: raw.start_sector.get(),
            size,
            sid_left: raw.sid_left.get(),
            sid_right: raw.sid_right.get(),
            sid_child: raw.sid_child.get(),
        })
    }

    /// Walk every sibling tree in order, starting from the root's child, and
    /// record the children of each storage. Each SID may appear once in the
    /// whole directory. The walk keeps its own stacks and does not recurse.
    fn build_storage_tree(&mut self, root_child: u32, dir_data: &[u8]) -> Result<(), OleError> {
        let mut visited = FixedBitSet::with_capacity(self.entries.len());
        visited.insert(0);

        let mut storages: Vec<(usize, u32)> = vec![(0, root_child)];
        while let Some((storage, first)) = storages.pop() {
            let mut siblings = Vec::new();
            // (sid, right sibling, child, is storage) of nodes whose left subtree is in progress
            let mut ancestors: Vec<(u32, u32, u32, bool)> = Vec::new();
            let mut current = first;

            loop {
                while current != NOSTREAM {
                    let entry = self.visit_entry(current, dir_data, &mut visited)?;
                    let left = entry.sid_left;
                    ancestors.push((current, entry.sid_right, entry.sid_child, entry.is_storage()));
                    current = left;
                }
                let Some((sid, right, child, is_storage)) = ancestors.pop() else {
                    break;
                };
                siblings.push(sid);
                if is_storage {
                    storages.push((sid as usize, child));
                }
                current = right;
            }

            self.children[storage] = siblings;
        }

        Ok(())
    }

    /// Parse the entry at `sid` into the directory, rejecting bad indexes,
    /// repeats and second roots.
    fn visit_entry(
        &mut self,
        sid: u32,
        dir_data: &[u8],
        visited: &mut FixedBitSet,
    ) -> Result<&DirectoryEntry, OleError> {
        let index = sid as usize;
        if sid > MAXREGSID || index >= self.entries.len() {
            return Err(OleError::CorruptedFile(format!(
                "Invalid directory entry index {}",
                sid
            )));
        }
        if visited.put(index) {
            return Err(OleError::CorruptedFile(format!(
                "Directory entry {} is referenced twice",
                sid
            )));
        }

        let offset = index * DIRENTRY_SIZE;
        let entry = self.parse_directory_entry(&dir_data[offset..offset + DIRENTRY_SIZE], sid)?;
        if entry.kind == EntryKind::Root {
            return Err(OleError::CorruptedFile(format!(
                "Directory entry {} is a second root",
                sid
            )));
        }
        Ok(&*self.entries[index].insert(entry))
    }

    fn sector_count(&self) -> usize {
        (self.data.len() / self.sector_size).saturating_sub(1) + 1
    }

    /// Byte range of a single sector. A short final sector is returned as is.
    fn sector_range(&self, sector_id: u32) -> Result<std::ops::Range<usize>, OleError> {
        if sector_id > MAXREGSECT {
            return Err(OleError::CorruptedFile(format!(
                "Sector id {:#X} is not a regular sector",
                sector_id
            )));
        }
        // Sector position in file: (sector_id + 1) * sector_size
        let start = (sector_id as usize + 1) * self.sector_size;
        if start >= self.data.len() {
            return Err(OleError::CorruptedFile(format!(
                "Sector {} is beyond the end of the file",
                sector_id
            )));
        }
        Ok(start..(start + self.sector_size).min(self.data.len()))
    }

    fn sector(&self, sector_id: u32) -> Result<&[u8], OleError> {
        let range = self.sector_range(sector_id)?;
        let sector = &self.data[range];
        if sector.len() < self.sector_size {
            return Err(OleError::CorruptedFile(format!("Sector {} is truncated", sector_id)));
        }
        Ok(sector)
    }

    fn mark_visited(&self, seen: &mut FixedBitSet, sector: u32, table: &str) -> Result<(), OleError> {
        let index = sector as usize;
        if index >= seen.len() {
            seen.grow(index + 1);
        }
        if seen.put(index) {
            return Err(OleError::CorruptedFile(format!(
                "Cycle in {} chain at sector {}",
                table, sector
            )));
        }
        Ok(())
    }

    /// Follow a FAT chain and return the concatenated sectors.
    ///
    /// A chain of consecutive sectors is returned as a zero-copy slice of the
    /// image.
    fn read_fat_chain(&self, start_sector: u32) -> Result<Bytes, OleError> {
        let mut ranges: Vec<std::ops::Range<usize>> = Vec::new();
        let mut seen = FixedBitSet::with_capacity(self.fat.len());
        let mut sector = start_sector;

        while sector != ENDOFCHAIN {
            if sector as usize >= self.fat.len() {
                return Err(OleError::CorruptedFile(format!(
                    "Invalid sector index {} in FAT",
                    sector
                )));
            }
            self.mark_visited(&mut seen, sector, "FAT")?;

            let range = self.sector_range(sector)?;
            match ranges.last_mut() {
                Some(last) if last.end == range.start => last.end = range.end,
                _ => ranges.push(range),
            }
            sector = self.fat[sector as usize];
        }

        Ok(match ranges.as_slice() {
            [] => Bytes::new(),
            [only] => self.data.slice(only.clone()),
            _ => {
                let mut buf = BytesMut::with_capacity(ranges.iter().map(|r| r.len()).sum());
                for range in ranges {
                    buf.extend_from_slice(&self.data[range]);
                }
                buf.freeze()
            },
        })
    }

    /// Follow a MiniFAT chain through the mini stream.
    fn read_minifat_chain(&self, start_sector: u32, size: u64) -> Result<Bytes, OleError> {
        let mut data = BytesMut::with_capacity(size as usize);
        let mut seen = FixedBitSet::with_capacity(self.minifat.len());
        let mut sector = start_sector;

        while sector != ENDOFCHAIN && (data.len() as u64) < size {
            if sector as usize >= self.minifat.len() {
                return Err(OleError::CorruptedFile(format!(
                    "Invalid sector index {} in MiniFAT",
                    sector
                )));
            }
            self.mark_visited(&mut seen, sector, "MiniFAT")?;

            let position = sector as usize * self.mini_sector_size;
            if position + self.mini_sector_size > self.ministream.len() {
                return Err(OleError::CorruptedFile(
                    "Mini sector out of bounds".to_string(),
                ));
            }
            data.extend_from_slice(&self.ministream[position..position + self.mini_sector_size]);
            sector = self.minifat[sector as usize];
        }

        Ok(data.freeze())
    }

    fn root(&self) -> Result<&DirectoryEntry, OleError> {
        self.entries
            .first()
            .and_then(Option::as_ref)
            .ok_or_else(|| OleError::CorruptedFile("No root entry".to_string()))
    }

    fn entry(&self, sid: u32) -> Option<&DirectoryEntry> {
        self.entries.get(sid as usize).and_then(Option::as_ref)
    }

    /// Find a directory entry by path. The empty path is the root.
    pub fn find_entry(&self, path: &[&str]) -> Result<&DirectoryEntry, OleError> {
        let mut current = self.root()?;

        for &name in path {
            if !current.is_storage() {
                return Err(OleError::StreamNotFound(join_path(path)));
            }
            current = self.children[current.sid as usize]
                .iter()
                .filter_map(|&sid| self.entry(sid))
                .find(|child| names_equal(&child.name, name))
                .ok_or_else(|| OleError::StreamNotFound(join_path(path)))?;
        }

        Ok(current)
    }

    /// Check if a stream or storage exists
    pub fn exists(&self, path: &[&str]) -> bool {
        self.find_entry(path).is_ok()
    }

    /// Get the root entry name
    pub fn root_name(&self) -> Option<&str> {
        self.root().ok().map(|r| r.name.as_str())
    }

    /// List all streams in the file as paths of storage/stream names.
    ///
    /// Streams of a storage come before those of its nested storages.
    pub fn list_streams(&self) -> Vec<Vec<String>> {
        let mut streams = Vec::new();
        let mut storages: Vec<(u32, Vec<String>)> = vec![(0, Vec::new())];

        while let Some((sid, path)) = storages.pop() {
            let mut nested = Vec::new();
            for entry in self.children[sid as usize].iter().filter_map(|&child| self.entry(child)) {
                let mut child_path = path.clone();
                child_path.push(entry.name.clone());
                if entry.is_stream() {
                    streams.push(child_path);
                } else {
                    nested.push((entry.sid, child_path));
                }
            }
            storages.extend(nested.into_iter().rev());
        }

        streams
    }
}

impl ByteStore for CompoundFile {
    fn open_stream(&self, path: &[&str]) -> Result<Bytes, OleError> {
        let entry = self.find_entry(path)?;
        if !entry.is_stream() {
            return Err(OleError::NotAStream(join_path(path)));
        }

        let data = if entry.size < self.mini_stream_cutoff as u64 {
            self.read_minifat_chain(entry.start_sector, entry.size)?
        } else {
            self.read_fat_chain(entry.start_sector)?
        };

        if (data.len() as u64) < entry.size {
            return Err(OleError::CorruptedFile(format!(
                "Stream {} is truncated ({} of {} bytes)",
                join_path(path),
                data.len(),
                entry.size
            )));
        }
        Ok(data.slice(..entry.size as usize))
    }

    fn list_entries(&self, path: &[&str]) -> Result<Vec<DirectoryEntry>, OleError> {
        let storage = self.find_entry(path)?;
        if !storage.is_storage() {
            return Err(OleError::NotAStorage(join_path(path)));
        }
        Ok(self.children[storage.sid as usize]
            .iter()
            .filter_map(|&sid| self.entry(sid).cloned())
            .collect())
    }
}

/// Compound file names compare case-insensitively.
fn names_equal(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_uppercase)
        .eq(b.chars().flat_map(char::to_uppercase))
}

pub(crate) fn join_path(path: &[&str]) -> String {
    path.join("/")
}

fn read_u32_table(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Decode UTF-16LE bytes to String
fn decode_utf16le(bytes: &[u8]) -> String {
    let utf16_chars: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    String::from_utf16_lossy(&utf16_chars)
        .trim_end_matches('\0')
        .to_string()
}

/// Format CLSID as a human-readable string
fn format_clsid(bytes: &[u8; 16]) -> String {
    if bytes.iter().all(|&b| b == 0) {
        return String::new();
    }
    crate::msg::PropertySetId::from_bytes(*bytes).to_string()
}

/// Check if a file/data is an OLE file by checking magic bytes
pub fn is_ole_file(data: &[u8]) -> bool {
    data.len() >= MINIMAL_OLEFILE_SIZE && &data[0..8] == MAGIC
}
