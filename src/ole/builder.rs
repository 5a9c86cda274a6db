//! Minimal compound file builder for test fixtures.
//!
//! Produces version 3 (512-byte sector) images by default and version 4
//! (4096-byte sector) images on request. Streams below the 4096-byte cutoff
//! go to the mini stream, larger ones get regular FAT chains. Large streams
//! are allocated first, so the first large stream starts at sector 0. FAT
//! sector ids that do not fit in the header go to DIFAT sectors written after
//! the FAT. Sibling trees are written as right-leaning chains, which readers
//! must accept like any other valid tree shape.

use super::consts::*;

const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: usize = 4096;

#[derive(Debug)]
struct Node {
    name: String,
    stream: Option<Vec<u8>>,
    children: Vec<usize>,
    start_sector: u32,
    size: u64,
}

/// Builds an in-memory compound file image.
#[derive(Debug)]
pub(crate) struct CompoundFileBuilder {
    nodes: Vec<Node>,
    major_version: u16,
    header_difat_entries: usize,
}

impl CompoundFileBuilder {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: "Root Entry".to_string(),
                stream: None,
                children: Vec::new(),
                start_sector: ENDOFCHAIN,
                size: 0,
            }],
            major_version: 3,
            header_difat_entries: HEADER_DIFAT_ENTRIES,
        }
    }

    /// Write a version 3 or version 4 image.
    pub(crate) fn major_version(&mut self, version: u16) -> &mut Self {
        assert!(matches!(version, 3 | 4), "unsupported major version {}", version);
        self.major_version = version;
        self
    }

    /// Keep at most `count` FAT sector ids in the header and move the rest to
    /// DIFAT sectors.
    pub(crate) fn header_difat_entries(&mut self, count: usize) -> &mut Self {
        self.header_difat_entries = count.min(HEADER_DIFAT_ENTRIES);
        self
    }

    fn sector_size(&self) -> usize {
        if self.major_version == 4 { SECTOR_SIZE_V4 } else { SECTOR_SIZE_V3 }
    }

    /// Create the storage at `path` (and any missing parents).
    pub(crate) fn add_storage(&mut self, path: &[&str]) -> &mut Self {
        self.storage_index(path);
        self
    }

    /// Create a stream, creating parent storages as needed.
    pub(crate) fn add_stream(&mut self, path: &[&str], data: &[u8]) -> &mut Self {
        let (name, parents) = path.split_last().expect("stream path must not be empty");
        let parent = self.storage_index(parents);
        let index = self.push_node(parent, name, Some(data.to_vec()));
        self.nodes[index].size = data.len() as u64;
        self
    }

    fn storage_index(&mut self, path: &[&str]) -> usize {
        let mut current = 0;
        for name in path {
            let existing = self.nodes[current]
                .children
                .iter()
                .copied()
                .find(|&child| self.nodes[child].name == *name);
            current = match existing {
                Some(child) => child,
                None => self.push_node(current, name, None),
            };
        }
        current
    }

    fn push_node(&mut self, parent: usize, name: &str, stream: Option<Vec<u8>>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            stream,
            children: Vec::new(),
            start_sector: 0,
            size: 0,
        });
        self.nodes[parent].children.push(index);
        index
    }

    /// Lay out and serialize the image.
    pub(crate) fn build(&mut self) -> Vec<u8> {
        let sector_size = self.sector_size();
        let mut sectors: Vec<u8> = Vec::new();
        let mut fat: Vec<u32> = Vec::new();

        // Large streams first
        for node in self.nodes.iter_mut() {
            if let Some(data) = &node.stream
                && data.len() >= MINI_STREAM_CUTOFF
            {
                node.start_sector = allocate(&mut sectors, &mut fat, data, sector_size);
            }
        }

        let mut ministream: Vec<u8> = Vec::new();
        let mut minifat: Vec<u32> = Vec::new();
        for node in self.nodes.iter_mut() {
            let Some(data) = &node.stream else { continue };
            if data.len() >= MINI_STREAM_CUTOFF {
                continue;
            }
            if data.is_empty() {
                node.start_sector = ENDOFCHAIN;
                continue;
            }
            let start = minifat.len() as u32;
            let count = data.len().div_ceil(MINI_SECTOR_SIZE);
            for i in 0..count {
                minifat.push(if i + 1 == count { ENDOFCHAIN } else { start + i as u32 + 1 });
            }
            ministream.extend_from_slice(data);
            ministream.resize(minifat.len() * MINI_SECTOR_SIZE, 0);
            node.start_sector = start;
        }

        if !ministream.is_empty() {
            self.nodes[0].start_sector = allocate(&mut sectors, &mut fat, &ministream, sector_size);
            self.nodes[0].size = ministream.len() as u64;
        }

        let (first_minifat_sector, num_minifat_sectors) = if minifat.is_empty() {
            (ENDOFCHAIN, 0)
        } else {
            let mut table: Vec<u8> = minifat.iter().flat_map(|v| v.to_le_bytes()).collect();
            let padded = table.len().div_ceil(sector_size) * sector_size;
            while table.len() < padded {
                table.extend_from_slice(&FREESECT.to_le_bytes());
            }
            let count = (table.len() / sector_size) as u32;
            (allocate(&mut sectors, &mut fat, &table, sector_size), count)
        };

        let directory = self.directory_stream(sector_size);
        let num_dir_sectors = (directory.len() / sector_size) as u32;
        let first_dir_sector = allocate(&mut sectors, &mut fat, &directory, sector_size);

        // FAT and DIFAT sectors are covered by the FAT too
        let per_sector = sector_size / 4;
        let ids_per_difat = per_sector - 1;
        let (mut num_fat, mut num_difat) = (0usize, 0usize);
        loop {
            let fat_needed = (fat.len() + num_fat + num_difat).div_ceil(per_sector);
            let difat_needed = fat_needed.saturating_sub(self.header_difat_entries).div_ceil(ids_per_difat);
            if (fat_needed, difat_needed) == (num_fat, num_difat) {
                break;
            }
            (num_fat, num_difat) = (fat_needed, difat_needed);
        }
        let first_fat_sector = fat.len() as u32;
        let first_difat_sector = first_fat_sector + num_fat as u32;
        fat.extend(std::iter::repeat_n(FATSECT, num_fat));
        fat.extend(std::iter::repeat_n(DIFSECT, num_difat));
        fat.resize(num_fat * per_sector, FREESECT);
        for entry in &fat {
            sectors.extend_from_slice(&entry.to_le_bytes());
        }

        let fat_ids: Vec<u32> = (0..num_fat as u32).map(|i| first_fat_sector + i).collect();
        let in_header = fat_ids.len().min(self.header_difat_entries);
        for (n, chunk) in fat_ids[in_header..].chunks(ids_per_difat).enumerate() {
            let mut ids = chunk.to_vec();
            ids.resize(ids_per_difat, FREESECT);
            ids.push(if n + 1 == num_difat { ENDOFCHAIN } else { first_difat_sector + n as u32 + 1 });
            for id in ids {
                sectors.extend_from_slice(&id.to_le_bytes());
            }
        }

        let mut header = vec![0u8; HEADER_SIZE];
        header[0..8].copy_from_slice(MAGIC);
        header[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
        header[26..28].copy_from_slice(&self.major_version.to_le_bytes());
        header[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
        header[30..32].copy_from_slice(&(sector_size.trailing_zeros() as u16).to_le_bytes());
        header[32..34].copy_from_slice(&6u16.to_le_bytes());
        if self.major_version == 4 {
            header[40..44].copy_from_slice(&num_dir_sectors.to_le_bytes());
        }
        header[44..48].copy_from_slice(&(num_fat as u32).to_le_bytes());
        header[48..52].copy_from_slice(&first_dir_sector.to_le_bytes());
        header[56..60].copy_from_slice(&(MINI_STREAM_CUTOFF as u32).to_le_bytes());
        header[60..64].copy_from_slice(&first_minifat_sector.to_le_bytes());
        header[64..68].copy_from_slice(&num_minifat_sectors.to_le_bytes());
        let difat_start = if num_difat == 0 { ENDOFCHAIN } else { first_difat_sector };
        header[68..72].copy_from_slice(&difat_start.to_le_bytes());
        header[72..76].copy_from_slice(&(num_difat as u32).to_le_bytes());
        for i in 0..HEADER_DIFAT_ENTRIES {
            let value = if i < in_header { fat_ids[i] } else { FREESECT };
            let offset = 76 + i * 4;
            header[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }

        // Sector 0 starts one sector into the file
        header.resize(sector_size, 0);
        header.extend_from_slice(&sectors);
        header
    }

    fn directory_stream(&self, sector_size: usize) -> Vec<u8> {
        let mut right = vec![NOSTREAM; self.nodes.len()];
        let mut child = vec![NOSTREAM; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            if let Some(&first) = node.children.first() {
                child[index] = first as u32;
            }
            for pair in node.children.windows(2) {
                right[pair[0]] = pair[1] as u32;
            }
        }

        let mut out = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            let entry_type = match (index, &node.stream) {
                (0, _) => STGTY_ROOT,
                (_, Some(_)) => STGTY_STREAM,
                (_, None) => STGTY_STORAGE,
            };
            out.extend_from_slice(&directory_entry(
                &node.name,
                entry_type,
                right[index],
                child[index],
                node.start_sector,
                node.size,
            ));
        }

        // Pad with empty entries to a whole sector
        while out.len() % sector_size != 0 {
            out.extend_from_slice(&directory_entry("", STGTY_EMPTY, NOSTREAM, NOSTREAM, 0, 0));
        }
        out
    }
}

fn directory_entry(
    name: &str,
    entry_type: u8,
    sid_right: u32,
    sid_child: u32,
    start_sector: u32,
    size: u64,
) -> [u8; DIRENTRY_SIZE] {
    let mut entry = [0u8; DIRENTRY_SIZE];
    let units: Vec<u16> = name.encode_utf16().take(31).collect();
    for (i, unit) in units.iter().enumerate() {
        entry[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    let name_len = if name.is_empty() { 0u16 } else { (units.len() as u16 + 1) * 2 };
    entry[64..66].copy_from_slice(&name_len.to_le_bytes());
    entry[66] = entry_type;
    entry[67] = 1;
    entry[68..72].copy_from_slice(&NOSTREAM.to_le_bytes());
    entry[72..76].copy_from_slice(&sid_right.to_le_bytes());
    entry[76..80].copy_from_slice(&sid_child.to_le_bytes());
    entry[116..120].copy_from_slice(&start_sector.to_le_bytes());
    entry[120..128].copy_from_slice(&size.to_le_bytes());
    entry
}

/// Append `data` as a chain of whole sectors and return its first sector.
fn allocate(sectors: &mut Vec<u8>, fat: &mut Vec<u32>, data: &[u8], sector_size: usize) -> u32 {
    if data.is_empty() {
        return ENDOFCHAIN;
    }
    let start = fat.len() as u32;
    let count = data.len().div_ceil(sector_size);
    for i in 0..count {
        fat.push(if i + 1 == count { ENDOFCHAIN } else { start + i as u32 + 1 });
    }
    sectors.extend_from_slice(data);
    sectors.resize(fat.len() * sector_size, 0);
    start
}
