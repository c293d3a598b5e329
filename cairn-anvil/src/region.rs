//! Region (`.mca`) files.
//!
//! The header consists of two tables:
//! - Location table: where each chunk is stored (3 bytes sector offset + 1 byte sector count)
//! - Timestamp table: when each chunk was last saved

use std::io::ErrorKind;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};

use crate::compression::{self, CompressionScheme};

pub const SECTOR_BYTES: usize = 4096; // minecraft uses 4096 bytes per sector
pub const HEADER_BYTES: usize = 8192; // header is 8192 bytes (2 sectors 8kb)
pub const CHUNKS_PER_REGION: usize = 1024;

const HEADER_SECTORS: u32 = (HEADER_BYTES / SECTOR_BYTES) as u32;
const MAX_SECTORS_PER_CHUNK: usize = 255;

pub fn region_file_name(region_x: i32, region_z: i32) -> String {
    format!("r.{}.{}.mca", region_x, region_z)
}

/// Index into the header tables. 32x32 chunks in region, formula: x + z * 32.
pub fn chunk_index(rel_x: i32, rel_z: i32) -> usize {
    ((rel_x & 31) + (rel_z & 31) * 32) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Location {
    sector: u32,
    count: u8,
}

/// In-memory image of one region file.
pub struct RegionFile {
    data: Vec<u8>,
}

impl RegionFile {
    pub fn new() -> Self {
        Self { data: vec![0u8; HEADER_BYTES] }
    }

    pub fn from_bytes(mut data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::new());
        }
        if data.len() < HEADER_BYTES {
            bail!("Region file truncated: {} bytes", data.len());
        }
        // Pad a partial trailing sector so sector math stays in bounds
        let padded = data.len().div_ceil(SECTOR_BYTES) * SECTOR_BYTES;
        data.resize(padded, 0);
        Ok(Self { data })
    }

    /// Returns `None` when the file does not exist yet.
    pub fn open(path: &Path) -> Result<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => Self::from_bytes(bytes)
                .with_context(|| format!("Failed to parse region file {}", path.display()))
                .map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read region file {}", path.display())),
        }
    }

    /// Writes the whole image through a temporary file, then renames it over the target.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("mca.tmp");
        std::fs::write(&tmp, &self.data)
            .with_context(|| format!("Failed to write region file {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace region file {}", path.display()))?;
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn location(&self, index: usize) -> Location {
        let entry = &self.data[index * 4..index * 4 + 4];
        Location {
            sector: u32::from_be_bytes([0, entry[0], entry[1], entry[2]]),
            count: entry[3],
        }
    }

    fn set_location(&mut self, index: usize, location: Location) {
        let entry_offset = index * 4;
        self.data[entry_offset] = ((location.sector >> 16) & 0xFF) as u8;
        self.data[entry_offset + 1] = ((location.sector >> 8) & 0xFF) as u8;
        self.data[entry_offset + 2] = (location.sector & 0xFF) as u8;
        self.data[entry_offset + 3] = location.count;
    }

    pub fn timestamp(&self, rel_x: i32, rel_z: i32) -> u32 {
        let offset = SECTOR_BYTES + chunk_index(rel_x, rel_z) * 4;
        let entry = &self.data[offset..offset + 4];
        u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]])
    }

    fn set_timestamp(&mut self, index: usize, timestamp: u32) {
        let offset = SECTOR_BYTES + index * 4;
        self.data[offset..offset + 4].copy_from_slice(&timestamp.to_be_bytes());
    }

    pub fn has_chunk(&self, rel_x: i32, rel_z: i32) -> bool {
        self.location(chunk_index(rel_x, rel_z)).sector != 0
    }

    /// Reads and decompresses the chunk NBT, `None` if the slot is empty.
    pub fn read_chunk(&self, rel_x: i32, rel_z: i32) -> Result<Option<Vec<u8>>> {
        let location = self.location(chunk_index(rel_x, rel_z));
        if location.sector == 0 {
            return Ok(None);
        }
        if location.sector < HEADER_SECTORS {
            bail!("Chunk ({}, {}) points into the header (sector {})", rel_x, rel_z, location.sector);
        }
        let start = location.sector as usize * SECTOR_BYTES;
        let end = start + location.count as usize * SECTOR_BYTES;
        if end > self.data.len() {
            bail!("Chunk ({}, {}) sectors {}..{} past end of file", rel_x, rel_z, start, end);
        }
        compression::unwrap_chunk(&self.data[start..end])
            .with_context(|| format!("Failed to decode chunk ({}, {})", rel_x, rel_z))
            .map(Some)
    }

    /// Stores the chunk NBT, reusing its sectors when the new payload fits.
    pub fn write_chunk(&mut self, rel_x: i32, rel_z: i32, nbt: &[u8], scheme: CompressionScheme) -> Result<()> {
        let blob = compression::compress_and_wrap_chunk(nbt, scheme)?;
        let sectors_needed = blob.len().div_ceil(SECTOR_BYTES);
        if sectors_needed > MAX_SECTORS_PER_CHUNK {
            bail!("Chunk ({}, {}) needs {} sectors, limit is {}", rel_x, rel_z, sectors_needed, MAX_SECTORS_PER_CHUNK);
        }

        let index = chunk_index(rel_x, rel_z);
        let current = self.location(index);
        let sector = if current.sector >= HEADER_SECTORS && sectors_needed <= current.count as usize {
            current.sector
        } else {
            // Append at the end; the old sectors become dead space
            (self.data.len() / SECTOR_BYTES) as u32
        };

        let start = sector as usize * SECTOR_BYTES;
        let end = start + sectors_needed * SECTOR_BYTES;
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..start + blob.len()].copy_from_slice(&blob);
        self.data[start + blob.len()..end].fill(0);

        self.set_location(index, Location { sector, count: sectors_needed as u8 });
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        self.set_timestamp(index, now);
        Ok(())
    }
}

impl Default for RegionFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        let region = RegionFile::new();
        assert_eq!(region.as_bytes().len(), 8192);
    }

    #[test]
    fn test_chunk_index() {
        assert_eq!(chunk_index(0, 0), 0);
        assert_eq!(chunk_index(31, 0), 31);
        assert_eq!(chunk_index(0, 1), 32);
        assert_eq!(chunk_index(-1, -1), 1023);
    }

    #[test]
    fn test_empty_slot_reads_none() {
        let region = RegionFile::new();
        assert!(region.read_chunk(3, 4).unwrap().is_none());
        assert!(!region.has_chunk(3, 4));
    }

    #[test]
    fn test_write_then_read() {
        let mut region = RegionFile::new();
        region.write_chunk(3, 4, b"first", CompressionScheme::Zlib).unwrap();
        region.write_chunk(5, 6, b"second", CompressionScheme::Gzip).unwrap();

        assert_eq!(region.read_chunk(3, 4).unwrap().unwrap(), b"first");
        assert_eq!(region.read_chunk(5, 6).unwrap().unwrap(), b"second");
        assert!(region.has_chunk(3, 4));
        assert!(region.timestamp(3, 4) > 0);

        // First chunk lands right after the header
        assert_eq!(region.as_bytes()[chunk_index(3, 4) * 4 + 2], 2);
    }

    #[test]
    fn test_overwrite_reuses_sectors_when_it_fits() {
        let mut region = RegionFile::new();
        region.write_chunk(0, 0, b"abc", CompressionScheme::Uncompressed).unwrap();
        let len = region.as_bytes().len();
        region.write_chunk(0, 0, b"xyz", CompressionScheme::Uncompressed).unwrap();
        assert_eq!(region.as_bytes().len(), len);
        assert_eq!(region.read_chunk(0, 0).unwrap().unwrap(), b"xyz");
    }

    #[test]
    fn test_growing_chunk_relocates() {
        let mut region = RegionFile::new();
        region.write_chunk(0, 0, b"small", CompressionScheme::Uncompressed).unwrap();
        let big = vec![7u8; SECTOR_BYTES * 2];
        region.write_chunk(0, 0, &big, CompressionScheme::Uncompressed).unwrap();
        assert_eq!(region.read_chunk(0, 0).unwrap().unwrap(), big);
    }

    #[test]
    fn test_save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(region_file_name(0, -1));
        assert!(RegionFile::open(&path).unwrap().is_none());

        let mut region = RegionFile::new();
        region.write_chunk(1, 2, b"persisted", CompressionScheme::Lz4).unwrap();
        region.save(&path).unwrap();

        let reopened = RegionFile::open(&path).unwrap().expect("Should exist");
        assert_eq!(reopened.read_chunk(1, 2).unwrap().unwrap(), b"persisted");
    }

    #[test]
    fn test_truncated_file_rejected() {
        assert!(RegionFile::from_bytes(vec![0u8; 100]).is_err());
        assert!(RegionFile::from_bytes(Vec::new()).is_ok());
    }
}
