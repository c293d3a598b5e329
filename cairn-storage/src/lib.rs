//! Chunk persistence backends and the structure start cache built on them.

use anyhow::Result;
use async_trait::async_trait;

use cairn_anvil::StructureScan;

pub mod cached;
pub mod legacy;
pub mod memory;
pub mod postgres;
pub mod region_folder;
pub mod structure_check;

pub use cached::CachedStorage;
pub use legacy::LegacyStructureUpgrader;
pub use memory::MemoryStorage;
pub use region_folder::RegionFolderStorage;
pub use structure_check::{FeatureEligibility, StructureCheck, StructureCheckResult};

/// How a backend lays chunk bytes out at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Uncompressed NBT.
    #[default]
    Raw,
    /// Zlib-compressed NBT.
    Compressed,
}

/// Chunk-granular persistence. Payloads crossing this trait are always
/// uncompressed NBT.
#[async_trait]
pub trait ChunkStorage: Send + Sync {
    async fn save_chunk(&self, x: i32, z: i32, data: &[u8]) -> Result<()>;

    async fn load_chunk(&self, x: i32, z: i32) -> Result<Option<Vec<u8>>>;

    /// Reads only the data version and structure sub-trees of a stored chunk.
    async fn scan_structures(&self, x: i32, z: i32) -> Result<Option<StructureScan>> {
        match self.load_chunk(x, z).await? {
            Some(nbt) => Ok(Some(StructureScan::decode(&nbt)?)),
            None => Ok(None),
        }
    }
}
