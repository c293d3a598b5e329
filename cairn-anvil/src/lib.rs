//! Anvil world format plumbing: region files, chunk compression and the
//! chunk NBT schema used by the structure layer.

pub mod builder;
pub mod compression;
pub mod nbt;
pub mod pos;
pub mod region;

pub use builder::ChunkBuilder;
pub use compression::CompressionScheme;
pub use nbt::{BlockEntity, ChunkData, ChunkStructures, StartRecord, StructureScan};
pub use pos::ChunkPos;
pub use region::RegionFile;
