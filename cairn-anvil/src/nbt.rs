//! NBT (Named Binary Tag) structures for Minecraft chunk data.
//!
//! These structures are serialized using fastnbt. Besides the block data the
//! chunk root carries the structure sub-tree: which structure starts are
//! rooted in the chunk and which nearby starts reach into it.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Minecraft data version for 1.21.11 (default).
pub const DEFAULT_DATA_VERSION: i32 = 4671;

/// Chunks older than this keep their structure starts in world-wide legacy
/// files instead of inside the chunk.
pub const LEGACY_STRUCTURE_VERSION: i32 = 1493;

/// Chunks older than this nest everything (structures included) under `Level`.
pub const FLAT_CHUNK_VERSION: i32 = 2844;

/// Id stored for a start that was attempted but produced nothing placeable.
pub const INVALID_START_ID: &str = "INVALID";

/// Data version written into new chunks.
/// Can be overridden by MC_DATA_VERSION env var.
pub fn get_data_version() -> i32 {
    std::env::var("MC_DATA_VERSION")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_DATA_VERSION)
}

/// Main chunk structure - the root of NBT hierarchy in .mca files.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkData {
    #[serde(rename = "DataVersion")]
    pub data_version: i32,

    // Chunk coordinates (absolute, not relative to region)
    #[serde(rename = "xPos")]
    pub x_pos: i32,
    #[serde(rename = "zPos")]
    pub z_pos: i32,
    #[serde(rename = "yPos")]
    pub y_pos: i32,

    // "minecraft:full" tells the server the chunk is fully generated.
    #[serde(rename = "Status")]
    pub status: String,

    #[serde(rename = "LastUpdate")]
    pub last_update: i64,

    #[serde(rename = "InhabitedTime", default)]
    pub inhabited_time: i64,

    #[serde(rename = "isLightOn", default, skip_serializing_if = "Option::is_none")]
    pub is_light_on: Option<i8>,

    // Vertical slices of the chunk (16 blocks high each)
    pub sections: Vec<Section>,

    #[serde(rename = "block_entities", default, skip_serializing_if = "Vec::is_empty")]
    pub block_entities: Vec<BlockEntity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structures: Option<ChunkStructures>,
}

impl ChunkData {
    pub fn decode(nbt: &[u8]) -> Result<Self> {
        fastnbt::from_bytes(nbt).context("Failed to decode chunk NBT")
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        fastnbt::to_bytes(self).context("Failed to encode chunk NBT")
    }
}

/// Container with a loot table that is rolled when first opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntity {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    #[serde(rename = "LootTable", default, skip_serializing_if = "Option::is_none")]
    pub loot_table: Option<String>,
}

// --- Section (16x16x16 Cube) ---
#[derive(Debug, Serialize, Deserialize)]
pub struct Section {
    // Vertical index of this section (e.g., -4 for the bottom, up to 19)
    #[serde(rename = "Y")]
    pub y: i8,

    #[serde(rename = "block_states", alias = "BlockStates", default, skip_serializing_if = "Option::is_none")]
    pub block_states: Option<BlockStates>,

    #[serde(rename = "biomes", alias = "Biomes", default, skip_serializing_if = "Option::is_none")]
    pub biomes: Option<Biomes>,
}

// --- Block Palette ---
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockStates {
    pub palette: Vec<BlockState>,
    // Indices into the palette. Required if palette length > 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<fastnbt::LongArray>,
}

// --- Biome Palette ---
#[derive(Debug, Serialize, Deserialize)]
pub struct Biomes {
    pub palette: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<fastnbt::LongArray>,
}

// --- Single Block ---
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockState {
    #[serde(rename = "Name")]
    pub name: String,
}

/// Structure sub-tree of a chunk.
///
/// Modern chunks spell the starts key `starts`, chunks nested under `Level`
/// spell it `Starts`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkStructures {
    #[serde(rename = "starts", alias = "Starts", default)]
    pub starts: HashMap<String, StartRecord>,

    /// Structure kind -> packed positions of start chunks reaching into this chunk.
    #[serde(rename = "References", default)]
    pub references: HashMap<String, fastnbt::LongArray>,
}

impl ChunkStructures {
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty() && self.references.is_empty()
    }
}

/// Persisted structure start. Pieces stay as raw NBT until the owning
/// structure kind decodes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRecord {
    pub id: String,
    #[serde(rename = "ChunkX", default)]
    pub chunk_x: i32,
    #[serde(rename = "ChunkZ", default)]
    pub chunk_z: i32,
    #[serde(default)]
    pub references: i32,
    #[serde(rename = "Children", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<fastnbt::Value>,
}

impl StartRecord {
    pub fn invalid() -> Self {
        Self {
            id: INVALID_START_ID.to_string(),
            chunk_x: 0,
            chunk_z: 0,
            references: 0,
            children: Vec::new(),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.id == INVALID_START_ID
    }
}

/// Pre-flattening wrapper; only the fields the structure layer needs.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LegacyLevel {
    #[serde(rename = "xPos", default)]
    pub x_pos: i32,
    #[serde(rename = "zPos", default)]
    pub z_pos: i32,
    #[serde(rename = "Structures", default, skip_serializing_if = "Option::is_none")]
    pub structures: Option<ChunkStructures>,
}

/// Field-selective view of a stored chunk: the data version and the structure
/// sub-trees. Sections, entities and everything else are skipped by the
/// decoder instead of being materialized.
#[derive(Debug, Default, Deserialize)]
pub struct StructureScan {
    #[serde(rename = "DataVersion", default)]
    pub data_version: Option<i32>,
    #[serde(default)]
    pub structures: Option<ChunkStructures>,
    #[serde(rename = "Level", default)]
    pub level: Option<LegacyLevel>,
}

impl StructureScan {
    pub fn decode(nbt: &[u8]) -> Result<Self> {
        fastnbt::from_bytes(nbt).context("Failed to scan chunk structure data")
    }

    /// Stored data version, 0 for chunks written before versions were recorded.
    pub fn version(&self) -> i32 {
        self.data_version.unwrap_or(0)
    }

    /// Structure sub-tree in whichever layout the version uses.
    pub fn take_structures(&mut self) -> Option<ChunkStructures> {
        if self.version() >= FLAT_CHUNK_VERSION {
            self.structures.take()
        } else {
            self.level.as_mut().and_then(|level| level.structures.take())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> ChunkData {
        let mut starts = HashMap::new();
        starts.insert(
            "minecraft:end_city".to_string(),
            StartRecord {
                id: "minecraft:end_city".to_string(),
                chunk_x: 3,
                chunk_z: 4,
                references: 2,
                children: Vec::new(),
            },
        );
        let mut references = HashMap::new();
        references.insert(
            "minecraft:end_city".to_string(),
            fastnbt::LongArray::new(vec![crate::ChunkPos::new(3, 4).as_long()]),
        );

        ChunkData {
            data_version: DEFAULT_DATA_VERSION,
            x_pos: 3,
            z_pos: 4,
            y_pos: -4,
            status: "minecraft:full".to_string(),
            last_update: 0,
            inhabited_time: 0,
            is_light_on: Some(1),
            sections: vec![Section {
                y: -4,
                block_states: Some(BlockStates {
                    palette: vec![BlockState { name: "minecraft:dirt".to_string() }],
                    data: None,
                }),
                biomes: None,
            }],
            block_entities: vec![BlockEntity {
                id: "minecraft:chest".to_string(),
                x: 50,
                y: 70,
                z: 66,
                loot_table: Some("minecraft:chests/end_city_treasure".to_string()),
            }],
            structures: Some(ChunkStructures { starts, references }),
        }
    }

    #[test]
    fn test_scan_selects_structures_only() {
        let bytes = sample_chunk().encode().unwrap();
        let mut scan = StructureScan::decode(&bytes).unwrap();
        assert_eq!(scan.version(), DEFAULT_DATA_VERSION);

        let structures = scan.take_structures().expect("Should have structures");
        let start = &structures.starts["minecraft:end_city"];
        assert_eq!(start.references, 2);
        assert_eq!((start.chunk_x, start.chunk_z), (3, 4));
        assert_eq!(&structures.references["minecraft:end_city"][..], &[crate::ChunkPos::new(3, 4).as_long()]);
    }

    #[test]
    fn test_scan_nested_layout() {
        let mut structures = ChunkStructures::default();
        structures.starts.insert("Fortress".to_string(), StartRecord::invalid());

        #[derive(Serialize)]
        struct Old {
            #[serde(rename = "DataVersion")]
            data_version: i32,
            #[serde(rename = "Level")]
            level: LegacyLevel,
        }
        let old = Old {
            data_version: 1976,
            level: LegacyLevel { x_pos: 1, z_pos: 2, structures: Some(structures) },
        };
        let bytes = fastnbt::to_bytes(&old).unwrap();

        let mut scan = StructureScan::decode(&bytes).unwrap();
        assert_eq!(scan.version(), 1976);
        let level = scan.level.as_ref().unwrap();
        assert_eq!((level.x_pos, level.z_pos), (1, 2));
        let structures = scan.take_structures().unwrap();
        assert!(structures.starts["Fortress"].is_invalid());
    }

    #[test]
    fn test_missing_version_is_zero() {
        #[derive(Serialize)]
        struct Bare {
            #[serde(rename = "Level")]
            level: LegacyLevel,
        }
        let bytes = fastnbt::to_bytes(&Bare { level: LegacyLevel::default() }).unwrap();
        let scan = StructureScan::decode(&bytes).unwrap();
        assert_eq!(scan.version(), 0);
    }

    #[test]
    fn test_chunk_round_trip_keeps_structures() {
        let bytes = sample_chunk().encode().unwrap();
        let chunk = ChunkData::decode(&bytes).unwrap();
        assert_eq!(chunk.sections.len(), 1);
        assert_eq!(chunk.block_entities[0].loot_table.as_deref(), Some("minecraft:chests/end_city_treasure"));
        let structures = chunk.structures.unwrap();
        assert!(structures.starts.contains_key("minecraft:end_city"));
    }
}
