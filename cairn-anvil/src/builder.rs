use std::collections::HashMap;

use crate::nbt::{
    Biomes, BlockState, BlockStates, ChunkData, ChunkStructures, Section, get_data_version,
};

pub const AIR: &str = "minecraft:air";
pub const MIN_Y: i32 = -64;
pub const MAX_Y: i32 = 319;

const MIN_SECTION: i8 = -4;
const MAX_SECTION: i8 = 19;

/// Sparse block builder for one chunk, coordinates are chunk-local on X/Z.
#[derive(Default)]
pub struct ChunkBuilder {
    // Key: (x, y, z), Value: Block Name
    custom_blocks: HashMap<(u8, i32, u8), String>,

    // Optimisation for layers:
    // Key: y, Value: Block Name
    full_layers: HashMap<i32, String>,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the editable form of a stored chunk.
    pub fn from_chunk(chunk: &ChunkData) -> Self {
        let mut builder = Self::new();
        for section in &chunk.sections {
            let Some(states) = &section.block_states else {
                continue;
            };
            let start_y = (section.y as i32) * 16;

            if states.palette.len() <= 1 {
                if let Some(state) = states.palette.first().filter(|s| s.name != AIR) {
                    for y in start_y..start_y + 16 {
                        builder.full_layers.insert(y, state.name.clone());
                    }
                }
                continue;
            }

            let Some(data) = &states.data else {
                log::warn!("Section {} has {} palette entries but no data", section.y, states.palette.len());
                continue;
            };
            let indices = unpack_indices(data, states.palette.len());
            for (i, palette_idx) in indices.into_iter().enumerate() {
                let Some(state) = states.palette.get(palette_idx) else {
                    continue;
                };
                if state.name == AIR {
                    continue;
                }
                // Index = (y*16 + z)*16 + x
                let x = (i % 16) as u8;
                let z = ((i / 16) % 16) as u8;
                let y = start_y + (i / 256) as i32;
                builder.custom_blocks.insert((x, y, z), state.name.clone());
            }
        }
        builder
    }

    /// Set a single block at chunk-local coordinates (x: 0..15, z: 0..15)
    pub fn set_block(&mut self, x: u8, y: i32, z: u8, name: &str) {
        if x < 16 && z < 16 && (MIN_Y..=MAX_Y).contains(&y) {
            self.custom_blocks.insert((x, y, z), name.to_string());
        }
    }

    /// Fill an entire Y-layer with a block (efficiently)
    pub fn fill_layer(&mut self, y: i32, name: &str) {
        self.full_layers.insert(y, name.to_string());
        // Individual blocks at this Y are overwritten
        self.custom_blocks.retain(|(_, by, _), _| *by != y);
    }

    pub fn block_at(&self, x: u8, y: i32, z: u8) -> &str {
        if let Some(name) = self.custom_blocks.get(&(x, y, z)) {
            name
        } else if let Some(layer) = self.full_layers.get(&y) {
            layer
        } else {
            AIR
        }
    }

    /// Y of the first air block above the highest solid block in the column.
    pub fn surface_height(&self, x: u8, z: u8) -> i32 {
        let top_layer = self.full_layers.iter().filter(|(_, n)| n.as_str() != AIR).map(|(y, _)| *y).max();
        let top_custom = self
            .custom_blocks
            .iter()
            .filter(|((bx, _, bz), n)| *bx == x && *bz == z && n.as_str() != AIR)
            .map(|((_, y, _), _)| *y)
            .max();
        match top_layer.max(top_custom) {
            // The top may be a custom air override of a full layer, so walk down
            Some(top) => (MIN_Y..=top)
                .rev()
                .find(|y| self.block_at(x, *y, z) != AIR)
                .map_or(MIN_Y, |y| y + 1),
            None => MIN_Y,
        }
    }

    /// Build the ChunkData NBT structure
    pub fn build(self, chunk_x: i32, chunk_z: i32, structures: Option<ChunkStructures>) -> ChunkData {
        let sections = (MIN_SECTION..=MAX_SECTION).map(|sec_y| self.build_section(sec_y)).collect();

        ChunkData {
            data_version: get_data_version(),
            x_pos: chunk_x,
            y_pos: MIN_SECTION as i32,
            z_pos: chunk_z,
            status: "minecraft:full".to_string(),
            last_update: 0,
            inhabited_time: 0,
            is_light_on: None,
            sections,
            block_entities: Vec::new(),
            structures,
        }
    }

    fn build_section(&self, sec_y: i8) -> Section {
        let start_y = (sec_y as i32) * 16;
        let end_y = start_y + 16;
        let plains = || {
            Some(Biomes {
                palette: vec!["minecraft:plains".to_string()],
                data: None,
            })
        };

        // If no layers set in this range AND no custom blocks in this range -> Empty
        let has_layers = (start_y..end_y).any(|y| self.full_layers.contains_key(&y));
        let has_blocks = self.custom_blocks.keys().any(|(_, y, _)| *y >= start_y && *y < end_y);

        if !has_layers && !has_blocks {
            return Section {
                y: sec_y,
                block_states: None, // Implicit Air
                biomes: plains(),
            };
        }

        let mut palette: Vec<String> = Vec::new();
        let mut name_to_index = HashMap::new();
        let mut block_indices = Vec::with_capacity(4096);

        // Standard Order: Y -> Z -> X => Index = (y*16 + z)*16 + x
        for y in start_y..end_y {
            for z in 0..16u8 {
                for x in 0..16u8 {
                    let block_name = self.block_at(x, y, z);
                    let idx = *name_to_index.entry(block_name.to_string()).or_insert_with(|| {
                        palette.push(block_name.to_string());
                        palette.len() - 1
                    });
                    block_indices.push(idx);
                }
            }
        }

        // Uniform section: single palette entry, no data
        if palette.len() <= 1 {
            let single_block = palette.first().cloned().unwrap_or_else(|| AIR.to_string());
            return Section {
                y: sec_y,
                block_states: Some(BlockStates {
                    palette: vec![BlockState { name: single_block }],
                    data: None,
                }),
                biomes: plains(),
            };
        }

        Section {
            y: sec_y,
            block_states: Some(BlockStates {
                data: Some(fastnbt::LongArray::new(pack_indices(&block_indices, palette.len()))),
                palette: palette.into_iter().map(|name| BlockState { name }).collect(),
            }),
            biomes: plains(),
        }
    }
}

/// Bits per block = ceil(log2(palette_len)), min 4.
fn bits_per_block(palette_len: usize) -> usize {
    ((palette_len as f64).log2().ceil() as usize).max(4)
}

// Compact long array: entries never straddle two longs.
fn pack_indices(indices: &[usize], palette_len: usize) -> Vec<i64> {
    let bits = bits_per_block(palette_len);
    let blocks_per_long = 64 / bits;
    let mask = (1u64 << bits) - 1;
    let mut packed = vec![0i64; indices.len().div_ceil(blocks_per_long)];

    for (i, &block_idx) in indices.iter().enumerate() {
        let long_index = i / blocks_per_long;
        let bit_offset = (i % blocks_per_long) * bits;
        let current = packed[long_index] as u64;
        packed[long_index] = (current | (((block_idx as u64) & mask) << bit_offset)) as i64;
    }
    packed
}

fn unpack_indices(packed: &[i64], palette_len: usize) -> Vec<usize> {
    let bits = bits_per_block(palette_len);
    let blocks_per_long = 64 / bits;
    let mask = (1u64 << bits) - 1;

    (0..4096)
        .map(|i| {
            let long = packed.get(i / blocks_per_long).copied().unwrap_or(0) as u64;
            ((long >> ((i % blocks_per_long) * bits)) & mask) as usize
        })
        .collect()
}
