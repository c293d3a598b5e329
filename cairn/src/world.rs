//! Structure-facing view of one loaded chunk.

use cairn_anvil::builder::{AIR, MAX_Y, MIN_Y};
use cairn_anvil::{BlockEntity, ChunkBuilder, ChunkData, ChunkStructures};
use cairn_gen::{BlockPos, ChunkPos, TerrainHeight, WorldAccess};

/// A chunk held in memory while a command works on it.
pub struct LoadedChunk {
    pub pos: ChunkPos,
    pub builder: ChunkBuilder,
    pub block_entities: Vec<BlockEntity>,
    pub structures: ChunkStructures,
}

impl LoadedChunk {
    pub fn new(pos: ChunkPos, builder: ChunkBuilder) -> Self {
        Self {
            pos,
            builder,
            block_entities: Vec::new(),
            structures: ChunkStructures::default(),
        }
    }

    pub fn from_data(pos: ChunkPos, data: ChunkData) -> Self {
        Self {
            pos,
            builder: ChunkBuilder::from_chunk(&data),
            block_entities: data.block_entities,
            structures: data.structures.unwrap_or_default(),
        }
    }

    pub fn encode(self) -> anyhow::Result<Vec<u8>> {
        let mut data = self.builder.build(self.pos.x, self.pos.z, Some(self.structures));
        data.block_entities = self.block_entities;
        data.encode()
    }

    /// Records that the start of `kind` rooted in `origin` reaches into this
    /// chunk. Adding the same origin twice is a no-op.
    pub fn add_reference(&mut self, kind: &str, origin: ChunkPos) {
        let key = origin.as_long();
        let mut refs = self
            .structures
            .references
            .get(kind)
            .map(|existing| existing.to_vec())
            .unwrap_or_default();
        if !refs.contains(&key) {
            refs.push(key);
            self.structures.references.insert(kind.to_string(), fastnbt::LongArray::new(refs));
        }
    }

    pub fn has_reference(&self, kind: &str, origin: ChunkPos) -> bool {
        self.structures
            .references
            .get(kind)
            .is_some_and(|refs| refs.contains(&origin.as_long()))
    }

    fn local(&self, x: i32, z: i32) -> Option<(u8, u8)> {
        let (lx, lz) = (x - self.pos.min_block_x(), z - self.pos.min_block_z());
        ((0..16).contains(&lx) && (0..16).contains(&lz)).then_some((lx as u8, lz as u8))
    }
}

impl TerrainHeight for LoadedChunk {
    /// Columns outside the chunk are answered from the nearest column inside.
    fn surface_height(&self, x: i32, z: i32) -> i32 {
        let lx = (x - self.pos.min_block_x()).clamp(0, 15) as u8;
        let lz = (z - self.pos.min_block_z()).clamp(0, 15) as u8;
        self.builder.surface_height(lx, lz)
    }
}

/// `WorldAccess` over a loaded chunk. Writes outside the chunk are refused.
pub struct ChunkWorld<'a> {
    chunk: &'a mut LoadedChunk,
    entities: usize,
}

impl<'a> ChunkWorld<'a> {
    pub fn new(chunk: &'a mut LoadedChunk) -> Self {
        Self { chunk, entities: 0 }
    }

    /// Entities requested so far. Entities are not persisted.
    pub fn entities(&self) -> usize {
        self.entities
    }

    fn in_chunk(&self, pos: BlockPos) -> Option<(u8, u8)> {
        if !(MIN_Y..=MAX_Y).contains(&pos.y) {
            return None;
        }
        self.chunk.local(pos.x, pos.z)
    }
}

impl TerrainHeight for ChunkWorld<'_> {
    fn surface_height(&self, x: i32, z: i32) -> i32 {
        self.chunk.surface_height(x, z)
    }
}

impl WorldAccess for ChunkWorld<'_> {
    fn set_block(&mut self, pos: BlockPos, block: &str) -> bool {
        let Some((x, z)) = self.in_chunk(pos) else {
            return false;
        };
        self.chunk.builder.set_block(x, pos.y, z, block);
        // A replaced container takes its contents with it
        self.chunk
            .block_entities
            .retain(|entity| (entity.x, entity.y, entity.z) != (pos.x, pos.y, pos.z));
        true
    }

    fn set_loot_table(&mut self, pos: BlockPos, table: &str) -> bool {
        let Some((x, z)) = self.in_chunk(pos) else {
            return false;
        };
        let id = self.chunk.builder.block_at(x, pos.y, z);
        if id == AIR {
            log::debug!("No container at {} for loot table {}", pos, table);
            return false;
        }
        let entity = BlockEntity {
            id: id.to_string(),
            x: pos.x,
            y: pos.y,
            z: pos.z,
            loot_table: Some(table.to_string()),
        };
        let entities = &mut self.chunk.block_entities;
        entities.retain(|e| (e.x, e.y, e.z) != (pos.x, pos.y, pos.z));
        entities.push(entity);
        true
    }

    fn spawn_entity(&mut self, pos: BlockPos, entity: &str) -> bool {
        if self.in_chunk(pos).is_none() {
            return false;
        }
        log::debug!("Spawning {} at {}", entity, pos);
        self.entities += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_gen::{FlatGenerator, WorldGenerator};

    fn flat_chunk(pos: ChunkPos) -> LoadedChunk {
        LoadedChunk::new(pos, FlatGenerator::default().generate_chunk(pos))
    }

    #[test]
    fn test_writes_outside_chunk_refused() {
        let mut chunk = flat_chunk(ChunkPos::new(1, 1));
        let mut world = ChunkWorld::new(&mut chunk);
        assert!(world.set_block(BlockPos::new(16, 70, 16), "minecraft:stone"));
        assert!(!world.set_block(BlockPos::new(15, 70, 16), "minecraft:stone"));
        assert!(!world.set_block(BlockPos::new(16, 400, 16), "minecraft:stone"));
        assert!(!world.spawn_entity(BlockPos::new(40, 70, 16), "minecraft:shulker"));
        assert!(world.spawn_entity(BlockPos::new(20, 70, 20), "minecraft:shulker"));
        assert_eq!(world.entities(), 1);
    }

    #[test]
    fn test_loot_table_needs_container() {
        let mut chunk = flat_chunk(ChunkPos::new(0, 0));
        let mut world = ChunkWorld::new(&mut chunk);
        let pos = BlockPos::new(3, 70, 3);
        assert!(!world.set_loot_table(pos, "minecraft:chests/desert_pyramid"));

        world.set_block(pos, "minecraft:chest");
        assert!(world.set_loot_table(pos, "minecraft:chests/desert_pyramid"));
        assert!(world.set_loot_table(pos, "minecraft:chests/end_city_treasure"));
        assert_eq!(chunk.block_entities.len(), 1);
        assert_eq!(chunk.block_entities[0].loot_table.as_deref(), Some("minecraft:chests/end_city_treasure"));

        let mut world = ChunkWorld::new(&mut chunk);
        world.set_block(pos, AIR);
        assert!(chunk.block_entities.is_empty());
    }

    #[test]
    fn test_surface_clamps_to_chunk() {
        let mut chunk = flat_chunk(ChunkPos::new(0, 0));
        chunk.builder.set_block(15, 80, 15, "minecraft:stone");
        assert_eq!(chunk.surface_height(15, 15), 81);
        assert_eq!(chunk.surface_height(40, 40), 81);
        assert_eq!(chunk.surface_height(-5, 3), 65);
    }

    #[test]
    fn test_add_reference_once() {
        let mut chunk = flat_chunk(ChunkPos::new(0, 0));
        chunk.add_reference("minecraft:end_city", ChunkPos::new(-1, 2));
        chunk.add_reference("minecraft:end_city", ChunkPos::new(-1, 2));
        chunk.add_reference("minecraft:end_city", ChunkPos::new(0, 0));
        assert_eq!(chunk.structures.references["minecraft:end_city"].len(), 2);
        assert!(chunk.has_reference("minecraft:end_city", ChunkPos::new(-1, 2)));
        assert!(!chunk.has_reference("minecraft:desert_pyramid", ChunkPos::new(-1, 2)));
    }

    #[test]
    fn test_encode_keeps_block_entities() {
        let mut chunk = flat_chunk(ChunkPos::new(2, 3));
        let mut world = ChunkWorld::new(&mut chunk);
        world.set_block(BlockPos::new(33, 70, 49), "minecraft:chest");
        world.set_loot_table(BlockPos::new(33, 70, 49), "minecraft:chests/desert_pyramid");

        let data = ChunkData::decode(&chunk.encode().unwrap()).unwrap();
        let reloaded = LoadedChunk::from_data(ChunkPos::new(2, 3), data);
        assert_eq!(reloaded.block_entities.len(), 1);
        assert_eq!(reloaded.builder.block_at(1, 70, 1), "minecraft:chest");
    }
}
