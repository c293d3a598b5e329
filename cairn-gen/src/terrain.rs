//! Base terrain that structures are built on top of.

use cairn_anvil::ChunkBuilder;

use crate::pos::ChunkPos;
use crate::world::TerrainHeight;

pub trait WorldGenerator: TerrainHeight + Send + Sync {
    fn generate_chunk(&self, chunk: ChunkPos) -> ChunkBuilder;
}

/// Bedrock floor, stone and dirt up to a fixed grass layer.
#[derive(Debug, Clone, Copy)]
pub struct FlatGenerator {
    pub grass_y: i32,
}

impl FlatGenerator {
    pub fn new(grass_y: i32) -> Self {
        Self { grass_y }
    }
}

impl Default for FlatGenerator {
    fn default() -> Self {
        Self::new(64)
    }
}

impl TerrainHeight for FlatGenerator {
    fn surface_height(&self, _x: i32, _z: i32) -> i32 {
        self.grass_y + 1
    }
}

impl WorldGenerator for FlatGenerator {
    fn generate_chunk(&self, _chunk: ChunkPos) -> ChunkBuilder {
        let mut builder = ChunkBuilder::new();
        builder.fill_layer(-64, "minecraft:bedrock");
        for y in -63..self.grass_y - 3 {
            builder.fill_layer(y, "minecraft:stone");
        }
        for y in (self.grass_y - 3).max(-63)..self.grass_y {
            builder.fill_layer(y, "minecraft:dirt");
        }
        builder.fill_layer(self.grass_y, "minecraft:grass_block");
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_layers() {
        let generator = FlatGenerator::new(64);
        let builder = generator.generate_chunk(ChunkPos::new(0, 0));
        assert_eq!(builder.block_at(3, -64, 3), "minecraft:bedrock");
        assert_eq!(builder.block_at(3, 0, 3), "minecraft:stone");
        assert_eq!(builder.block_at(3, 62, 3), "minecraft:dirt");
        assert_eq!(builder.block_at(3, 64, 3), "minecraft:grass_block");
        assert_eq!(builder.surface_height(3, 3), generator.surface_height(3, 3));
    }
}
