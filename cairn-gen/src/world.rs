//! What structure code needs from the world it builds into.

use crate::pos::BlockPos;

/// Surface height lookup used when a piece settles onto terrain.
pub trait TerrainHeight {
    /// Y of the first air block above the ground in the column.
    fn surface_height(&self, x: i32, z: i32) -> i32;
}

/// Mutable view of the chunk currently being decorated. Writes outside the
/// loaded area are refused and return `false`.
pub trait WorldAccess: TerrainHeight {
    fn set_block(&mut self, pos: BlockPos, block: &str) -> bool;

    /// Attaches a loot table to the container at `pos`.
    fn set_loot_table(&mut self, pos: BlockPos, table: &str) -> bool;

    fn spawn_entity(&mut self, pos: BlockPos, entity: &str) -> bool;
}

/// Terrain with one constant surface height everywhere.
#[derive(Debug, Clone, Copy)]
pub struct FlatSurface(pub i32);

impl TerrainHeight for FlatSurface {
    fn surface_height(&self, _x: i32, _z: i32) -> i32 {
        self.0
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use super::*;

    /// Records every write so tests can inspect placement.
    #[derive(Debug, Default)]
    pub struct RecordingWorld {
        pub surface: i32,
        pub blocks: HashMap<BlockPos, String>,
        pub loot: HashMap<BlockPos, String>,
        pub entities: Vec<(BlockPos, String)>,
    }

    impl RecordingWorld {
        pub fn with_surface(surface: i32) -> Self {
            Self { surface, ..Default::default() }
        }
    }

    impl TerrainHeight for RecordingWorld {
        fn surface_height(&self, _x: i32, _z: i32) -> i32 {
            self.surface
        }
    }

    impl WorldAccess for RecordingWorld {
        fn set_block(&mut self, pos: BlockPos, block: &str) -> bool {
            self.blocks.insert(pos, block.to_string());
            true
        }

        fn set_loot_table(&mut self, pos: BlockPos, table: &str) -> bool {
            self.loot.insert(pos, table.to_string());
            true
        }

        fn spawn_entity(&mut self, pos: BlockPos, entity: &str) -> bool {
            self.entities.push((pos, entity.to_string()));
            true
        }
    }
}
