//! Built-in prefab catalogue. A prefab is a hollow shell of one block type
//! with named data markers that the owning piece resolves during placement.

use crate::pos::BlockPos;

#[derive(Debug)]
pub struct Prefab {
    pub name: &'static str,
    pub size: BlockPos,
    pub shell: &'static str,
    pub markers: &'static [Marker],
}

#[derive(Debug, Clone, Copy)]
pub struct Marker {
    pub name: &'static str,
    pub offset: BlockPos,
}

const fn marker(name: &'static str, x: i32, y: i32, z: i32) -> Marker {
    Marker { name, offset: BlockPos::new(x, y, z) }
}

const PURPUR: &str = "minecraft:purpur_block";
const END_BRICKS: &str = "minecraft:end_stone_bricks";

const fn prefab(name: &'static str, x: i32, y: i32, z: i32, shell: &'static str, markers: &'static [Marker]) -> Prefab {
    Prefab { name, size: BlockPos::new(x, y, z), shell, markers }
}

static PREFABS: &[Prefab] = &[
    prefab("base_floor", 10, 4, 10, PURPUR, &[]),
    prefab("base_roof", 12, 2, 12, PURPUR, &[]),
    prefab("second_floor_1", 12, 4, 12, PURPUR, &[]),
    prefab("second_floor_2", 12, 8, 12, PURPUR, &[marker("Chest", 3, 2, 3)]),
    prefab("second_roof", 14, 2, 14, PURPUR, &[]),
    prefab("third_floor_1", 14, 4, 14, PURPUR, &[]),
    prefab("third_floor_2", 14, 8, 14, PURPUR, &[marker("Chest", 4, 2, 4), marker("Chest", 9, 2, 9)]),
    prefab("third_roof", 16, 2, 16, PURPUR, &[]),
    prefab("tower_base", 7, 7, 7, PURPUR, &[]),
    prefab("tower_piece", 7, 4, 7, PURPUR, &[]),
    prefab("tower_top", 9, 5, 9, PURPUR, &[marker("Sentry", 4, 3, 4)]),
    prefab("bridge_end", 5, 6, 2, END_BRICKS, &[]),
    prefab("bridge_piece", 5, 6, 4, END_BRICKS, &[]),
    prefab("bridge_steep_stairs", 5, 10, 4, END_BRICKS, &[]),
    prefab("bridge_gentle_stairs", 5, 10, 8, END_BRICKS, &[]),
    prefab("fat_tower_base", 13, 4, 13, PURPUR, &[]),
    prefab("fat_tower_middle", 13, 8, 13, PURPUR, &[marker("Sentry", 6, 2, 6)]),
    prefab("fat_tower_top", 17, 6, 17, PURPUR, &[marker("Chest", 8, 2, 8), marker("Sentry", 3, 3, 3)]),
    prefab(
        "ship",
        13,
        24,
        29,
        "minecraft:purpur_pillar",
        &[
            marker("Elytra", 6, 12, 20),
            marker("Chest", 5, 8, 16),
            marker("Chest", 7, 8, 16),
            marker("Sentry", 6, 16, 8),
        ],
    ),
];

pub fn lookup(name: &str) -> Option<&'static Prefab> {
    PREFABS.iter().find(|p| p.name == name)
}

impl Prefab {
    pub fn contains(&self, local: BlockPos) -> bool {
        (0..self.size.x).contains(&local.x) && (0..self.size.y).contains(&local.y) && (0..self.size.z).contains(&local.z)
    }

    pub fn is_shell(&self, local: BlockPos) -> bool {
        local.x == 0
            || local.y == 0
            || local.z == 0
            || local.x == self.size.x - 1
            || local.y == self.size.y - 1
            || local.z == self.size.z - 1
    }
}
