//! Recursive tower, bridge and house layout with at most one ship.

use rand::Rng;

use crate::assembly::{Assembly, MAX_DEPTH, PieceGenerator};
use crate::graph::PieceGraph;
use crate::orientation::Rotation;
use crate::piece::TemplatePiece;
use crate::placement::GridPlacement;
use crate::pos::BlockPos;
use crate::random::assembly_rng;
use crate::structure::{GenerationContext, StructureKind, StructureType};

/// Cities need solid ground at least this high under the whole base.
pub const MIN_SURFACE: i32 = 60;

const TOWER_BRIDGES: [(Rotation, BlockPos); 4] = [
    (Rotation::None, BlockPos::new(1, -1, 0)),
    (Rotation::Clockwise90, BlockPos::new(6, -1, 1)),
    (Rotation::CounterClockwise90, BlockPos::new(0, -1, 5)),
    (Rotation::Clockwise180, BlockPos::new(5, -1, 6)),
];

const FAT_TOWER_BRIDGES: [(Rotation, BlockPos); 4] = [
    (Rotation::None, BlockPos::new(4, -1, 0)),
    (Rotation::Clockwise90, BlockPos::new(12, -1, 4)),
    (Rotation::CounterClockwise90, BlockPos::new(0, -1, 8)),
    (Rotation::Clockwise180, BlockPos::new(8, -1, 12)),
];

/// Assembly state shared by every branch of one city.
#[derive(Debug, Default)]
pub struct CityState {
    ship_placed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CityPart {
    HouseTower,
    TowerBridge,
    Tower,
    FatTower,
}

type CityAssembly<'a> = Assembly<'a, CityState>;

/// Anchors a template at `offset` in the parent's rotated frame.
fn attach(assembly: &CityAssembly<'_>, parent: usize, offset: BlockPos, template: &str, rotation: Rotation, overwrite: bool) -> TemplatePiece {
    let origin = match assembly.piece(parent).template() {
        Some(parent) => parent.world_pos(offset),
        None => assembly.piece(parent).bounding_box.min() + offset,
    };
    TemplatePiece::new(template, origin, rotation, overwrite)
}

fn add(assembly: &mut CityAssembly<'_>, parent: usize, offset: BlockPos, template: &str, rotation: Rotation, overwrite: bool) -> usize {
    let piece = attach(assembly, parent, offset, template, rotation, overwrite).into_piece();
    assembly.add(piece)
}

fn rotation_of(assembly: &CityAssembly<'_>, index: usize) -> Rotation {
    assembly.piece(index).template().map_or(Rotation::None, |t| t.rotation)
}

impl PieceGenerator<CityState> for CityPart {
    fn generate(&self, assembly: &mut CityAssembly<'_>, depth: u32, parent: usize, anchor: Option<BlockPos>) -> bool {
        match self {
            CityPart::HouseTower => house_tower(assembly, depth, parent, anchor.unwrap_or(BlockPos::ZERO)),
            CityPart::TowerBridge => tower_bridge(assembly, depth, parent),
            CityPart::Tower => tower(assembly, depth, parent),
            CityPart::FatTower => fat_tower(assembly, depth, parent),
        }
    }
}

fn house_tower(assembly: &mut CityAssembly<'_>, depth: u32, parent: usize, offset: BlockPos) -> bool {
    let rotation = rotation_of(assembly, parent);
    let base = add(assembly, parent, offset, "base_floor", rotation, true);
    match assembly.rng().gen_range(0..3) {
        0 => {
            add(assembly, base, BlockPos::new(-1, 4, -1), "base_roof", rotation, true);
        }
        1 => {
            let floor = add(assembly, base, BlockPos::new(-1, 0, -1), "second_floor_2", rotation, false);
            let roof = add(assembly, floor, BlockPos::new(-1, 8, -1), "second_roof", rotation, false);
            assembly.expand(&CityPart::Tower, depth + 1, roof, None);
        }
        _ => {
            let floor = add(assembly, base, BlockPos::new(-1, 0, -1), "second_floor_2", rotation, false);
            let third = add(assembly, floor, BlockPos::new(-1, 4, -1), "third_floor_2", rotation, false);
            let roof = add(assembly, third, BlockPos::new(-1, 8, -1), "third_roof", rotation, true);
            assembly.expand(&CityPart::Tower, depth + 1, roof, None);
        }
    }
    true
}

fn tower_bridge(assembly: &mut CityAssembly<'_>, depth: u32, parent: usize) -> bool {
    let rotation = rotation_of(assembly, parent);
    let length = assembly.rng().gen_range(1..=5);
    let mut piece = add(assembly, parent, BlockPos::new(0, 0, -4), "bridge_piece", rotation, true);
    let mut rise = 0;
    for _ in 0..length {
        if assembly.rng().gen_bool(0.5) {
            piece = add(assembly, piece, BlockPos::new(0, rise, -4), "bridge_piece", rotation, true);
            rise = 0;
        } else {
            piece = if assembly.rng().gen_bool(0.5) {
                add(assembly, piece, BlockPos::new(0, rise, -4), "bridge_steep_stairs", rotation, true)
            } else {
                add(assembly, piece, BlockPos::new(0, rise, -8), "bridge_gentle_stairs", rotation, true)
            };
            rise = 4;
        }
    }

    let odds = (MAX_DEPTH + 2 - depth) as i32;
    if !assembly.state.ship_placed && assembly.rng().gen_range(0..odds) == 0 {
        let x = -8 + assembly.rng().gen_range(0..8);
        let z = -70 + assembly.rng().gen_range(0..10);
        add(assembly, piece, BlockPos::new(x, rise, z), "ship", rotation, true);
        assembly.state.ship_placed = true;
    } else if !assembly.expand(&CityPart::HouseTower, depth + 1, piece, Some(BlockPos::new(-3, rise + 1, -11))) {
        return false;
    }

    add(assembly, piece, BlockPos::new(4, rise, 0), "bridge_end", rotation.rotated(Rotation::Clockwise180), true);
    true
}

fn tower(assembly: &mut CityAssembly<'_>, depth: u32, parent: usize) -> bool {
    let rotation = rotation_of(assembly, parent);
    let x = 3 + assembly.rng().gen_range(0..2);
    let z = 3 + assembly.rng().gen_range(0..2);
    let base = add(assembly, parent, BlockPos::new(x, -3, z), "tower_base", rotation, true);
    let mut piece = add(assembly, base, BlockPos::new(0, 7, 0), "tower_piece", rotation, true);
    let mut bridge_floor = (assembly.rng().gen_range(0..3) == 0).then_some(piece);

    let floors = 1 + assembly.rng().gen_range(0..3);
    for floor in 0..floors {
        piece = add(assembly, piece, BlockPos::new(0, 4, 0), "tower_piece", rotation, true);
        if floor < floors - 1 && assembly.rng().gen_bool(0.5) {
            bridge_floor = Some(piece);
        }
    }

    if let Some(floor) = bridge_floor {
        for (turn, offset) in TOWER_BRIDGES {
            if assembly.rng().gen_bool(0.5) {
                let bridge = add(assembly, floor, offset, "bridge_end", rotation.rotated(turn), true);
                assembly.expand(&CityPart::TowerBridge, depth + 1, bridge, None);
            }
        }
    } else if depth != MAX_DEPTH - 1 {
        return assembly.expand(&CityPart::FatTower, depth + 1, piece, None);
    }
    add(assembly, piece, BlockPos::new(-1, 4, -1), "tower_top", rotation, true);
    true
}

fn fat_tower(assembly: &mut CityAssembly<'_>, depth: u32, parent: usize) -> bool {
    let rotation = rotation_of(assembly, parent);
    let base = add(assembly, parent, BlockPos::new(-3, 4, -3), "fat_tower_base", rotation, true);
    let mut piece = add(assembly, base, BlockPos::new(0, 4, 0), "fat_tower_middle", rotation, true);

    let mut floors = 0;
    while floors < 2 && assembly.rng().gen_range(0..3) != 0 {
        piece = add(assembly, piece, BlockPos::new(0, 8, 0), "fat_tower_middle", rotation, true);
        for (turn, offset) in FAT_TOWER_BRIDGES {
            if assembly.rng().gen_bool(0.5) {
                let bridge = add(assembly, piece, offset, "bridge_end", rotation.rotated(turn), true);
                assembly.expand(&CityPart::TowerBridge, depth + 1, bridge, None);
            }
        }
        floors += 1;
    }
    add(assembly, piece, BlockPos::new(-2, 8, -2), "fat_tower_top", rotation, true);
    true
}

#[derive(Debug)]
pub struct EndCity {
    kind: StructureKind,
}

impl EndCity {
    pub const PLACEMENT: GridPlacement = GridPlacement::new(20, 11, 10387313);

    pub fn new() -> Self {
        Self {
            kind: StructureKind::new("minecraft:end_city"),
        }
    }
}

impl Default for EndCity {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureType for EndCity {
    fn kind(&self) -> &StructureKind {
        &self.kind
    }

    fn placement(&self) -> GridPlacement {
        Self::PLACEMENT
    }

    fn assemble(&self, ctx: &GenerationContext<'_>) -> PieceGraph {
        let mut rng = assembly_rng(ctx.seed, ctx.chunk);
        let rotation = Rotation::random(&mut rng);

        // Lowest ground under a 5x5 footprint at the chunk centre, in the rotated frame.
        let (x, z) = (ctx.chunk.min_block_x() + 7, ctx.chunk.min_block_z() + 7);
        let far = rotation.rotate_offset(BlockPos::new(5, 0, 5));
        let y = [(0, 0), (0, far.z), (far.x, 0), (far.x, far.z)]
            .into_iter()
            .map(|(dx, dz)| ctx.terrain.surface_height(x + dx, z + dz))
            .min()
            .unwrap_or(i32::MIN);
        if y < MIN_SURFACE {
            return PieceGraph::new();
        }

        // Laid out at y=0, then the finished graph is lifted onto the ground.
        let mut assembly = Assembly::new(rng, CityState::default()).with_metrics(ctx.metrics);
        let base = assembly.add_root(TemplatePiece::new("base_floor", BlockPos::new(x, 0, z), rotation, true).into_piece());
        let second = attach(&assembly, base, BlockPos::new(-1, 0, -1), "second_floor_1", rotation, false);
        let second = assembly.add_root(second.into_piece());
        let third = attach(&assembly, second, BlockPos::new(-1, 4, -1), "third_floor_1", rotation, false);
        let third = assembly.add_root(third.into_piece());
        let roof = attach(&assembly, third, BlockPos::new(-1, 8, -1), "third_roof", rotation, true);
        let roof = assembly.add_root(roof.into_piece());
        assembly.expand(&CityPart::Tower, 1, roof, None);
        let mut graph = assembly.finish();
        graph.translate(0, y, 0);
        graph
    }
}
