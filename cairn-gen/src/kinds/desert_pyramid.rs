use crate::assembly::Assembly;
use crate::bounding_box::BoundingBox;
use crate::graph::PieceGraph;
use crate::piece::{DesertPyramidPiece, PieceKind};
use crate::placement::GridPlacement;
use crate::pos::BlockPos;
use crate::random::{StructureRng, assembly_rng};
use crate::structure::{GenerationContext, StructureKind, StructureType};
use crate::world::WorldAccess;

/// Single-piece structure that settles onto the terrain of the first chunk
/// it is placed in.
#[derive(Debug)]
pub struct DesertPyramid {
    kind: StructureKind,
}

impl DesertPyramid {
    pub const PLACEMENT: GridPlacement = GridPlacement::new(32, 8, 14357617);

    pub fn new() -> Self {
        Self {
            kind: StructureKind::new("minecraft:desert_pyramid"),
        }
    }
}

impl Default for DesertPyramid {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureType for DesertPyramid {
    fn kind(&self) -> &StructureKind {
        &self.kind
    }

    fn placement(&self) -> GridPlacement {
        Self::PLACEMENT
    }

    fn assemble(&self, ctx: &GenerationContext<'_>) -> PieceGraph {
        let mut rng = assembly_rng(ctx.seed, ctx.chunk);
        let (x, z) = (ctx.chunk.min_block_x(), ctx.chunk.min_block_z());
        let y = ctx.terrain.surface_height(x + DesertPyramidPiece::WIDTH / 2, z + DesertPyramidPiece::DEPTH / 2);
        let piece = DesertPyramidPiece::create(&mut rng, x, y, z);

        let mut assembly = Assembly::new(rng, ()).with_metrics(ctx.metrics);
        assembly.add_root(piece);
        assembly.finish()
    }

    /// Fills sandstone under the floor down to the ground so the pyramid
    /// never hangs over lower terrain.
    fn after_place(&self, world: &mut dyn WorldAccess, _rng: &mut StructureRng, region: &BoundingBox, pieces: &PieceGraph) {
        for piece in pieces.pieces() {
            let PieceKind::DesertPyramid(pyramid) = &piece.kind else {
                continue;
            };
            if !pyramid.is_settled() {
                continue;
            }
            let Some(clip) = piece.bounding_box.intersection(region) else {
                continue;
            };
            let floor = piece.bounding_box.min_y();
            for z in clip.min_z()..=clip.max_z() {
                for x in clip.min_x()..=clip.max_x() {
                    let ground = world.surface_height(x, z).max(region.min_y());
                    for y in ground..floor {
                        world.set_block(BlockPos::new(x, y, z), "minecraft:sandstone");
                    }
                }
            }
        }
    }
}
