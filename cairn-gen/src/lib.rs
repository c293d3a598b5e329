//! Multi-piece structure generation: bounding boxes, pieces, branch-checked
//! assembly, structure starts and the built-in structure kinds.

pub mod assembly;
pub mod bounding_box;
pub mod graph;
pub mod kinds;
pub mod orientation;
pub mod piece;
pub mod placement;
pub mod pos;
pub mod prefab;
pub mod random;
pub mod start;
pub mod structure;
pub mod terrain;
pub mod world;

pub use assembly::{Assembly, MAX_DEPTH, PieceGenerator};
pub use bounding_box::BoundingBox;
pub use graph::PieceGraph;
pub use piece::{Piece, PieceKind};
pub use placement::GridPlacement;
pub use pos::{BlockPos, ChunkPos};
pub use start::StructureStart;
pub use structure::{GenerationContext, StructureKind, StructureRegistry, StructureType};
pub use terrain::{FlatGenerator, WorldGenerator};
pub use world::{TerrainHeight, WorldAccess};
