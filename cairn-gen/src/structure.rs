use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cairn_benchmark::BenchmarkMetrics;

use crate::bounding_box::BoundingBox;
use crate::graph::PieceGraph;
use crate::kinds::{DesertPyramid, EndCity};
use crate::placement::GridPlacement;
use crate::pos::ChunkPos;
use crate::random::StructureRng;
use crate::world::{TerrainHeight, WorldAccess};

/// Namespaced structure type id, e.g. `minecraft:end_city`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureKind(Arc<str>);

impl StructureKind {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inputs for generating the start rooted in one chunk.
pub struct GenerationContext<'a> {
    pub seed: u64,
    pub chunk: ChunkPos,
    pub terrain: &'a dyn TerrainHeight,
    pub metrics: Option<&'a BenchmarkMetrics>,
}

/// A structure type: knows how to assemble a start and how to finish one
/// off after its pieces are written into a chunk.
pub trait StructureType: Send + Sync {
    fn kind(&self) -> &StructureKind;

    /// Which chunks may root a start of this type.
    fn placement(&self) -> GridPlacement;

    /// How many chunks may record a reference to one start.
    fn max_references(&self) -> u32 {
        1
    }

    /// Assembles the pieces of a start. An empty graph means nothing could be
    /// placed here.
    fn assemble(&self, ctx: &GenerationContext<'_>) -> PieceGraph;

    /// Runs after the start's pieces are written into `region`.
    fn after_place(&self, _world: &mut dyn WorldAccess, _rng: &mut StructureRng, _region: &BoundingBox, _pieces: &PieceGraph) {}
}

#[derive(Clone, Default)]
pub struct StructureRegistry {
    types: HashMap<StructureKind, Arc<dyn StructureType>>,
}

impl StructureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every structure type shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DesertPyramid::new()));
        registry.register(Arc::new(EndCity::new()));
        registry
    }

    pub fn register(&mut self, structure: Arc<dyn StructureType>) {
        self.types.insert(structure.kind().clone(), structure);
    }

    pub fn get(&self, kind: &StructureKind) -> Option<&Arc<dyn StructureType>> {
        self.types.get(kind)
    }

    /// Resolves a persisted id. Ids without a namespace get `minecraft:`.
    pub fn resolve(&self, id: &str) -> Option<StructureKind> {
        let key = if id.contains(':') {
            StructureKind::new(id)
        } else {
            StructureKind::new(&format!("minecraft:{}", id.to_ascii_lowercase()))
        };
        self.types.contains_key(&key).then_some(key)
    }

    /// Registered kinds in a stable order.
    pub fn kinds(&self) -> Vec<StructureKind> {
        let mut kinds: Vec<_> = self.types.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for StructureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}
