use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;

use cairn_anvil::StartRecord;
use cairn_anvil::builder::{MAX_Y, MIN_Y};

use crate::bounding_box::BoundingBox;
use crate::graph::PieceGraph;
use crate::pos::ChunkPos;
use crate::random::placement_rng;
use crate::structure::{GenerationContext, StructureKind, StructureType};
use crate::world::WorldAccess;

/// One generated instance of a structure, rooted in a chunk.
///
/// A start without pieces is invalid: it records that the structure was
/// considered for the chunk and produced nothing, and persists as `INVALID`.
#[derive(Debug)]
pub struct StructureStart {
    kind: StructureKind,
    chunk: ChunkPos,
    references: AtomicU32,
    max_references: u32,
    graph: PieceGraph,
}

impl StructureStart {
    pub fn new(kind: StructureKind, chunk: ChunkPos, graph: PieceGraph, max_references: u32) -> Self {
        Self {
            kind,
            chunk,
            references: AtomicU32::new(0),
            max_references,
            graph,
        }
    }

    pub fn invalid(kind: StructureKind, chunk: ChunkPos) -> Self {
        Self::new(kind, chunk, PieceGraph::new(), 0)
    }

    pub fn generate(structure: &dyn StructureType, ctx: &GenerationContext<'_>) -> Self {
        let graph = structure.assemble(ctx);
        if graph.is_empty() {
            log::debug!("No {} start fits in chunk {}", structure.kind(), ctx.chunk);
            return Self::invalid(structure.kind().clone(), ctx.chunk);
        }
        log::debug!("Assembled {} at {} with {} pieces", structure.kind(), ctx.chunk, graph.len());
        Self::new(structure.kind().clone(), ctx.chunk, graph, structure.max_references())
    }

    /// Rebuilds a persisted start. A record whose pieces all fail to decode
    /// yields an invalid start.
    pub fn load(structure: &dyn StructureType, chunk: ChunkPos, record: &StartRecord) -> Self {
        if record.is_invalid() {
            return Self::invalid(structure.kind().clone(), chunk);
        }
        let graph = PieceGraph::from_records(&record.children);
        if graph.is_empty() {
            log::warn!("Start {} at {} has no readable pieces, treating it as invalid", structure.kind(), chunk);
            return Self::invalid(structure.kind().clone(), chunk);
        }
        let start = Self::new(structure.kind().clone(), chunk, graph, structure.max_references());
        start.references.store(record.references.max(0) as u32, Ordering::Relaxed);
        start
    }

    pub fn to_record(&self) -> Result<StartRecord> {
        if !self.is_valid() {
            return Ok(StartRecord::invalid());
        }
        Ok(StartRecord {
            id: self.kind.to_string(),
            chunk_x: self.chunk.x,
            chunk_z: self.chunk.z,
            references: self.references() as i32,
            children: self.graph.to_records()?,
        })
    }

    pub fn is_valid(&self) -> bool {
        !self.graph.is_empty()
    }

    pub fn kind(&self) -> &StructureKind {
        &self.kind
    }

    pub fn chunk(&self) -> ChunkPos {
        self.chunk
    }

    pub fn pieces(&self) -> &PieceGraph {
        &self.graph
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.graph.bounding_box()
    }

    pub fn references(&self) -> u32 {
        self.references.load(Ordering::Relaxed)
    }

    pub fn add_reference(&self) {
        self.references.fetch_add(1, Ordering::Relaxed);
    }

    pub fn can_be_referenced(&self) -> bool {
        self.references() < self.max_references
    }

    /// Writes the pieces overlapping `chunk`, then runs the structure's
    /// post-placement hook. Returns false if nothing overlapped.
    pub fn place_in_chunk(
        &mut self,
        structure: &dyn StructureType,
        world: &mut dyn WorldAccess,
        seed: u64,
        chunk: ChunkPos,
    ) -> bool {
        let region = BoundingBox::for_chunk(chunk, MIN_Y, MAX_Y);
        match self.bounding_box() {
            Some(bounds) if bounds.intersects(&region) => {}
            _ => return false,
        }

        let mut rng = placement_rng(seed, chunk);
        let mut placed = false;
        for piece in self.graph.pieces_mut() {
            if piece.bounding_box.intersects(&region) {
                placed |= piece.place(world, &mut rng, &region);
            }
        }
        structure.after_place(world, &mut rng, &region, &self.graph);
        placed
    }
}
