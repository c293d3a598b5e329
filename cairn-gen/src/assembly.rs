//! Recursive, collision-checked assembly of a piece graph.
//!
//! Generators add pieces one branch at a time. When a branch finishes, every
//! piece it added (including nested branches) is checked against the pieces
//! that existed before it started. Overlap is tolerated only with pieces that
//! carry the parent's branch id; anything else rolls the branch back.

use std::time::Instant;

use rand::Rng;

use cairn_benchmark::BenchmarkMetrics;

use crate::graph::PieceGraph;
use crate::piece::{Piece, ROOT_BRANCH};
use crate::pos::BlockPos;
use crate::random::StructureRng;

/// Deepest expansion a generator may request.
pub const MAX_DEPTH: u32 = 8;

/// Produces one branch of a structure. `S` is the per-assembly state shared by
/// every generator of the same structure.
pub trait PieceGenerator<S> {
    /// Adds candidate pieces through [`Assembly::add`]. Returning false
    /// abandons the branch.
    fn generate(&self, assembly: &mut Assembly<'_, S>, depth: u32, parent: usize, anchor: Option<BlockPos>) -> bool;
}

pub struct Assembly<'a, S> {
    graph: PieceGraph,
    rng: StructureRng,
    pub state: S,
    branch: u32,
    parent: Option<usize>,
    depth: u32,
    started: Instant,
    metrics: Option<&'a BenchmarkMetrics>,
}

impl<'a, S> Assembly<'a, S> {
    pub fn new(rng: StructureRng, state: S) -> Self {
        Self {
            graph: PieceGraph::new(),
            rng,
            state,
            branch: ROOT_BRANCH,
            parent: None,
            depth: 0,
            started: Instant::now(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<&'a BenchmarkMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn rng(&mut self) -> &mut StructureRng {
        &mut self.rng
    }

    pub fn piece(&self, index: usize) -> &Piece {
        &self.graph.pieces()[index]
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Adds a start piece. Start pieces are never collision checked.
    pub fn add_root(&mut self, mut piece: Piece) -> usize {
        piece.depth = 0;
        piece.branch = ROOT_BRANCH;
        piece.parent = None;
        self.graph.push(piece)
    }

    /// Adds a candidate piece to the branch currently being generated.
    pub fn add(&mut self, mut piece: Piece) -> usize {
        piece.depth = self.depth;
        piece.branch = self.branch;
        piece.parent = self.parent;
        self.graph.push(piece)
    }

    /// Runs `generator` as a new branch under `parent`. The branch is kept
    /// only if the generator succeeds and none of its pieces collide with an
    /// earlier piece from a different branch than the parent's.
    pub fn expand<G>(&mut self, generator: &G, depth: u32, parent: usize, anchor: Option<BlockPos>) -> bool
    where
        G: PieceGenerator<S> + ?Sized,
    {
        if depth > MAX_DEPTH {
            if let Some(metrics) = self.metrics {
                metrics.record_depth_cutoff();
            }
            return false;
        }

        let start = self.graph.len();
        let branch = self.next_branch_id();
        let saved = (self.branch, self.parent, self.depth);
        (self.branch, self.parent, self.depth) = (branch, Some(parent), depth);
        let generated = generator.generate(self, depth, parent, anchor);
        (self.branch, self.parent, self.depth) = saved;

        if !generated {
            self.graph.truncate(start);
            return false;
        }

        let parent_branch = self.graph.pieces()[parent].branch;
        let pieces = self.graph.pieces();
        let collided = pieces[start..].iter().any(|candidate| {
            pieces[..start]
                .iter()
                .any(|existing| existing.branch != parent_branch && existing.bounding_box.intersects(&candidate.bounding_box))
        });
        if collided {
            log::trace!("Rolling back branch {:08x} at depth {}", branch, depth);
            if let Some(metrics) = self.metrics {
                metrics.record_batch_rejected();
            }
            self.graph.truncate(start);
            return false;
        }

        for piece in &mut self.graph.pieces_mut()[start..] {
            piece.branch = branch;
        }
        true
    }

    fn next_branch_id(&mut self) -> u32 {
        loop {
            let id: u32 = self.rng.r#gen();
            if id != ROOT_BRANCH {
                return id;
            }
        }
    }

    pub fn finish(self) -> PieceGraph {
        if let Some(metrics) = self.metrics {
            metrics.record_assembly(self.started.elapsed(), self.graph.len());
        }
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::Rotation;
    use crate::piece::TemplatePiece;
    use crate::pos::ChunkPos;
    use crate::random::assembly_rng;

    fn block(x: i32, y: i32, z: i32) -> Piece {
        TemplatePiece::new("tower_piece", BlockPos::new(x, y, z), Rotation::None, true).into_piece()
    }

    /// Adds a piece at a fixed offset from the parent, then optionally recurses.
    struct Stack {
        step: BlockPos,
        recurse: bool,
    }

    impl PieceGenerator<u32> for Stack {
        fn generate(&self, assembly: &mut Assembly<'_, u32>, depth: u32, parent: usize, _anchor: Option<BlockPos>) -> bool {
            assembly.state += 1;
            let at = assembly.piece(parent).bounding_box.min() + self.step;
            let added = assembly.add(block(at.x, at.y, at.z));
            if self.recurse {
                assembly.expand(self, depth + 1, added, None);
            }
            true
        }
    }

    struct Refuse;

    impl PieceGenerator<u32> for Refuse {
        fn generate(&self, assembly: &mut Assembly<'_, u32>, _depth: u32, parent: usize, _anchor: Option<BlockPos>) -> bool {
            let at = assembly.piece(parent).bounding_box.min();
            assembly.add(block(at.x + 100, at.y, at.z));
            false
        }
    }

    fn assembly() -> Assembly<'static, u32> {
        Assembly::new(assembly_rng(9, ChunkPos::new(0, 0)), 0)
    }

    #[test]
    fn test_recursion_stops_past_max_depth() {
        let mut asm = assembly();
        let root = asm.add_root(block(0, 0, 0));
        let upward = Stack { step: BlockPos::new(0, 4, 0), recurse: true };
        assert!(asm.expand(&upward, 1, root, None));
        let graph = asm.finish();
        assert_eq!(graph.len(), 1 + MAX_DEPTH as usize);
        assert!(graph.pieces().iter().all(|p| p.depth <= MAX_DEPTH));
    }

    #[test]
    fn test_failed_generator_rolls_back() {
        let mut asm = assembly();
        let root = asm.add_root(block(0, 0, 0));
        assert!(!asm.expand(&Refuse, 1, root, None));
        assert_eq!(asm.len(), 1);
    }

    #[test]
    fn test_overlap_with_parent_branch_is_allowed() {
        let mut asm = assembly();
        let root = asm.add_root(block(0, 0, 0));
        // Overlaps the root by a few blocks; the root shares the parent's branch.
        let overlapping = Stack { step: BlockPos::new(2, 0, 0), recurse: false };
        assert!(asm.expand(&overlapping, 1, root, None));
        assert_eq!(asm.len(), 2);
    }

    #[test]
    fn test_overlap_with_foreign_branch_rolls_back() {
        let mut asm = assembly();
        let root = asm.add_root(block(0, 0, 0));
        let east = Stack { step: BlockPos::new(20, 0, 0), recurse: false };
        assert!(asm.expand(&east, 1, root, None));
        let east_piece = 1;

        // A second branch off the root lands on the first branch's piece.
        let onto_east = Stack { step: BlockPos::new(22, 0, 0), recurse: false };
        assert!(!asm.expand(&onto_east, 1, root, None));
        assert_eq!(asm.len(), 2);

        // Growing from the east piece itself may touch it.
        let beside = Stack { step: BlockPos::new(3, 0, 0), recurse: false };
        assert!(asm.expand(&beside, 2, east_piece, None));
        assert_eq!(asm.len(), 3);
    }

    #[test]
    fn test_nested_pieces_take_outer_branch() {
        let mut asm = assembly();
        let root = asm.add_root(block(0, 0, 0));
        let upward = Stack { step: BlockPos::new(0, 4, 0), recurse: true };
        asm.expand(&upward, 7, root, None);
        let graph = asm.finish();
        let branches: Vec<u32> = graph.pieces()[1..].iter().map(|p| p.branch).collect();
        assert_eq!(branches.len(), 2);
        assert!(branches.iter().all(|b| *b == branches[0] && *b != ROOT_BRANCH));
        assert_eq!(graph.pieces()[2].parent, Some(1));
    }

    #[test]
    fn test_state_is_shared_across_branches() {
        let mut asm = assembly();
        let root = asm.add_root(block(0, 0, 0));
        let upward = Stack { step: BlockPos::new(0, 4, 0), recurse: true };
        asm.expand(&upward, 6, root, None);
        // Depths 6, 7 and 8 each ran the generator once.
        assert_eq!(asm.state, 3);
    }
}
