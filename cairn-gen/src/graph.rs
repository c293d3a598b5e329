use std::ops::Range;
use std::sync::OnceLock;

use anyhow::Result;
use fastnbt::Value;

use crate::bounding_box::BoundingBox;
use crate::piece::Piece;

/// Ordered arena of pieces. Parent links are indices into the arena.
#[derive(Debug, Clone, Default)]
pub struct PieceGraph {
    pieces: Vec<Piece>,
    bounds: OnceLock<Option<BoundingBox>>,
}

impl PieceGraph {
    pub const fn new() -> Self {
        Self {
            pieces: Vec::new(),
            bounds: OnceLock::new(),
        }
    }

    pub fn from_pieces(pieces: Vec<Piece>) -> Self {
        Self {
            pieces,
            bounds: OnceLock::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// Mutable access drops the cached bounding box.
    pub fn pieces_mut(&mut self) -> &mut [Piece] {
        self.bounds = OnceLock::new();
        &mut self.pieces
    }

    /// Union of all piece boxes, computed once until the graph changes.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        *self
            .bounds
            .get_or_init(|| BoundingBox::encapsulating_all(self.pieces.iter().map(|p| p.bounding_box)))
    }

    /// First piece in `within` whose box intersects `bounds`.
    pub fn find_collision(&self, bounds: &BoundingBox, within: Range<usize>) -> Option<usize> {
        let end = within.end.min(self.pieces.len());
        (within.start..end).find(|&i| self.pieces[i].bounding_box.intersects(bounds))
    }

    pub fn translate(&mut self, dx: i32, dy: i32, dz: i32) {
        for piece in self.pieces_mut() {
            piece.translate(dx, dy, dz);
        }
    }

    pub(crate) fn push(&mut self, piece: Piece) -> usize {
        self.bounds = OnceLock::new();
        self.pieces.push(piece);
        self.pieces.len() - 1
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        if len < self.pieces.len() {
            self.bounds = OnceLock::new();
            self.pieces.truncate(len);
        }
    }

    pub fn to_records(&self) -> Result<Vec<Value>> {
        self.pieces.iter().map(Piece::to_record).collect()
    }

    /// Rebuilds a graph from persisted records, keeping unreadable pieces as
    /// placeholders. Parent indices are remapped past dropped records; a piece
    /// whose parent was dropped becomes a root.
    pub fn from_records(records: &[Value]) -> Self {
        let mut remap: Vec<Option<usize>> = Vec::with_capacity(records.len());
        let mut pieces = Vec::with_capacity(records.len());
        for record in records {
            match Piece::from_record_lenient(record) {
                Some(mut piece) => {
                    // Parents always precede their children.
                    piece.parent = piece
                        .parent
                        .filter(|&p| p < remap.len())
                        .and_then(|p| remap[p]);
                    remap.push(Some(pieces.len()));
                    pieces.push(piece);
                }
                None => remap.push(None),
            }
        }
        Self::from_pieces(pieces)
    }
}
