//! Where starts may be rooted: the world is cut into square cells of
//! `spacing` chunks and each cell gets one seeded candidate chunk.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::pos::ChunkPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPlacement {
    /// Cell edge length in chunks.
    pub spacing: i32,
    /// Minimum gap between candidates of neighbouring cells, in chunks.
    pub separation: i32,
    pub salt: u64,
}

impl GridPlacement {
    pub const fn new(spacing: i32, separation: i32, salt: u64) -> Self {
        Self { spacing, separation, salt }
    }

    pub fn cell_of(&self, chunk: ChunkPos) -> (i32, i32) {
        (chunk.x.div_euclid(self.spacing), chunk.z.div_euclid(self.spacing))
    }

    /// Candidate chunk of a cell. Offsets stay within `spacing - separation`
    /// so candidates of adjacent cells keep at least `separation` apart.
    pub fn candidate(&self, seed: u64, cell: (i32, i32)) -> ChunkPos {
        let key = ChunkPos::new(cell.0, cell.1).as_long() as u64;
        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ self.salt.rotate_left(17) ^ key.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let range = (self.spacing - self.separation).max(1);
        ChunkPos::new(
            cell.0 * self.spacing + rng.gen_range(0..range),
            cell.1 * self.spacing + rng.gen_range(0..range),
        )
    }

    pub fn is_start_chunk(&self, seed: u64, chunk: ChunkPos) -> bool {
        self.candidate(seed, self.cell_of(chunk)) == chunk
    }

    /// Candidate of the cell containing `chunk`.
    pub fn nearest_candidate(&self, seed: u64, chunk: ChunkPos) -> ChunkPos {
        self.candidate(seed, self.cell_of(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRID: GridPlacement = GridPlacement::new(20, 11, 10387313);

    #[test]
    fn test_one_candidate_per_cell() {
        for cell in [(0, 0), (-1, 3), (7, -7)] {
            let candidate = GRID.candidate(99, cell);
            assert_eq!(GRID.cell_of(candidate), cell);
            assert!(GRID.is_start_chunk(99, candidate));

            let others = (0..20)
                .flat_map(|dx| (0..20).map(move |dz| ChunkPos::new(cell.0 * 20 + dx, cell.1 * 20 + dz)))
                .filter(|c| GRID.is_start_chunk(99, *c))
                .count();
            assert_eq!(others, 1);
        }
    }

    #[test]
    fn test_neighbouring_candidates_are_separated() {
        for cx in -3..3 {
            let a = GRID.candidate(5, (cx, 0));
            let b = GRID.candidate(5, (cx + 1, 0));
            assert!(b.x - a.x >= GRID.separation);
        }
    }
}
