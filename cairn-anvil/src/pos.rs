use std::fmt;

/// Horizontal 16x16 column of the world, the unit of persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given block column.
    pub const fn from_block(block_x: i32, block_z: i32) -> Self {
        Self::new(block_x >> 4, block_z >> 4)
    }

    /// Packs into the 64-bit key used by persisted indexes (x in the low half).
    pub const fn as_long(self) -> i64 {
        ((self.x as u32 as u64) | ((self.z as u32 as u64) << 32)) as i64
    }

    pub const fn from_long(key: i64) -> Self {
        let key = key as u64;
        Self::new(key as u32 as i32, (key >> 32) as u32 as i32)
    }

    pub const fn min_block_x(self) -> i32 {
        self.x << 4
    }

    pub const fn min_block_z(self) -> i32 {
        self.z << 4
    }

    pub const fn max_block_x(self) -> i32 {
        self.min_block_x() + 15
    }

    pub const fn max_block_z(self) -> i32 {
        self.min_block_z() + 15
    }

    /// Coordinates of the region file holding this chunk.
    pub const fn region(self) -> (i32, i32) {
        (self.x >> 5, self.z >> 5)
    }

    /// Coordinates of this chunk inside its region file (0..32).
    pub const fn region_local(self) -> (i32, i32) {
        (self.x & 31, self.z & 31)
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let coords = [(0, 0), (1, 1), (-1, -1), (3, 4), (i32::MAX, i32::MIN), (-30_000_000, 29_999_999)];

        for (x, z) in coords {
            let pos = ChunkPos::new(x, z);
            assert_eq!(ChunkPos::from_long(pos.as_long()), pos);
        }
    }

    #[test]
    fn test_packed_layout() {
        // x in the low 32 bits, z in the high 32 bits
        assert_eq!(ChunkPos::new(3, 4).as_long(), 3 | (4 << 32));
        assert_eq!(ChunkPos::new(-1, 0).as_long(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_region_coords() {
        assert_eq!(ChunkPos::new(0, 0).region(), (0, 0));
        assert_eq!(ChunkPos::new(31, 32).region(), (0, 1));
        assert_eq!(ChunkPos::new(-1, -33).region(), (-1, -2));
        assert_eq!(ChunkPos::new(-1, -33).region_local(), (31, 31));
    }

    #[test]
    fn test_block_bounds() {
        let pos = ChunkPos::from_block(-1, 17);
        assert_eq!(pos, ChunkPos::new(-1, 1));
        assert_eq!(pos.min_block_x(), -16);
        assert_eq!(pos.max_block_x(), -1);
        assert_eq!(pos.min_block_z(), 16);
        assert_eq!(pos.max_block_z(), 31);
    }
}
