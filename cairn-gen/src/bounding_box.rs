//! Axis-aligned integer boxes with inclusive bounds.

use fastnbt::IntArray;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::orientation::Direction;
use crate::pos::{BlockPos, ChunkPos};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    min_x: i32,
    min_y: i32,
    min_z: i32,
    max_x: i32,
    max_y: i32,
    max_z: i32,
}

impl BoundingBox {
    /// Builds a box from explicit bounds. Inverted bounds are reported and
    /// swapped per axis (or rejected outright with the `strict` feature).
    pub fn new(min_x: i32, min_y: i32, min_z: i32, max_x: i32, max_y: i32, max_z: i32) -> Self {
        if min_x > max_x || min_y > max_y || min_z > max_z {
            let message = format!(
                "Invalid bounding box data, inverted bounds: min ({}, {}, {}) max ({}, {}, {})",
                min_x, min_y, min_z, max_x, max_y, max_z
            );
            if cfg!(feature = "strict") {
                panic!("{}", message);
            }
            log::warn!("{}", message);
        }
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            min_z: min_z.min(max_z),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
            max_z: min_z.max(max_z),
        }
    }

    /// Smallest box containing both corners, in any order.
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min_x: a.x.min(b.x),
            min_y: a.y.min(b.y),
            min_z: a.z.min(b.z),
            max_x: a.x.max(b.x),
            max_y: a.y.max(b.y),
            max_z: a.z.max(b.z),
        }
    }

    /// Box with its origin corner at `origin`, laid out along `facing`:
    /// `width` runs across the facing axis, `depth` along it.
    pub fn sized(origin: BlockPos, width: i32, height: i32, depth: i32, facing: Direction) -> Self {
        let (span_x, span_z) = if facing.is_z_axis() { (width, depth) } else { (depth, width) };
        Self::from_corners(origin, origin.offset(span_x - 1, height - 1, span_z - 1))
    }

    /// The full vertical column of a chunk.
    pub fn for_chunk(chunk: ChunkPos, min_y: i32, max_y: i32) -> Self {
        Self::new(chunk.min_block_x(), min_y, chunk.min_block_z(), chunk.max_block_x(), max_y, chunk.max_block_z())
    }

    /// Smallest box containing every input, `None` for an empty input.
    pub fn encapsulating_all<I>(boxes: I) -> Option<Self>
    where
        I: IntoIterator<Item = BoundingBox>,
    {
        boxes.into_iter().reduce(|acc, b| acc.encapsulating(&b))
    }

    pub fn encapsulating(&self, other: &BoundingBox) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            min_z: self.min_z.min(other.min_z),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
            max_z: self.max_z.max(other.max_z),
        }
    }

    /// Inclusive overlap test; boxes sharing a face intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.max_x >= other.min_x
            && self.min_x <= other.max_x
            && self.max_z >= other.min_z
            && self.min_z <= other.max_z
            && self.max_y >= other.min_y
            && self.min_y <= other.max_y
    }

    pub fn intersects_xz(&self, min_x: i32, min_z: i32, max_x: i32, max_z: i32) -> bool {
        self.max_x >= min_x && self.min_x <= max_x && self.max_z >= min_z && self.min_z <= max_z
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        Some(Self {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            min_z: self.min_z.max(other.min_z),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
            max_z: self.max_z.min(other.max_z),
        })
    }

    /// Grows every face by `amount` (shrinks for negative amounts).
    pub fn inflated_by(&self, amount: i32) -> Self {
        Self::new(
            self.min_x - amount,
            self.min_y - amount,
            self.min_z - amount,
            self.max_x + amount,
            self.max_y + amount,
            self.max_z + amount,
        )
    }

    pub fn moved(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            min_z: self.min_z + dz,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
            max_z: self.max_z + dz,
        }
    }

    pub fn is_inside(&self, pos: BlockPos) -> bool {
        pos.x >= self.min_x
            && pos.x <= self.max_x
            && pos.z >= self.min_z
            && pos.z <= self.max_z
            && pos.y >= self.min_y
            && pos.y <= self.max_y
    }

    pub fn span_x(&self) -> i32 {
        self.max_x - self.min_x + 1
    }

    pub fn span_y(&self) -> i32 {
        self.max_y - self.min_y + 1
    }

    pub fn span_z(&self) -> i32 {
        self.max_z - self.min_z + 1
    }

    pub fn center(&self) -> BlockPos {
        BlockPos::new(
            self.min_x + (self.max_x - self.min_x + 1) / 2,
            self.min_y + (self.max_y - self.min_y + 1) / 2,
            self.min_z + (self.max_z - self.min_z + 1) / 2,
        )
    }

    pub fn corners(&self) -> [BlockPos; 8] {
        let (a, b) = (self.min(), self.max());
        [
            BlockPos::new(a.x, a.y, a.z),
            BlockPos::new(a.x, a.y, b.z),
            BlockPos::new(a.x, b.y, a.z),
            BlockPos::new(a.x, b.y, b.z),
            BlockPos::new(b.x, a.y, a.z),
            BlockPos::new(b.x, a.y, b.z),
            BlockPos::new(b.x, b.y, a.z),
            BlockPos::new(b.x, b.y, b.z),
        ]
    }

    pub fn min(&self) -> BlockPos {
        BlockPos::new(self.min_x, self.min_y, self.min_z)
    }

    pub fn max(&self) -> BlockPos {
        BlockPos::new(self.max_x, self.max_y, self.max_z)
    }

    pub fn min_x(&self) -> i32 {
        self.min_x
    }

    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    pub fn min_z(&self) -> i32 {
        self.min_z
    }

    pub fn max_x(&self) -> i32 {
        self.max_x
    }

    pub fn max_y(&self) -> i32 {
        self.max_y
    }

    pub fn max_z(&self) -> i32 {
        self.max_z
    }

    /// Every position inside the box, x fastest.
    pub fn positions(&self) -> impl Iterator<Item = BlockPos> + '_ {
        (self.min_y..=self.max_y).flat_map(move |y| {
            (self.min_z..=self.max_z).flat_map(move |z| (self.min_x..=self.max_x).map(move |x| BlockPos::new(x, y, z)))
        })
    }

    /// Chunks whose columns the box touches.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        let (min, max) = (self.min().chunk(), self.max().chunk());
        (min.z..=max.z).flat_map(move |z| (min.x..=max.x).map(move |x| ChunkPos::new(x, z)))
    }

    pub fn to_array(&self) -> [i32; 6] {
        [self.min_x, self.min_y, self.min_z, self.max_x, self.max_y, self.max_z]
    }
}

/// Persisted as a six element int array: min x, y, z then max x, y, z.
impl Serialize for BoundingBox {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        IntArray::new(self.to_array().to_vec()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BoundingBox {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = IntArray::deserialize(deserializer)?;
        match values[..] {
            [min_x, min_y, min_z, max_x, max_y, max_z] => Ok(Self::new(min_x, min_y, min_z, max_x, max_y, max_z)),
            _ => Err(D::Error::custom(format!("bounding box needs 6 ints, got {}", values.len()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_contact_intersects() {
        let a = BoundingBox::new(0, 0, 0, 4, 4, 4);
        let b = BoundingBox::new(4, 0, 0, 8, 4, 4);
        let c = BoundingBox::new(5, 0, 0, 8, 4, 4);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[cfg(not(feature = "strict"))]
    #[test]
    fn test_inverted_bounds_normalized() {
        let b = BoundingBox::new(5, 9, 2, 1, 3, 8);
        assert_eq!(b.to_array(), [1, 3, 2, 5, 9, 8]);
    }

    #[cfg(feature = "strict")]
    #[test]
    #[should_panic]
    fn test_inverted_bounds_rejected_in_strict_mode() {
        BoundingBox::new(5, 0, 0, 1, 0, 0);
    }

    #[test]
    fn test_encapsulating_all() {
        assert_eq!(BoundingBox::encapsulating_all(Vec::new()), None);
        let merged = BoundingBox::encapsulating_all([
            BoundingBox::new(0, 0, 0, 1, 1, 1),
            BoundingBox::new(-3, 5, 2, -1, 6, 3),
        ])
        .unwrap();
        assert_eq!(merged.to_array(), [-3, 0, 0, 1, 6, 3]);
    }

    #[test]
    fn test_spans_center_and_corners() {
        let b = BoundingBox::new(0, 10, 0, 20, 24, 20);
        assert_eq!((b.span_x(), b.span_y(), b.span_z()), (21, 15, 21));
        assert_eq!(b.center(), BlockPos::new(10, 17, 10));
        let corners = b.corners();
        assert!(corners.iter().all(|c| b.is_inside(*c)));
        assert!(corners.contains(&BlockPos::new(20, 10, 0)));
    }

    #[test]
    fn test_inflate_and_move() {
        let b = BoundingBox::new(0, 0, 0, 2, 2, 2);
        assert_eq!(b.inflated_by(1).to_array(), [-1, -1, -1, 3, 3, 3]);
        assert_eq!(b.moved(1, -2, 3).to_array(), [1, -2, 3, 3, 0, 5]);
    }

    #[test]
    fn test_intersection_and_chunks() {
        let b = BoundingBox::new(-4, 0, 10, 20, 5, 40);
        let clip = b.intersection(&BoundingBox::for_chunk(ChunkPos::new(0, 1), -64, 319)).unwrap();
        assert_eq!(clip.to_array(), [0, 0, 16, 15, 5, 31]);
        let chunks: Vec<_> = b.chunks().collect();
        assert_eq!(chunks.len(), 2 * 3);
        assert!(chunks.contains(&ChunkPos::new(-1, 0)));
        assert!(chunks.contains(&ChunkPos::new(1, 2)));
    }

    #[test]
    fn test_sized_follows_facing_axis() {
        let origin = BlockPos::new(0, 64, 0);
        let north = BoundingBox::sized(origin, 5, 3, 9, Direction::North);
        let east = BoundingBox::sized(origin, 5, 3, 9, Direction::East);
        assert_eq!((north.span_x(), north.span_z()), (5, 9));
        assert_eq!((east.span_x(), east.span_z()), (9, 5));
    }

    #[test]
    fn test_positions_count() {
        let b = BoundingBox::new(0, 0, 0, 1, 2, 3);
        assert_eq!(b.positions().count(), 2 * 3 * 4);
    }

    #[test]
    fn test_nbt_int_array() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            #[serde(rename = "BB")]
            bb: BoundingBox,
        }
        let bytes = fastnbt::to_bytes(&Holder { bb: BoundingBox::new(-1, 2, -3, 4, 5, 6) }).unwrap();
        let decoded: Holder = fastnbt::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.bb.to_array(), [-1, 2, -3, 4, 5, 6]);

        let raw: fastnbt::Value = fastnbt::from_bytes(&bytes).unwrap();
        let fastnbt::Value::Compound(map) = raw else { panic!("expected compound") };
        assert!(matches!(map.get("BB"), Some(fastnbt::Value::IntArray(_))));
    }
}
