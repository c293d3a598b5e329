//! Discrete rotations for prefabs and facing directions for pieces.

use rand::Rng;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::pos::BlockPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    CounterClockwise90,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [
        Rotation::None,
        Rotation::Clockwise90,
        Rotation::Clockwise180,
        Rotation::CounterClockwise90,
    ];

    fn quarter_turns(self) -> usize {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 1,
            Rotation::Clockwise180 => 2,
            Rotation::CounterClockwise90 => 3,
        }
    }

    /// Composition of two rotations.
    pub fn rotated(self, other: Rotation) -> Rotation {
        Self::ALL[(self.quarter_turns() + other.quarter_turns()) % 4]
    }

    pub fn inverse(self) -> Rotation {
        Self::ALL[(4 - self.quarter_turns()) % 4]
    }

    /// Rotates a template-relative offset about the template origin.
    pub fn rotate_offset(self, pos: BlockPos) -> BlockPos {
        match self {
            Rotation::None => pos,
            Rotation::Clockwise90 => BlockPos::new(-pos.z, pos.y, pos.x),
            Rotation::Clockwise180 => BlockPos::new(-pos.x, pos.y, -pos.z),
            Rotation::CounterClockwise90 => BlockPos::new(pos.z, pos.y, -pos.x),
        }
    }

    pub fn rotate_direction(self, direction: Direction) -> Direction {
        if !direction.is_horizontal() {
            return direction;
        }
        (0..self.quarter_turns()).fold(direction, |d, _| d.clockwise())
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Rotation {
        Self::ALL[rng.gen_range(0..4)]
    }

    pub fn name(self) -> &'static str {
        match self {
            Rotation::None => "NONE",
            Rotation::Clockwise90 => "CLOCKWISE_90",
            Rotation::Clockwise180 => "CLOCKWISE_180",
            Rotation::CounterClockwise90 => "COUNTERCLOCKWISE_90",
        }
    }

    pub fn from_name(name: &str) -> Option<Rotation> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }
}

impl Serialize for Rotation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Rotation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Rotation::from_name(&name).ok_or_else(|| D::Error::custom(format!("unknown rotation {}", name)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl Direction {
    pub const HORIZONTAL: [Direction; 4] = [Direction::South, Direction::West, Direction::North, Direction::East];

    pub fn is_horizontal(self) -> bool {
        !matches!(self, Direction::Up | Direction::Down)
    }

    pub fn clockwise(self) -> Direction {
        match self {
            Direction::North => Direction::East,
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
            other => other,
        }
    }

    /// True when the direction runs along the Z axis.
    pub fn is_z_axis(self) -> bool {
        matches!(self, Direction::North | Direction::South)
    }

    /// Persisted orientation value: south=0, west=1, north=2, east=3.
    pub fn data_2d(self) -> Option<i32> {
        Self::HORIZONTAL.iter().position(|d| *d == self).map(|i| i as i32)
    }

    pub fn from_data_2d(value: i32) -> Option<Direction> {
        usize::try_from(value).ok().and_then(|i| Self::HORIZONTAL.get(i).copied())
    }

    pub fn random_horizontal<R: Rng + ?Sized>(rng: &mut R) -> Direction {
        Self::HORIZONTAL[rng.gen_range(0..4)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_composition() {
        assert_eq!(Rotation::Clockwise90.rotated(Rotation::Clockwise90), Rotation::Clockwise180);
        assert_eq!(Rotation::CounterClockwise90.rotated(Rotation::Clockwise90), Rotation::None);
        assert_eq!(Rotation::Clockwise180.rotated(Rotation::Clockwise180), Rotation::None);
        for rotation in Rotation::ALL {
            assert_eq!(rotation.rotated(rotation.inverse()), Rotation::None);
        }
    }

    #[test]
    fn test_rotate_offset_full_turn() {
        let p = BlockPos::new(3, 5, -7);
        let turned = (0..4).fold(p, |acc, _| Rotation::Clockwise90.rotate_offset(acc));
        assert_eq!(turned, p);
        assert_eq!(Rotation::Clockwise90.rotate_offset(BlockPos::new(1, 0, 0)), BlockPos::new(0, 0, 1));
    }

    #[test]
    fn test_rotate_direction() {
        assert_eq!(Rotation::Clockwise90.rotate_direction(Direction::North), Direction::East);
        assert_eq!(Rotation::Clockwise180.rotate_direction(Direction::West), Direction::East);
        assert_eq!(Rotation::CounterClockwise90.rotate_direction(Direction::Up), Direction::Up);
    }

    #[test]
    fn test_names_round_trip() {
        for rotation in Rotation::ALL {
            assert_eq!(Rotation::from_name(rotation.name()), Some(rotation));
        }
        assert_eq!(Rotation::from_name("SIDEWAYS"), None);
    }

    #[test]
    fn test_data_2d() {
        for d in Direction::HORIZONTAL {
            assert_eq!(Direction::from_data_2d(d.data_2d().unwrap()), Some(d));
        }
        assert_eq!(Direction::Up.data_2d(), None);
        assert_eq!(Direction::from_data_2d(7), None);
    }
}
