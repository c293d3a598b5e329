//! Structure pieces: one placeable unit with a box, a kind-specific payload
//! and its position in the assembly tree.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use fastnbt::{IntArray, Value};
use rand::Rng;
use serde::{Deserialize, Serialize};

use cairn_anvil::builder::AIR;

use crate::bounding_box::BoundingBox;
use crate::orientation::{Direction, Rotation};
use crate::pos::BlockPos;
use crate::prefab;
use crate::random::StructureRng;
use crate::world::WorldAccess;

pub const END_CITY_PIECE_ID: &str = "ECP";
pub const DESERT_PYRAMID_PIECE_ID: &str = "TeDP";

pub const END_CITY_LOOT: &str = "minecraft:chests/end_city_treasure";
pub const DESERT_PYRAMID_LOOT: &str = "minecraft:chests/desert_pyramid";

/// Branch id of pieces added outside any branch (start pieces).
pub const ROOT_BRANCH: u32 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub kind: PieceKind,
    pub bounding_box: BoundingBox,
    pub orientation: Option<Direction>,
    /// Expansion depth that produced the piece, 0 for start pieces.
    pub depth: u32,
    /// Collision tag shared by every piece committed in the same branch.
    pub branch: u32,
    /// Index of the piece this one was attached to.
    pub parent: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PieceKind {
    EndCity(TemplatePiece),
    DesertPyramid(DesertPyramidPiece),
    /// Stand-in for a persisted piece that could not be decoded. Keeps its box
    /// so references stay stable, places nothing.
    Empty { id: String },
}

impl PieceKind {
    pub fn id(&self) -> &str {
        match self {
            PieceKind::EndCity(_) => END_CITY_PIECE_ID,
            PieceKind::DesertPyramid(_) => DESERT_PYRAMID_PIECE_ID,
            PieceKind::Empty { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct PieceHeader {
    id: String,
    #[serde(rename = "GD", default)]
    depth: i32,
    #[serde(rename = "O", default)]
    orientation: Option<i32>,
    #[serde(rename = "BB")]
    bounding_box: BoundingBox,
    #[serde(rename = "Branch", default)]
    branch: i32,
    #[serde(rename = "Parent", default)]
    parent: Option<i32>,
}

impl PieceHeader {
    fn into_piece(self, kind: PieceKind) -> Piece {
        Piece {
            kind,
            bounding_box: self.bounding_box,
            orientation: self.orientation.and_then(Direction::from_data_2d),
            depth: self.depth.max(0) as u32,
            branch: self.branch as u32,
            parent: self.parent.and_then(|p| usize::try_from(p).ok()),
        }
    }
}

impl Piece {
    pub fn new(kind: PieceKind, bounding_box: BoundingBox, orientation: Option<Direction>) -> Self {
        Self {
            kind,
            bounding_box,
            orientation,
            depth: 0,
            branch: ROOT_BRANCH,
            parent: None,
        }
    }

    pub fn template(&self) -> Option<&TemplatePiece> {
        match &self.kind {
            PieceKind::EndCity(template) => Some(template),
            _ => None,
        }
    }

    pub fn translate(&mut self, dx: i32, dy: i32, dz: i32) {
        self.bounding_box = self.bounding_box.moved(dx, dy, dz);
        if let PieceKind::EndCity(template) = &mut self.kind {
            template.x += dx;
            template.y += dy;
            template.z += dz;
        }
    }

    /// Writes the part of the piece inside `region`. Returns false when
    /// nothing could be placed.
    pub fn place(&mut self, world: &mut dyn WorldAccess, rng: &mut StructureRng, region: &BoundingBox) -> bool {
        match &mut self.kind {
            PieceKind::EndCity(template) => template.place(world, region),
            PieceKind::DesertPyramid(pyramid) => pyramid.place(&mut self.bounding_box, world, rng, region),
            PieceKind::Empty { .. } => false,
        }
    }

    pub fn to_record(&self) -> Result<Value> {
        let payload = match &self.kind {
            PieceKind::EndCity(template) => fastnbt::to_value(template)?,
            PieceKind::DesertPyramid(pyramid) => fastnbt::to_value(pyramid)?,
            PieceKind::Empty { .. } => Value::Compound(HashMap::new()),
        };
        let Value::Compound(mut record) = payload else {
            bail!("Piece payload for {} is not a compound", self.kind.id());
        };
        record.insert("id".to_string(), Value::String(self.kind.id().to_string()));
        record.insert("GD".to_string(), Value::Int(self.depth as i32));
        record.insert(
            "O".to_string(),
            Value::Int(self.orientation.and_then(Direction::data_2d).unwrap_or(-1)),
        );
        record.insert(
            "BB".to_string(),
            Value::IntArray(IntArray::new(self.bounding_box.to_array().to_vec())),
        );
        record.insert("Branch".to_string(), Value::Int(self.branch as i32));
        if let Some(parent) = self.parent {
            record.insert("Parent".to_string(), Value::Int(parent as i32));
        }
        Ok(Value::Compound(record))
    }

    pub fn from_record(record: &Value) -> Result<Piece> {
        let header: PieceHeader = fastnbt::from_value(record).context("Malformed piece header")?;
        let kind = match header.id.as_str() {
            END_CITY_PIECE_ID => PieceKind::EndCity(fastnbt::from_value(record).context("Malformed end city piece")?),
            DESERT_PYRAMID_PIECE_ID => {
                PieceKind::DesertPyramid(fastnbt::from_value(record).context("Malformed desert pyramid piece")?)
            }
            other => bail!("Unknown piece type {}", other),
        };
        Ok(header.into_piece(kind))
    }

    /// Like [`Piece::from_record`] but degrades to an [`PieceKind::Empty`]
    /// placeholder. Records without a readable header are dropped.
    pub fn from_record_lenient(record: &Value) -> Option<Piece> {
        match Self::from_record(record) {
            Ok(piece) => Some(piece),
            Err(e) => {
                log::warn!("Replacing unreadable structure piece with a placeholder: {:#}", e);
                let header: PieceHeader = fastnbt::from_value(record).ok()?;
                let id = header.id.clone();
                Some(header.into_piece(PieceKind::Empty { id }))
            }
        }
    }
}

/// A rotated prefab anchored at `origin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePiece {
    #[serde(rename = "Template")]
    pub template: String,
    #[serde(rename = "TX")]
    x: i32,
    #[serde(rename = "TY")]
    y: i32,
    #[serde(rename = "TZ")]
    z: i32,
    #[serde(rename = "Rot")]
    pub rotation: Rotation,
    #[serde(rename = "OW", default)]
    pub overwrite: bool,
}

impl TemplatePiece {
    pub fn new(template: &str, origin: BlockPos, rotation: Rotation, overwrite: bool) -> Self {
        Self {
            template: template.to_string(),
            x: origin.x,
            y: origin.y,
            z: origin.z,
            rotation,
            overwrite,
        }
    }

    pub fn origin(&self) -> BlockPos {
        BlockPos::new(self.x, self.y, self.z)
    }

    pub fn world_pos(&self, local: BlockPos) -> BlockPos {
        self.origin() + self.rotation.rotate_offset(local)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let size = prefab::lookup(&self.template).map_or(BlockPos::new(1, 1, 1), |p| p.size);
        BoundingBox::from_corners(self.world_pos(BlockPos::ZERO), self.world_pos(size.offset(-1, -1, -1)))
    }

    pub fn into_piece(self) -> Piece {
        let bounding_box = self.bounding_box();
        Piece::new(PieceKind::EndCity(self), bounding_box, None)
    }

    fn place(&self, world: &mut dyn WorldAccess, region: &BoundingBox) -> bool {
        let Some(prefab) = prefab::lookup(&self.template) else {
            log::warn!("Skipping piece with unknown template {}", self.template);
            return false;
        };
        let Some(clip) = self.bounding_box().intersection(region) else {
            return false;
        };

        let origin = self.origin();
        let inverse = self.rotation.inverse();
        for pos in clip.positions() {
            let local = inverse.rotate_offset(pos - origin);
            if prefab.is_shell(local) {
                world.set_block(pos, prefab.shell);
            } else if self.overwrite {
                world.set_block(pos, AIR);
            }
        }

        for marker in prefab.markers {
            let pos = self.world_pos(marker.offset);
            if region.is_inside(pos) {
                handle_end_city_marker(world, marker.name, pos);
            }
        }
        true
    }
}

fn handle_end_city_marker(world: &mut dyn WorldAccess, marker: &str, pos: BlockPos) {
    match marker {
        "Chest" => {
            world.set_block(pos, AIR);
            let chest = pos.offset(0, -1, 0);
            world.set_block(chest, "minecraft:chest");
            world.set_loot_table(chest, END_CITY_LOOT);
        }
        "Sentry" => {
            world.set_block(pos, AIR);
            world.spawn_entity(pos, "minecraft:shulker");
        }
        "Elytra" => {
            world.spawn_entity(pos, "minecraft:item_frame");
        }
        other => log::debug!("Ignoring data marker {} at {}", other, pos),
    }
}

/// Persisted marker for a pyramid that has not settled onto terrain yet.
const UNSETTLED: i32 = -1;

const CHEST_OFFSETS: [BlockPos; 4] = [
    BlockPos::new(10, 1, 12),
    BlockPos::new(8, 1, 10),
    BlockPos::new(10, 1, 8),
    BlockPos::new(12, 1, 10),
];
const TRAP_OFFSET: BlockPos = BlockPos::new(10, 1, 10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesertPyramidPiece {
    #[serde(rename = "Width")]
    pub width: i32,
    #[serde(rename = "Height")]
    pub height: i32,
    #[serde(rename = "Depth")]
    pub depth: i32,
    #[serde(rename = "HPos", default = "unsettled")]
    pub height_position: i32,
    #[serde(rename = "hasPlacedChest0", default)]
    chest_0: bool,
    #[serde(rename = "hasPlacedChest1", default)]
    chest_1: bool,
    #[serde(rename = "hasPlacedChest2", default)]
    chest_2: bool,
    #[serde(rename = "hasPlacedChest3", default)]
    chest_3: bool,
}

fn unsettled() -> i32 {
    UNSETTLED
}

impl DesertPyramidPiece {
    pub const WIDTH: i32 = 21;
    pub const HEIGHT: i32 = 15;
    pub const DEPTH: i32 = 21;

    /// Pyramid at column (`x`, `z`), facing a random horizontal direction.
    pub fn create(rng: &mut StructureRng, x: i32, y: i32, z: i32) -> Piece {
        let facing = Direction::random_horizontal(rng);
        let pyramid = Self {
            width: Self::WIDTH,
            height: Self::HEIGHT,
            depth: Self::DEPTH,
            height_position: UNSETTLED,
            chest_0: false,
            chest_1: false,
            chest_2: false,
            chest_3: false,
        };
        let bounding_box = BoundingBox::sized(BlockPos::new(x, y, z), Self::WIDTH, Self::HEIGHT, Self::DEPTH, facing);
        Piece::new(PieceKind::DesertPyramid(pyramid), bounding_box, Some(facing))
    }

    pub fn is_settled(&self) -> bool {
        self.height_position >= 0
    }

    pub fn placed_chests(&self) -> [bool; 4] {
        [self.chest_0, self.chest_1, self.chest_2, self.chest_3]
    }

    fn chest_flag(&mut self, index: usize) -> &mut bool {
        match index {
            0 => &mut self.chest_0,
            1 => &mut self.chest_1,
            2 => &mut self.chest_2,
            _ => &mut self.chest_3,
        }
    }

    /// Moves the box once to the average surface height of the columns
    /// visible in `region`. Later calls keep the first result.
    fn settle(&mut self, bounding_box: &mut BoundingBox, terrain: &dyn WorldAccess, region: &BoundingBox) -> bool {
        if self.is_settled() {
            return true;
        }

        let (mut total, mut count) = (0i64, 0i64);
        for z in bounding_box.min_z()..=bounding_box.max_z() {
            for x in bounding_box.min_x()..=bounding_box.max_x() {
                if region.intersects_xz(x, z, x, z) {
                    total += terrain.surface_height(x, z) as i64;
                    count += 1;
                }
            }
        }
        if count == 0 {
            return false;
        }

        // Heights below zero settle at zero so the -1 marker stays unambiguous.
        self.height_position = ((total / count) as i32).max(0);
        *bounding_box = bounding_box.moved(0, self.height_position - bounding_box.min_y(), 0);
        true
    }

    fn shape_block(&self, local: BlockPos, rng: &mut StructureRng) -> Option<&'static str> {
        let inset = local.y * (self.width.min(self.depth) / 2) / self.height;
        let (low_x, high_x) = (inset, self.width - 1 - inset);
        let (low_z, high_z) = (inset, self.depth - 1 - inset);
        if local.x < low_x || local.x > high_x || local.z < low_z || local.z > high_z {
            return None;
        }
        let shell = local.y == 0
            || local.y == self.height - 1
            || local.x == low_x
            || local.x == high_x
            || local.z == low_z
            || local.z == high_z;
        if !shell {
            return Some(AIR);
        }
        if local.y > 0 && rng.gen_range(0..8) == 0 {
            Some("minecraft:chiseled_sandstone")
        } else {
            Some("minecraft:sandstone")
        }
    }

    fn place(
        &mut self,
        bounding_box: &mut BoundingBox,
        world: &mut dyn WorldAccess,
        rng: &mut StructureRng,
        region: &BoundingBox,
    ) -> bool {
        if !self.settle(bounding_box, &*world, region) {
            return false;
        }
        let Some(clip) = bounding_box.intersection(region) else {
            return false;
        };

        let origin = bounding_box.min();
        for pos in clip.positions() {
            if let Some(block) = self.shape_block(pos - origin, rng) {
                world.set_block(pos, block);
            }
        }

        for (index, offset) in CHEST_OFFSETS.iter().enumerate() {
            let pos = origin + *offset;
            if *self.chest_flag(index) || !region.is_inside(pos) {
                continue;
            }
            if world.set_block(pos, "minecraft:chest") {
                world.set_loot_table(pos, DESERT_PYRAMID_LOOT);
                *self.chest_flag(index) = true;
            }
        }

        let trap = origin + TRAP_OFFSET;
        if region.is_inside(trap) {
            world.set_block(trap, "minecraft:stone_pressure_plate");
            world.set_block(trap.offset(0, -1, 0), "minecraft:tnt");
        }
        true
    }
}
