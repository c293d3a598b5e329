//! Upgrade path for chunks saved before structure starts lived in chunks.
//!
//! Old worlds keep one `data/<Kind>.dat` file per structure kind holding
//! every start in the world, plus `data/<Kind>_index.dat` listing which
//! start chunks exist (`All`) and which have not been migrated yet
//! (`Remaining`). Upgrading a chunk injects its start and the references of
//! nearby starts in the modern per-chunk layout.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use fastnbt::LongArray;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use cairn_anvil::{ChunkPos, ChunkStructures, StartRecord};

/// Legacy file names, one per world-wide structure index.
pub const LEGACY_KINDS: [&str; 8] = [
    "Village",
    "Mineshaft",
    "Mansion",
    "Temple",
    "Stronghold",
    "Monument",
    "Fortress",
    "EndCity",
];

/// Radius in chunks of the reference scan around an upgraded chunk.
const REFERENCE_RADIUS: i32 = 8;

/// Current structure id of a legacy start. Temples covered four structure
/// types and are told apart by their first piece.
pub fn current_id(legacy: &str, start: &StartRecord) -> Option<&'static str> {
    let name = if legacy == "Temple" {
        let first = start.children.first().and_then(child_id)?;
        match first.as_str() {
            "TeDP" => "Desert_Pyramid",
            "TeJP" => "Jungle_Pyramid",
            "TeSH" => "Swamp_Hut",
            "Iglu" => "Igloo",
            _ => return None,
        }
    } else {
        legacy
    };
    namespaced(name)
}

fn namespaced(name: &str) -> Option<&'static str> {
    Some(match name {
        "Village" => "minecraft:village",
        "Mineshaft" => "minecraft:mineshaft",
        "Mansion" => "minecraft:mansion",
        "Stronghold" => "minecraft:stronghold",
        "Monument" => "minecraft:monument",
        "Fortress" => "minecraft:fortress",
        "EndCity" => "minecraft:end_city",
        "Desert_Pyramid" => "minecraft:desert_pyramid",
        "Jungle_Pyramid" => "minecraft:jungle_pyramid",
        "Swamp_Hut" => "minecraft:swamp_hut",
        "Igloo" => "minecraft:igloo",
        _ => return None,
    })
}

fn child_id(child: &fastnbt::Value) -> Option<String> {
    match child {
        fastnbt::Value::Compound(map) => match map.get("id") {
            Some(fastnbt::Value::String(id)) => Some(id.clone()),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Deserialize)]
struct FeaturesFile {
    data: FeaturesData,
}

#[derive(Deserialize)]
struct FeaturesData {
    #[serde(rename = "Features", default)]
    features: HashMap<String, fastnbt::Value>,
}

/// Decodes the starts of one legacy file. Unreadable and `INVALID` records
/// are skipped; they never produced a structure.
fn decode_features(name: &str, file: FeaturesFile) -> HashMap<i64, StartRecord> {
    let mut starts = HashMap::new();
    for (key, value) in file.data.features {
        let start: StartRecord = match fastnbt::from_value(&value) {
            Ok(start) => start,
            Err(e) => {
                log::warn!("Skipping unreadable legacy {} start {}: {}", name, key, e);
                continue;
            }
        };
        if start.is_invalid() {
            continue;
        }
        starts.insert(ChunkPos::new(start.chunk_x, start.chunk_z).as_long(), start);
    }
    starts
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    data: IndexData,
}

#[derive(Serialize, Deserialize)]
struct IndexData {
    #[serde(rename = "All")]
    all: LongArray,
    #[serde(rename = "Remaining")]
    remaining: LongArray,
}

#[derive(Debug, Default)]
struct LegacyIndex {
    all: HashSet<i64>,
    remaining: HashSet<i64>,
    dirty: bool,
}

impl LegacyIndex {
    fn from_file(file: IndexFile) -> Self {
        Self {
            all: file.data.all.iter().copied().collect(),
            remaining: file.data.remaining.iter().copied().collect(),
            dirty: false,
        }
    }

    fn to_file(&self) -> IndexFile {
        let mut all: Vec<i64> = self.all.iter().copied().collect();
        let mut remaining: Vec<i64> = self.remaining.iter().copied().collect();
        all.sort_unstable();
        remaining.sort_unstable();
        IndexFile {
            data: IndexData {
                all: LongArray::new(all),
                remaining: LongArray::new(remaining),
            },
        }
    }
}

struct LegacyKind {
    name: &'static str,
    starts: HashMap<i64, StartRecord>,
    index: Mutex<LegacyIndex>,
}

impl LegacyKind {
    fn index(&self) -> MutexGuard<'_, LegacyIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-kind summary reported by the `migrate` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyKindStats {
    pub kind: &'static str,
    pub starts: usize,
    pub all: usize,
    pub remaining: usize,
}

pub struct LegacyStructureUpgrader {
    data_dir: PathBuf,
    kinds: Vec<LegacyKind>,
}

fn read_gzip_nbt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to open {}", path.display())),
    };
    let mut nbt = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut nbt)
        .with_context(|| format!("Failed to decompress {}", path.display()))?;
    let value = fastnbt::from_bytes(&nbt).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn write_gzip_nbt<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let nbt = fastnbt::to_bytes(value).context("Failed to encode legacy index")?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&nbt)?;
    let compressed = encoder.finish()?;
    std::fs::write(path, compressed).with_context(|| format!("Failed to write {}", path.display()))
}

impl LegacyStructureUpgrader {
    /// Loads every legacy kind found in `data_dir`. Missing indexes are
    /// rebuilt from the start records and written back immediately.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let mut kinds = Vec::with_capacity(LEGACY_KINDS.len());

        for name in LEGACY_KINDS {
            let starts = read_gzip_nbt::<FeaturesFile>(&data_dir.join(format!("{}.dat", name)))?
                .map(|file| decode_features(name, file))
                .unwrap_or_default();

            let index_path = data_dir.join(format!("{}_index.dat", name));
            let index = match read_gzip_nbt::<IndexFile>(&index_path)? {
                Some(file) => LegacyIndex::from_file(file),
                None if starts.is_empty() => LegacyIndex::default(),
                None => {
                    log::info!("Rebuilding legacy {} index from {} starts", name, starts.len());
                    let keys: HashSet<i64> = starts.keys().copied().collect();
                    let index = LegacyIndex {
                        all: keys.clone(),
                        remaining: keys,
                        dirty: false,
                    };
                    write_gzip_nbt(&index_path, &index.to_file())?;
                    index
                }
            };

            kinds.push(LegacyKind {
                name,
                starts,
                index: Mutex::new(index),
            });
        }

        Ok(Self { data_dir, kinds })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// True when some legacy file recorded a start at `chunk`.
    pub fn has_legacy_start(&self, chunk: ChunkPos) -> bool {
        let key = chunk.as_long();
        self.kinds.iter().any(|kind| kind.starts.contains_key(&key) && kind.index().all.contains(&key))
    }

    /// Rewrites the structure data of a pre-1493 chunk into the modern layout.
    /// Does not touch the index; see [`Self::migrate_chunk`].
    pub fn upgrade(&self, chunk: ChunkPos, structures: Option<ChunkStructures>) -> ChunkStructures {
        let mut structures = structures.unwrap_or_default();
        let key = chunk.as_long();

        for kind in &self.kinds {
            if !kind.index().remaining.contains(&key) {
                continue;
            }
            let Some(start) = kind.starts.get(&key) else {
                continue;
            };
            match current_id(kind.name, start) {
                Some(id) => {
                    let mut record = start.clone();
                    record.id = id.to_string();
                    structures.starts.insert(id.to_string(), record);
                }
                None => log::debug!("Legacy {} start at {} has no current structure", kind.name, chunk),
            }
        }

        let mut references: BTreeMap<&'static str, Vec<i64>> = BTreeMap::new();
        for dz in -REFERENCE_RADIUS..=REFERENCE_RADIUS {
            for dx in -REFERENCE_RADIUS..=REFERENCE_RADIUS {
                let near = ChunkPos::new(chunk.x + dx, chunk.z + dz).as_long();
                for kind in &self.kinds {
                    let Some(start) = kind.starts.get(&near) else {
                        continue;
                    };
                    if !kind.index().all.contains(&near) {
                        continue;
                    }
                    if let Some(id) = current_id(kind.name, start) {
                        references.entry(id).or_default().push(near);
                    }
                }
            }
        }
        for (id, positions) in references {
            structures
                .references
                .entry(id.to_string())
                .or_insert_with(|| LongArray::new(positions));
        }
        structures
    }

    /// Drops `chunk` from every `Remaining` set; it stays in `All`.
    pub fn mark_handled(&self, chunk: ChunkPos) {
        let key = chunk.as_long();
        for kind in &self.kinds {
            let mut index = kind.index();
            if index.remaining.remove(&key) {
                index.dirty = true;
            }
        }
    }

    /// Upgrade followed by [`Self::mark_handled`], for chunks that are about
    /// to be saved in the modern layout.
    pub fn migrate_chunk(&self, chunk: ChunkPos, structures: Option<ChunkStructures>) -> ChunkStructures {
        let upgraded = self.upgrade(chunk, structures);
        self.mark_handled(chunk);
        upgraded
    }

    /// Writes back every index changed since the last save.
    pub fn save(&self) -> Result<usize> {
        let mut written = 0;
        for kind in &self.kinds {
            let mut index = kind.index();
            if !index.dirty {
                continue;
            }
            let path = self.data_dir.join(format!("{}_index.dat", kind.name));
            write_gzip_nbt(&path, &index.to_file())?;
            index.dirty = false;
            written += 1;
        }
        Ok(written)
    }

    pub fn stats(&self) -> Vec<LegacyKindStats> {
        self.kinds
            .iter()
            .map(|kind| {
                let index = kind.index();
                LegacyKindStats {
                    kind: kind.name,
                    starts: kind.starts.len(),
                    all: index.all.len(),
                    remaining: index.remaining.len(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn temple_start(x: i32, z: i32, piece: &str) -> StartRecord {
        let mut child = HashMap::new();
        child.insert("id".to_string(), fastnbt::Value::String(piece.to_string()));
        child.insert(
            "BB".to_string(),
            fastnbt::Value::IntArray(fastnbt::IntArray::new(vec![x * 16, 64, z * 16, x * 16 + 20, 78, z * 16 + 20])),
        );
        StartRecord {
            id: "Temple".to_string(),
            chunk_x: x,
            chunk_z: z,
            references: 0,
            children: vec![fastnbt::Value::Compound(child)],
        }
    }

    #[derive(Serialize)]
    struct FeaturesOut {
        data: FeaturesDataOut,
    }

    #[derive(Serialize)]
    struct FeaturesDataOut {
        #[serde(rename = "Features")]
        features: HashMap<String, StartRecord>,
    }

    /// Writes `data/Temple.dat` holding the given starts.
    pub(crate) fn write_temples(dir: &Path, starts: &[StartRecord]) {
        let features = starts
            .iter()
            .map(|s| (format!("[{},{}]", s.chunk_x, s.chunk_z), s.clone()))
            .collect();
        let file = FeaturesOut { data: FeaturesDataOut { features } };
        write_gzip_nbt(&dir.join("Temple.dat"), &file).unwrap();
    }

    fn write_temple_index(dir: &Path, all: &[ChunkPos], remaining: &[ChunkPos]) {
        let index = IndexFile {
            data: IndexData {
                all: LongArray::new(all.iter().map(|c| c.as_long()).collect()),
                remaining: LongArray::new(remaining.iter().map(|c| c.as_long()).collect()),
            },
        };
        write_gzip_nbt(&dir.join("Temple_index.dat"), &index).unwrap();
    }

    #[test]
    fn test_temple_split_by_first_piece() {
        assert_eq!(current_id("Temple", &temple_start(0, 0, "TeDP")), Some("minecraft:desert_pyramid"));
        assert_eq!(current_id("Temple", &temple_start(0, 0, "TeSH")), Some("minecraft:swamp_hut"));
        assert_eq!(current_id("Temple", &temple_start(0, 0, "Iglu")), Some("minecraft:igloo"));
        assert_eq!(current_id("Temple", &temple_start(0, 0, "XXXX")), None);
        assert_eq!(current_id("EndCity", &temple_start(0, 0, "ECP")), Some("minecraft:end_city"));
    }

    #[test]
    fn test_migration_consumes_remaining_once() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = ChunkPos::new(3, 4);
        write_temples(dir.path(), &[temple_start(3, 4, "TeDP")]);
        write_temple_index(dir.path(), &[chunk], &[chunk]);

        let upgrader = LegacyStructureUpgrader::open(dir.path()).unwrap();
        let migrated = upgrader.migrate_chunk(chunk, None);
        let start = &migrated.starts["minecraft:desert_pyramid"];
        assert_eq!((start.chunk_x, start.chunk_z), (3, 4));
        assert_eq!(start.id, "minecraft:desert_pyramid");

        let temple = upgrader.stats().into_iter().find(|s| s.kind == "Temple").unwrap();
        assert_eq!((temple.all, temple.remaining), (1, 0));

        // Already handled: no start is injected again, the reference remains.
        let again = upgrader.upgrade(chunk, None);
        assert!(again.starts.is_empty());
        assert_eq!(again.references["minecraft:desert_pyramid"].to_vec(), vec![chunk.as_long()]);
    }

    #[test]
    fn test_handled_chunk_is_not_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = ChunkPos::new(3, 4);
        write_temples(dir.path(), &[temple_start(3, 4, "TeDP")]);
        write_temple_index(dir.path(), &[chunk], &[]);

        let upgrader = LegacyStructureUpgrader::open(dir.path()).unwrap();
        assert!(upgrader.upgrade(chunk, None).starts.is_empty());
    }

    #[test]
    fn test_missing_index_rebuilt_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        write_temples(dir.path(), &[temple_start(3, 4, "TeDP"), temple_start(-20, 7, "TeJP")]);

        let upgrader = LegacyStructureUpgrader::open(dir.path()).unwrap();
        assert!(dir.path().join("Temple_index.dat").exists());
        let temple = upgrader.stats().into_iter().find(|s| s.kind == "Temple").unwrap();
        assert_eq!((temple.starts, temple.all, temple.remaining), (2, 2, 2));
        assert!(!dir.path().join("Village_index.dat").exists());
    }

    #[test]
    fn test_save_persists_handled_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = ChunkPos::new(3, 4);
        write_temples(dir.path(), &[temple_start(3, 4, "TeDP")]);

        let upgrader = LegacyStructureUpgrader::open(dir.path()).unwrap();
        assert_eq!(upgrader.save().unwrap(), 0);
        upgrader.mark_handled(chunk);
        upgrader.mark_handled(chunk);
        assert_eq!(upgrader.save().unwrap(), 1);
        assert_eq!(upgrader.save().unwrap(), 0);

        let reopened = LegacyStructureUpgrader::open(dir.path()).unwrap();
        assert!(reopened.upgrade(chunk, None).starts.is_empty());
        assert!(reopened.has_legacy_start(chunk));
    }

    fn write_villages(dir: &Path, features: HashMap<String, fastnbt::Value>) {
        #[derive(Serialize)]
        struct Raw {
            data: RawData,
        }
        #[derive(Serialize)]
        struct RawData {
            #[serde(rename = "Features")]
            features: HashMap<String, fastnbt::Value>,
        }
        write_gzip_nbt(&dir.join("Village.dat"), &Raw { data: RawData { features } }).unwrap();
    }

    #[test]
    fn test_invalid_legacy_start_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut invalid = StartRecord::invalid();
        invalid.chunk_x = 3;
        invalid.chunk_z = 4;
        let mut features = HashMap::new();
        features.insert("[3,4]".to_string(), fastnbt::to_value(&invalid).unwrap());
        write_villages(dir.path(), features);

        let upgrader = LegacyStructureUpgrader::open(dir.path()).unwrap();
        let upgraded = upgrader.upgrade(ChunkPos::new(3, 4), None);
        assert!(upgraded.starts.is_empty());
        assert!(upgraded.references.is_empty());
        assert!(!upgrader.has_legacy_start(ChunkPos::new(3, 4)));
        let village = upgrader.stats().into_iter().find(|s| s.kind == "Village").unwrap();
        assert_eq!((village.starts, village.all), (0, 0));
    }

    #[test]
    fn test_unreadable_legacy_start_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut good = temple_start(3, 4, "TeDP");
        good.id = "Village".to_string();
        let mut broken = HashMap::new();
        broken.insert("ChunkX".to_string(), fastnbt::Value::Int(9));
        let mut features = HashMap::new();
        features.insert("[3,4]".to_string(), fastnbt::to_value(&good).unwrap());
        features.insert("[9,0]".to_string(), fastnbt::Value::Compound(broken));
        write_villages(dir.path(), features);

        let upgrader = LegacyStructureUpgrader::open(dir.path()).unwrap();
        let village = upgrader.stats().into_iter().find(|s| s.kind == "Village").unwrap();
        assert_eq!((village.starts, village.remaining), (1, 1));
        let upgraded = upgrader.upgrade(ChunkPos::new(3, 4), None);
        assert!(upgraded.starts.contains_key("minecraft:village"));
    }

    #[test]
    fn test_references_reach_eight_chunks() {
        let dir = tempfile::tempdir().unwrap();
        write_temples(dir.path(), &[temple_start(0, 0, "TeDP")]);
        let upgrader = LegacyStructureUpgrader::open(dir.path()).unwrap();

        let near = upgrader.upgrade(ChunkPos::new(8, -8), None);
        assert!(near.references.contains_key("minecraft:desert_pyramid"));
        let far = upgrader.upgrade(ChunkPos::new(9, 0), None);
        assert!(far.references.is_empty());
    }
}
