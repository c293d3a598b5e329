//! Commands against one stored world: structure generation through the
//! start cache, reference claims, inspection and legacy migration.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;

use cairn_anvil::nbt::{FLAT_CHUNK_VERSION, LEGACY_STRUCTURE_VERSION};
use cairn_anvil::{ChunkData, ChunkStructures, StructureScan};
use cairn_benchmark::BenchmarkMetrics;
use cairn_gen::{
    BoundingBox, ChunkPos, GenerationContext, StructureKind, StructureRegistry, StructureStart, StructureType,
    WorldGenerator,
};
use cairn_storage::legacy::LegacyKindStats;
use cairn_storage::{ChunkStorage, FeatureEligibility, LegacyStructureUpgrader, StructureCheck, StructureCheckResult};

use crate::world::{ChunkWorld, LoadedChunk};

/// A chunk may root a start when it is its kind's grid candidate.
struct PlacementEligibility {
    registry: StructureRegistry,
    seed: u64,
}

impl FeatureEligibility for PlacementEligibility {
    fn can_start_here(&self, kind: &StructureKind, chunk: ChunkPos) -> bool {
        self.registry
            .get(kind)
            .is_some_and(|structure| structure.placement().is_start_chunk(self.seed, chunk))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    NoStart { candidate: ChunkPos },
    Invalid,
    AlreadyPlaced,
    Placed { pieces: usize, chunks: usize, bounds: BoundingBox },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed { references: u32 },
    Exhausted,
    NoStart,
}

#[derive(Debug, Serialize)]
pub struct StartReport {
    pub valid: bool,
    pub references: u32,
    pub pieces: Vec<String>,
    pub bounds: Option<[i32; 6]>,
}

#[derive(Debug, Serialize)]
pub struct ChunkReport {
    pub chunk: [i32; 2],
    pub data_version: i32,
    pub starts: BTreeMap<String, StartReport>,
    /// Unknown kinds are listed here untouched.
    pub unknown_starts: Vec<String>,
    pub references: BTreeMap<String, Vec<[i32; 2]>>,
}

pub struct WorldSession {
    storage: Arc<dyn ChunkStorage>,
    generator: Arc<dyn WorldGenerator>,
    registry: StructureRegistry,
    upgrader: Option<Arc<LegacyStructureUpgrader>>,
    check: StructureCheck,
    metrics: Arc<BenchmarkMetrics>,
    seed: u64,
}

impl WorldSession {
    pub fn new(
        storage: Arc<dyn ChunkStorage>,
        generator: Arc<dyn WorldGenerator>,
        seed: u64,
        upgrader: Option<Arc<LegacyStructureUpgrader>>,
        metrics: Arc<BenchmarkMetrics>,
    ) -> Self {
        let registry = StructureRegistry::builtin();
        let eligibility = Arc::new(PlacementEligibility { registry: registry.clone(), seed });
        let mut check = StructureCheck::new(storage.clone(), registry.clone(), eligibility).with_metrics(metrics.clone());
        if let Some(upgrader) = &upgrader {
            check = check.with_upgrader(upgrader.clone());
        }
        Self {
            storage,
            generator,
            registry,
            upgrader,
            check,
            metrics,
            seed,
        }
    }

    pub fn resolve_kind(&self, id: &str) -> Result<StructureKind> {
        self.registry
            .resolve(id)
            .ok_or_else(|| anyhow!("Unknown structure kind '{}', known kinds: {:?}", id, self.registry))
    }

    fn structure(&self, kind: &StructureKind) -> Result<Arc<dyn StructureType>> {
        self.registry
            .get(kind)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown structure kind '{}'", kind))
    }

    pub async fn check(&self, kind: &StructureKind, chunk: ChunkPos, skip_referenced: bool) -> StructureCheckResult {
        self.check.check_start(chunk, kind, skip_referenced).await
    }

    /// Fully loads a chunk. Missing chunks are generated with their starts
    /// decided. Chunks from before the flattening keep their structure data
    /// but get fresh terrain.
    pub async fn load(&self, chunk: ChunkPos) -> Result<LoadedChunk> {
        let started = Instant::now();
        let stored = self
            .storage
            .load_chunk(chunk.x, chunk.z)
            .await
            .with_context(|| format!("Failed to load chunk {}", chunk))?;
        self.metrics.record_load(started.elapsed());

        let Some(nbt) = stored else {
            let mut loaded = LoadedChunk::new(chunk, self.generator.generate_chunk(chunk));
            self.decide_starts(&mut loaded)?;
            return Ok(loaded);
        };

        let mut scan = StructureScan::decode(&nbt)?;
        let version = scan.version();
        if version >= FLAT_CHUNK_VERSION {
            let data = ChunkData::decode(&nbt).with_context(|| format!("Failed to decode chunk {}", chunk))?;
            return Ok(LoadedChunk::from_data(chunk, data));
        }

        log::info!("Chunk {} has data version {}, regenerating its terrain", chunk, version);
        let structures = match &self.upgrader {
            Some(upgrader) if version < LEGACY_STRUCTURE_VERSION => {
                self.metrics.record_legacy_upgrade();
                upgrader.migrate_chunk(chunk, scan.take_structures())
            }
            _ => scan.take_structures().unwrap_or_default(),
        };
        let mut loaded = LoadedChunk::new(chunk, self.generator.generate_chunk(chunk));
        loaded.structures = structures;
        Ok(loaded)
    }

    pub async fn save(&self, loaded: LoadedChunk) -> Result<()> {
        let started = Instant::now();
        let pos = loaded.pos;
        let nbt = loaded.encode()?;
        self.storage
            .save_chunk(pos.x, pos.z, &nbt)
            .await
            .with_context(|| format!("Failed to save chunk {}", pos))?;
        self.metrics.record_save(started.elapsed());
        Ok(())
    }

    /// Every kind whose grid picks this chunk gets a start record, invalid
    /// when nothing fits.
    fn decide_starts(&self, loaded: &mut LoadedChunk) -> Result<()> {
        for kind in self.registry.kinds() {
            let structure = self.structure(&kind)?;
            if structure.placement().is_start_chunk(self.seed, loaded.pos) {
                self.create_start(structure.as_ref(), loaded)?;
            }
        }
        Ok(())
    }

    fn create_start(&self, structure: &dyn StructureType, loaded: &mut LoadedChunk) -> Result<()> {
        let ctx = GenerationContext {
            seed: self.seed,
            chunk: loaded.pos,
            terrain: &*loaded,
            metrics: Some(self.metrics.as_ref()),
        };
        let start = StructureStart::generate(structure, &ctx);
        let record = start.to_record()?;
        loaded.structures.starts.insert(structure.kind().to_string(), record);
        Ok(())
    }

    /// Starts persisted in a chunk, for every kind this session knows.
    fn starts_of(&self, chunk: ChunkPos, structures: &ChunkStructures) -> Vec<StructureStart> {
        structures
            .starts
            .iter()
            .filter_map(|(id, record)| {
                let Some(structure) = self.registry.resolve(id).and_then(|kind| self.registry.get(&kind)) else {
                    log::debug!("Skipping unknown structure {} in chunk {}", id, chunk);
                    return None;
                };
                Some(StructureStart::load(structure.as_ref(), chunk, record))
            })
            .collect()
    }

    /// Loads the origin chunk, makes sure it has decided a `kind` start when
    /// it is a candidate, and reports its starts to the cache.
    async fn load_origin(&self, structure: &dyn StructureType, chunk: ChunkPos) -> Result<(LoadedChunk, Vec<StructureStart>)> {
        let mut origin = self.load(chunk).await?;
        let kind = structure.kind();
        let decided = origin
            .structures
            .starts
            .keys()
            .any(|id| self.registry.resolve(id).as_ref() == Some(kind));
        if !decided && structure.placement().is_start_chunk(self.seed, chunk) {
            self.create_start(structure, &mut origin)?;
        }
        let starts = self.starts_of(chunk, &origin.structures);
        self.check.on_structure_load(chunk, &starts);
        Ok((origin, starts))
    }

    /// Generates the `kind` start rooted in `chunk` if there is one and
    /// places it into every chunk its bounds touch.
    pub async fn generate(&self, kind: &StructureKind, chunk: ChunkPos) -> Result<GenerateOutcome> {
        let structure = self.structure(kind)?;
        let candidate = structure.placement().nearest_candidate(self.seed, chunk);
        if self.check.check_start(chunk, kind, false).await == StructureCheckResult::StartNotPresent {
            return Ok(GenerateOutcome::NoStart { candidate });
        }

        let (mut origin, starts) = self.load_origin(structure.as_ref(), chunk).await?;
        let Some(mut start) = starts.into_iter().find(|start| start.kind() == kind) else {
            self.save(origin).await?;
            return Ok(GenerateOutcome::NoStart { candidate });
        };
        let Some(bounds) = start.bounding_box() else {
            self.save(origin).await?;
            return Ok(GenerateOutcome::Invalid);
        };

        if origin.has_reference(kind.as_str(), chunk) {
            return Ok(GenerateOutcome::AlreadyPlaced);
        }

        let targets: Vec<ChunkPos> = bounds.chunks().collect();
        for &target in &targets {
            if target == chunk {
                self.place_into(&mut start, structure.as_ref(), &mut origin);
                continue;
            }
            let mut loaded = self.load(target).await?;
            self.place_into(&mut start, structure.as_ref(), &mut loaded);
            self.save(loaded).await?;
        }

        // Placement settles pieces, so the start is written back afterwards
        origin.structures.starts.insert(kind.to_string(), start.to_record()?);
        self.save(origin).await?;
        log::info!("Placed {} at {} across {} chunks", kind, chunk, targets.len());

        Ok(GenerateOutcome::Placed {
            pieces: start.pieces().len(),
            chunks: targets.len(),
            bounds,
        })
    }

    fn place_into(&self, start: &mut StructureStart, structure: &dyn StructureType, loaded: &mut LoadedChunk) {
        let started = Instant::now();
        let target = loaded.pos;
        let mut world = ChunkWorld::new(loaded);
        let placed = start.place_in_chunk(structure, &mut world, self.seed, target);
        let entities = world.entities();
        if placed {
            log::debug!("Placed {} into {} ({} entities not persisted)", start.kind(), target, entities);
        }
        loaded.add_reference(start.kind().as_str(), start.chunk());
        self.metrics.record_placement(started.elapsed());
    }

    /// Adds one reference to the `kind` start rooted in `chunk` and persists it.
    pub async fn claim(&self, kind: &StructureKind, chunk: ChunkPos) -> Result<ClaimOutcome> {
        let structure = self.structure(kind)?;
        let (mut origin, starts) = self.load_origin(structure.as_ref(), chunk).await?;
        let Some(start) = starts.iter().find(|start| start.kind() == kind && start.is_valid()) else {
            self.save(origin).await?;
            return Ok(ClaimOutcome::NoStart);
        };
        if !start.can_be_referenced() {
            self.save(origin).await?;
            return Ok(ClaimOutcome::Exhausted);
        }

        start.add_reference();
        self.check.increment_reference(chunk, kind);
        origin.structures.starts.insert(kind.to_string(), start.to_record()?);
        let references = start.references();
        self.save(origin).await?;
        Ok(ClaimOutcome::Claimed { references })
    }

    /// Structure view of a stored chunk, `None` if it was never saved. Legacy
    /// chunks are shown upgraded without consuming their migration.
    pub async fn inspect(&self, chunk: ChunkPos) -> Result<Option<ChunkReport>> {
        let Some(mut scan) = self.storage.scan_structures(chunk.x, chunk.z).await? else {
            return Ok(None);
        };
        let version = scan.version();
        let structures = match &self.upgrader {
            Some(upgrader) if version < LEGACY_STRUCTURE_VERSION => upgrader.upgrade(chunk, scan.take_structures()),
            _ => scan.take_structures().unwrap_or_default(),
        };

        let mut starts = BTreeMap::new();
        let mut unknown_starts = Vec::new();
        for (id, record) in &structures.starts {
            let Some(structure) = self.registry.resolve(id).and_then(|kind| self.registry.get(&kind)) else {
                unknown_starts.push(id.clone());
                continue;
            };
            let start = StructureStart::load(structure.as_ref(), chunk, record);
            let report = StartReport {
                valid: start.is_valid(),
                references: start.references(),
                pieces: start.pieces().pieces().iter().map(|piece| piece.kind.id().to_string()).collect(),
                bounds: start.bounding_box().map(|bounds| bounds.to_array()),
            };
            starts.insert(id.clone(), report);
        }
        unknown_starts.sort();

        let references = structures
            .references
            .iter()
            .map(|(id, packed)| {
                let origins = packed
                    .iter()
                    .map(|key| {
                        let pos = ChunkPos::from_long(*key);
                        [pos.x, pos.z]
                    })
                    .collect();
                (id.clone(), origins)
            })
            .collect();

        Ok(Some(ChunkReport {
            chunk: [chunk.x, chunk.z],
            data_version: version,
            starts,
            unknown_starts,
            references,
        }))
    }

    /// Rewrites the listed legacy chunks in the current format and saves the
    /// legacy indexes.
    pub async fn migrate(&self, chunks: &[ChunkPos]) -> Result<Vec<LegacyKindStats>> {
        let Some(upgrader) = &self.upgrader else {
            bail!("Migration needs the legacy data directory (--legacy-dir)");
        };
        for &chunk in chunks {
            let Some(scan) = self.storage.scan_structures(chunk.x, chunk.z).await? else {
                log::warn!("Chunk {} is not stored, nothing to migrate", chunk);
                continue;
            };
            if scan.version() >= LEGACY_STRUCTURE_VERSION {
                log::debug!("Chunk {} is already at data version {}", chunk, scan.version());
                continue;
            }
            let loaded = self.load(chunk).await?;
            self.save(loaded).await?;
        }
        upgrader.save()?;
        Ok(upgrader.stats())
    }

    /// Flushes legacy indexes touched by this session.
    pub fn finish(&self) -> Result<()> {
        if let Some(upgrader) = &self.upgrader {
            let written = upgrader.save()?;
            if written > 0 {
                log::info!("Saved {} legacy indexes", written);
            }
        }
        Ok(())
    }
}
