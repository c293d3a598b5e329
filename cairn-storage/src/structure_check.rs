//! Answers "is there a start of this kind rooted in this chunk?" without
//! loading chunks whenever possible.
//!
//! Chunks whose structure data has been seen are cached authoritatively in
//! `loaded_chunks`. Otherwise the stored chunk is scanned for just its data
//! version and structure starts. Chunks that were never saved fall back to a
//! memoized per-kind eligibility guess, which can rule a start out but never
//! confirm one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use cairn_anvil::nbt::{LEGACY_STRUCTURE_VERSION, StructureScan};
use cairn_anvil::ChunkStructures;
use cairn_benchmark::BenchmarkMetrics;
use cairn_gen::{ChunkPos, StructureKind, StructureRegistry, StructureStart};

use crate::ChunkStorage;
use crate::legacy::LegacyStructureUpgrader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureCheckResult {
    StartPresent,
    /// A start exists but already has references; only reported when the
    /// caller asks to skip referenced starts.
    StartReferenced,
    StartNotPresent,
    /// Not enough information without loading the chunk in full.
    ChunkLoadNeeded,
}

enum StoredStructures {
    Known(ChunkStructures),
    /// Saved without a structure sub-tree, e.g. a chunk that never reached
    /// the structure stage.
    Missing,
    NeedsLoad,
}

/// Cheap guess whether a kind could start in a chunk at all (biome and
/// placement rules).
pub trait FeatureEligibility: Send + Sync {
    fn can_start_here(&self, kind: &StructureKind, chunk: ChunkPos) -> bool;
}

impl<F> FeatureEligibility for F
where
    F: Fn(&StructureKind, ChunkPos) -> bool + Send + Sync,
{
    fn can_start_here(&self, kind: &StructureKind, chunk: ChunkPos) -> bool {
        self(kind, chunk)
    }
}

pub struct StructureCheck {
    storage: Arc<dyn ChunkStorage>,
    registry: StructureRegistry,
    eligibility: Arc<dyn FeatureEligibility>,
    upgrader: Option<Arc<LegacyStructureUpgrader>>,
    metrics: Option<Arc<BenchmarkMetrics>>,
    /// Chunk -> reference count per kind of the starts rooted there.
    loaded_chunks: DashMap<ChunkPos, HashMap<StructureKind, i32>>,
    /// Kind -> chunk -> eligibility guess for chunks with no stored data.
    feature_checks: DashMap<StructureKind, DashMap<ChunkPos, bool>>,
}

impl StructureCheck {
    pub fn new(
        storage: Arc<dyn ChunkStorage>,
        registry: StructureRegistry,
        eligibility: Arc<dyn FeatureEligibility>,
    ) -> Self {
        Self {
            storage,
            registry,
            eligibility,
            upgrader: None,
            metrics: None,
            loaded_chunks: DashMap::new(),
            feature_checks: DashMap::new(),
        }
    }

    pub fn with_upgrader(mut self, upgrader: Arc<LegacyStructureUpgrader>) -> Self {
        self.upgrader = Some(upgrader);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<BenchmarkMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn check_start(&self, chunk: ChunkPos, kind: &StructureKind, skip_referenced: bool) -> StructureCheckResult {
        let known = self
            .loaded_chunks
            .get(&chunk)
            .map(|refs| Self::check_structure_info(&refs, kind, skip_referenced));
        if let Some(result) = known {
            if let Some(metrics) = &self.metrics {
                metrics.record_loaded_hit();
            }
            return result;
        }

        let started = Instant::now();
        let scan = self.storage.scan_structures(chunk.x, chunk.z).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_scoped_read(started.elapsed(), scan.is_err());
        }

        let scan = match scan {
            Ok(Some(scan)) => scan,
            Ok(None) => return self.check_feature(chunk, kind),
            Err(e) => {
                log::warn!("Failed to read structure data for chunk {}: {:#}", chunk, e);
                return StructureCheckResult::ChunkLoadNeeded;
            }
        };

        let structures = match self.stored_structures(chunk, scan) {
            StoredStructures::Known(structures) => structures,
            StoredStructures::Missing => return self.check_feature(chunk, kind),
            StoredStructures::NeedsLoad => return StructureCheckResult::ChunkLoadNeeded,
        };
        let refs = self.load_structures(chunk, &structures);
        self.store_scanned_results(chunk, refs, kind, skip_referenced)
    }

    /// Structure data of a scanned chunk in the current layout.
    fn stored_structures(&self, chunk: ChunkPos, mut scan: StructureScan) -> StoredStructures {
        let version = scan.version();
        if version == 0 {
            return StoredStructures::NeedsLoad;
        }
        if version < LEGACY_STRUCTURE_VERSION {
            let Some(upgrader) = self.upgrader.as_ref() else {
                return StoredStructures::NeedsLoad;
            };
            if let Some(metrics) = &self.metrics {
                metrics.record_legacy_upgrade();
            }
            return StoredStructures::Known(upgrader.upgrade(chunk, scan.take_structures()));
        }
        match scan.take_structures() {
            Some(structures) => StoredStructures::Known(structures),
            None => StoredStructures::Missing,
        }
    }

    fn load_structures(&self, chunk: ChunkPos, structures: &ChunkStructures) -> HashMap<StructureKind, i32> {
        let mut refs = HashMap::new();
        for (id, start) in &structures.starts {
            let Some(kind) = self.registry.resolve(id) else {
                log::debug!("Unknown structure {} in chunk {}", id, chunk);
                continue;
            };
            let count = if start.is_invalid() { 0 } else { start.references };
            refs.insert(kind, count);
        }
        refs
    }

    fn check_structure_info(refs: &HashMap<StructureKind, i32>, kind: &StructureKind, skip_referenced: bool) -> StructureCheckResult {
        match refs.get(kind) {
            None => StructureCheckResult::StartNotPresent,
            Some(&count) if skip_referenced && count != 0 => StructureCheckResult::StartReferenced,
            Some(_) => StructureCheckResult::StartPresent,
        }
    }

    fn check_feature(&self, chunk: ChunkPos, kind: &StructureKind) -> StructureCheckResult {
        let per_kind = self.feature_checks.entry(kind.clone()).or_default().downgrade();
        let mut computed = false;
        let eligible = *per_kind.entry(chunk).or_insert_with(|| {
            computed = true;
            self.eligibility.can_start_here(kind, chunk)
        });
        drop(per_kind);

        if let Some(metrics) = &self.metrics {
            if computed {
                metrics.record_feature_miss();
            } else {
                metrics.record_feature_hit();
            }
        }
        if eligible {
            StructureCheckResult::ChunkLoadNeeded
        } else {
            StructureCheckResult::StartNotPresent
        }
    }

    /// Scoped reads race with full loads and reference updates made while
    /// the read was pending; counts already cached win.
    fn store_scanned_results(
        &self,
        chunk: ChunkPos,
        refs: HashMap<StructureKind, i32>,
        kind: &StructureKind,
        skip_referenced: bool,
    ) -> StructureCheckResult {
        let result = {
            let stored = self.loaded_chunks.entry(chunk).or_insert(refs);
            Self::check_structure_info(&stored, kind, skip_referenced)
        };
        self.invalidate_feature_checks(chunk);
        result
    }

    /// Records the authoritative start counts of a chunk and drops every
    /// eligibility guess made for it.
    fn store_full_results(&self, chunk: ChunkPos, refs: HashMap<StructureKind, i32>) {
        self.loaded_chunks.insert(chunk, refs);
        self.invalidate_feature_checks(chunk);
    }

    fn invalidate_feature_checks(&self, chunk: ChunkPos) {
        let mut removed = 0;
        for per_kind in self.feature_checks.iter() {
            if per_kind.remove(&chunk).is_some() {
                removed += 1;
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_invalidations(removed);
        }
    }

    /// Called once a chunk's starts are loaded through the full load path.
    /// Invalid starts are recorded with a count of 0 so the chunk is not
    /// tried again.
    pub fn on_structure_load<'a, I>(&self, chunk: ChunkPos, starts: I)
    where
        I: IntoIterator<Item = &'a StructureStart>,
    {
        let refs = starts
            .into_iter()
            .map(|start| {
                let count = if start.is_valid() { start.references() as i32 } else { 0 };
                (start.kind().clone(), count)
            })
            .collect();
        self.store_full_results(chunk, refs);
    }

    /// Bumps the cached count of the `kind` start rooted in `chunk`, if the
    /// chunk is known.
    pub fn increment_reference(&self, chunk: ChunkPos, kind: &StructureKind) {
        if let Some(mut refs) = self.loaded_chunks.get_mut(&chunk) {
            *refs.entry(kind.clone()).or_insert(0) += 1;
        }
    }

    pub fn is_loaded(&self, chunk: ChunkPos) -> bool {
        self.loaded_chunks.contains_key(&chunk)
    }

    pub fn pending_feature_checks(&self, chunk: ChunkPos) -> usize {
        self.feature_checks.iter().filter(|per_kind| per_kind.contains_key(&chunk)).count()
    }
}
