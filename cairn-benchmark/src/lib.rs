use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct BenchmarkMetrics {
    // Assembly Stats
    pub total_structures_assembled: AtomicUsize,
    pub total_invalid_starts: AtomicUsize,
    pub total_assembly_time_us: AtomicU64,
    pub max_assembly_time_us: AtomicU64,
    pub total_pieces_committed: AtomicUsize,
    pub total_batches_rejected: AtomicUsize,
    pub total_depth_cutoffs: AtomicUsize,

    // Placement Stats
    pub total_chunks_placed: AtomicUsize,
    pub total_placement_time_us: AtomicU64,

    // Storage Stats
    pub total_chunks_loaded: AtomicUsize,
    pub total_load_time_us: AtomicU64,
    pub total_chunks_saved: AtomicUsize,
    pub total_save_time_us: AtomicU64,

    // Structure Check
    pub total_loaded_hits: AtomicUsize,
    pub total_feature_hits: AtomicUsize,
    pub total_feature_misses: AtomicUsize,
    pub total_scoped_reads: AtomicUsize,
    pub total_scoped_read_failures: AtomicUsize,
    pub total_scoped_read_time_us: AtomicU64,
    pub total_legacy_upgrades: AtomicUsize,
    pub total_invalidations: AtomicUsize,

    // Storage cache
    pub total_cache_hits: AtomicUsize,
    pub total_cache_misses: AtomicUsize,

    // Session
    pub start_time: Option<Instant>,
    pub config_summary: String,
}

fn avg(total_ms: f64, count: usize) -> f64 {
    if count > 0 { total_ms / count as f64 } else { 0.0 }
}

fn rate(hits: usize, misses: usize) -> f64 {
    let total = hits + misses;
    if total > 0 { (hits as f64 / total as f64) * 100.0 } else { 0.0 }
}

impl BenchmarkMetrics {
    pub fn new(config_summary: String) -> Self {
        Self {
            start_time: Some(Instant::now()),
            config_summary,
            ..Default::default()
        }
    }

    pub fn record_assembly(&self, duration: Duration, pieces: usize) {
        if pieces == 0 {
            self.total_invalid_starts.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_structures_assembled.fetch_add(1, Ordering::Relaxed);
        }
        self.total_pieces_committed.fetch_add(pieces, Ordering::Relaxed);
        let us = duration.as_micros() as u64;
        self.total_assembly_time_us.fetch_add(us, Ordering::Relaxed);
        self.max_assembly_time_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn record_batch_rejected(&self) {
        self.total_batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_depth_cutoff(&self) {
        self.total_depth_cutoffs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_placement(&self, duration: Duration) {
        self.total_chunks_placed.fetch_add(1, Ordering::Relaxed);
        self.total_placement_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_load(&self, duration: Duration) {
        self.total_chunks_loaded.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_save(&self, duration: Duration) {
        self.total_chunks_saved.fetch_add(1, Ordering::Relaxed);
        self.total_save_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_loaded_hit(&self) {
        self.total_loaded_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_feature_hit(&self) {
        self.total_feature_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_feature_miss(&self) {
        self.total_feature_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scoped_read(&self, duration: Duration, failed: bool) {
        self.total_scoped_reads.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.total_scoped_read_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.total_scoped_read_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_legacy_upgrade(&self) {
        self.total_legacy_upgrades.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, removed: usize) {
        self.total_invalidations.fetch_add(removed, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.total_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.total_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn generate_report(&self) -> String {
        let uptime = self.start_time.unwrap_or_else(Instant::now).elapsed();
        let assembled = self.total_structures_assembled.load(Ordering::Relaxed);
        let invalid = self.total_invalid_starts.load(Ordering::Relaxed);
        let attempts = assembled + invalid;
        let asm_total = self.total_assembly_time_us.load(Ordering::Relaxed) as f64 / 1000.0; // ms
        let asm_max = self.max_assembly_time_us.load(Ordering::Relaxed) as f64 / 1000.0; // ms
        let pieces = self.total_pieces_committed.load(Ordering::Relaxed);

        let placed = self.total_chunks_placed.load(Ordering::Relaxed);
        let place_time = self.total_placement_time_us.load(Ordering::Relaxed) as f64 / 1000.0;

        let loaded = self.total_chunks_loaded.load(Ordering::Relaxed);
        let load_time = self.total_load_time_us.load(Ordering::Relaxed) as f64 / 1000.0;
        let saved = self.total_chunks_saved.load(Ordering::Relaxed);
        let save_time = self.total_save_time_us.load(Ordering::Relaxed) as f64 / 1000.0;

        let scoped = self.total_scoped_reads.load(Ordering::Relaxed);
        let scoped_time = self.total_scoped_read_time_us.load(Ordering::Relaxed) as f64 / 1000.0;
        let feature_hits = self.total_feature_hits.load(Ordering::Relaxed);
        let feature_misses = self.total_feature_misses.load(Ordering::Relaxed);

        let hits = self.total_cache_hits.load(Ordering::Relaxed);
        let misses = self.total_cache_misses.load(Ordering::Relaxed);

        format!(
            "Cairn Benchmark Report\n\
             ======================\n\
             Configuration: {}\n\
             Session Duration: {:.2?}\n\n\
             [Assembly]\n\
             Structures Assembled: {} ({} invalid)\n\
             Avg Time: {:.2} ms/structure\n\
             Max Time: {:.2} ms\n\
             Pieces Committed: {}\n\
             Batches Rejected: {}\n\
             Depth Cutoffs: {}\n\n\
             [Placement]\n\
             Chunks Placed: {}\n\
             Avg Time: {:.2} ms/chunk\n\n\
             [Storage]\n\
             Chunks Loaded: {} ({:.2} ms/chunk)\n\
             Chunks Saved: {} ({:.2} ms/chunk)\n\
             Cache Hits: {}\n\
             Cache Misses: {}\n\
             Cache Hit Rate: {:.1}%\n\n\
             [Structure Check]\n\
             Loaded Hits: {}\n\
             Scoped Reads: {} ({} failed, {:.2} ms/read)\n\
             Legacy Upgrades: {}\n\
             Feature Checks: {} hits / {} computed ({:.1}% hit rate)\n\
             Speculative Entries Invalidated: {}\n",
            self.config_summary,
            uptime,
            assembled, invalid,
            avg(asm_total, attempts), asm_max,
            pieces,
            self.total_batches_rejected.load(Ordering::Relaxed),
            self.total_depth_cutoffs.load(Ordering::Relaxed),
            placed, avg(place_time, placed),
            loaded, avg(load_time, loaded),
            saved, avg(save_time, saved),
            hits, misses, rate(hits, misses),
            self.total_loaded_hits.load(Ordering::Relaxed),
            scoped, self.total_scoped_read_failures.load(Ordering::Relaxed), avg(scoped_time, scoped),
            self.total_legacy_upgrades.load(Ordering::Relaxed),
            feature_hits, feature_misses, rate(feature_hits, feature_misses),
            self.total_invalidations.load(Ordering::Relaxed),
        )
    }
}
