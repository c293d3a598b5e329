use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;

use cairn_benchmark::BenchmarkMetrics;

use crate::ChunkStorage;

/// LRU read cache in front of another backend. Writes go through and refresh
/// the cached copy.
pub struct CachedStorage {
    inner: Arc<dyn ChunkStorage>,
    cache: Mutex<LruCache<(i32, i32), Arc<Vec<u8>>>>,
    metrics: Option<Arc<BenchmarkMetrics>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn ChunkStorage>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<BenchmarkMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn cached(&self, key: (i32, i32)) -> Option<Arc<Vec<u8>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key).cloned()
    }

    fn remember(&self, key: (i32, i32), data: Vec<u8>) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).put(key, Arc::new(data));
    }
}

#[async_trait]
impl ChunkStorage for CachedStorage {
    async fn save_chunk(&self, x: i32, z: i32, data: &[u8]) -> Result<()> {
        let started = Instant::now();
        self.inner.save_chunk(x, z, data).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_save(started.elapsed());
        }
        self.remember((x, z), data.to_vec());
        Ok(())
    }

    async fn load_chunk(&self, x: i32, z: i32) -> Result<Option<Vec<u8>>> {
        if let Some(data) = self.cached((x, z)) {
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_hit();
            }
            return Ok(Some(data.as_ref().clone()));
        }

        let started = Instant::now();
        let loaded = self.inner.load_chunk(x, z).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss();
            metrics.record_load(started.elapsed());
        }
        if let Some(data) = &loaded {
            self.remember((x, z), data.clone());
        }
        Ok(loaded)
    }
}
