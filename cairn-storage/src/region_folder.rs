use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use cairn_anvil::region::region_file_name;
use cairn_anvil::{ChunkPos, CompressionScheme, RegionFile};

use crate::ChunkStorage;

/// Anvil region files in one directory, the layout of a world's `region/`
/// folder. Writers to the same region file are serialized.
pub struct RegionFolderStorage {
    dir: PathBuf,
    scheme: CompressionScheme,
    locks: DashMap<(i32, i32), Arc<Mutex<()>>>,
}

impl RegionFolderStorage {
    pub fn new(dir: impl Into<PathBuf>, scheme: CompressionScheme) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create region folder {}", dir.display()))?;
        Ok(Self {
            dir,
            scheme,
            locks: DashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn region_path(&self, region_x: i32, region_z: i32) -> PathBuf {
        self.dir.join(region_file_name(region_x, region_z))
    }

    fn lock_for(&self, region: (i32, i32)) -> Arc<Mutex<()>> {
        self.locks.entry(region).or_default().clone()
    }

    async fn open_region(&self, path: PathBuf) -> Result<Option<RegionFile>> {
        tokio::task::spawn_blocking(move || RegionFile::open(&path))
            .await
            .context("Region reader task failed")?
    }
}

#[async_trait]
impl ChunkStorage for RegionFolderStorage {
    async fn save_chunk(&self, x: i32, z: i32, data: &[u8]) -> Result<()> {
        let pos = ChunkPos::new(x, z);
        let (region_x, region_z) = pos.region();
        let (rel_x, rel_z) = pos.region_local();
        let path = self.region_path(region_x, region_z);

        let lock = self.lock_for((region_x, region_z));
        let _guard = lock.lock().await;

        let mut region = self.open_region(path.clone()).await?.unwrap_or_else(RegionFile::new);
        region
            .write_chunk(rel_x, rel_z, data, self.scheme)
            .with_context(|| format!("Failed to write chunk {}", pos))?;
        tokio::task::spawn_blocking(move || region.save(&path))
            .await
            .context("Region writer task failed")??;
        Ok(())
    }

    async fn load_chunk(&self, x: i32, z: i32) -> Result<Option<Vec<u8>>> {
        let pos = ChunkPos::new(x, z);
        let (region_x, region_z) = pos.region();
        let (rel_x, rel_z) = pos.region_local();
        let Some(region) = self.open_region(self.region_path(region_x, region_z)).await? else {
            return Ok(None);
        };
        region
            .read_chunk(rel_x, rel_z)
            .with_context(|| format!("Failed to read chunk {}", pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunks_land_in_their_region_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RegionFolderStorage::new(dir.path(), CompressionScheme::Zlib).unwrap();

        storage.save_chunk(0, 0, b"origin").await.unwrap();
        storage.save_chunk(31, 31, b"corner").await.unwrap();
        storage.save_chunk(-1, 5, b"west").await.unwrap();

        assert!(dir.path().join("r.0.0.mca").exists());
        assert!(dir.path().join("r.-1.0.mca").exists());
        assert_eq!(storage.load_chunk(0, 0).await.unwrap().as_deref(), Some(&b"origin"[..]));
        assert_eq!(storage.load_chunk(31, 31).await.unwrap().as_deref(), Some(&b"corner"[..]));
        assert_eq!(storage.load_chunk(-1, 5).await.unwrap().as_deref(), Some(&b"west"[..]));
        assert_eq!(storage.load_chunk(1, 0).await.unwrap(), None);
        assert_eq!(storage.load_chunk(100, 100).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_writers_to_one_region() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RegionFolderStorage::new(dir.path(), CompressionScheme::Gzip).unwrap());

        let mut tasks = Vec::new();
        for i in 0..8 {
            let storage = storage.clone();
            tasks.push(tokio::spawn(async move {
                storage.save_chunk(i, 0, format!("chunk {}", i).as_bytes()).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for i in 0..8 {
            let data = storage.load_chunk(i, 0).await.unwrap().unwrap();
            assert_eq!(data, format!("chunk {}", i).into_bytes());
        }
    }

    #[tokio::test]
    async fn test_corrupt_region_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RegionFolderStorage::new(dir.path(), CompressionScheme::Zlib).unwrap();
        std::fs::write(storage.region_path(0, 0), b"not a region").unwrap();
        assert!(storage.load_chunk(0, 0).await.is_err());
    }
}
