use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ChunkStorage;

/// Volatile backend for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    chunks: RwLock<HashMap<(i32, i32), Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

#[async_trait]
impl ChunkStorage for MemoryStorage {
    async fn save_chunk(&self, x: i32, z: i32, data: &[u8]) -> Result<()> {
        self.chunks.write().await.insert((x, z), data.to_vec());
        Ok(())
    }

    async fn load_chunk(&self, x: i32, z: i32) -> Result<Option<Vec<u8>>> {
        Ok(self.chunks.read().await.get(&(x, z)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_anvil::ChunkBuilder;

    #[tokio::test]
    async fn test_save_load() {
        let storage = MemoryStorage::new();
        assert!(storage.load_chunk(1, 2).await.unwrap().is_none());
        storage.save_chunk(1, 2, &[1, 2, 3]).await.unwrap();
        assert_eq!(storage.load_chunk(1, 2).await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_scan_reads_version() {
        let storage = MemoryStorage::new();
        let nbt = ChunkBuilder::new().build(0, 0, None).encode().unwrap();
        storage.save_chunk(0, 0, &nbt).await.unwrap();
        let scan = storage.scan_structures(0, 0).await.unwrap().unwrap();
        assert_eq!(scan.version(), cairn_anvil::nbt::get_data_version());
    }
}
