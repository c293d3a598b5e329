use crate::{ChunkStorage, StorageMode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use cairn_anvil::CompressionScheme;
use cairn_anvil::compression::{compress, decompress};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

pub struct PostgresStorage {
    pool: Pool,
    mode: StorageMode,
}

impl PostgresStorage {
    pub async fn new(connection_string: &str, mode: StorageMode) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.url = Some(connection_string.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create Postgres pool")?;

        // Ensure connections work and schema exists
        let storage = Self { pool, mode };
        storage.init_schema().await?;

        Ok(storage)
    }

    fn table(&self) -> &'static str {
        match self.mode {
            StorageMode::Raw => "chunks_raw",
            StorageMode::Compressed => "chunks_zlib",
        }
    }

    async fn init_schema(&self) -> Result<()> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                x INT,
                z INT,
                data BYTEA,
                updated_at TIMESTAMP DEFAULT NOW(),
                PRIMARY KEY (x, z)
            );",
            self.table()
        );
        client
            .batch_execute(&ddl)
            .await
            .with_context(|| format!("Failed to init {:?} schema", self.mode))?;
        Ok(())
    }
}

#[async_trait]
impl ChunkStorage for PostgresStorage {
    async fn save_chunk(&self, x: i32, z: i32, data: &[u8]) -> Result<()> {
        let payload = match self.mode {
            StorageMode::Raw => data.to_vec(),
            StorageMode::Compressed => compress(data, CompressionScheme::Zlib)?,
        };
        let client = self.pool.get().await.context("Failed to get DB connection")?;

        // Upsert logic
        let sql = format!(
            "INSERT INTO {} (x, z, data, updated_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (x, z) DO UPDATE SET data = $3, updated_at = NOW()",
            self.table()
        );
        client
            .execute(sql.as_str(), &[&x, &z, &payload])
            .await
            .with_context(|| format!("Failed to upsert chunk [{}, {}]", x, z))?;

        Ok(())
    }

    async fn load_chunk(&self, x: i32, z: i32) -> Result<Option<Vec<u8>>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;

        let sql = format!("SELECT data FROM {} WHERE x = $1 AND z = $2", self.table());
        let rows = client
            .query(sql.as_str(), &[&x, &z])
            .await
            .with_context(|| format!("Failed to query chunk [{}, {}]", x, z))?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let data: Vec<u8> = row.get(0);
        match self.mode {
            StorageMode::Raw => Ok(Some(data)),
            StorageMode::Compressed => Ok(Some(decompress(&data, CompressionScheme::Zlib)?)),
        }
    }
}
