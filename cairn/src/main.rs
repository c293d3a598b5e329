use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use cairn_anvil::CompressionScheme;
use cairn_benchmark::BenchmarkMetrics;
use cairn_gen::{ChunkPos, FlatGenerator, WorldGenerator};
use cairn_storage::postgres::PostgresStorage;
use cairn_storage::{CachedStorage, ChunkStorage, LegacyStructureUpgrader, RegionFolderStorage, StorageMode};

mod session;
mod world;

use session::{ClaimOutcome, GenerateOutcome, WorldSession};

const CONNECT_RETRIES: u32 = 30;

#[derive(Parser)]
#[command(name = "cairn", about = "Structure generation and start lookup over stored Minecraft worlds")]
pub struct Args {
    /// Region folder (`.mca` files) to use as the chunk store, takes
    /// precedence over the database
    #[arg(short, long)]
    pub world: Option<PathBuf>,

    /// Postgres chunk store, used when no region folder is given
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Store zlib-compressed chunks in Postgres
    #[arg(long)]
    pub compressed: bool,

    /// Folder holding legacy `<Kind>.dat` structure files
    #[arg(long)]
    pub legacy_dir: Option<PathBuf>,

    #[arg(short, long, default_value = "0")]
    pub seed: u64,

    /// Grass layer height of the flat terrain
    #[arg(long, default_value = "64")]
    pub surface: i32,

    /// Chunks kept in memory between reads, 0 disables the cache
    #[arg(long, default_value = "256")]
    pub cache_size: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate and place the start of a structure rooted in a chunk
    Generate {
        #[arg(short, long)]
        kind: String,
        #[arg(long, allow_hyphen_values = true)]
        chunk_x: i32,
        #[arg(long, allow_hyphen_values = true)]
        chunk_z: i32,
    },
    /// Ask whether a structure start is rooted in a chunk
    Check {
        #[arg(short, long)]
        kind: String,
        #[arg(long, allow_hyphen_values = true)]
        chunk_x: i32,
        #[arg(long, allow_hyphen_values = true)]
        chunk_z: i32,
        /// Report starts that already have references as referenced
        #[arg(long)]
        skip_referenced: bool,
        /// Add a reference to the start if it can take one
        #[arg(long)]
        claim: bool,
    },
    /// Print the structure data of a stored chunk as JSON
    Inspect {
        #[arg(long, allow_hyphen_values = true)]
        chunk_x: i32,
        #[arg(long, allow_hyphen_values = true)]
        chunk_z: i32,
    },
    /// Move legacy structure starts into the listed chunks
    Migrate {
        /// Chunk as `x,z`; repeatable
        #[arg(long = "chunk", value_parser = parse_chunk, allow_hyphen_values = true)]
        chunks: Vec<ChunkPos>,
    },
}

fn parse_chunk(value: &str) -> Result<ChunkPos, String> {
    let (x, z) = value.split_once(',').ok_or_else(|| format!("expected x,z, got '{}'", value))?;
    let x = x.trim().parse().map_err(|e| format!("bad chunk x '{}': {}", x, e))?;
    let z = z.trim().parse().map_err(|e| format!("bad chunk z '{}': {}", z, e))?;
    Ok(ChunkPos::new(x, z))
}

async fn connect_postgres(database_url: &str, mode: StorageMode) -> Result<PostgresStorage> {
    println!("Connecting to storage at {}...", database_url);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match PostgresStorage::new(database_url, mode).await {
            Ok(storage) => return Ok(storage),
            Err(e) if attempt < CONNECT_RETRIES => {
                eprintln!("Failed to connect to storage: {}. Retrying {}/{} in 2s...", e, attempt, CONNECT_RETRIES);
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            }
            Err(e) => return Err(e.context(format!("Could not connect to storage after {} retries", CONNECT_RETRIES))),
        }
    }
}

async fn open_storage(args: &Args, metrics: &Arc<BenchmarkMetrics>) -> Result<Arc<dyn ChunkStorage>> {
    let backend: Arc<dyn ChunkStorage> = match (&args.world, &args.database_url) {
        (Some(dir), _) => {
            println!("Using region folder {:?}", dir);
            Arc::new(RegionFolderStorage::new(dir, CompressionScheme::Zlib)?)
        }
        (None, Some(url)) => {
            let mode = if args.compressed { StorageMode::Compressed } else { StorageMode::Raw };
            Arc::new(connect_postgres(url, mode).await?)
        }
        (None, None) => bail!("No chunk store given, pass --world <DIR> or --database-url / DATABASE_URL"),
    };

    if args.cache_size == 0 {
        return Ok(backend);
    }
    Ok(Arc::new(CachedStorage::new(backend, args.cache_size).with_metrics(metrics.clone())))
}

async fn run(args: Args) -> Result<()> {
    let metrics = Arc::new(BenchmarkMetrics::new(format!(
        "seed={}, surface={}, cache={}",
        args.seed, args.surface, args.cache_size
    )));
    let storage = open_storage(&args, &metrics).await?;
    let generator: Arc<dyn WorldGenerator> = Arc::new(FlatGenerator::new(args.surface));
    let upgrader = match &args.legacy_dir {
        Some(dir) => Some(Arc::new(LegacyStructureUpgrader::open(dir)?)),
        None => None,
    };
    let session = WorldSession::new(storage, generator, args.seed, upgrader, metrics.clone());

    match args.command {
        Command::Generate { kind, chunk_x, chunk_z } => {
            let kind = session.resolve_kind(&kind)?;
            let chunk = ChunkPos::new(chunk_x, chunk_z);
            match session.generate(&kind, chunk).await? {
                GenerateOutcome::NoStart { candidate } => {
                    println!("No {} starts in {}; the nearest candidate chunk is {}", kind, chunk, candidate)
                }
                GenerateOutcome::Invalid => println!("{} was considered for {} but nothing fit", kind, chunk),
                GenerateOutcome::AlreadyPlaced => println!("{} in {} is already placed", kind, chunk),
                GenerateOutcome::Placed { pieces, chunks, bounds } => {
                    println!("Placed {} in {}: {} pieces over {} chunks, bounds {:?}", kind, chunk, pieces, chunks, bounds)
                }
            }
        }
        Command::Check { kind, chunk_x, chunk_z, skip_referenced, claim } => {
            let kind = session.resolve_kind(&kind)?;
            let chunk = ChunkPos::new(chunk_x, chunk_z);
            let result = session.check(&kind, chunk, skip_referenced).await;
            println!("{} in {}: {:?}", kind, chunk, result);
            if claim {
                match session.claim(&kind, chunk).await? {
                    ClaimOutcome::Claimed { references } => println!("Claimed, {} references now", references),
                    ClaimOutcome::Exhausted => println!("Start has no references left"),
                    ClaimOutcome::NoStart => println!("Nothing to claim"),
                }
            }
        }
        Command::Inspect { chunk_x, chunk_z } => {
            let chunk = ChunkPos::new(chunk_x, chunk_z);
            match session.inspect(chunk).await? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => println!("Chunk {} is not stored", chunk),
            }
        }
        Command::Migrate { chunks } => {
            let stats = session.migrate(&chunks).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    session.finish()?;
    println!("{}", metrics.generate_report());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    run(Args::parse()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk() {
        assert_eq!(parse_chunk("3,-4"), Ok(ChunkPos::new(3, -4)));
        assert_eq!(parse_chunk(" -1 , 2"), Ok(ChunkPos::new(-1, 2)));
        assert!(parse_chunk("3").is_err());
        assert!(parse_chunk("a,1").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "cairn", "--world", "/tmp/w", "--seed", "7", "check", "-k", "end_city", "--chunk-x", "-3", "--chunk-z", "5",
            "--claim",
        ])
        .unwrap();
        assert_eq!(args.seed, 7);
        assert!(matches!(args.command, Command::Check { chunk_x: -3, chunk_z: 5, claim: true, skip_referenced: false, .. }));

        let args = Args::try_parse_from(["cairn", "migrate", "--chunk", "1,2", "--chunk", "-5,0"]).unwrap();
        let Command::Migrate { chunks } = args.command else {
            panic!("expected migrate");
        };
        assert_eq!(chunks, [ChunkPos::new(1, 2), ChunkPos::new(-5, 0)]);
    }

    #[tokio::test]
    async fn test_run_against_region_folder() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            "cairn",
            "--world",
            dir.path().to_str().unwrap(),
            "--cache-size",
            "0",
            "inspect",
            "--chunk-x",
            "0",
            "--chunk-z",
            "0",
        ])
        .unwrap();
        run(args).await.unwrap();
    }
}
