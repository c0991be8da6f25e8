//! Ghost application binary - composition root.
//!
//! 1. Resolve and load configuration from TOML
//! 2. Initialise tracing (stderr) with the resolved filter
//! 3. Dispatch to the subcommand:
//!    - `chat`: build the session once, then answer one query per line
//!    - `embed`: ingestion artifact -> embedding artifact
//!    - `load`: embedding artifact -> RediSearch index
//!
//! Configuration errors abort before the query loop starts. Once the loop
//! runs, failures are reported per turn and never end the session.

mod cli;
mod repl;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use ghost_chat::{GhostSession, OllamaGenerator};
use ghost_core::config::{expand_home, GhostConfig};
use ghost_core::error::{GhostError, Result};
use ghost_vector::embedding::{EmbeddingService, OnnxEmbeddingService};
use ghost_vector::ingest::{read_embedded, EmbeddingReport, IngestPipeline};
use ghost_vector::{KnnSearch, MemoryIndex, RedisVectorIndex};

use cli::{CliArgs, Command};

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// A missing config file means defaults; a present but broken one is fatal.
fn load_config(path: &Path) -> Result<GhostConfig> {
    if path.exists() {
        GhostConfig::load(path)
    } else {
        Ok(GhostConfig::default())
    }
}

fn load_embedder(config: &GhostConfig) -> Result<OnnxEmbeddingService> {
    let model_dir = expand_home(&config.embedding.model_dir);
    let embedder = OnnxEmbeddingService::from_directory(&model_dir)?;
    if embedder.dimensions() != config.embedding.dimensions {
        tracing::warn!(
            model = %config.embedding.model_name,
            configured = config.embedding.dimensions,
            actual = embedder.dimensions(),
            "Model dimension differs from configuration; using the model's"
        );
    }
    tracing::info!(
        model = %config.embedding.model_name,
        dimensions = embedder.dimensions(),
        "Query encoder loaded"
    );
    Ok(embedder)
}

async fn run_chat(config: GhostConfig, in_memory: Option<PathBuf>) -> Result<()> {
    let embedder = Arc::new(load_embedder(&config)?);

    let (index, backend): (Arc<dyn KnnSearch>, &str) = match in_memory {
        Some(path) => {
            let blocks = read_embedded(&path)?;
            EmbeddingReport::from_blocks(&blocks).validate()?;
            let index: Arc<dyn KnnSearch> = Arc::new(MemoryIndex::from_blocks(blocks)?);
            (index, "in-memory")
        }
        None => {
            let mut redis =
                RedisVectorIndex::connect(config.index.clone(), config.embedding.dimensions)
                    .await?
                    .with_missing_distance(config.retrieval.missing_distance);
            redis.verify_schema().await?;
            let index: Arc<dyn KnnSearch> = Arc::new(redis);
            (index, "Redis-backed")
        }
    };

    let generator = Arc::new(OllamaGenerator::new(config.generation.clone())?);
    let session = GhostSession::new(embedder, index, generator, config.retrieval.clone())?;

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("Ghost ({}) is awake. Empty input to exit.\n", backend).as_bytes())
        .await?;

    let turns = repl::run_loop(&session, BufReader::new(tokio::io::stdin()), &mut stdout).await?;

    tracing::info!(turns, "Session ended");
    Ok(())
}

async fn run_embed(config: GhostConfig, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let input = input.unwrap_or_else(|| PathBuf::from(&config.ingest.blocks_path));
    let output = output.unwrap_or_else(|| PathBuf::from(&config.ingest.embedded_path));

    let embedder = load_embedder(&config)?;
    let report = IngestPipeline::new(embedder).run(&input, &output).await?;

    println!(
        "Embedded {} blocks ({:?} dims) into {}",
        report.count,
        report.dimensions,
        output.display()
    );
    Ok(())
}

async fn run_load(config: GhostConfig, input: Option<PathBuf>) -> Result<()> {
    let input = input.unwrap_or_else(|| PathBuf::from(&config.ingest.embedded_path));

    let blocks = read_embedded(&input)?;
    let dimensions = EmbeddingReport::from_blocks(&blocks).validate()?;
    if dimensions != config.embedding.dimensions {
        return Err(GhostError::Config(format!(
            "{} holds {}-dimensional vectors but the encoder is configured for {}",
            input.display(),
            dimensions,
            config.embedding.dimensions
        )));
    }

    let mut index = RedisVectorIndex::connect(config.index.clone(), dimensions).await?;
    let created = index.ensure_index().await?;
    let written = index.load_blocks(&blocks).await?;

    println!(
        "Loaded {} blocks into index {}{}",
        written,
        index.config().index_name,
        if created { " (created)" } else { "" }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let loaded = load_config(&config_file);
    let config_level = loaded
        .as_ref()
        .map(|c| c.general.log_level.clone())
        .unwrap_or_else(|_| "warn".to_string());
    init_tracing(&args.resolve_log_filter(&config_level));

    tracing::info!("Starting Ghost v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %config_file.display(), error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    if let Some(url) = args.redis_url.clone() {
        config.index.redis_url = url;
    }
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    let result = match args.command() {
        Command::Chat { in_memory } => run_chat(config, in_memory).await,
        Command::Embed { input, output } => run_embed(config, input, output).await,
        Command::Load { input } => run_load(config, input).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, fatal = e.is_fatal(), "Ghost stopped");
        return Err(e.into());
    }
    Ok(())
}
