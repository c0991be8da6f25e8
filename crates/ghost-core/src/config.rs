use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{GhostError, Result};
use crate::types::DistanceMetric;

/// Top-level configuration for Ghost.
///
/// Loaded from `~/.ghost/config.toml` by default. Every section falls back
/// to its defaults, so a partial (or empty) file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GhostConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl GhostConfig {
    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GhostConfig = toml::from_str(&content)?;
        config.validate()?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Like [`GhostConfig::load`], but any failure yields the defaults (logged).
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config unusable; using defaults");
                Self::default()
            }
        }
    }

    /// Write as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimensions == 0 {
            return Err(GhostError::Config(
                "embedding.dimensions must be positive".to_string(),
            ));
        }
        if self.retrieval.knn_k == 0 {
            return Err(GhostError::Config(
                "retrieval.knn_k must be positive".to_string(),
            ));
        }
        if self.retrieval.max_results == 0 {
            return Err(GhostError::Config(
                "retrieval.max_results must be positive".to_string(),
            ));
        }
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !non_negative(self.retrieval.max_distance) || !non_negative(self.retrieval.margin) {
            return Err(GhostError::Config(
                "retrieval.max_distance and retrieval.margin must be non-negative".to_string(),
            ));
        }
        if self.generation.timeout_secs == 0 {
            return Err(GhostError::Config(
                "generation.timeout_secs must be positive".to_string(),
            ));
        }
        if self.index.index_name.trim().is_empty() {
            return Err(GhostError::Config(
                "index.index_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default tracing filter when neither `--log-level` nor `RUST_LOG` is set.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

/// Sentence-transformer model used for both ingestion and queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model name.
    pub model_name: String,
    /// Directory containing `model.onnx` and `tokenizer.json`.
    pub model_dir: String,
    /// Embedding dimension.
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: "all-MiniLM-L6-v2".to_string(),
            model_dir: "~/.ghost/models/all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
        }
    }
}

/// RediSearch vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub redis_url: String,
    pub index_name: String,
    /// Hash key prefix covered by the index.
    pub key_prefix: String,
    pub vector_field: String,
    pub text_field: String,
    /// Alias under which the KNN distance is returned.
    pub score_alias: String,
    pub distance_metric: DistanceMetric,
    /// Query dialect version.
    pub dialect: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            index_name: "ghost_idx".to_string(),
            key_prefix: "block:".to_string(),
            vector_field: "embedding".to_string(),
            text_field: "text".to_string(),
            score_alias: "vector_score".to_string(),
            distance_metric: DistanceMetric::Cosine,
            dialect: 2,
        }
    }
}

/// Hybrid retrieval tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Neighbours requested from the index.
    pub knn_k: usize,
    /// Candidates whose energy differs from the query by this much or more are filtered.
    pub energy_tolerance: usize,
    /// A best distance above this is a no-match.
    pub max_distance: f64,
    /// Candidates must be strictly closer than `best + margin`.
    pub margin: f64,
    /// Cap on the selection size.
    pub max_results: usize,
    /// Distance assumed when an index entry carries none.
    pub missing_distance: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            knn_k: 30,
            energy_tolerance: 10,
            max_distance: 0.8,
            margin: 0.05,
            max_results: 5,
            missing_distance: 1.0,
        }
    }
}

/// Ollama generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Maximum number of tokens to generate.
    pub num_predict: u32,
    /// Upper bound on a single generation round trip.
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "phi3:mini".to_string(),
            temperature: 0.3,
            num_predict: 40,
            timeout_secs: 60,
        }
    }
}

/// Artifact locations for the `embed` and `load` commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// JSON array of raw message strings.
    pub blocks_path: String,
    /// JSON array of `{id, text, vector}` records.
    pub embedded_path: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            blocks_path: "blocks.json".to_string(),
            embedded_path: "embedded_blocks.json".to_string(),
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}
