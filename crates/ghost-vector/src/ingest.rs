//! Corpus ingestion: raw messages to embedded text blocks.
//!
//! The ingestion artifact is a JSON array of strings. Each entry is trimmed,
//! empty entries are skipped, and the rest are embedded in order. The
//! embedding artifact is a JSON array of [`TextBlock`] records whose `id` is
//! the 0-based position among the non-empty entries.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ghost_core::error::{GhostError, Result};
use ghost_core::types::TextBlock;

use crate::embedding::EmbeddingService;

/// Summary of an embedded corpus, used to sanity-check it before loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingReport {
    pub count: usize,
    /// Every vector length observed; a healthy corpus has exactly one.
    pub dimensions: BTreeSet<usize>,
    pub contains_nan: bool,
}

impl EmbeddingReport {
    pub fn from_blocks(blocks: &[TextBlock]) -> Self {
        Self {
            count: blocks.len(),
            dimensions: blocks.iter().map(TextBlock::dimensions).collect(),
            contains_nan: blocks.iter().any(|b| b.vector.iter().any(|v| v.is_nan())),
        }
    }

    /// The single corpus dimension, or a configuration error if the corpus is
    /// empty, mixed, or contains NaN.
    pub fn validate(&self) -> Result<usize> {
        if self.contains_nan {
            return Err(GhostError::Config(
                "embedded corpus contains NaN values".to_string(),
            ));
        }
        let mut dims = self.dimensions.iter();
        match (dims.next(), dims.next()) {
            (Some(&d), None) if d > 0 => Ok(d),
            (None, _) => Err(GhostError::Config("embedded corpus is empty".to_string())),
            _ => Err(GhostError::Config(format!(
                "embedded corpus has inconsistent dimensions: {:?}",
                self.dimensions
            ))),
        }
    }
}

/// Read the ingestion artifact.
pub fn read_raw_blocks(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let blocks: Vec<String> = serde_json::from_str(&content)?;
    info!(path = %path.display(), count = blocks.len(), "Loaded raw blocks");
    Ok(blocks)
}

/// Read the embedding artifact.
pub fn read_embedded(path: &Path) -> Result<Vec<TextBlock>> {
    let content = std::fs::read_to_string(path)?;
    let blocks: Vec<TextBlock> = serde_json::from_str(&content)?;
    info!(path = %path.display(), count = blocks.len(), "Loaded embedded blocks");
    Ok(blocks)
}

/// Write the embedding artifact.
pub fn write_embedded(path: &Path, blocks: &[TextBlock]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string(blocks)?;
    std::fs::write(path, content)?;
    info!(path = %path.display(), count = blocks.len(), "Saved embedded blocks");
    Ok(())
}

/// Batch embedding of a raw corpus.
pub struct IngestPipeline<E: EmbeddingService> {
    embedder: E,
}

impl<E: EmbeddingService> IngestPipeline<E> {
    pub fn new(embedder: E) -> Self {
        Self { embedder }
    }

    /// Trim, drop empties, and embed. Ids are assigned densely from 0.
    pub async fn embed_corpus(&self, raw: &[String]) -> Result<Vec<TextBlock>> {
        let mut blocks = Vec::with_capacity(raw.len());
        for text in raw.iter().map(|t| t.trim()) {
            if text.is_empty() {
                debug!(position = blocks.len(), "Skipping empty block");
                continue;
            }
            let vector = self.embedder.embed(text).await?;
            blocks.push(TextBlock {
                id: blocks.len() as u64,
                text: text.to_string(),
                vector,
            });
        }

        let skipped = raw.len() - blocks.len();
        if skipped > 0 {
            warn!(skipped, "Skipped empty blocks");
        }
        Ok(blocks)
    }

    /// Embed the ingestion artifact at `input` and write the result to `output`.
    pub async fn run(&self, input: &Path, output: &Path) -> Result<EmbeddingReport> {
        let raw = read_raw_blocks(input)?;
        let blocks = self.embed_corpus(&raw).await?;
        let report = EmbeddingReport::from_blocks(&blocks);
        let dimensions = report.validate()?;

        write_embedded(output, &blocks)?;
        info!(
            count = report.count,
            dimensions,
            "Embedding artifact written"
        );
        Ok(report)
    }
}
