//! In-memory vector index with brute-force cosine distance.
//!
//! Serves the same `KnnSearch` contract as the RediSearch client and reports
//! the same metric (`1 - cosine similarity`), so thresholds carry over. Used
//! for offline sessions straight from the embedding artifact, and in tests.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use ghost_core::error::GhostError;
use ghost_core::types::{Candidate, TextBlock};

use crate::index::KnnSearch;

/// Thread-safe brute-force index over text blocks.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    blocks: Arc<RwLock<Vec<TextBlock>>>,
    dimensions: usize,
}

impl MemoryIndex {
    /// Create an empty index for vectors of the given dimension.
    pub fn new(dimensions: usize) -> Self {
        Self {
            blocks: Arc::new(RwLock::new(Vec::new())),
            dimensions,
        }
    }

    /// Build an index from an embedded corpus. All blocks must share one dimension.
    pub fn from_blocks(blocks: Vec<TextBlock>) -> Result<Self, GhostError> {
        let dimensions = blocks.first().map(TextBlock::dimensions).unwrap_or(0);
        let index = Self::new(dimensions);
        for block in blocks {
            index.insert(block)?;
        }
        Ok(index)
    }

    /// Insert a block, replacing any block with the same id.
    pub fn insert(&self, block: TextBlock) -> Result<(), GhostError> {
        if block.dimensions() != self.dimensions {
            return Err(GhostError::Config(format!(
                "block {} has dimension {}, index expects {}",
                block.id,
                block.dimensions(),
                self.dimensions
            )));
        }
        let mut blocks = self
            .blocks
            .write()
            .map_err(|e| GhostError::Transport(format!("Lock poisoned: {}", e)))?;
        blocks.retain(|b| b.id != block.id);
        blocks.push(block);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blocks.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KnnSearch for MemoryIndex {
    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<Candidate>, GhostError> {
        let blocks = self
            .blocks
            .read()
            .map_err(|e| GhostError::Transport(format!("Lock poisoned: {}", e)))?;

        let mut hits: Vec<Candidate> = blocks
            .iter()
            .map(|b| Candidate::new(b.text.clone(), cosine_distance(vector, &b.vector)))
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// `1 - cosine similarity`, in `[0, 2]`.
///
/// Mismatched lengths or a zero vector are treated as similarity 0 (distance 1).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 1.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (mag_a * mag_b)
}
