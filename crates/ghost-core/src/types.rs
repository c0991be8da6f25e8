//! Shared data model for the retrieval pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GhostError;

/// A corpus entry: one short message together with its embedding.
///
/// This is also the record format of the embedding artifact
/// (`embedded_blocks.json`). `id` is assigned at ingestion and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub id: u64,
    pub text: String,
    pub vector: Vec<f32>,
}

impl TextBlock {
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// A single KNN hit for the current turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    /// Index distance; lower is more similar.
    pub distance: f64,
}

impl Candidate {
    pub fn new(text: impl Into<String>, distance: f64) -> Self {
        Self {
            text: text.into(),
            distance,
        }
    }
}

/// Per-turn view of the incoming query.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub raw_query: String,
    pub energy: usize,
    pub query_vector: Vec<f32>,
}

/// The bounded, distance-ordered set of candidates chosen for a turn.
///
/// Construction goes through the selector in `ghost-chat`, which guarantees
/// ascending order, the absolute threshold on the best entry, the margin
/// window and the size cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionResult {
    candidates: Vec<Candidate>,
}

impl SelectionResult {
    /// Wrap an already ordered and windowed candidate list.
    pub fn from_ordered(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// The lowest-distance entry, used as the basis for the reply.
    pub fn anchor(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn best_distance(&self) -> Option<f64> {
        self.anchor().map(|c| c.distance)
    }

    pub fn texts(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.text.as_str()).collect()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Distance metric of the vector index.
///
/// The retrieval thresholds are calibrated for `Cosine` over L2-normalised
/// embeddings, where RediSearch reports `1 - cos(a, b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DistanceMetric {
    Cosine,
    L2,
    Ip,
}

impl DistanceMetric {
    /// Name used in `FT.CREATE ... DISTANCE_METRIC`.
    pub fn as_redis_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "COSINE",
            DistanceMetric::L2 => "L2",
            DistanceMetric::Ip => "IP",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_redis_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = GhostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COSINE" => Ok(DistanceMetric::Cosine),
            "L2" => Ok(DistanceMetric::L2),
            "IP" => Ok(DistanceMetric::Ip),
            other => Err(GhostError::Config(format!(
                "unknown distance metric: {}",
                other
            ))),
        }
    }
}
