//! Query turn handling.
//!
//! `GhostSession` holds the long-lived handles (encoder, index, generator)
//! and runs one query at a time through encode -> KNN -> energy filter ->
//! selection -> generation. A turn never returns an error: every failure is
//! folded into the `TurnOutcome`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use ghost_core::config::RetrievalConfig;
use ghost_core::error::GhostError;
use ghost_core::types::QueryContext;
use ghost_vector::embedding::DynEmbeddingService;
use ghost_vector::index::KnnSearch;

use crate::energy::energy_score;
use crate::generation::Generator;
use crate::response::TurnOutcome;
use crate::selection::{filter_by_energy, Selection, Selector};

/// Shared state for the query loop, built once per process.
pub struct GhostSession {
    embedder: Arc<dyn DynEmbeddingService>,
    index: Arc<dyn KnnSearch>,
    generator: Arc<dyn Generator>,
    config: RetrievalConfig,
    selector: Selector,
}

impl std::fmt::Debug for GhostSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GhostSession")
            .field("dimensions", &self.embedder.dimensions())
            .field("config", &self.config)
            .finish()
    }
}

impl GhostSession {
    /// Assemble a session. Fails if the encoder and the index disagree on
    /// the vector dimension.
    pub fn new(
        embedder: Arc<dyn DynEmbeddingService>,
        index: Arc<dyn KnnSearch>,
        generator: Arc<dyn Generator>,
        config: RetrievalConfig,
    ) -> Result<Self, GhostError> {
        let encoder_dims = embedder.dimensions();
        let index_dims = index.dimensions();
        if encoder_dims != index_dims {
            return Err(GhostError::Config(format!(
                "query encoder produces {}-dimensional vectors but the index holds {}",
                encoder_dims, index_dims
            )));
        }

        info!(dimensions = encoder_dims, k = config.knn_k, "Session ready");
        let selector = Selector::from_config(&config);
        Ok(Self {
            embedder,
            index,
            generator,
            config,
            selector,
        })
    }

    /// Score and embed the raw query.
    pub async fn encode(&self, raw_query: &str) -> Result<QueryContext, GhostError> {
        let query_vector = self.embedder.embed_boxed(raw_query).await?;
        Ok(QueryContext {
            raw_query: raw_query.to_string(),
            energy: energy_score(raw_query),
            query_vector,
        })
    }

    /// Run retrieval and selection without generating a reply.
    ///
    /// A malformed index reply is treated as an empty candidate set; encoder
    /// and transport failures are returned.
    pub async fn retrieve(&self, raw_query: &str) -> Result<Selection, GhostError> {
        let query = self.encode(raw_query).await?;

        let candidates = match self.index.knn(&query.query_vector, self.config.knn_k).await {
            Ok(candidates) => candidates,
            Err(GhostError::Parse(reason)) => {
                warn!(%reason, "Discarding malformed index reply");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        debug!(
            candidates = candidates.len(),
            query_energy = query.energy,
            "KNN candidates retrieved"
        );

        let filtered = filter_by_energy(candidates, query.energy, self.config.energy_tolerance);
        Ok(self.selector.select(filtered))
    }

    /// Handle one query end to end.
    pub async fn handle_turn(&self, raw_query: &str) -> TurnOutcome {
        let selection = match self.retrieve(raw_query).await {
            Ok(selection) => selection,
            Err(e) => {
                warn!(error = %e, "Retrieval failed");
                return TurnOutcome::RetrievalFailed {
                    reason: e.to_string(),
                };
            }
        };

        let result = match selection {
            Selection::Matched(result) => result,
            Selection::NoRelevant { best_distance } => {
                debug!(best_distance, "No candidate within threshold");
                return TurnOutcome::NoRelevantMemories { best_distance };
            }
            Selection::Empty => return TurnOutcome::NoMemoriesFound,
        };

        let Some(anchor) = result.anchor().map(|c| c.text.clone()) else {
            return TurnOutcome::NoMemoriesFound;
        };

        match self.generator.generate(&anchor, raw_query).await {
            Ok(reply) => TurnOutcome::Replied { anchor, reply },
            Err(e) => {
                warn!(error = %e, "Generation failed");
                let reason = match e {
                    GhostError::Generation(reason) => reason,
                    other => other.to_string(),
                };
                TurnOutcome::GenerationFailed { anchor, reason }
            }
        }
    }
}
