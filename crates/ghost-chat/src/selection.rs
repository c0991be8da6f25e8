//! Energy filtering and distance-based selection.

use tracing::debug;

use ghost_core::config::RetrievalConfig;
use ghost_core::types::{Candidate, SelectionResult};

use crate::energy::energy_score;

/// Keep candidates whose energy is within `tolerance` of the query's.
///
/// Never empties a non-empty list: if nothing passes, the input is returned
/// unchanged.
pub fn filter_by_energy(
    candidates: Vec<Candidate>,
    query_energy: usize,
    tolerance: usize,
) -> Vec<Candidate> {
    let (kept, dropped): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|c| energy_score(&c.text).abs_diff(query_energy) < tolerance);

    if kept.is_empty() {
        debug!(candidates = dropped.len(), "Energy filter removed everything; using unfiltered set");
        return dropped;
    }

    debug!(kept = kept.len(), dropped = dropped.len(), "Energy filter applied");
    kept
}

/// What the selector decided for a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// At least one candidate passed the thresholds.
    Matched(SelectionResult),
    /// The closest candidate is too far away to be relevant.
    NoRelevant { best_distance: f64 },
    /// Nothing to anchor on: no candidates, or an empty margin window.
    Empty,
}

/// Absolute-threshold and margin-window selection.
#[derive(Debug, Clone)]
pub struct Selector {
    max_distance: f64,
    margin: f64,
    max_results: usize,
}

impl Default for Selector {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

impl Selector {
    pub fn new(max_distance: f64, margin: f64, max_results: usize) -> Self {
        Self {
            max_distance,
            margin,
            max_results,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.max_distance, config.margin, config.max_results)
    }

    /// Sort ascending by distance (stable), apply the absolute threshold to
    /// the best entry, then keep everything strictly inside `best + margin`,
    /// up to `max_results`.
    pub fn select(&self, mut candidates: Vec<Candidate>) -> Selection {
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let Some(best_distance) = candidates.first().map(|c| c.distance) else {
            return Selection::Empty;
        };
        if best_distance > self.max_distance {
            return Selection::NoRelevant { best_distance };
        }

        let cutoff = best_distance + self.margin;
        let chosen: Vec<Candidate> = candidates
            .into_iter()
            .take_while(|c| c.distance < cutoff)
            .take(self.max_results)
            .collect();

        // Only reachable with a zero margin.
        if chosen.is_empty() {
            debug!(best_distance, "Margin window is empty");
            return Selection::Empty;
        }

        debug!(best_distance, selected = chosen.len(), "Selection window built");
        Selection::Matched(SelectionResult::from_ordered(chosen))
    }
}
