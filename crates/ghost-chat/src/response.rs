//! Per-turn outcome and its rendering for the interactive surface.

use std::fmt;

/// Result of handling one query. Every turn ends in exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// A memory was found and rewritten as a reply.
    Replied { anchor: String, reply: String },
    /// A memory was found but the generation call failed.
    GenerationFailed { anchor: String, reason: String },
    /// The closest memory is beyond the absolute distance threshold.
    NoRelevantMemories { best_distance: f64 },
    /// The index returned nothing usable.
    NoMemoriesFound,
    /// Encoding or index lookup failed for this turn.
    RetrievalFailed { reason: String },
}

impl TurnOutcome {
    /// The memory the reply was based on, if any.
    pub fn anchor(&self) -> Option<&str> {
        match self {
            TurnOutcome::Replied { anchor, .. } | TurnOutcome::GenerationFailed { anchor, .. } => {
                Some(anchor)
            }
            _ => None,
        }
    }

    /// True when a reply (real or placeholder) was produced from a memory.
    pub fn is_match(&self) -> bool {
        self.anchor().is_some()
    }
}

impl fmt::Display for TurnOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnOutcome::Replied { reply, .. } => write!(f, "Ghost: {}", reply),
            TurnOutcome::GenerationFailed { reason, .. } => {
                write!(f, "Ghost: [LLM Error: {}]", reason)
            }
            TurnOutcome::NoRelevantMemories { best_distance } => write!(
                f,
                "Ghost: ... (No relevant memories found, closest dist: {:.2})",
                best_distance
            ),
            TurnOutcome::NoMemoriesFound => write!(f, "Ghost: ... (No memories found)"),
            TurnOutcome::RetrievalFailed { reason } => write!(f, "Retrieval error: {}", reason),
        }
    }
}
