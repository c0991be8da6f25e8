//! Conversational layer for Ghost.
//!
//! Scores query energy, filters and selects retrieved memories, and turns
//! the best one into a reply through the generation service.

pub mod energy;
pub mod generation;
pub mod response;
pub mod selection;
pub mod session;

pub use energy::energy_score;
pub use generation::{build_reply_prompt, Generator, OllamaGenerator};
pub use response::TurnOutcome;
pub use selection::{filter_by_energy, Selection, Selector};
pub use session::GhostSession;
