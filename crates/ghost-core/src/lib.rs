pub mod config;
pub mod error;
pub mod types;

pub use config::GhostConfig;
pub use error::{GhostError, Result};
pub use types::*;
