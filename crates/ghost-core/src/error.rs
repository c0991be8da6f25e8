use thiserror::Error;

/// Top-level error type for Ghost.
///
/// The variants follow the failure classes of a query turn. `Config` is the
/// only one that is fatal: it is raised before the interactive loop starts.
/// Everything else ends the current turn and the loop carries on.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GhostError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GhostError {
    /// True for errors that must abort the process instead of a single turn.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GhostError::Config(_))
    }
}

impl From<toml::de::Error> for GhostError {
    fn from(err: toml::de::Error) -> Self {
        GhostError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for GhostError {
    fn from(err: toml::ser::Error) -> Self {
        GhostError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for GhostError {
    fn from(err: serde_json::Error) -> Self {
        GhostError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Ghost operations.
pub type Result<T> = std::result::Result<T, GhostError>;
