//! Error handling for the identity engine

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed static metadata source (fatal to that load only)
    #[error("Config format error: {0}")]
    ConfigFormat(String),

    /// Referenced file missing (treated as "no metadata available")
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unparsable live payload (dropped, counted)
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// All publish sinks rejected the generated documents
    #[error("Publish error: {0}")]
    Publish(String),

    /// Generation skipped because no persons are known
    #[error("Generation skipped: {0}")]
    GenerationSkipped(String),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error is a skipped run rather than a failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::GenerationSkipped(_))
    }
}
