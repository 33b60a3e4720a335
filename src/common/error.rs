use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Document could not be parsed ({}): {reason}", path.display())]
    DocumentParse { path: PathBuf, reason: String },

    #[error("Invalid section kind: {0}")]
    InvalidSectionKind(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Document timed out after {secs}s: {}", path.display())]
    DocumentTimeout { path: PathBuf, secs: u64 },

    #[error("No worker available: all {workers} workers are stuck on timed-out documents")]
    WorkersExhausted { workers: usize },

    #[error("No researcher named '{0}' in the name index")]
    UnknownResearcher(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoringError {
    pub fn config(message: impl Into<String>) -> Self {
        ScoringError::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ScoringError>;
