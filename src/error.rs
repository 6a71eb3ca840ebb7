//! Error types for loggraph.
//!
//! Only configuration loading, input reading, persistence and output writing
//! can fail. Per-template and per-line conditions (unmatched values, missing
//! exemplars, index misses) degrade the annotation instead of returning errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or loading a pattern registry.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Invalid regex for pattern '{name}': {source}")]
    InvalidRegex {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Duplicate pattern name: {0}")]
    DuplicateName(String),

    #[error("Failed to read pattern file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse pattern file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised by the template archive.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Template archive I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template archive is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported template archive version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Persistence skipped because the prior archive could not be loaded: {0}")]
    LoadFailed(String),
}

/// Errors raised while reading log records or template definitions.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while loading the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Errors raised while writing the populated graph.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
