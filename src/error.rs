//! Error types for the feature tracker

use std::path::PathBuf;

use thiserror::Error;

/// Result type for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// A single file that could not be parsed during a bulk operation
#[derive(Debug, Clone, serde::Serialize)]
pub struct ParseFailure {
    /// Path of the offending file
    pub path: PathBuf,
    /// Why it failed to parse
    pub reason: String,
}

/// Feature tracker errors
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Feature not found: {id}")]
    NotFound { id: String },

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Feature {id} is blocked by dependency {dependency} (must be done)")]
    DependencyBlocked { id: String, dependency: String },

    #[error("Feature {id} is locked by {owner}")]
    ActiveLock { id: String, owner: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed record {}: {}", .path.display(), .reason)]
    MalformedRecord { path: PathBuf, reason: String },

    #[error("{} record(s) failed to parse", .failures.len())]
    MalformedBatch { failures: Vec<ParseFailure> },

    #[error("Schema file {}: {}", .path.display(), .reason)]
    SchemaFile { path: PathBuf, reason: String },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl TrackerError {
    /// Paths and reasons carried by a batch failure, one line each.
    pub fn batch_detail(&self) -> Vec<String> {
        match self {
            TrackerError::MalformedBatch { failures } => failures
                .iter()
                .map(|f| format!("{}: {}", f.path.display(), f.reason))
                .collect(),
            _ => Vec::new(),
        }
    }
}
