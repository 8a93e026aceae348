//! Error types for pvdb-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pvdb-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a source's database file (drops that source from the run)
    #[error("failed to read source '{name}' database '{path}': {source}")]
    SourceRead {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to load or parse the load-order configuration
    #[error("failed to load config '{path}': {message}")]
    Config { path: PathBuf, message: String },

    /// Cannot create a backup (fatal for that file's mutation)
    #[error("backup of '{path}' failed: {message}")]
    Backup { path: PathBuf, message: String },

    /// No backup exists for a source (fatal for that restore request only)
    #[error("no backup found for source '{source_name}'")]
    RestoreMissing { source_name: String },

    /// Failed to copy a backup back over the live file
    #[error("restore of source '{source_name}' failed: {message}")]
    Restore { source_name: String, message: String },

    /// Cannot write an edited database file (fatal for that file, isolated)
    #[error("failed to write mutated file '{path}': {source}")]
    MutationWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV report error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
