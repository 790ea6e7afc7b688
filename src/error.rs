//! Central error types for propgraph.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic
//! `Display` and `From` implementations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum PropgraphError {
    /// IO operation failed (without path context - prefer IoWithPath when path is available)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO operation failed with path context for better error messages
    #[error("IO error at {path}: {error}")]
    IoWithPath {
        error: std::io::Error,
        path: PathBuf,
    },

    /// Failed to parse source text
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// Method not found in the compilation unit
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Tree-sitter language/grammar error
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience type alias for Results using PropgraphError.
pub type Result<T> = std::result::Result<T, PropgraphError>;

impl PropgraphError {
    /// Create an IO error with path context.
    ///
    /// Use this when reading files to provide actionable error messages
    /// that include the file path that failed.
    #[inline]
    pub fn io_with_path(error: std::io::Error, path: impl AsRef<Path>) -> Self {
        PropgraphError::IoWithPath {
            error,
            path: path.as_ref().to_path_buf(),
        }
    }
}
