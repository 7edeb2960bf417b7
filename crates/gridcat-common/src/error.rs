//! Error types for gridcat.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using GridcatError.
pub type GridcatResult<T> = Result<T, GridcatError>;

/// Primary error type for catalog, domain and cache operations.
#[derive(Debug, Error)]
pub enum GridcatError {
    // === Catalog Errors ===
    #[error("Failed to read catalog metadata from {path}: {message}")]
    CatalogRead { path: PathBuf, message: String },

    #[error("No data found for {names:?} matching the requirement")]
    NoMatchingDomain { names: Vec<String> },

    #[error("Domain merge did not converge after {rounds} rounds ({domains} domains)")]
    MergeLimitExceeded { rounds: usize, domains: usize },

    // === Read Errors ===
    #[error("Stored metadata for '{variable}' in {path} disagrees with the file: {message}")]
    ReadInconsistency {
        path: PathBuf,
        variable: String,
        message: String,
    },

    #[error("Failed to read data: {0}")]
    DataRead(String),

    #[error("Invalid axis '{name}': {message}")]
    InvalidAxis { name: String, message: String },

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    // === Cache Errors ===
    #[error("Cache artifact not found: {0}")]
    CacheNotFound(String),

    #[error("No writable cache location configured")]
    NowhereToWrite,

    #[error("Failed to write cache artifact {path}: {message}")]
    CacheWrite { path: PathBuf, message: String },

    #[error("Interrupted while writing {0}")]
    Interrupted(PathBuf),

    // === Infrastructure Errors ===
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of an error, for callers that need to branch on
/// the failure category rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Data that should exist does not (missing files, no matching domain, absent artifact).
    Missing,
    /// The environment is misconfigured (nowhere to write, bad config).
    Misconfigured,
    /// Stored state disagrees with reality.
    Inconsistent,
    /// The operation was cancelled by the caller.
    Interrupted,
    /// Anything else (I/O, serialization, invalid input).
    Other,
}

impl GridcatError {
    /// Create a CatalogRead error.
    pub fn catalog_read(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::CatalogRead {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a ReadInconsistency error.
    pub fn inconsistent(
        path: impl Into<PathBuf>,
        variable: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::ReadInconsistency {
            path: path.into(),
            variable: variable.into(),
            message: msg.into(),
        }
    }

    /// Create a CacheWrite error.
    pub fn cache_write(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::CacheWrite {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create an InvalidAxis error.
    pub fn invalid_axis(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidAxis {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a DataRead error.
    pub fn data_read(msg: impl Into<String>) -> Self {
        Self::DataRead(msg.into())
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an InvalidSelection error.
    pub fn invalid_selection(msg: impl Into<String>) -> Self {
        Self::InvalidSelection(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GridcatError::CatalogRead { .. }
            | GridcatError::NoMatchingDomain { .. }
            | GridcatError::CacheNotFound(_)
            | GridcatError::DataRead(_) => ErrorKind::Missing,

            GridcatError::NowhereToWrite
            | GridcatError::CacheWrite { .. }
            | GridcatError::Config(_) => ErrorKind::Misconfigured,

            GridcatError::ReadInconsistency { .. } => ErrorKind::Inconsistent,

            GridcatError::Interrupted(_) => ErrorKind::Interrupted,

            _ => ErrorKind::Other,
        }
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, GridcatError::Interrupted(_))
    }
}

// Conversion from common error types
impl From<std::io::Error> for GridcatError {
    fn from(err: std::io::Error) -> Self {
        GridcatError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for GridcatError {
    fn from(err: serde_json::Error) -> Self {
        GridcatError::Serialization(format!("JSON error: {}", err))
    }
}
