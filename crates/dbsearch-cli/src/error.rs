//! Error types for dbsearch-cli

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for dbsearch-cli operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dbsearch-cli
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error from the search backend
    #[error(transparent)]
    Search(#[from] dbsearch::Error),

    /// A file could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Input or output JSON was malformed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// An index is not listed in the configuration file
    #[error("Index '{0}' is not configured")]
    UnknownIndex(String),
}

impl Error {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }
}
