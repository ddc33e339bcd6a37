//! Error types for the dbsearch backend.
//!
//! Every public operation of the backend reports failures through [`Error`].
//! Storage-engine errors (sqlx, I/O) never cross a crate boundary in their raw
//! form: the storage layer wraps them into [`Error::Storage`], and the schema
//! manager re-wraps anything that happens during DDL into
//! [`Error::SchemaOperation`].

use std::error::Error as StdError;

/// Boxed source error carried by wrapping variants.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Result type alias for dbsearch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the dbsearch backend.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A field type identifier is not one of the canonical search types.
    #[error("Unknown field type: {type_id}")]
    UnknownType {
        /// The identifier that could not be mapped.
        type_id: String,
    },

    /// Creating, altering or dropping tables/columns, or persisting the
    /// storage descriptor, failed.
    #[error("Schema operation failed: {message}")]
    SchemaOperation {
        /// What was being done.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// No storage descriptor has been persisted for the index.
    #[error("No storage configuration found for index '{index_id}'")]
    MissingIndexConfiguration {
        /// The index that was queried or indexed.
        index_id: String,
    },

    /// A query references a field the index does not store.
    #[error("Unknown field '{field}' in {context}")]
    UnknownField {
        /// Field identifier.
        field: String,
        /// Where the field was referenced (sort, filter, fulltext, …).
        context: String,
    },

    /// Fulltext search was requested on a non-fulltext field.
    #[error("Field '{field}' is not a fulltext field")]
    TypeMismatch {
        /// Field identifier.
        field: String,
    },

    /// A statement failed inside the storage engine.
    #[error("Storage error: {message}")]
    Storage {
        /// What was being done.
        message: String,
        /// Underlying engine error.
        #[source]
        source: Option<BoxError>,
    },

    /// The query is structurally invalid (bad operator, malformed value).
    #[error("Invalid query: {message}")]
    InvalidQuery {
        /// What is wrong with the query.
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Creates a schema operation error without a source.
    pub fn schema_operation<S: Into<String>>(message: S) -> Self {
        Error::SchemaOperation {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a schema operation error wrapping its cause.
    pub fn schema_operation_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: StdError + Send + Sync + 'static,
    {
        Error::SchemaOperation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a storage error without a source.
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Error::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a storage error wrapping the engine error.
    pub fn storage_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: StdError + Send + Sync + 'static,
    {
        Error::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an unknown-type error.
    pub fn unknown_type<S: Into<String>>(type_id: S) -> Self {
        Error::UnknownType {
            type_id: type_id.into(),
        }
    }

    /// Creates a missing-index-configuration error.
    pub fn missing_index<S: Into<String>>(index_id: S) -> Self {
        Error::MissingIndexConfiguration {
            index_id: index_id.into(),
        }
    }

    /// Creates an unknown-field error.
    pub fn unknown_field<F, C>(field: F, context: C) -> Self
    where
        F: Into<String>,
        C: Into<String>,
    {
        Error::UnknownField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Creates a type-mismatch error.
    pub fn type_mismatch<S: Into<String>>(field: S) -> Self {
        Error::TypeMismatch {
            field: field.into(),
        }
    }

    /// Creates an invalid-query error.
    pub fn invalid_query<S: Into<String>>(message: S) -> Self {
        Error::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Wraps any error as a schema operation failure.
    ///
    /// Schema operation errors pass through unchanged so the innermost
    /// message is kept, and so do missing-configuration errors.
    pub fn into_schema_operation<S: Into<String>>(self, message: S) -> Self {
        match self {
            err @ (Error::SchemaOperation { .. } | Error::MissingIndexConfiguration { .. }) => err,
            other => Error::schema_operation_with_source(message, other),
        }
    }

    /// Returns whether the error aborts the whole operation.
    ///
    /// Only storage errors may be transient; everything else needs a
    /// configuration or query fix before retrying.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Storage { .. })
    }
}
