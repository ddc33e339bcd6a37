//! Mapping of engine errors into the dbsearch error taxonomy.

use dbsearch_core::Error;

/// Extension for wrapping sqlx results into [`Error::Storage`].
pub trait StorageResultExt<T> {
    /// Wraps the error with a description of what was being done.
    fn storage_context<S: Into<String>>(self, message: S) -> dbsearch_core::Result<T>;
}

impl<T> StorageResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn storage_context<S: Into<String>>(self, message: S) -> dbsearch_core::Result<T> {
        self.map_err(|e| Error::storage_with_source(message, e))
    }
}
