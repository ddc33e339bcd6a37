//! The backend capability interface.
//!
//! The schema manager, the indexing pipeline, and the query compiler only
//! ever see these traits. One implementation exists per engine.

use async_trait::async_trait;

use crate::table::{ColumnDef, TableDef};
use crate::value::{Row, SqlValue};
use dbsearch_core::Result;

/// Longest identifier any supported engine accepts, before the table prefix.
pub const MAX_IDENTIFIER_LENGTH: usize = 62;

/// Something that runs statements: a pooled session or an open transaction.
///
/// Temporary tables are only visible to the executor that created them.
#[async_trait]
pub trait Executor: Send {
    /// Runs a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Runs a query and returns every row.
    async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Runs a query and returns the first column of the first row.
    async fn fetch_scalar(&mut self, sql: &str, params: &[SqlValue]) -> Result<SqlValue> {
        let rows = self.fetch_all(sql, params).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or(SqlValue::Null))
    }

    /// Whether a table exists.
    async fn table_exists(&mut self, table: &str) -> Result<bool>;

    /// Whether a column exists on a table.
    async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool>;

    /// Creates a table with its primary key and secondary indexes.
    async fn create_table(&mut self, table: &TableDef) -> Result<()>;

    /// Drops a table if it exists.
    async fn drop_table(&mut self, table: &str) -> Result<()>;

    /// Adds a column to an existing table.
    async fn add_column(&mut self, table: &str, column: &ColumnDef) -> Result<()>;

    /// Drops a column from an existing table.
    async fn drop_column(&mut self, table: &str, column: &str) -> Result<()>;

    /// Changes the type of an existing column, keeping its name.
    ///
    /// Existing values are cast to the new type.
    async fn change_column(&mut self, table: &str, column: &ColumnDef) -> Result<()>;

    /// Materializes a query into a temporary table.
    async fn create_temporary_table(
        &mut self,
        name: &str,
        select_sql: &str,
        params: &[SqlValue],
    ) -> Result<()>;

    /// Drops a temporary table if it exists.
    async fn drop_temporary_table(&mut self, name: &str) -> Result<()>;
}

/// An open transaction. Dropping it without committing rolls back.
#[async_trait]
pub trait Transaction: Executor {
    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rolls the transaction back.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// A database engine.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Prefix applied to every table name.
    fn table_prefix(&self) -> &str;

    /// Byte budget for generated table and column names, excluding the prefix.
    fn max_identifier_length(&self) -> usize {
        MAX_IDENTIFIER_LENGTH.saturating_sub(self.table_prefix().len())
    }

    /// Checks out a session. Temporary tables live as long as it does.
    async fn connection(&self) -> Result<Box<dyn Executor>>;

    /// Begins a transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}
