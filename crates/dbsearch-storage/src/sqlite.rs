//! SQLite engine, backed by an sqlx connection pool.
//!
//! SQLite has no `ALTER COLUMN`; [`Executor::change_column`] rebuilds the
//! table instead (create copy, cast values across, swap, recreate indexes).
//! In-memory databases are private to one connection, so the pool is pinned
//! to a single long-lived connection for them.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Row as _, Sqlite, TypeInfo, ValueRef};

use crate::error::StorageResultExt;
use crate::table::{ColumnDef, ColumnSpec, ColumnType, TableDef};
use crate::traits::{Backend, Executor, Transaction};
use crate::value::{Row, SqlValue};
use dbsearch_core::{Error, Result};

/// Quotes an identifier for use in generated SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_type_sql(column_type: ColumnType) -> String {
    match column_type {
        ColumnType::Varchar(len) => format!("VARCHAR({len})"),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::UnsignedInt => "INTEGER".to_string(),
        ColumnType::Float => "FLOAT".to_string(),
        ColumnType::SmallInt => "SMALLINT".to_string(),
    }
}

fn cast_target(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Varchar(_) | ColumnType::Text => "TEXT",
        ColumnType::BigInt | ColumnType::UnsignedInt | ColumnType::SmallInt => "INTEGER",
        ColumnType::Float => "REAL",
    }
}

/// Whether casting a column declared as `declared` to `target` moves between
/// text and numeric storage. SQLite casts non-numeric text to 0 silently.
fn crosses_text_numeric(declared: &str, target: ColumnType) -> bool {
    let declared = declared.to_ascii_uppercase();
    let from_text =
        declared.contains("CHAR") || declared.contains("TEXT") || declared.contains("CLOB");
    from_text != (cast_target(target) == "TEXT")
}

fn column_sql(name: &str, spec: &ColumnSpec) -> String {
    let mut sql = format!("{} {}", quote_ident(name), column_type_sql(spec.column_type));
    if spec.not_null {
        sql.push_str(" NOT NULL");
    }
    sql
}

fn create_table_sql(table: &TableDef) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| column_sql(&c.name, &c.spec))
        .collect();
    if !table.primary_key.is_empty() {
        let pk: Vec<String> = table.primary_key.iter().map(|c| quote_ident(c)).collect();
        parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }
    format!("CREATE TABLE {} ({})", quote_ident(&table.name), parts.join(", "))
}

fn bind_params<'q>(sql: &'q str, params: &[SqlValue]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut values = Vec::with_capacity(row.len());
    for idx in 0..row.len() {
        let type_name = {
            let raw = row.try_get_raw(idx).storage_context("Reading result column")?;
            if raw.is_null() {
                values.push(SqlValue::Null);
                continue;
            }
            raw.type_info().name().to_string()
        };
        let value = match type_name.as_str() {
            "INTEGER" | "BOOLEAN" => SqlValue::Integer(
                row.try_get_unchecked::<i64, _>(idx)
                    .storage_context("Decoding integer column")?,
            ),
            "REAL" | "NUMERIC" => SqlValue::Real(
                row.try_get_unchecked::<f64, _>(idx)
                    .storage_context("Decoding real column")?,
            ),
            _ => SqlValue::Text(
                row.try_get_unchecked::<String, _>(idx)
                    .storage_context("Decoding text column")?,
            ),
        };
        values.push(value);
    }
    Ok(values)
}

// ============================================================================
// Executor
// ============================================================================

/// Connection an executor runs on.
enum Conn {
    Pooled(PoolConnection<Sqlite>),
    Tx(sqlx::Transaction<'static, Sqlite>),
}

/// Runs statements on one SQLite connection, either a pooled session or an
/// open transaction.
pub struct SqliteExecutor {
    conn: Conn,
}

impl SqliteExecutor {
    fn raw(&mut self) -> &mut SqliteConnection {
        match &mut self.conn {
            Conn::Pooled(conn) => &mut **conn,
            Conn::Tx(tx) => &mut **tx,
        }
    }

    async fn run_ddl(&mut self, sql: &str) -> Result<()> {
        log::debug!("DDL: {sql}");
        sqlx::Executor::execute(self.raw(), sqlx::raw_sql(sql))
            .await
            .storage_context(format!("Running DDL: {sql}"))?;
        Ok(())
    }
}

#[async_trait]
impl Executor for SqliteExecutor {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let result = bind_params(sql, params)
            .execute(self.raw())
            .await
            .storage_context(format!("Executing: {sql}"))?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let rows = bind_params(sql, params)
            .fetch_all(self.raw())
            .await
            .storage_context(format!("Querying: {sql}"))?;
        rows.iter().map(decode_row).collect()
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let count = self
            .fetch_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[table.into()],
            )
            .await?;
        Ok(count.as_i64().unwrap_or(0) > 0)
    }

    async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool> {
        let count = self
            .fetch_scalar(
                "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?",
                &[table.into(), column.into()],
            )
            .await?;
        Ok(count.as_i64().unwrap_or(0) > 0)
    }

    async fn create_table(&mut self, table: &TableDef) -> Result<()> {
        self.run_ddl(&create_table_sql(table)).await?;
        for index in &table.indexes {
            let columns: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
            self.run_ddl(&format!(
                "CREATE INDEX {} ON {} ({})",
                quote_ident(&index.name),
                quote_ident(&table.name),
                columns.join(", ")
            ))
            .await?;
        }
        Ok(())
    }

    async fn drop_table(&mut self, table: &str) -> Result<()> {
        self.run_ddl(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
            .await
    }

    async fn add_column(&mut self, table: &str, column: &ColumnDef) -> Result<()> {
        self.run_ddl(&format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            column_sql(&column.name, &column.spec)
        ))
        .await
    }

    async fn drop_column(&mut self, table: &str, column: &str) -> Result<()> {
        self.run_ddl(&format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(table),
            quote_ident(column)
        ))
        .await
    }

    async fn change_column(&mut self, table: &str, column: &ColumnDef) -> Result<()> {
        // cid, name, type, notnull, dflt_value, pk
        let info = self
            .fetch_all(&format!("PRAGMA table_info({})", quote_ident(table)), &[])
            .await?;
        if !info
            .iter()
            .any(|row| row.get(1).and_then(SqlValue::as_str) == Some(column.name.as_str()))
        {
            return Err(Error::storage(format!(
                "Column '{}' not found on table '{table}'",
                column.name
            )));
        }

        let mut definitions = Vec::new();
        let mut names = Vec::new();
        let mut selects = Vec::new();
        let mut primary_key: Vec<(i64, String)> = Vec::new();
        for row in &info {
            let name = row.get(1).and_then(SqlValue::as_string).unwrap_or_default();
            let pk_position = row.get(5).and_then(SqlValue::as_i64).unwrap_or(0);
            if pk_position > 0 {
                primary_key.push((pk_position, quote_ident(&name)));
            }
            if name == column.name {
                let declared = row.get(2).and_then(SqlValue::as_string).unwrap_or_default();
                if crosses_text_numeric(&declared, column.spec.column_type) {
                    log::warn!(
                        "Casting '{table}.{name}' from {declared} to {}; non-numeric text becomes 0 until reindexed",
                        column_type_sql(column.spec.column_type)
                    );
                }
                definitions.push(column_sql(&name, &column.spec));
                selects.push(format!(
                    "CAST({} AS {})",
                    quote_ident(&name),
                    cast_target(column.spec.column_type)
                ));
            } else {
                let declared = row.get(2).and_then(SqlValue::as_string).unwrap_or_default();
                let not_null = row.get(3).and_then(SqlValue::as_i64) == Some(1);
                definitions.push(format!(
                    "{} {}{}",
                    quote_ident(&name),
                    declared,
                    if not_null { " NOT NULL" } else { "" }
                ));
                selects.push(quote_ident(&name));
            }
            names.push(quote_ident(&name));
        }
        primary_key.sort();
        if !primary_key.is_empty() {
            let pk: Vec<String> = primary_key.into_iter().map(|(_, name)| name).collect();
            definitions.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        }

        let index_sql: Vec<String> = self
            .fetch_all(
                "SELECT sql FROM sqlite_master WHERE type = 'index' AND tbl_name = ? AND sql IS NOT NULL",
                &[table.into()],
            )
            .await?
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(|v| v.as_string()))
            .collect();

        let rebuild = format!("{table}__rebuild");
        self.run_ddl(&format!(
            "CREATE TABLE {} ({})",
            quote_ident(&rebuild),
            definitions.join(", ")
        ))
        .await?;
        self.run_ddl(&format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(&rebuild),
            names.join(", "),
            selects.join(", "),
            quote_ident(table)
        ))
        .await?;
        self.drop_table(table).await?;
        self.run_ddl(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&rebuild),
            quote_ident(table)
        ))
        .await?;
        for sql in index_sql {
            self.run_ddl(&sql).await?;
        }
        Ok(())
    }

    async fn create_temporary_table(
        &mut self,
        name: &str,
        select_sql: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        let sql = format!("CREATE TEMP TABLE {} AS {select_sql}", quote_ident(name));
        log::debug!("Materializing {name}: {sql}");
        bind_params(&sql, params)
            .persistent(false)
            .execute(self.raw())
            .await
            .storage_context(format!("Creating temporary table {name}"))?;
        Ok(())
    }

    async fn drop_temporary_table(&mut self, name: &str) -> Result<()> {
        self.run_ddl(&format!("DROP TABLE IF EXISTS temp.{}", quote_ident(name)))
            .await
    }
}

#[async_trait]
impl Transaction for SqliteExecutor {
    async fn commit(self: Box<Self>) -> Result<()> {
        match self.conn {
            Conn::Tx(tx) => tx.commit().await.storage_context("Committing transaction"),
            Conn::Pooled(_) => Ok(()),
        }
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        match self.conn {
            Conn::Tx(tx) => tx
                .rollback()
                .await
                .storage_context("Rolling back transaction"),
            Conn::Pooled(_) => Ok(()),
        }
    }
}

// ============================================================================
// Backend
// ============================================================================

/// SQLite engine.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    table_prefix: String,
}

impl SqliteBackend {
    /// Connects to a database URL such as `sqlite://search.db` or `sqlite::memory:`.
    ///
    /// File databases are created if missing.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        table_prefix: impl Into<String>,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .storage_context(format!("Parsing database URL '{url}'"))?
            .create_if_missing(true);
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            pool_options = pool_options.max_connections(max_connections.max(1));
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .storage_context(format!("Connecting to '{url}'"))?;
        log::info!("Connected to SQLite database {url}");
        Ok(Self::from_pool(pool, table_prefix))
    }

    /// Private in-memory database with no table prefix.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1, "").await
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: SqlitePool, table_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            table_prefix: table_prefix.into(),
        }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    async fn connection(&self) -> Result<Box<dyn Executor>> {
        let conn = self
            .pool
            .acquire()
            .await
            .storage_context("Acquiring connection")?;
        Ok(Box::new(SqliteExecutor {
            conn: Conn::Pooled(conn),
        }))
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let conn = self
            .pool
            .begin()
            .await
            .storage_context("Beginning transaction")?;
        Ok(Box::new(SqliteExecutor {
            conn: Conn::Tx(conn),
        }))
    }
}
