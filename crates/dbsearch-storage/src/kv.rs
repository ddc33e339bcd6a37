//! Collection/name/value persistence for JSON documents.
//!
//! Storage descriptors are kept here so that they are written in the same
//! transaction as the DDL that changes the tables they describe.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::sqlite::quote_ident;
use crate::table::{ColumnSpec, ColumnType, TableDef};
use crate::traits::Executor;
use dbsearch_core::Result;

/// JSON documents keyed by `(collection, name)`.
#[derive(Debug, Clone)]
pub struct KeyValueStore {
    table: String,
}

impl KeyValueStore {
    /// Store using `{prefix}key_value` as its table.
    pub fn new(table_prefix: &str) -> Self {
        Self {
            table: format!("{table_prefix}key_value"),
        }
    }

    /// Name of the backing table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the backing table if missing.
    pub async fn ensure_table(&self, exec: &mut dyn Executor) -> Result<()> {
        if exec.table_exists(&self.table).await? {
            return Ok(());
        }
        let table = TableDef::new(&self.table)
            .column("collection", ColumnSpec::required(ColumnType::Varchar(128)))
            .column("name", ColumnSpec::required(ColumnType::Varchar(128)))
            .column("value", ColumnSpec::required(ColumnType::Text))
            .primary_key(["collection", "name"]);
        exec.create_table(&table).await
    }

    /// Loads and deserializes one document.
    pub async fn get<T: DeserializeOwned>(
        &self,
        exec: &mut dyn Executor,
        collection: &str,
        name: &str,
    ) -> Result<Option<T>> {
        let sql = format!(
            "SELECT value FROM {} WHERE collection = ? AND name = ?",
            quote_ident(&self.table)
        );
        let value = exec
            .fetch_scalar(&sql, &[collection.into(), name.into()])
            .await?;
        match value.as_str() {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    /// Loads every document of a collection, ordered by name.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        exec: &mut dyn Executor,
        collection: &str,
    ) -> Result<Vec<(String, T)>> {
        let sql = format!(
            "SELECT name, value FROM {} WHERE collection = ? ORDER BY name",
            quote_ident(&self.table)
        );
        let rows = exec.fetch_all(&sql, &[collection.into()]).await?;
        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let (Some(name), Some(json)) = (
                row.first().and_then(|v| v.as_string()),
                row.get(1).and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            documents.push((name, serde_json::from_str(json)?));
        }
        Ok(documents)
    }

    /// Serializes and stores a document, replacing any previous one.
    pub async fn set<T: Serialize>(
        &self,
        exec: &mut dyn Executor,
        collection: &str,
        name: &str,
        value: &T,
    ) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.delete(exec, collection, name).await?;
        let sql = format!(
            "INSERT INTO {} (collection, name, value) VALUES (?, ?, ?)",
            quote_ident(&self.table)
        );
        exec.execute(&sql, &[collection.into(), name.into(), json.into()])
            .await?;
        Ok(())
    }

    /// Deletes a document. Deleting a missing document is not an error.
    pub async fn delete(&self, exec: &mut dyn Executor, collection: &str, name: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE collection = ? AND name = ?",
            quote_ident(&self.table)
        );
        exec.execute(&sql, &[collection.into(), name.into()])
            .await?;
        Ok(())
    }
}
