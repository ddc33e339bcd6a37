//! Schema manager: per-index table provisioning.
//!
//! Each index owns:
//!
//! - an **index table** (`{prefix}dbsearch_{index}`): one row per item, keyed
//!   by `item_id`, with one column per field. Text fields only keep a short
//!   preview there.
//! - one **field table** per non-text field (`{prefix}dbsearch_{index}_{field}`)
//!   holding `(item_id, value)` rows, so multi-valued fields can be filtered.
//! - one shared **text table** (`{prefix}dbsearch_{index}_text`) holding the
//!   scored words of every text field, discriminated by `field_name`.
//!
//! [`SchemaManager::reconcile_fields`] moves an existing layout to a new field
//! configuration with as little DDL as possible and reports whether the index
//! has to be rebuilt. Every public operation runs in one transaction together
//! with the descriptor write.

use std::collections::BTreeMap;

use dbsearch_core::util::ids::{sanitize_identifier, suffixed_identifier};
use dbsearch_core::{Error, FIELD_DATASOURCE, FieldDescriptor, IndexDefinition, Result};
use dbsearch_storage::{
    Backend, ColumnDef, ColumnSpec, ColumnType, Executor, KeyValueStore, SqlValue, TableDef,
    quote_ident,
};

use crate::descriptor::{
    FieldStorageInfo, ITEM_ID_COLUMN, IndexStorageDescriptor, VALUE_COLUMN,
};
use crate::mapper::{MAX_SCORE, WORD_MAX_LENGTH, column_spec};

/// Width of item ID columns.
pub const ITEM_ID_LENGTH: u32 = 150;

/// Width of the text table's field name column.
const FIELD_NAME_LENGTH: u32 = 255;

fn item_id_spec() -> ColumnSpec {
    ColumnSpec::required(ColumnType::Varchar(ITEM_ID_LENGTH))
}

fn boost_changed(old: f64, new: f64) -> bool {
    (old - new).abs() > f64::EPSILON
}

/// Creates, migrates, and removes per-index storage.
#[derive(Debug, Clone)]
pub struct SchemaManager {
    kv: KeyValueStore,
    table_prefix: String,
    max_identifier_length: usize,
}

impl SchemaManager {
    /// Schema manager for the given backend.
    pub fn new(backend: &dyn Backend) -> Self {
        Self {
            kv: KeyValueStore::new(backend.table_prefix()),
            table_prefix: backend.table_prefix().to_string(),
            max_identifier_length: backend.max_identifier_length(),
        }
    }

    /// Key-value store holding descriptors.
    pub fn kv(&self) -> &KeyValueStore {
        &self.kv
    }

    /// Creates the key-value table if needed.
    pub async fn install(&self, backend: &dyn Backend) -> Result<()> {
        let mut conn = backend.connection().await?;
        self.kv.ensure_table(conn.as_mut()).await
    }

    /// Loads the descriptor of an index, if any.
    pub async fn load(
        &self,
        exec: &mut dyn Executor,
        index: &IndexDefinition,
    ) -> Result<Option<IndexStorageDescriptor>> {
        IndexStorageDescriptor::load(exec, &self.kv, &index.storage_key()).await
    }

    /// Loads the descriptor of an index, failing when none was persisted.
    pub async fn load_required(
        &self,
        exec: &mut dyn Executor,
        index: &IndexDefinition,
    ) -> Result<IndexStorageDescriptor> {
        self.load(exec, index)
            .await?
            .ok_or_else(|| Error::missing_index(&index.id))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Creates storage for a new index.
    ///
    /// An index that already has a descriptor is reconciled instead.
    pub async fn add_index(&self, backend: &dyn Backend, index: &IndexDefinition) -> Result<()> {
        let mut tx = backend.begin().await?;
        let outcome = self.add_index_in(&mut *tx, index).await;
        finish(tx, outcome, "Adding index").await?;
        log::info!("Added index '{}' on server '{}'", index.id, index.server_id);
        Ok(())
    }

    async fn add_index_in(&self, exec: &mut dyn Executor, index: &IndexDefinition) -> Result<()> {
        let mut descriptor = match self.load(exec, index).await? {
            Some(existing) => {
                log::debug!("Index '{}' already has storage; reconciling", index.id);
                existing
            }
            None => {
                let base = format!("dbsearch_{}", index.id);
                let index_table = self.find_free_table(exec, &base).await?;
                IndexStorageDescriptor::new(&index.server_id, &index.id, index_table)
            }
        };
        descriptor.read_only = index.read_only;
        self.reconcile_fields(exec, &mut descriptor, &index.all_fields())
            .await?;
        descriptor.save(exec, &self.kv).await
    }

    /// Applies a changed field configuration. Returns whether the index
    /// must be reindexed.
    pub async fn update_index(
        &self,
        backend: &dyn Backend,
        index: &IndexDefinition,
    ) -> Result<bool> {
        let mut tx = backend.begin().await?;
        let outcome = self.update_index_in(&mut *tx, index).await;
        let needs_reindex = finish(tx, outcome, "Updating index").await?;
        if needs_reindex {
            log::info!("Index '{}' needs to be reindexed", index.id);
        }
        Ok(needs_reindex)
    }

    async fn update_index_in(
        &self,
        exec: &mut dyn Executor,
        index: &IndexDefinition,
    ) -> Result<bool> {
        let mut descriptor = self.load_required(exec, index).await?;
        let before = descriptor.clone();
        descriptor.read_only = index.read_only;
        let needs_reindex = self
            .reconcile_fields(exec, &mut descriptor, &index.all_fields())
            .await?;
        if descriptor != before {
            descriptor.save(exec, &self.kv).await?;
        }
        Ok(needs_reindex)
    }

    /// Removes an index: drops its tables unless read-only, and forgets it.
    pub async fn remove_index(&self, backend: &dyn Backend, index: &IndexDefinition) -> Result<()> {
        let mut tx = backend.begin().await?;
        let outcome = self.remove_index_in(&mut *tx, index).await;
        finish(tx, outcome, "Removing index").await
    }

    async fn remove_index_in(&self, exec: &mut dyn Executor, index: &IndexDefinition) -> Result<()> {
        let Some(mut descriptor) = self.load(exec, index).await? else {
            log::warn!("Index '{}' has no storage to remove", index.id);
            return Ok(());
        };
        descriptor.read_only = descriptor.read_only || index.read_only;
        self.drop_storage(exec, &descriptor).await
    }

    /// Index IDs with storage on a server.
    pub async fn index_ids(&self, exec: &mut dyn Executor, server_id: &str) -> Result<Vec<String>> {
        let descriptors = IndexStorageDescriptor::load_all(exec, &self.kv, server_id).await?;
        Ok(descriptors.into_iter().map(|d| d.index_id).collect())
    }

    /// Removes every index of a server.
    pub async fn drop_all(&self, backend: &dyn Backend, server_id: &str) -> Result<()> {
        let mut tx = backend.begin().await?;
        let outcome = self.drop_all_in(&mut *tx, server_id).await;
        finish(tx, outcome, "Removing server storage").await
    }

    async fn drop_all_in(&self, exec: &mut dyn Executor, server_id: &str) -> Result<()> {
        let descriptors = IndexStorageDescriptor::load_all(exec, &self.kv, server_id).await?;
        for descriptor in &descriptors {
            self.drop_storage(exec, descriptor).await?;
        }
        log::info!(
            "Removed storage of {} index(es) on server '{server_id}'",
            descriptors.len()
        );
        Ok(())
    }

    async fn drop_storage(
        &self,
        exec: &mut dyn Executor,
        descriptor: &IndexStorageDescriptor,
    ) -> Result<()> {
        if descriptor.read_only {
            log::info!(
                "Index '{}' is read-only; keeping its tables",
                descriptor.index_id
            );
        } else {
            for table in descriptor.dedicated_tables() {
                exec.drop_table(table).await?;
            }
            if let Some(text_table) = &descriptor.text_table {
                exec.drop_table(text_table).await?;
            }
            exec.drop_table(&descriptor.index_table).await?;
        }
        descriptor.delete(exec, &self.kv).await
    }

    /// Deletes indexed data of an index, optionally only for one datasource.
    pub async fn clear(
        &self,
        backend: &dyn Backend,
        index: &IndexDefinition,
        datasource: Option<&str>,
    ) -> Result<()> {
        let mut tx = backend.begin().await?;
        let outcome = self.clear_in(&mut *tx, index, datasource).await;
        finish(tx, outcome, "Clearing index").await
    }

    async fn clear_in(
        &self,
        exec: &mut dyn Executor,
        index: &IndexDefinition,
        datasource: Option<&str>,
    ) -> Result<()> {
        let descriptor = self.load_required(exec, index).await?;
        delete_rows(exec, &descriptor, datasource).await?;
        log::info!(
            "Cleared index '{}'{}",
            index.id,
            datasource.map_or(String::new(), |d| format!(" for datasource '{d}'"))
        );
        Ok(())
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Moves the storage of `descriptor` to the `desired` field set.
    ///
    /// Steps, in order: remove fields that are gone; handle type and boost
    /// changes of remaining fields; create storage for new fields; make sure
    /// the index table and (with any text field) the text table exist.
    /// Returns whether stored data no longer matches the configuration.
    pub async fn reconcile_fields(
        &self,
        exec: &mut dyn Executor,
        descriptor: &mut IndexStorageDescriptor,
        desired: &BTreeMap<String, FieldDescriptor>,
    ) -> Result<bool> {
        let result = self.reconcile_inner(exec, descriptor, desired).await;
        result.map_err(|e| e.into_schema_operation(format!(
            "Reconciling fields of index '{}'",
            descriptor.index_id
        )))
    }

    async fn reconcile_inner(
        &self,
        exec: &mut dyn Executor,
        descriptor: &mut IndexStorageDescriptor,
        desired: &BTreeMap<String, FieldDescriptor>,
    ) -> Result<bool> {
        let mut needs_reindex = false;
        let mut fulltext_flipped = false;
        self.ensure_index_table(exec, descriptor).await?;

        // 1. Removed fields.
        let removed: Vec<String> = descriptor
            .field_tables
            .keys()
            .filter(|name| !desired.contains_key(*name))
            .cloned()
            .collect();
        for name in removed {
            log::debug!("Removing field '{name}' from index '{}'", descriptor.index_id);
            self.remove_field_storage(exec, descriptor, &name).await?;
        }

        // 2. Changed fields.
        for (name, field) in desired {
            let Some(old) = descriptor.field_tables.get(name).cloned() else {
                continue;
            };
            if old.field_type != field.field_type {
                if old.field_type.is_text() != field.field_type.is_text() {
                    log::debug!(
                        "Field '{name}' switched fulltext status ({} -> {})",
                        old.field_type,
                        field.field_type
                    );
                    self.remove_field_storage(exec, descriptor, name).await?;
                    needs_reindex = true;
                    fulltext_flipped = true;
                    continue;
                }
                let new_spec = column_spec(field.field_type);
                if column_spec(old.field_type) != new_spec {
                    if !old.field_type.is_text() {
                        let value_spec = ColumnSpec::required(new_spec.column_type);
                        exec.change_column(&old.table, &ColumnDef::new(VALUE_COLUMN, value_spec))
                            .await?;
                    }
                    exec.change_column(&descriptor.index_table, &ColumnDef::new(&old.column, new_spec))
                        .await?;
                    needs_reindex = true;
                }
                if let Some(info) = descriptor.field_tables.get_mut(name) {
                    info.field_type = field.field_type;
                }
            }

            if boost_changed(old.boost, field.boost) {
                if field.field_type.is_text() && old.field_type.is_text() {
                    if old.boost == 0.0 {
                        needs_reindex = true;
                    } else {
                        self.rescale_scores(exec, &old.table, name, field.boost / old.boost)
                            .await?;
                    }
                }
                if let Some(info) = descriptor.field_tables.get_mut(name) {
                    info.boost = field.boost;
                }
            }
        }

        // 3. New fields.
        for (name, field) in desired {
            if descriptor.field_tables.contains_key(name) {
                continue;
            }
            log::debug!(
                "Adding {} field '{name}' to index '{}'",
                field.field_type,
                descriptor.index_id
            );
            self.create_field_storage(exec, descriptor, name, field).await?;
            needs_reindex = true;
        }

        // 4. Base tables.
        self.ensure_index_table(exec, descriptor).await?;
        if descriptor.has_text_fields() {
            self.ensure_text_table(exec, descriptor).await?;
        }

        // Items indexed under the old layout must not stay searchable.
        if fulltext_flipped {
            log::info!(
                "Clearing index '{}' after a fulltext type change",
                descriptor.index_id
            );
            delete_rows(exec, descriptor, None).await?;
        }

        Ok(needs_reindex)
    }

    async fn rescale_scores(
        &self,
        exec: &mut dyn Executor,
        text_table: &str,
        field: &str,
        ratio: f64,
    ) -> Result<()> {
        log::debug!("Rescaling scores of field '{field}' by {ratio}");
        let sql = format!(
            "UPDATE {} SET score = CASE WHEN ROUND(score * ?) > {MAX_SCORE} THEN {MAX_SCORE} ELSE ROUND(score * ?) END WHERE field_name = ?",
            quote_ident(text_table)
        );
        exec.execute(&sql, &[ratio.into(), ratio.into(), field.into()])
            .await?;
        Ok(())
    }

    async fn remove_field_storage(
        &self,
        exec: &mut dyn Executor,
        descriptor: &mut IndexStorageDescriptor,
        name: &str,
    ) -> Result<()> {
        let Some(info) = descriptor.field_tables.remove(name) else {
            return Ok(());
        };
        if info.field_type.is_text() {
            if exec.table_exists(&info.table).await? {
                exec.execute(
                    &format!("DELETE FROM {} WHERE field_name = ?", quote_ident(&info.table)),
                    &[name.into()],
                )
                .await?;
            }
            if !descriptor.has_text_fields() {
                exec.drop_table(&info.table).await?;
                descriptor.text_table = None;
            }
        } else {
            exec.drop_table(&info.table).await?;
        }
        if exec.column_exists(&descriptor.index_table, &info.column).await? {
            exec.drop_column(&descriptor.index_table, &info.column)
                .await?;
        }
        Ok(())
    }

    async fn create_field_storage(
        &self,
        exec: &mut dyn Executor,
        descriptor: &mut IndexStorageDescriptor,
        name: &str,
        field: &FieldDescriptor,
    ) -> Result<()> {
        let column = self.find_free_column(exec, descriptor, name).await?;
        let spec = column_spec(field.field_type);
        let table = if field.field_type.is_text() {
            self.ensure_text_table(exec, descriptor).await?
        } else {
            let table = self
                .find_free_table(exec, &format!("dbsearch_{}_{name}", descriptor.index_id))
                .await?;
            let value_spec = ColumnSpec::required(spec.column_type);
            exec.create_table(
                &TableDef::new(&table)
                    .column(ITEM_ID_COLUMN, item_id_spec())
                    .column(VALUE_COLUMN, value_spec)
                    .primary_key([ITEM_ID_COLUMN, VALUE_COLUMN])
                    .index(format!("{table}_value"), [VALUE_COLUMN]),
            )
            .await?;
            table
        };
        exec.add_column(&descriptor.index_table, &ColumnDef::new(&column, spec))
            .await?;
        descriptor.field_tables.insert(
            name.to_string(),
            FieldStorageInfo {
                table,
                column,
                field_type: field.field_type,
                boost: field.boost,
                multi_valued: field.field_type.is_text(),
            },
        );
        Ok(())
    }

    async fn ensure_index_table(
        &self,
        exec: &mut dyn Executor,
        descriptor: &IndexStorageDescriptor,
    ) -> Result<()> {
        if exec.table_exists(&descriptor.index_table).await? {
            return Ok(());
        }
        exec.create_table(
            &TableDef::new(&descriptor.index_table)
                .column(ITEM_ID_COLUMN, item_id_spec())
                .primary_key([ITEM_ID_COLUMN]),
        )
        .await
    }

    async fn ensure_text_table(
        &self,
        exec: &mut dyn Executor,
        descriptor: &mut IndexStorageDescriptor,
    ) -> Result<String> {
        let table = match &descriptor.text_table {
            Some(table) => table.clone(),
            None => {
                let base = format!("dbsearch_{}_text", descriptor.index_id);
                self.find_free_table(exec, &base).await?
            }
        };
        if !exec.table_exists(&table).await? {
            exec.create_table(
                &TableDef::new(&table)
                    .column(ITEM_ID_COLUMN, item_id_spec())
                    .column(
                        "field_name",
                        ColumnSpec::required(ColumnType::Varchar(FIELD_NAME_LENGTH)),
                    )
                    .column(
                        "word",
                        ColumnSpec::required(ColumnType::Varchar(WORD_MAX_LENGTH as u32)),
                    )
                    .column("score", ColumnSpec::required(ColumnType::UnsignedInt))
                    .primary_key([ITEM_ID_COLUMN, "field_name", "word"])
                    .index(format!("{table}_word_field"), ["word", "field_name"]),
            )
            .await?;
        }
        descriptor.text_table = Some(table.clone());
        Ok(table)
    }

    /// First unused table name derived from `base`.
    async fn find_free_table(&self, exec: &mut dyn Executor, base: &str) -> Result<String> {
        let base = sanitize_identifier(base);
        for n in 0.. {
            let name = format!(
                "{}{}",
                self.table_prefix,
                suffixed_identifier(&base, n, self.max_identifier_length)
            );
            if !exec.table_exists(&name).await? {
                return Ok(name);
            }
        }
        Err(Error::schema_operation(format!("No free table name for '{base}'")))
    }

    /// First unused index-table column name derived from a field ID.
    async fn find_free_column(
        &self,
        exec: &mut dyn Executor,
        descriptor: &IndexStorageDescriptor,
        field: &str,
    ) -> Result<String> {
        let base = sanitize_identifier(field);
        for n in 0.. {
            let name = suffixed_identifier(&base, n, self.max_identifier_length);
            let taken = name == ITEM_ID_COLUMN
                || descriptor.field_tables.values().any(|f| f.column == name)
                || exec.column_exists(&descriptor.index_table, &name).await?;
            if !taken {
                return Ok(name);
            }
        }
        Err(Error::schema_operation(format!("No free column name for '{field}'")))
    }
}

/// Commits on success, rolls back on failure, and wraps failures as schema
/// operation errors.
async fn finish<T>(
    tx: Box<dyn dbsearch_storage::Transaction>,
    outcome: Result<T>,
    action: &str,
) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| e.into_schema_operation(action))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                log::warn!("{action}: rollback failed: {rollback}");
            }
            Err(err.into_schema_operation(action))
        }
    }
}

/// Deletes stored item rows from every table of an index, optionally only
/// those of items from one datasource.
async fn delete_rows(
    exec: &mut dyn Executor,
    descriptor: &IndexStorageDescriptor,
    datasource: Option<&str>,
) -> Result<()> {
    let index_table = quote_ident(&descriptor.index_table);
    let (filter, params) = match datasource {
        None => (String::new(), Vec::new()),
        Some(datasource) => {
            let column = descriptor
                .field_tables
                .get(FIELD_DATASOURCE)
                .map(|info| info.column.clone())
                .ok_or_else(|| {
                    Error::schema_operation(format!(
                        "Index '{}' does not store the datasource",
                        descriptor.index_id
                    ))
                })?;
            (
                format!(
                    " WHERE {ITEM_ID_COLUMN} IN (SELECT {ITEM_ID_COLUMN} FROM {index_table} WHERE {} = ?)",
                    quote_ident(&column)
                ),
                vec![SqlValue::from(datasource)],
            )
        }
    };

    let mut tables: Vec<&str> = descriptor.dedicated_tables().into_iter().collect();
    if let Some(text_table) = &descriptor.text_table {
        tables.push(text_table);
    }
    for table in tables {
        exec.execute(
            &format!("DELETE FROM {}{filter}", quote_ident(table)),
            &params,
        )
        .await?;
    }
    exec.execute(&format!("DELETE FROM {index_table}{filter}"), &params)
        .await?;
    Ok(())
}
