//! Indexing pipeline.
//!
//! Writes items into the tables laid out by the schema manager. Each item is
//! indexed in its own transaction (delete old rows, convert, insert), so one
//! bad item never takes the rest of a batch down with it.
//!
//! # Scoring
//!
//! Text values are split into words. Each word contributes its token boost
//! times a position decay factor,
//! `min(1, 0.01 + 3.5 / (2 + unique_words_so_far * 0.015))`, so words deep
//! into long texts matter less. Contributions of words with the same base
//! form are summed into one row, and the stored score is
//! `round(sum * field_boost * 1000)`, clamped to the column maximum.

use std::collections::{BTreeSet, HashMap};

use dbsearch_core::util::ids::truncate_chars;
use dbsearch_core::{IndexDefinition, IndexItem, ItemId, Result, TextToken};
use dbsearch_storage::{Backend, Executor, SqlValue, quote_ident};

use crate::descriptor::{FieldStorageInfo, ITEM_ID_COLUMN, IndexStorageDescriptor, VALUE_COLUMN};
use crate::mapper::{
    MAX_SCORE, SCORE_MULTIPLIER, StorageValue, TEXT_PREVIEW_LENGTH, canonical, convert_value,
    is_numeric,
};
use crate::schema::SchemaManager;

/// Rows per multi-row INSERT into the text table.
const INSERT_BATCH_SIZE: usize = 100;

/// One stored word of a text field.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredWord {
    /// Base form, as stored.
    pub word: String,
    /// Scaled score.
    pub score: u32,
}

/// Position decay for a token preceded by `unique_count` distinct words.
pub fn position_decay(unique_count: usize) -> f64 {
    (0.01 + 3.5 / (2.0 + unique_count as f64 * 0.015)).min(1.0)
}

/// Normalizes an indexed or searched word.
///
/// Numbers lose leading `-` and `0`; other words shorter than `min_chars`
/// are dropped.
pub fn normalize_word(word: &str, min_chars: usize) -> Option<String> {
    if is_numeric(word) {
        let trimmed = word.trim_start_matches(['-', '0']);
        return (!trimmed.is_empty()).then(|| trimmed.to_string());
    }
    (word.chars().count() >= min_chars).then(|| canonical(word))
}

/// Scores the tokens of one text field.
///
/// Returns the stored words in first-occurrence order and the preview for
/// the index table.
pub fn score_tokens(
    tokens: &[TextToken],
    field_boost: f64,
    min_chars: usize,
) -> (Vec<ScoredWord>, String) {
    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, f64> = HashMap::new();
    for token in tokens {
        let Some(word) = normalize_word(&token.text, min_chars) else {
            continue;
        };
        let decay = position_decay(order.len());
        match sums.get_mut(&word) {
            Some(sum) => *sum += token.boost * decay,
            None => {
                sums.insert(word.clone(), token.boost * decay);
                order.push(word);
            }
        }
    }

    let words = order
        .into_iter()
        .map(|word| {
            let sum = sums.get(&word).copied().unwrap_or(0.0);
            let score = (sum * field_boost * SCORE_MULTIPLIER).round();
            let score = score.clamp(0.0, MAX_SCORE as f64) as u32;
            ScoredWord { word, score }
        })
        .collect();

    let joined = tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let (preview, _) = truncate_chars(&joined, TEXT_PREVIEW_LENGTH);
    (words, preview)
}

/// Deduplicates scalar values by base form, keeping the first spelling.
pub fn dedupe_values(values: Vec<SqlValue>) -> Vec<SqlValue> {
    let mut seen = BTreeSet::new();
    values
        .into_iter()
        .filter(|v| !v.is_null())
        .filter(|v| {
            let key = match v {
                SqlValue::Text(s) => canonical(s),
                other => other.to_string(),
            };
            seen.insert(key)
        })
        .collect()
}

/// Writes items into an index.
#[derive(Debug, Clone)]
pub struct IndexingPipeline {
    schema: SchemaManager,
    min_chars: usize,
}

impl IndexingPipeline {
    /// Pipeline using the given schema manager.
    pub fn new(schema: SchemaManager, min_chars: usize) -> Self {
        Self { schema, min_chars }
    }

    /// Indexes a batch, returning the IDs that were stored.
    ///
    /// Failed items are logged and left out of the result. Schema errors
    /// from reconciling a drifted layout abort the batch.
    pub async fn index_items(
        &self,
        backend: &dyn Backend,
        index: &IndexDefinition,
        items: &[IndexItem],
    ) -> Result<Vec<ItemId>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let mut descriptor = {
            let mut conn = backend.connection().await?;
            self.schema.load_required(conn.as_mut(), index).await?
        };

        let desired = index.all_fields();
        if desired.keys().any(|f| !descriptor.field_tables.contains_key(f)) {
            log::info!(
                "Storage of index '{}' is out of date; reconciling before indexing",
                index.id
            );
            self.schema.update_index(backend, index).await?;
            let mut conn = backend.connection().await?;
            descriptor = self.schema.load_required(conn.as_mut(), index).await?;
        }

        let mut indexed = Vec::with_capacity(items.len());
        let mut multi_valued = BTreeSet::new();
        for item in items {
            let mut tx = backend.begin().await?;
            match self.index_item(&mut *tx, &descriptor, item).await {
                Ok(fields) => match tx.commit().await {
                    Ok(()) => {
                        multi_valued.extend(fields);
                        indexed.push(item.id.clone());
                    }
                    Err(e) => log::warn!("Failed to commit item '{}': {e}", item.id),
                },
                Err(e) => {
                    log::warn!("Failed to index item '{}': {e}", item.id);
                    if let Err(rollback) = tx.rollback().await {
                        log::warn!("Rollback after item '{}' failed: {rollback}", item.id);
                    }
                }
            }
        }

        let newly_multi: Vec<String> = multi_valued
            .into_iter()
            .filter(|f| {
                descriptor
                    .field_tables
                    .get(f)
                    .is_some_and(|info| !info.multi_valued)
            })
            .collect();
        if !newly_multi.is_empty() {
            for field in &newly_multi {
                if let Some(info) = descriptor.field_tables.get_mut(field) {
                    info.multi_valued = true;
                }
            }
            log::debug!("Marking fields as multi-valued: {newly_multi:?}");
            let mut tx = backend.begin().await?;
            match descriptor.save(&mut *tx, self.schema.kv()).await {
                Ok(()) => tx.commit().await?,
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        log::warn!("Rollback of descriptor update failed: {rollback}");
                    }
                    return Err(e);
                }
            }
        }

        log::info!(
            "Indexed {}/{} item(s) into '{}'",
            indexed.len(),
            items.len(),
            index.id
        );
        Ok(indexed)
    }

    /// Replaces the stored rows of one item.
    ///
    /// Returns the fields for which this item had more than one value.
    pub async fn index_item(
        &self,
        exec: &mut dyn Executor,
        descriptor: &IndexStorageDescriptor,
        item: &IndexItem,
    ) -> Result<Vec<String>> {
        delete_item_rows(exec, descriptor, std::slice::from_ref(&item.id)).await?;

        let mut columns = vec![ITEM_ID_COLUMN.to_string()];
        let mut row = vec![SqlValue::from(item.id.as_str())];
        let mut multi_valued = Vec::new();

        for (name, field) in item.all_fields() {
            let Some(info) = descriptor.field_tables.get(&name) else {
                log::warn!(
                    "Field '{name}' of item '{}' has no storage in index '{}'; skipping",
                    item.id,
                    descriptor.index_id
                );
                continue;
            };

            let first = if info.field_type.is_text() {
                let mut tokens = Vec::new();
                for value in &field.values {
                    let converted =
                        convert_value(value, info.field_type, field.original_type, &name);
                    if let StorageValue::Tokens(t) = converted.value {
                        tokens.extend(t);
                    }
                }
                let (words, preview) = score_tokens(&tokens, info.boost, self.min_chars);
                insert_words(exec, info, &name, &item.id, &words).await?;
                if preview.is_empty() {
                    SqlValue::Null
                } else {
                    SqlValue::Text(preview)
                }
            } else {
                let values: Vec<SqlValue> = field
                    .values
                    .iter()
                    .map(|v| {
                        convert_value(v, info.field_type, field.original_type, &name)
                            .value
                            .into_scalar()
                    })
                    .collect();
                let values = dedupe_values(values);
                insert_values(exec, info, &item.id, &values).await?;
                if values.len() > 1 {
                    multi_valued.push(name.clone());
                }
                values.into_iter().next().unwrap_or(SqlValue::Null)
            };
            columns.push(quote_ident(&info.column));
            row.push(first);
        }

        let placeholders = vec!["?"; row.len()].join(", ");
        exec.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                quote_ident(&descriptor.index_table),
                columns.join(", ")
            ),
            &row,
        )
        .await?;
        Ok(multi_valued)
    }

    /// Deletes items from an index.
    pub async fn delete_items(
        &self,
        backend: &dyn Backend,
        index: &IndexDefinition,
        ids: &[ItemId],
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = backend.begin().await?;
        let outcome = async {
            let descriptor = self.schema.load_required(&mut *tx, index).await?;
            delete_item_rows(&mut *tx, &descriptor, ids).await
        }
        .await;
        match outcome {
            Ok(()) => {
                tx.commit().await?;
                log::info!("Deleted {} item(s) from '{}'", ids.len(), index.id);
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    log::warn!("Rollback of item deletion failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    /// Deletes all items of an index, or only those of one datasource.
    pub async fn delete_all_items(
        &self,
        backend: &dyn Backend,
        index: &IndexDefinition,
        datasource: Option<&str>,
    ) -> Result<()> {
        self.schema.clear(backend, index, datasource).await
    }
}

/// Deletes every row of the given items from all tables of an index.
pub async fn delete_item_rows(
    exec: &mut dyn Executor,
    descriptor: &IndexStorageDescriptor,
    ids: &[ItemId],
) -> Result<()> {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let params: Vec<SqlValue> = ids.iter().map(|id| SqlValue::from(id.as_str())).collect();
    let mut tables: Vec<&str> = descriptor.dedicated_tables().into_iter().collect();
    if let Some(text_table) = &descriptor.text_table {
        tables.push(text_table);
    }
    tables.push(&descriptor.index_table);
    for table in tables {
        exec.execute(
            &format!(
                "DELETE FROM {} WHERE {ITEM_ID_COLUMN} IN ({placeholders})",
                quote_ident(table)
            ),
            &params,
        )
        .await?;
    }
    Ok(())
}

async fn insert_words(
    exec: &mut dyn Executor,
    info: &FieldStorageInfo,
    field: &str,
    item_id: &str,
    words: &[ScoredWord],
) -> Result<()> {
    for chunk in words.chunks(INSERT_BATCH_SIZE) {
        let values = vec!["(?, ?, ?, ?)"; chunk.len()].join(", ");
        let mut params = Vec::with_capacity(chunk.len() * 4);
        for word in chunk {
            params.push(SqlValue::from(item_id));
            params.push(SqlValue::from(field));
            params.push(SqlValue::from(word.word.as_str()));
            params.push(SqlValue::from(word.score));
        }
        exec.execute(
            &format!(
                "INSERT INTO {} ({ITEM_ID_COLUMN}, field_name, word, score) VALUES {values}",
                quote_ident(&info.table)
            ),
            &params,
        )
        .await?;
    }
    Ok(())
}

async fn insert_values(
    exec: &mut dyn Executor,
    info: &FieldStorageInfo,
    item_id: &str,
    values: &[SqlValue],
) -> Result<()> {
    if values.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["(?, ?)"; values.len()].join(", ");
    let mut params = Vec::with_capacity(values.len() * 2);
    for value in values {
        params.push(SqlValue::from(item_id));
        params.push(value.clone());
    }
    exec.execute(
        &format!(
            "INSERT INTO {} ({ITEM_ID_COLUMN}, {VALUE_COLUMN}) VALUES {placeholders}",
            quote_ident(&info.table)
        ),
        &params,
    )
    .await
    .map(|_| ())
}
