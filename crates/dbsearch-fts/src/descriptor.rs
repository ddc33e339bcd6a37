//! Persisted per-index storage descriptor.
//!
//! The descriptor records which physical tables and columns hold each field
//! of an index. It is versioned, validated before every write, and stored as
//! JSON in the key-value store under collection [`DESCRIPTOR_COLLECTION`].
//! [`DescriptorCache`] is the parsed, query-time view of it and is never
//! persisted.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use dbsearch_core::util::ids::is_valid_identifier;
use dbsearch_core::{Error, FieldType, Result};
use dbsearch_storage::{Executor, KeyValueStore, MAX_IDENTIFIER_LENGTH};

/// Current descriptor format.
pub const DESCRIPTOR_FORMAT_VERSION: u32 = 1;

/// Key-value collection holding descriptors.
pub const DESCRIPTOR_COLLECTION: &str = "dbsearch.indexes";

/// Item ID column shared by every table.
pub const ITEM_ID_COLUMN: &str = "item_id";

/// Value column of a dedicated field table.
pub const VALUE_COLUMN: &str = "value";

/// Where one field is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStorageInfo {
    /// Dedicated field table, or the shared text table for text fields.
    pub table: String,
    /// Column in the index table.
    pub column: String,
    /// Stored type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Field boost.
    pub boost: f64,
    /// Whether any item has more than one value for this field.
    #[serde(default)]
    pub multi_valued: bool,
}

impl FieldStorageInfo {
    /// Text fields are always filtered through the text table.
    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued || self.field_type.is_text()
    }
}

/// Storage layout of one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStorageDescriptor {
    /// Format version.
    pub format_version: u32,
    /// Server the index lives on.
    pub server_id: String,
    /// Index identifier.
    pub index_id: String,
    /// Read-only indexes keep their tables on removal.
    #[serde(default)]
    pub read_only: bool,
    /// Denormalized table, one row per item.
    pub index_table: String,
    /// Shared text table, present while any text field exists.
    #[serde(default)]
    pub text_table: Option<String>,
    /// Storage of each field.
    #[serde(default)]
    pub field_tables: BTreeMap<String, FieldStorageInfo>,
}

impl IndexStorageDescriptor {
    /// An empty descriptor.
    pub fn new(
        server_id: impl Into<String>,
        index_id: impl Into<String>,
        index_table: impl Into<String>,
    ) -> Self {
        Self {
            format_version: DESCRIPTOR_FORMAT_VERSION,
            server_id: server_id.into(),
            index_id: index_id.into(),
            read_only: false,
            index_table: index_table.into(),
            text_table: None,
            field_tables: BTreeMap::new(),
        }
    }

    /// Key-value key, `"{server_id}:{index_id}"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.server_id, self.index_id)
    }

    /// Whether any field is fulltext.
    pub fn has_text_fields(&self) -> bool {
        self.field_tables.values().any(|f| f.field_type.is_text())
    }

    /// Dedicated field tables (text fields excluded), deduplicated.
    pub fn dedicated_tables(&self) -> BTreeSet<&str> {
        self.field_tables
            .values()
            .filter(|f| !f.field_type.is_text())
            .map(|f| f.table.as_str())
            .collect()
    }

    /// Checks version and identifiers.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != DESCRIPTOR_FORMAT_VERSION {
            return Err(Error::schema_operation(format!(
                "Unsupported storage descriptor version {} for index '{}'",
                self.format_version, self.index_id
            )));
        }
        let check = |kind: &str, name: &str| {
            if is_valid_identifier(name, MAX_IDENTIFIER_LENGTH) {
                Ok(())
            } else {
                Err(Error::schema_operation(format!(
                    "Invalid {kind} name '{name}' in storage descriptor of index '{}'",
                    self.index_id
                )))
            }
        };
        check("table", &self.index_table)?;
        if let Some(text_table) = &self.text_table {
            check("table", text_table)?;
        }
        for (field, info) in &self.field_tables {
            check("table", &info.table)?;
            check("column", &info.column)?;
            if info.field_type.is_text() && self.text_table.as_deref() != Some(info.table.as_str()) {
                return Err(Error::schema_operation(format!(
                    "Text field '{field}' of index '{}' is not stored in the text table",
                    self.index_id
                )));
            }
        }
        Ok(())
    }

    /// Loads a descriptor. Newer format versions are rejected.
    pub async fn load(
        exec: &mut dyn Executor,
        kv: &KeyValueStore,
        key: &str,
    ) -> Result<Option<Self>> {
        let Some(json) = kv
            .get::<serde_json::Value>(exec, DESCRIPTOR_COLLECTION, key)
            .await?
        else {
            return Ok(None);
        };
        let version = json
            .get("format_version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        if version != u64::from(DESCRIPTOR_FORMAT_VERSION) {
            return Err(Error::schema_operation(format!(
                "Storage descriptor '{key}' has unsupported format version {version}"
            )));
        }
        Ok(Some(serde_json::from_value(json)?))
    }

    /// Loads every descriptor of a server.
    pub async fn load_all(
        exec: &mut dyn Executor,
        kv: &KeyValueStore,
        server_id: &str,
    ) -> Result<Vec<Self>> {
        let prefix = format!("{server_id}:");
        let mut descriptors = Vec::new();
        for (key, json) in kv
            .get_all::<serde_json::Value>(exec, DESCRIPTOR_COLLECTION)
            .await?
        {
            if !key.starts_with(&prefix) {
                continue;
            }
            let descriptor: Self = serde_json::from_value(json)?;
            descriptor.validate()?;
            descriptors.push(descriptor);
        }
        Ok(descriptors)
    }

    /// Validates and persists the descriptor.
    pub async fn save(&self, exec: &mut dyn Executor, kv: &KeyValueStore) -> Result<()> {
        self.validate()?;
        kv.set(exec, DESCRIPTOR_COLLECTION, &self.key(), self)
            .await
            .map_err(|e| e.into_schema_operation("Persisting storage descriptor"))
    }

    /// Deletes the persisted descriptor.
    pub async fn delete(&self, exec: &mut dyn Executor, kv: &KeyValueStore) -> Result<()> {
        kv.delete(exec, DESCRIPTOR_COLLECTION, &self.key()).await
    }

    /// Builds the query-time view.
    pub fn cache(&self) -> DescriptorCache {
        let mut fulltext = BTreeMap::new();
        let mut scalar = BTreeMap::new();
        for (name, info) in &self.field_tables {
            if info.field_type.is_text() {
                fulltext.insert(name.clone(), info.clone());
            } else {
                scalar.insert(name.clone(), info.clone());
            }
        }
        DescriptorCache {
            index_table: self.index_table.clone(),
            text_table: self.text_table.clone(),
            fulltext,
            scalar,
        }
    }
}

/// Field maps split by kind, rebuilt from a descriptor for each request.
#[derive(Debug, Clone, Default)]
pub struct DescriptorCache {
    /// Denormalized table.
    pub index_table: String,
    /// Shared text table.
    pub text_table: Option<String>,
    /// Fulltext fields.
    pub fulltext: BTreeMap<String, FieldStorageInfo>,
    /// Every other field.
    pub scalar: BTreeMap<String, FieldStorageInfo>,
}

impl DescriptorCache {
    /// Storage of any field.
    pub fn field(&self, name: &str) -> Option<&FieldStorageInfo> {
        self.fulltext.get(name).or_else(|| self.scalar.get(name))
    }

    /// Whether a field is fulltext.
    pub fn is_fulltext(&self, name: &str) -> bool {
        self.fulltext.contains_key(name)
    }

    /// Names of all fulltext fields.
    pub fn fulltext_fields(&self) -> Vec<String> {
        self.fulltext.keys().cloned().collect()
    }
}
