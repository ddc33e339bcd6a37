//! Input-side data model: field types, index definitions, and items.
//!
//! These types describe what the caller hands to the backend. How they end
//! up in tables is decided by the mapper and the schema manager in
//! `dbsearch-fts`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identifier of an indexed item.
pub type ItemId = String;

/// Special field holding the item ID.
pub const FIELD_ID: &str = "search_api_id";
/// Special field holding the item's datasource.
pub const FIELD_DATASOURCE: &str = "search_api_datasource";
/// Special field holding the item's language.
pub const FIELD_LANGUAGE: &str = "search_api_language";
/// Pseudo-field used to sort by relevance.
pub const FIELD_RELEVANCE: &str = "search_api_relevance";

// ============================================================================
// FieldType
// ============================================================================

/// Canonical search data type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Fulltext: tokenized into the shared text table.
    Text,
    /// Short string, stored verbatim.
    String,
    /// Signed integer.
    Integer,
    /// Floating-point number.
    Decimal,
    /// Boolean, stored as 0/1.
    Boolean,
    /// Point in time, stored as a Unix timestamp.
    Date,
    /// URI, stored like a string.
    Uri,
    /// Duration in seconds.
    Duration,
}

impl FieldType {
    /// All canonical types.
    pub const ALL: [FieldType; 8] = [
        FieldType::Text,
        FieldType::String,
        FieldType::Integer,
        FieldType::Decimal,
        FieldType::Boolean,
        FieldType::Date,
        FieldType::Uri,
        FieldType::Duration,
    ];

    /// Type identifier as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Uri => "uri",
            FieldType::Duration => "duration",
        }
    }

    /// Whether values of this type are tokenized for fulltext search.
    pub fn is_text(&self) -> bool {
        matches!(self, FieldType::Text)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::unknown_type(s))
    }
}

// ============================================================================
// Index definition
// ============================================================================

fn default_boost() -> f64 {
    1.0
}

/// Configuration of one indexed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Canonical search type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Relevance multiplier (fulltext fields only).
    #[serde(default = "default_boost")]
    pub boost: f64,
}

impl FieldDescriptor {
    /// Creates a descriptor with boost 1.0.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            boost: default_boost(),
        }
    }

    /// Sets the boost.
    pub fn with_boost(mut self, boost: f64) -> Self {
        self.boost = boost;
        self
    }
}

/// A search index as configured by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index identifier.
    pub id: String,
    /// Server (backend instance) the index lives on.
    #[serde(default = "default_server_id")]
    pub server_id: String,
    /// User-configured fields.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDescriptor>,
    /// Read-only indexes never have their tables dropped.
    #[serde(default)]
    pub read_only: bool,
}

fn default_server_id() -> String {
    "default".to_string()
}

impl IndexDefinition {
    /// Creates an index definition with no user fields.
    pub fn new(id: impl Into<String>, server_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            server_id: server_id.into(),
            fields: BTreeMap::new(),
            read_only: false,
        }
    }

    /// Adds a field.
    pub fn with_field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name.into(), descriptor);
        self
    }

    /// Marks the index read-only.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Fields every index stores in addition to the configured ones.
    pub fn special_fields() -> BTreeMap<String, FieldDescriptor> {
        [FIELD_ID, FIELD_DATASOURCE, FIELD_LANGUAGE]
            .into_iter()
            .map(|name| (name.to_string(), FieldDescriptor::new(FieldType::String)))
            .collect()
    }

    /// Configured fields plus special fields.
    ///
    /// A user field shadows a special field of the same name.
    pub fn all_fields(&self) -> BTreeMap<String, FieldDescriptor> {
        let mut fields = Self::special_fields();
        fields.extend(self.fields.clone());
        fields
    }

    /// Key under which the storage descriptor is persisted.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.server_id, self.id)
    }
}

// ============================================================================
// Items
// ============================================================================

/// One token of pre-tokenized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    /// Token text.
    pub text: String,
    /// Score contribution (1.0 unless a processor weighted it).
    #[serde(default = "default_boost")]
    pub boost: f64,
}

impl TextToken {
    /// Creates a token with score 1.0.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            boost: default_boost(),
        }
    }
}

/// A raw field value before conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// No value.
    Null,
    /// Boolean.
    Boolean(bool),
    /// Integer.
    Integer(i64),
    /// Floating-point number.
    Decimal(f64),
    /// String.
    String(String),
    /// Pre-tokenized text.
    Tokens(Vec<TextToken>),
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::String(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::String(s)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Integer(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Decimal(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Boolean(v)
    }
}

/// Values of one field of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemField {
    /// Search type the values are stored as.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Type the values had in the source data, if different.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_type: Option<FieldType>,
    /// Raw values.
    #[serde(default)]
    pub values: Vec<RawValue>,
}

impl ItemField {
    /// Creates a field with the given values.
    pub fn new(field_type: FieldType, values: Vec<RawValue>) -> Self {
        Self {
            field_type,
            original_type: None,
            values,
        }
    }

    /// Sets the source type.
    pub fn with_original_type(mut self, original_type: FieldType) -> Self {
        self.original_type = Some(original_type);
        self
    }
}

/// An item handed to the indexing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexItem {
    /// Item ID.
    pub id: ItemId,
    /// Datasource the item comes from.
    pub datasource: String,
    /// Language code.
    #[serde(default)]
    pub language: String,
    /// Field values keyed by field ID.
    #[serde(default)]
    pub fields: BTreeMap<String, ItemField>,
}

impl IndexItem {
    /// Creates an item with no fields.
    pub fn new(
        id: impl Into<ItemId>,
        datasource: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            datasource: datasource.into(),
            language: language.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds a field.
    pub fn with_field(mut self, name: impl Into<String>, field: ItemField) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Field values including the special fields.
    pub fn all_fields(&self) -> BTreeMap<String, ItemField> {
        let mut fields = BTreeMap::new();
        for (name, value) in [
            (FIELD_ID, &self.id),
            (FIELD_DATASOURCE, &self.datasource),
            (FIELD_LANGUAGE, &self.language),
        ] {
            fields.insert(
                name.to_string(),
                ItemField::new(FieldType::String, vec![RawValue::String(value.clone())]),
            );
        }
        fields.extend(self.fields.clone());
        fields
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ========================================================================
    // FieldType tests
    // ========================================================================

    #[test]
    fn test_field_type_from_str() {
        for t in FieldType::ALL {
            assert_eq!(t.as_str().parse::<FieldType>().unwrap(), t);
        }
    }

    #[test]
    fn test_field_type_unknown() {
        let err = "location".parse::<FieldType>().unwrap_err();
        assert!(matches!(err, Error::UnknownType { type_id } if type_id == "location"));
    }

    #[test]
    fn test_field_type_serde() {
        let json = serde_json::to_string(&FieldType::Decimal).unwrap();
        assert_eq!(json, "\"decimal\"");
        let back: FieldType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FieldType::Decimal);
    }

    // ========================================================================
    // IndexDefinition tests
    // ========================================================================

    #[test]
    fn test_special_fields_present() {
        let index = IndexDefinition::new("nodes", "db")
            .with_field("title", FieldDescriptor::new(FieldType::Text).with_boost(5.0));
        let all = index.all_fields();
        assert_eq!(all.len(), 4);
        assert_eq!(all[FIELD_ID].field_type, FieldType::String);
        assert_eq!(all["title"].boost, 5.0);
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(IndexDefinition::new("nodes", "db").storage_key(), "db:nodes");
    }

    #[test]
    fn test_index_definition_toml_defaults() {
        let index: IndexDefinition = serde_json::from_str(
            r#"{"id": "nodes", "fields": {"body": {"type": "text"}}}"#,
        )
        .unwrap();
        assert_eq!(index.server_id, "default");
        assert_eq!(index.fields["body"].boost, 1.0);
        assert!(!index.read_only);
    }

    // ========================================================================
    // Item tests
    // ========================================================================

    #[test]
    fn test_item_all_fields_includes_specials() {
        let item = IndexItem::new("entity:node/1", "entity:node", "en").with_field(
            "body",
            ItemField::new(FieldType::Text, vec!["hello".into()]),
        );
        let fields = item.all_fields();
        assert_eq!(
            fields[FIELD_DATASOURCE].values,
            vec![RawValue::String("entity:node".into())]
        );
        assert!(fields.contains_key("body"));
    }

    #[test]
    fn test_raw_value_untagged_serde() {
        let values: Vec<RawValue> =
            serde_json::from_str(r#"[null, true, 3, 2.5, "x", [{"text": "a"}]]"#).unwrap();
        assert_eq!(values[0], RawValue::Null);
        assert_eq!(values[1], RawValue::Boolean(true));
        assert_eq!(values[2], RawValue::Integer(3));
        assert_eq!(values[3], RawValue::Decimal(2.5));
        assert_eq!(values[4], RawValue::String("x".into()));
        assert_eq!(values[5], RawValue::Tokens(vec![TextToken::new("a")]));
    }
}
