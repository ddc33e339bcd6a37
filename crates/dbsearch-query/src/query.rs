//! Search queries and their results.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use dbsearch_core::{Error, RawValue, Result};

use crate::keys::{Conjunction, Keys};

/// Comparison operator of a field condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    #[default]
    #[serde(rename = "=")]
    Eq,
    /// `<>`
    #[serde(rename = "<>")]
    NotEq,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `IN`
    #[serde(rename = "IN")]
    In,
    /// `NOT IN`
    #[serde(rename = "NOT IN")]
    NotIn,
    /// `BETWEEN`
    #[serde(rename = "BETWEEN")]
    Between,
    /// `NOT BETWEEN`
    #[serde(rename = "NOT BETWEEN")]
    NotBetween,
}

impl Operator {
    /// SQL spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
        }
    }

    /// Whether the operator excludes values.
    pub fn is_negative(&self) -> bool {
        matches!(self, Operator::NotEq | Operator::NotIn | Operator::NotBetween)
    }

    /// The positive counterpart of a negative operator.
    pub fn positive(&self) -> Operator {
        match self {
            Operator::NotEq => Operator::Eq,
            Operator::NotIn => Operator::In,
            Operator::NotBetween => Operator::Between,
            other => *other,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_uppercase().as_str() {
            "=" => Ok(Operator::Eq),
            "<>" | "!=" => Ok(Operator::NotEq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            "BETWEEN" => Ok(Operator::Between),
            "NOT BETWEEN" => Ok(Operator::NotBetween),
            _ => Err(Error::invalid_query(format!("Unsupported operator '{s}'"))),
        }
    }
}

/// Value side of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    /// Values for `IN` and `BETWEEN`.
    List(Vec<RawValue>),
    /// A single value.
    Single(RawValue),
}

impl ConditionValue {
    /// Values as a list.
    pub fn values(&self) -> Vec<&RawValue> {
        match self {
            ConditionValue::List(values) => values.iter().collect(),
            ConditionValue::Single(value) => vec![value],
        }
    }

    /// Whether this is a single NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, ConditionValue::Single(RawValue::Null))
    }
}

impl From<RawValue> for ConditionValue {
    fn from(value: RawValue) -> Self {
        ConditionValue::Single(value)
    }
}

impl From<Vec<RawValue>> for ConditionValue {
    fn from(values: Vec<RawValue>) -> Self {
        ConditionValue::List(values)
    }
}

macro_rules! single_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ConditionValue {
                fn from(value: $t) -> Self {
                    ConditionValue::Single(value.into())
                }
            }
        )*
    };
}

single_value_from!(&str, String, i64, f64, bool);

/// A field condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Field name.
    pub field: String,
    /// Compared value(s).
    pub value: ConditionValue,
    /// Operator.
    #[serde(default)]
    pub operator: Operator,
}

/// A member of a condition group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionItem {
    /// A single condition.
    Condition(Condition),
    /// A nested group.
    Group(ConditionGroup),
}

/// Conditions joined by one conjunction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    /// How members combine.
    #[serde(default)]
    pub conjunction: Conjunction,
    /// Members.
    #[serde(default)]
    pub conditions: Vec<ConditionItem>,
    /// Tags, e.g. `facet:color` for the filters of an OR facet.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl ConditionGroup {
    /// An empty group.
    pub fn new(conjunction: Conjunction) -> Self {
        Self {
            conjunction,
            ..Self::default()
        }
    }

    /// Adds a condition.
    pub fn condition(
        mut self,
        field: impl Into<String>,
        value: impl Into<ConditionValue>,
        operator: Operator,
    ) -> Self {
        self.conditions.push(ConditionItem::Condition(Condition {
            field: field.into(),
            value: value.into(),
            operator,
        }));
        self
    }

    /// Adds a nested group.
    pub fn group(mut self, group: ConditionGroup) -> Self {
        self.conditions.push(ConditionItem::Group(group));
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Whether there is nothing to filter on.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A sort criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    /// Field name, or `search_api_relevance`.
    pub field: String,
    /// `ASC` or `DESC`; anything else sorts ascending with a warning.
    #[serde(default = "default_direction")]
    pub direction: String,
}

fn default_direction() -> String {
    "ASC".to_string()
}

/// How a facet interacts with its own filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacetOperator {
    /// Counts within the current result.
    #[default]
    And,
    /// Counts ignoring the facet's own filters (groups tagged `facet:{field}`).
    Or,
}

/// A requested facet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetRequest {
    /// Field to count values of.
    pub field: String,
    /// Maximum number of values; 0 for no limit.
    #[serde(default)]
    pub limit: usize,
    /// Minimum count of a reported value. 0 also reports absent values.
    #[serde(default = "default_min_count")]
    pub min_count: u64,
    /// Also count items without a value (filter `!`).
    #[serde(default)]
    pub missing: bool,
    /// Facet operator.
    #[serde(default)]
    pub operator: FacetOperator,
}

fn default_min_count() -> u64 {
    1
}

impl FacetRequest {
    /// Facet with defaults.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            limit: 0,
            min_count: default_min_count(),
            missing: false,
            operator: FacetOperator::And,
        }
    }
}

/// A search over one index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Fulltext keys.
    #[serde(default)]
    pub keys: Option<Keys>,
    /// Fulltext fields to search; all of them when unset.
    #[serde(default)]
    pub fulltext_fields: Option<Vec<String>>,
    /// Field conditions.
    #[serde(default)]
    pub conditions: ConditionGroup,
    /// Sorts, applied in order.
    #[serde(default)]
    pub sorts: Vec<Sort>,
    /// Facets to compute.
    #[serde(default)]
    pub facets: Vec<FacetRequest>,
    /// Results to skip.
    #[serde(default)]
    pub offset: usize,
    /// Results to return; the configured default when unset.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchQuery {
    /// An empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the keys.
    pub fn keys(mut self, keys: Keys) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Restricts the searched fulltext fields.
    pub fn fulltext_fields(mut self, fields: Vec<String>) -> Self {
        self.fulltext_fields = Some(fields);
        self
    }

    /// Adds a condition to the root group.
    pub fn condition(
        mut self,
        field: impl Into<String>,
        value: impl Into<ConditionValue>,
        operator: Operator,
    ) -> Self {
        self.conditions = self.conditions.condition(field, value, operator);
        self
    }

    /// Adds a condition group to the root group.
    pub fn condition_group(mut self, group: ConditionGroup) -> Self {
        self.conditions = self.conditions.group(group);
        self
    }

    /// Adds a sort.
    pub fn sort(mut self, field: impl Into<String>, direction: impl Into<String>) -> Self {
        self.sorts.push(Sort {
            field: field.into(),
            direction: direction.into(),
        });
        self
    }

    /// Adds a facet.
    pub fn facet(mut self, facet: FacetRequest) -> Self {
        self.facets.push(facet);
        self
    }

    /// Sets offset and limit.
    pub fn range(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// One hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    /// Item ID.
    pub id: String,
    /// Relevance score.
    pub score: f64,
}

/// One facet value and its count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    /// `"value"`, or `!` for items without a value.
    pub filter: String,
    /// Number of matching items.
    pub count: u64,
}

/// Search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Total number of matching items.
    pub count: u64,
    /// The requested page of hits.
    pub items: Vec<ResultItem>,
    /// Facet values by field.
    pub facets: BTreeMap<String, Vec<FacetValue>>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
    /// Keywords left out of the search.
    pub ignored_keywords: Vec<String>,
}

impl ResultSet {
    /// IDs of the returned hits.
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.id.as_str()).collect()
    }
}

/// An autocomplete suggestion: `user_input` followed by `suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// What the user typed, lowercased.
    pub user_input: String,
    /// Text to append.
    pub suffix: String,
    /// Number of items the completed input would find.
    pub result_count: u64,
}

impl Suggestion {
    /// The full suggested text.
    pub fn text(&self) -> String {
        format!("{}{}", self.user_input, self.suffix)
    }
}
