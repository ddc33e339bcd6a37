//! dbsearch: a search backend on top of a relational database.
//!
//! Items are stored in ordinary tables, one denormalized table per index
//! plus per-field tables and a shared word table for fulltext fields.
//! Searches are compiled into SQL against those tables.
//!
//! This crate bundles the components and exposes the [`SearchBackend`]
//! service:
//!
//! - [`core`]: shared types and errors
//! - [`storage`]: database engine abstraction (SQLite via sqlx)
//! - [`fts`]: field mapping, schema management, indexing
//! - [`query`]: query compilation, facets, autocomplete

pub mod backend;

pub use dbsearch_core as core;
pub use dbsearch_fts as fts;
pub use dbsearch_query as query;
pub use dbsearch_storage as storage;

pub use backend::{DbSearchBackend, SearchBackend};

// Convenience re-exports of the types every caller needs
pub use dbsearch_core::{
    Error, FieldDescriptor, FieldType, IndexDefinition, IndexItem, ItemField, ItemId, RawValue,
    Result, TextToken,
};
pub use dbsearch_fts::{AutocompleteConfig, BackendConfig, MatchingMode};
pub use dbsearch_query::{
    ConditionGroup, Conjunction, FacetOperator, FacetRequest, FacetValue, Keys, Operator,
    ResultItem, ResultSet, SearchQuery, Sort, Suggestion,
};
