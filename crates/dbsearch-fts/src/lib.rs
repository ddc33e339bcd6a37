//! Storage layout and indexing for dbsearch.
//!
//! This crate maps search fields onto relational tables and keeps those
//! tables in step with the index configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      dbsearch-fts                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  mapper      field types → column types, value conversion   │
//! │  descriptor  persisted per-index storage layout             │
//! │  schema      table provisioning and field reconciliation    │
//! │  indexer     item conversion, word scoring, row writes      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  types       BackendConfig (TOML)                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use dbsearch_fts::{IndexingPipeline, SchemaManager};
//!
//! let schema = SchemaManager::new(&backend);
//! schema.install(&backend).await?;
//! schema.add_index(&backend, &index).await?;
//!
//! let pipeline = IndexingPipeline::new(schema, config.min_chars);
//! let stored = pipeline.index_items(&backend, &index, &items).await?;
//! ```

pub mod descriptor;
pub mod indexer;
pub mod mapper;
pub mod schema;
pub mod types;

mod proptests;

// Re-exports
pub use descriptor::{DescriptorCache, FieldStorageInfo, IndexStorageDescriptor};
pub use indexer::{IndexingPipeline, ScoredWord, score_tokens};
pub use mapper::{Converted, StorageValue, column_spec, convert_value};
pub use schema::SchemaManager;
pub use types::{AutocompleteConfig, BackendConfig, MatchingMode};
