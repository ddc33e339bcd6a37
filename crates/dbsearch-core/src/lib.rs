//! dbsearch core: shared types, errors, and utilities.
//!
//! This crate provides the foundational types used across all dbsearch
//! crates. It has no internal dbsearch dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`types`]: Field types, index definitions, and items
//! - [`util`]: Identifier utilities

pub mod error;
pub mod types;
pub mod util;

mod proptests;

// Re-export key types at crate root for convenience
pub use error::{Error, Result};
pub use types::{
    FIELD_DATASOURCE, FIELD_ID, FIELD_LANGUAGE, FIELD_RELEVANCE, FieldDescriptor, FieldType,
    IndexDefinition, IndexItem, ItemField, ItemId, RawValue, TextToken,
};

// Convenience re-exports from util
pub use util::ids::{is_valid_identifier, sanitize_identifier, truncate_bytes};
