//! # dbsearch-storage
//!
//! Relational storage backends for dbsearch.
//!
//! Everything above this crate talks to the database through the
//! [`Backend`] capability interface: plain SQL with positional `?`
//! parameters, plus the handful of DDL operations the schema manager needs.
//! Engine errors never leave this crate; they are wrapped into
//! [`dbsearch_core::Error::Storage`].
//!
//! This crate provides:
//! - [`SqlValue`] and [`Row`]: dynamically typed parameters and results
//! - [`TableDef`], [`ColumnDef`], [`ColumnSpec`]: engine-neutral table definitions
//! - [`Backend`], [`Executor`], [`Transaction`]: the capability interface
//! - [`sqlite::SqliteBackend`]: the SQLite engine (sqlx)
//! - [`KeyValueStore`]: collection/name/value JSON persistence

#![warn(clippy::all)]

pub mod error;
pub mod kv;
pub mod sqlite;
pub mod table;
pub mod traits;
pub mod value;

pub use dbsearch_core::{Error, Result};
pub use kv::KeyValueStore;
pub use sqlite::{SqliteBackend, quote_ident};
pub use table::{ColumnDef, ColumnSpec, ColumnType, IndexDef, TableDef};
pub use traits::{Backend, Executor, MAX_IDENTIFIER_LENGTH, Transaction};
pub use value::{Row, SqlValue};
