//! # dbsearch-cli
//!
//! Admin CLI for the dbsearch database search backend.
//!
//! This crate provides command-line tools over `DbSearchBackend`:
//! - Index lifecycle (add, update, remove, drop a whole server)
//! - Indexing and deleting items from JSON files
//! - Searching and autocomplete from the shell
//! - Inspecting and creating the TOML configuration file

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod config_handlers;
pub mod error;

pub use cli::{Cli, Command, ConfigAction};
pub use config::CliConfig;
pub use error::{Error, Result};
