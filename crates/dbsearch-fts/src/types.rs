//! Backend configuration.
//!
//! One [`BackendConfig`] is shared by every index of a server. It is usually
//! loaded from TOML:
//!
//! ```toml
//! database_url = "sqlite://search.db"
//! table_prefix = "search_"
//! min_chars = 3
//! matching = "partial"
//!
//! [autocomplete]
//! suggest_suffix = true
//! suggest_words = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use dbsearch_core::{Error, Result};

/// How fulltext keywords are matched against indexed words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMode {
    /// Whole words only.
    #[default]
    Words,
    /// Keyword may appear anywhere inside a word.
    Partial,
    /// Keyword must be a prefix of a word.
    Prefix,
}

/// Autocomplete passes to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutocompleteConfig {
    /// Complete the word currently being typed.
    #[serde(default = "default_true")]
    pub suggest_suffix: bool,

    /// Suggest additional words that co-occur with the input.
    #[serde(default = "default_true")]
    pub suggest_words: bool,
}

impl Default for AutocompleteConfig {
    fn default() -> Self {
        Self {
            suggest_suffix: default_true(),
            suggest_words: default_true(),
        }
    }
}

/// Backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Database URL, e.g. `sqlite://search.db` or `sqlite::memory:`.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Prefix applied to every table name.
    #[serde(default)]
    pub table_prefix: String,

    /// Minimum length of an indexed or searched word. Numbers are exempt.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,

    /// Keyword matching mode.
    #[serde(default)]
    pub matching: MatchingMode,

    /// Autocomplete passes.
    #[serde(default)]
    pub autocomplete: AutocompleteConfig,

    /// Suggested words occurring in more than this share of the results are dropped.
    #[serde(default = "default_max_occurrences")]
    pub autocomplete_max_occurrences: f64,

    /// Result limit applied when a query sets none.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_chars() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_max_occurrences() -> f64 {
    0.9
}

fn default_limit() -> usize {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            table_prefix: String::new(),
            min_chars: default_min_chars(),
            matching: MatchingMode::default(),
            autocomplete: AutocompleteConfig::default(),
            autocomplete_max_occurrences: default_max_occurrences(),
            default_limit: default_limit(),
        }
    }
}

impl BackendConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::config(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.autocomplete_max_occurrences) {
            return Err(Error::config(format!(
                "autocomplete_max_occurrences must be within 0..=1, got {}",
                self.autocomplete_max_occurrences
            )));
        }
        if !self
            .table_prefix
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        {
            return Err(Error::config(format!(
                "table_prefix '{}' may only contain [a-z0-9_]",
                self.table_prefix
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
