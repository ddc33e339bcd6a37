//! CLI configuration file.
//!
//! The backend settings sit at the top level and configured indexes follow
//! as `[[indexes]]` tables:
//!
//! ```toml
//! database_url = "sqlite://search.db"
//! min_chars = 3
//!
//! [[indexes]]
//! id = "articles"
//!
//! [indexes.fields.title]
//! type = "text"
//! boost = 2.0
//!
//! [indexes.fields.tags]
//! type = "string"
//! ```

use std::path::Path;

use dbsearch::{BackendConfig, IndexDefinition};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Backend settings.
    #[serde(flatten)]
    pub backend: BackendConfig,

    /// Configured indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

impl CliConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::config(e.to_string()))?;
        config.backend.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    /// Serializes to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// A configured index by ID.
    pub fn index(&self, id: &str) -> Result<&IndexDefinition> {
        self.indexes
            .iter()
            .find(|index| index.id == id)
            .ok_or_else(|| Error::UnknownIndex(id.to_string()))
    }

    /// The named index, or every configured index.
    pub fn selected(&self, id: Option<&str>) -> Result<Vec<&IndexDefinition>> {
        match id {
            Some(id) => Ok(vec![self.index(id)?]),
            None => Ok(self.indexes.iter().collect()),
        }
    }
}
