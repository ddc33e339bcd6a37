//! The search backend service.
//!
//! [`SearchBackend`] is the surface a search framework drives: index
//! lifecycle, item indexing and deletion, searching and autocomplete.
//! [`DbSearchBackend`] implements it over any [`Backend`] database engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use dbsearch::{BackendConfig, DbSearchBackend, SearchBackend, SearchQuery, Keys};
//!
//! let service = DbSearchBackend::from_config(BackendConfig::load("dbsearch.toml")?).await?;
//! service.add_index(&index).await?;
//! service.index_items(&index, &items).await?;
//!
//! let results = service
//!     .search(&index, &SearchQuery::new().keys(Keys::word("car")))
//!     .await?;
//! println!("Found {} items", results.count);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use dbsearch_core::{IndexDefinition, IndexItem, ItemId, Result};
use dbsearch_fts::{BackendConfig, IndexingPipeline, SchemaManager};
use dbsearch_query::{ResultSet, SearchQuery, Suggestion};
use dbsearch_storage::{Backend, SqliteBackend};

/// Operations of a search backend.
///
/// Schema changes and indexing of one index are serialized; searches run
/// concurrently with everything.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Provisions storage for a new index. An existing index is reconciled
    /// with the definition instead.
    async fn add_index(&self, index: &IndexDefinition) -> Result<()>;

    /// Applies a changed field configuration. Returns `true` when stored
    /// items must be reindexed.
    async fn update_index(&self, index: &IndexDefinition) -> Result<bool>;

    /// Drops an index's storage, keeping the tables of read-only indexes.
    async fn remove_index(&self, index: &IndexDefinition) -> Result<()>;

    /// Drops the storage of every index on a server about to be deleted.
    async fn pre_delete(&self, server_id: &str) -> Result<()>;

    /// Indexes items, returning the IDs that were stored.
    async fn index_items(&self, index: &IndexDefinition, items: &[IndexItem])
    -> Result<Vec<ItemId>>;

    /// Removes items from an index.
    async fn delete_items(&self, index: &IndexDefinition, ids: &[ItemId]) -> Result<()>;

    /// Removes every item of an index, or only those of one datasource.
    async fn delete_all_index_items(
        &self,
        index: &IndexDefinition,
        datasource: Option<&str>,
    ) -> Result<()>;

    /// Runs a search.
    async fn search(&self, index: &IndexDefinition, query: &SearchQuery) -> Result<ResultSet>;

    /// Suggests completions for the input a user is typing.
    async fn autocomplete_suggestions(
        &self,
        index: &IndexDefinition,
        query: &SearchQuery,
        search_id: &str,
        incomplete_key: &str,
        user_input: &str,
    ) -> Result<Vec<Suggestion>>;

    /// Backend name for diagnostics.
    fn name(&self) -> &str;
}

/// Relational database search backend.
pub struct DbSearchBackend {
    config: BackendConfig,
    backend: Arc<dyn Backend>,
    schema: SchemaManager,
    pipeline: IndexingPipeline,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DbSearchBackend {
    /// Service over an already connected database.
    ///
    /// Creates the descriptor store if it does not exist yet.
    pub async fn new(config: BackendConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        config.validate()?;
        let schema = SchemaManager::new(backend.as_ref());
        schema.install(backend.as_ref()).await?;
        let pipeline = IndexingPipeline::new(schema.clone(), config.min_chars);
        log::info!(
            "dbsearch backend ready on {} (prefix '{}')",
            backend.name(),
            backend.table_prefix()
        );
        Ok(Self {
            config,
            backend,
            schema,
            pipeline,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Connects to the configured SQLite database.
    pub async fn from_config(config: BackendConfig) -> Result<Self> {
        config.validate()?;
        let backend = SqliteBackend::connect(
            &config.database_url,
            config.max_connections,
            config.table_prefix.clone(),
        )
        .await?;
        Self::new(config, Arc::new(backend)).await
    }

    /// Active configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Underlying database engine.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Schema manager of this service.
    pub fn schema(&self) -> &SchemaManager {
        &self.schema
    }

    /// Waits for exclusive access to one index.
    async fn lock_index(&self, index: &IndexDefinition) -> OwnedMutexGuard<()> {
        self.lock_key(index.storage_key()).await
    }

    async fn lock_key(&self, key: String) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl std::fmt::Debug for DbSearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSearchBackend")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SearchBackend for DbSearchBackend {
    async fn add_index(&self, index: &IndexDefinition) -> Result<()> {
        let _guard = self.lock_index(index).await;
        self.schema.add_index(self.backend(), index).await
    }

    async fn update_index(&self, index: &IndexDefinition) -> Result<bool> {
        let _guard = self.lock_index(index).await;
        let needs_reindex = self.schema.update_index(self.backend(), index).await?;
        if needs_reindex {
            log::info!("Index '{}' needs reindexing", index.id);
        }
        Ok(needs_reindex)
    }

    async fn remove_index(&self, index: &IndexDefinition) -> Result<()> {
        let _guard = self.lock_index(index).await;
        self.schema.remove_index(self.backend(), index).await
    }

    async fn pre_delete(&self, server_id: &str) -> Result<()> {
        log::info!("Removing all storage of server '{server_id}'");
        let mut index_ids = {
            let mut conn = self.backend.connection().await?;
            self.schema.index_ids(conn.as_mut(), server_id).await?
        };
        // Fixed order so concurrent callers cannot deadlock.
        index_ids.sort();
        let mut guards = Vec::with_capacity(index_ids.len());
        for index_id in index_ids {
            let key = IndexDefinition::new(index_id, server_id).storage_key();
            guards.push(self.lock_key(key).await);
        }
        self.schema.drop_all(self.backend(), server_id).await
    }

    async fn index_items(
        &self,
        index: &IndexDefinition,
        items: &[IndexItem],
    ) -> Result<Vec<ItemId>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.lock_index(index).await;
        self.pipeline
            .index_items(self.backend(), index, items)
            .await
    }

    async fn delete_items(&self, index: &IndexDefinition, ids: &[ItemId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _guard = self.lock_index(index).await;
        self.pipeline.delete_items(self.backend(), index, ids).await
    }

    async fn delete_all_index_items(
        &self,
        index: &IndexDefinition,
        datasource: Option<&str>,
    ) -> Result<()> {
        let _guard = self.lock_index(index).await;
        self.pipeline
            .delete_all_items(self.backend(), index, datasource)
            .await
    }

    async fn search(&self, index: &IndexDefinition, query: &SearchQuery) -> Result<ResultSet> {
        let mut conn = self.backend.connection().await?;
        let descriptor = self.schema.load_required(conn.as_mut(), index).await?;
        dbsearch_query::execute(conn.as_mut(), &descriptor, query, &self.config).await
    }

    async fn autocomplete_suggestions(
        &self,
        index: &IndexDefinition,
        query: &SearchQuery,
        search_id: &str,
        incomplete_key: &str,
        user_input: &str,
    ) -> Result<Vec<Suggestion>> {
        let mut conn = self.backend.connection().await?;
        let descriptor = self.schema.load_required(conn.as_mut(), index).await?;
        dbsearch_query::suggest(
            conn.as_mut(),
            &descriptor,
            query,
            search_id,
            incomplete_key,
            user_input,
            &self.config,
        )
        .await
    }

    fn name(&self) -> &str {
        "dbsearch"
    }
}
