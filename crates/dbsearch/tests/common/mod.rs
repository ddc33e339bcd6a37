//! Common test utilities and harness for dbsearch integration tests.

use dbsearch::{
    BackendConfig, DbSearchBackend, FieldDescriptor, FieldType, IndexDefinition, IndexItem,
    ItemField, ItemId, RawValue, SearchBackend, SearchQuery,
};
use dbsearch::fts::IndexStorageDescriptor;

/// Test harness around a service on a private in-memory database.
pub struct TestHarness {
    /// Service under test.
    pub service: DbSearchBackend,
}

impl TestHarness {
    /// Harness with the default configuration.
    pub async fn new() -> Self {
        Self::with_config(BackendConfig::default()).await
    }

    /// Harness with a custom configuration.
    pub async fn with_config(config: BackendConfig) -> Self {
        let service = DbSearchBackend::from_config(config)
            .await
            .expect("in-memory backend should start");
        Self { service }
    }

    /// Harness with `index` added and `items` indexed.
    pub async fn with_items(index: &IndexDefinition, items: &[IndexItem]) -> Self {
        let harness = Self::new().await;
        harness.service.add_index(index).await.unwrap();
        let stored = harness.service.index_items(index, items).await.unwrap();
        assert_eq!(stored.len(), items.len(), "every item should be indexed");
        harness
    }

    /// Current storage descriptor of an index.
    pub async fn descriptor(&self, index: &IndexDefinition) -> IndexStorageDescriptor {
        let mut conn = self.service.backend().connection().await.unwrap();
        self.service
            .schema()
            .load_required(conn.as_mut(), index)
            .await
            .unwrap()
    }

    /// IDs a query returns, in result order.
    pub async fn ids(&self, index: &IndexDefinition, query: SearchQuery) -> Vec<ItemId> {
        let results = self.service.search(index, &query).await.unwrap();
        results.items.into_iter().map(|item| item.id).collect()
    }
}

/// Index with fulltext `title` and string `color`.
pub fn vehicles_index() -> IndexDefinition {
    IndexDefinition::new("vehicles", "db")
        .with_field("title", FieldDescriptor::new(FieldType::Text))
        .with_field("color", FieldDescriptor::new(FieldType::String))
}

/// Item of [`vehicles_index`].
pub fn vehicle(id: &str, title: &str, color: &str) -> IndexItem {
    IndexItem::new(id, "entity:vehicle", "en")
        .with_field("title", ItemField::new(FieldType::Text, vec![title.into()]))
        .with_field(
            "color",
            ItemField::new(FieldType::String, vec![RawValue::from(color)]),
        )
}

/// The two items of the red/blue car scenario.
pub fn cars() -> Vec<IndexItem> {
    vec![vehicle("a", "red car", "red"), vehicle("b", "blue car", "blue")]
}
