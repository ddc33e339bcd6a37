//! Index lifecycle: adding, updating, removing and lazy reconciliation.

use dbsearch::{
    BackendConfig, Error, FieldDescriptor, FieldType, IndexDefinition, ItemField, Keys, RawValue,
    SearchBackend, SearchQuery,
};

use crate::common::{TestHarness, cars, vehicle, vehicles_index};

async fn table_exists(harness: &TestHarness, table: &str) -> bool {
    let mut conn = harness.service.backend().connection().await.unwrap();
    conn.table_exists(table).await.unwrap()
}

async fn row_count(harness: &TestHarness, table: &str) -> i64 {
    let mut conn = harness.service.backend().connection().await.unwrap();
    conn.fetch_scalar(
        &format!("SELECT COUNT(*) FROM {}", dbsearch::storage::quote_ident(table)),
        &[],
    )
    .await
    .unwrap()
    .as_i64()
    .unwrap()
}

#[tokio::test]
async fn test_add_index_creates_storage() {
    let harness = TestHarness::new().await;
    harness.service.add_index(&vehicles_index()).await.unwrap();

    let descriptor = harness.descriptor(&vehicles_index()).await;
    assert!(table_exists(&harness, &descriptor.index_table).await);
    assert!(table_exists(&harness, descriptor.text_table.as_deref().unwrap()).await);
    assert!(table_exists(&harness, &descriptor.field_tables["color"].table).await);
    assert!(descriptor.field_tables.contains_key(dbsearch::core::FIELD_ID));
}

#[tokio::test]
async fn test_adding_twice_reconciles() {
    let harness = TestHarness::new().await;
    harness.service.add_index(&vehicles_index()).await.unwrap();
    let before = harness.descriptor(&vehicles_index()).await;
    harness.service.add_index(&vehicles_index()).await.unwrap();
    assert_eq!(harness.descriptor(&vehicles_index()).await, before);
}

#[tokio::test]
async fn test_unchanged_update_needs_no_reindex() {
    let harness = TestHarness::with_items(&vehicles_index(), &cars()).await;
    let before = harness.descriptor(&vehicles_index()).await;
    assert!(!harness.service.update_index(&vehicles_index()).await.unwrap());
    assert!(!harness.service.update_index(&vehicles_index()).await.unwrap());
    assert_eq!(harness.descriptor(&vehicles_index()).await, before);
}

#[tokio::test]
async fn test_boost_change_rescales_scores() {
    let harness = TestHarness::with_items(&vehicles_index(), &cars()).await;
    let boosted = vehicles_index().with_field(
        "title",
        FieldDescriptor::new(FieldType::Text).with_boost(2.0),
    );
    assert!(!harness.service.update_index(&boosted).await.unwrap());

    let results = harness
        .service
        .search(&boosted, &SearchQuery::new().keys(Keys::word("car")))
        .await
        .unwrap();
    assert_eq!(results.items[0].score, 2.0);
    assert_eq!(results.items[1].score, 2.0);
}

#[tokio::test]
async fn test_fulltext_flip_needs_reindex_and_replaces_storage() {
    let harness = TestHarness::with_items(&vehicles_index(), &cars()).await;
    let old_table = harness.descriptor(&vehicles_index()).await.field_tables["color"]
        .table
        .clone();

    let flipped = vehicles_index().with_field("color", FieldDescriptor::new(FieldType::Text));
    assert!(harness.service.update_index(&flipped).await.unwrap());
    assert!(!table_exists(&harness, &old_table).await);

    let descriptor = harness.descriptor(&flipped).await;
    assert_eq!(
        Some(descriptor.field_tables["color"].table.as_str()),
        descriptor.text_table.as_deref()
    );

    // Items indexed under the old layout are gone until reindexed.
    let results = harness
        .service
        .search(&flipped, &SearchQuery::new())
        .await
        .unwrap();
    assert_eq!(results.count, 0);
    assert!(
        harness
            .ids(&flipped, SearchQuery::new().keys(Keys::word("car")))
            .await
            .is_empty()
    );
    assert_eq!(row_count(&harness, &descriptor.index_table).await, 0);
    assert_eq!(
        row_count(&harness, descriptor.text_table.as_deref().unwrap()).await,
        0
    );
    for info in descriptor.field_tables.values() {
        assert_eq!(row_count(&harness, &info.table).await, 0, "{}", info.table);
    }

    let recolored: Vec<_> = cars()
        .into_iter()
        .map(|item| {
            let color = item.fields["color"].values.clone();
            item.with_field("color", ItemField::new(FieldType::Text, color))
        })
        .collect();
    harness.service.index_items(&flipped, &recolored).await.unwrap();
    let ids = harness
        .ids(
            &flipped,
            SearchQuery::new()
                .keys(Keys::word("blue"))
                .fulltext_fields(vec!["color".into()]),
        )
        .await;
    assert_eq!(ids, vec!["b"]);
}

#[tokio::test]
async fn test_new_field_needs_reindex() {
    let harness = TestHarness::with_items(&vehicles_index(), &cars()).await;
    let extended =
        vehicles_index().with_field("wheels", FieldDescriptor::new(FieldType::Integer));
    assert!(harness.service.update_index(&extended).await.unwrap());
    assert!(
        harness
            .descriptor(&extended)
            .await
            .field_tables
            .contains_key("wheels")
    );
}

#[tokio::test]
async fn test_removed_field_drops_storage() {
    let harness = TestHarness::with_items(&vehicles_index(), &cars()).await;
    let color_table = harness.descriptor(&vehicles_index()).await.field_tables["color"]
        .table
        .clone();
    let mut reduced = vehicles_index();
    reduced.fields.remove("color");
    harness.service.update_index(&reduced).await.unwrap();

    assert!(!table_exists(&harness, &color_table).await);
    let err = harness
        .service
        .search(
            &reduced,
            &SearchQuery::new().condition("color", "red", dbsearch::Operator::Eq),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownField { .. }));
}

#[tokio::test]
async fn test_indexing_reconciles_drifted_schema() {
    let harness = TestHarness::with_items(&vehicles_index(), &cars()).await;
    let extended =
        vehicles_index().with_field("wheels", FieldDescriptor::new(FieldType::Integer));
    let item = vehicle("c", "green truck", "green").with_field(
        "wheels",
        ItemField::new(FieldType::Integer, vec![RawValue::Integer(6)]),
    );
    let stored = harness.service.index_items(&extended, &[item]).await.unwrap();
    assert_eq!(stored, vec!["c"]);

    let ids = harness
        .ids(
            &extended,
            SearchQuery::new().condition("wheels", 4i64, dbsearch::Operator::Gt),
        )
        .await;
    assert_eq!(ids, vec!["c"]);
}

#[tokio::test]
async fn test_remove_index_drops_tables() {
    let harness = TestHarness::with_items(&vehicles_index(), &cars()).await;
    let descriptor = harness.descriptor(&vehicles_index()).await;
    harness.service.remove_index(&vehicles_index()).await.unwrap();

    assert!(!table_exists(&harness, &descriptor.index_table).await);
    let err = harness
        .service
        .search(&vehicles_index(), &SearchQuery::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingIndexConfiguration { .. }));
}

#[tokio::test]
async fn test_remove_read_only_index_keeps_tables() {
    let index = vehicles_index().read_only(true);
    let harness = TestHarness::with_items(&index, &cars()).await;
    let descriptor = harness.descriptor(&index).await;
    harness.service.remove_index(&index).await.unwrap();
    assert!(table_exists(&harness, &descriptor.index_table).await);
}

#[tokio::test]
async fn test_pre_delete_removes_every_index_of_server() {
    let harness = TestHarness::new().await;
    let first = vehicles_index();
    let second = IndexDefinition::new("boats", "db")
        .with_field("title", FieldDescriptor::new(FieldType::Text));
    let elsewhere = IndexDefinition::new("vehicles", "other")
        .with_field("title", FieldDescriptor::new(FieldType::Text));
    for index in [&first, &second, &elsewhere] {
        harness.service.add_index(index).await.unwrap();
    }

    harness.service.pre_delete("db").await.unwrap();
    for index in [&first, &second] {
        let err = harness
            .service
            .search(index, &SearchQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingIndexConfiguration { .. }));
    }
    harness
        .service
        .search(&elsewhere, &SearchQuery::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_indexing_unknown_index_fails() {
    let harness = TestHarness::new().await;
    let err = harness
        .service
        .index_items(&vehicles_index(), &cars())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingIndexConfiguration { .. }));
}

#[tokio::test]
async fn test_file_database_survives_reconnect() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = BackendConfig {
        database_url: format!("sqlite://{}", dir.path().join("search.db").display()),
        ..BackendConfig::default()
    };
    let index = vehicles_index();
    {
        let harness = TestHarness::with_config(config.clone()).await;
        harness.service.add_index(&index).await.unwrap();
        harness.service.index_items(&index, &cars()).await.unwrap();
    }

    let harness = TestHarness::with_config(config).await;
    let ids = harness
        .ids(&index, SearchQuery::new().keys(Keys::word("blue")))
        .await;
    assert_eq!(ids, vec!["b"]);
    // Reconciling an unchanged index against the reopened store is a no-op.
    assert!(!harness.service.update_index(&index).await.unwrap());
}
