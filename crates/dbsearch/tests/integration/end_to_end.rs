//! The red/blue car scenario and item lifecycle.

use dbsearch::{Keys, Operator, RawValue, SearchBackend, SearchQuery};

use crate::common::{TestHarness, cars, vehicle, vehicles_index};

#[tokio::test]
async fn test_shared_word_matches_both_items_with_equal_scores() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &cars()).await;

    let results = harness
        .service
        .search(&index, &SearchQuery::new().keys(Keys::word("car")))
        .await
        .unwrap();
    assert_eq!(results.count, 2);
    assert_eq!(results.ids(), vec!["a", "b"]);
    assert_eq!(results.items[0].score, results.items[1].score);
    assert!(results.warnings.is_empty());
}

#[tokio::test]
async fn test_distinct_word_matches_one_item() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &cars()).await;
    let ids = harness
        .ids(&index, SearchQuery::new().keys(Keys::word("red")))
        .await;
    assert_eq!(ids, vec!["a"]);
}

#[tokio::test]
async fn test_condition_without_keys() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &cars()).await;
    let ids = harness
        .ids(
            &index,
            SearchQuery::new().condition("color", "blue", Operator::Eq),
        )
        .await;
    assert_eq!(ids, vec!["b"]);
}

#[tokio::test]
async fn test_negated_keys() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &cars()).await;
    let ids = harness
        .ids(&index, SearchQuery::new().keys(Keys::word("red").not()))
        .await;
    assert_eq!(ids, vec!["b"]);
}

#[tokio::test]
async fn test_not_equal_includes_items_without_value() {
    let index = vehicles_index();
    let mut items = cars();
    items.push(
        dbsearch::IndexItem::new("c", "entity:vehicle", "en").with_field(
            "title",
            dbsearch::ItemField::new(dbsearch::FieldType::Text, vec!["grey van".into()]),
        ),
    );
    let harness = TestHarness::with_items(&index, &items).await;
    let ids = harness
        .ids(
            &index,
            SearchQuery::new().condition("color", "red", Operator::NotEq),
        )
        .await;
    assert_eq!(ids, vec!["b", "c"]);
}

#[tokio::test]
async fn test_sort_and_paging() {
    let index = vehicles_index();
    let items = vec![
        vehicle("a", "red car", "red"),
        vehicle("b", "blue car", "blue"),
        vehicle("c", "green car", "green"),
    ];
    let harness = TestHarness::with_items(&index, &items).await;

    let query = SearchQuery::new()
        .keys(Keys::word("car"))
        .sort("color", "DESC")
        .range(1, Some(1));
    let results = harness.service.search(&index, &query).await.unwrap();
    assert_eq!(results.count, 3);
    assert_eq!(results.ids(), vec!["c"]);
}

#[tokio::test]
async fn test_reindexing_replaces_item() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &cars()).await;
    harness
        .service
        .index_items(&index, &[vehicle("a", "yellow bus", "yellow")])
        .await
        .unwrap();

    let red = harness
        .ids(&index, SearchQuery::new().keys(Keys::word("red")))
        .await;
    assert!(red.is_empty());
    let bus = harness
        .ids(&index, SearchQuery::new().keys(Keys::word("bus")))
        .await;
    assert_eq!(bus, vec!["a"]);
}

#[tokio::test]
async fn test_delete_items() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &cars()).await;
    harness
        .service
        .delete_items(&index, &["a".to_string()])
        .await
        .unwrap();
    let ids = harness
        .ids(&index, SearchQuery::new().keys(Keys::word("car")))
        .await;
    assert_eq!(ids, vec!["b"]);
}

#[tokio::test]
async fn test_delete_all_items_of_one_datasource() {
    let index = vehicles_index();
    let mut items = cars();
    items.push(
        dbsearch::IndexItem::new("z", "entity:boat", "en").with_field(
            "title",
            dbsearch::ItemField::new(dbsearch::FieldType::Text, vec!["red boat".into()]),
        ),
    );
    let harness = TestHarness::with_items(&index, &items).await;

    harness
        .service
        .delete_all_index_items(&index, Some("entity:vehicle"))
        .await
        .unwrap();
    assert_eq!(harness.ids(&index, SearchQuery::new()).await, vec!["z"]);

    harness
        .service
        .delete_all_index_items(&index, None)
        .await
        .unwrap();
    assert!(harness.ids(&index, SearchQuery::new()).await.is_empty());
}

#[tokio::test]
async fn test_special_fields_are_searchable() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &cars()).await;
    let ids = harness
        .ids(
            &index,
            SearchQuery::new().condition(
                dbsearch::core::FIELD_ID,
                vec![RawValue::from("b"), RawValue::from("x")],
                Operator::In,
            ),
        )
        .await;
    assert_eq!(ids, vec!["b"]);
}

#[tokio::test]
async fn test_concurrent_searches_agree() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &cars()).await;
    let query = SearchQuery::new().keys(Keys::word("car"));

    let searches = (0..8).map(|_| harness.service.search(&index, &query));
    let results = futures::future::try_join_all(searches).await.unwrap();
    assert!(results.iter().all(|r| r.ids() == vec!["a", "b"]));
}
