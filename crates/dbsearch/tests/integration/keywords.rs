//! Keyword semantics: AND, OR, negation, deduplication, partial matching.

use dbsearch::{
    BackendConfig, Error, FieldDescriptor, FieldType, IndexDefinition, IndexItem, ItemField, Keys,
    MatchingMode, SearchBackend, SearchQuery,
};

use crate::common::TestHarness;

fn animals_index() -> IndexDefinition {
    IndexDefinition::new("animals", "db")
        .with_field("body", FieldDescriptor::new(FieldType::Text))
        .with_field("kind", FieldDescriptor::new(FieldType::String))
}

fn animal(id: &str, body: &str) -> IndexItem {
    IndexItem::new(id, "entity:animal", "en")
        .with_field("body", ItemField::new(FieldType::Text, vec![body.into()]))
}

fn animals() -> Vec<IndexItem> {
    vec![
        animal("1", "cat"),
        animal("2", "dog"),
        animal("3", "cat dog"),
        animal("4", "bird"),
    ]
}

async fn harness_with(config: BackendConfig) -> TestHarness {
    let harness = TestHarness::with_config(config).await;
    harness.service.add_index(&animals_index()).await.unwrap();
    harness
        .service
        .index_items(&animals_index(), &animals())
        .await
        .unwrap();
    harness
}

#[tokio::test]
async fn test_and_is_intersection() {
    let harness = TestHarness::with_items(&animals_index(), &animals()).await;
    let keys = Keys::and(vec![Keys::word("cat"), Keys::word("dog")]);
    let ids = harness
        .ids(&animals_index(), SearchQuery::new().keys(keys))
        .await;
    assert_eq!(ids, vec!["3"]);
}

#[tokio::test]
async fn test_or_is_union_ranked_by_score() {
    let harness = TestHarness::with_items(&animals_index(), &animals()).await;
    let keys = Keys::or(vec![Keys::word("cat"), Keys::word("dog")]);
    let results = harness
        .service
        .search(&animals_index(), &SearchQuery::new().keys(keys))
        .await
        .unwrap();
    assert_eq!(results.ids(), vec!["3", "1", "2"]);
    assert_eq!(results.items[0].score, 2.0);
    assert_eq!(results.items[1].score, 1.0);
}

#[tokio::test]
async fn test_negated_and_excludes_only_full_matches() {
    let harness = TestHarness::with_items(&animals_index(), &animals()).await;
    let keys = Keys::and(vec![Keys::word("cat"), Keys::word("dog")]).not();
    let ids = harness
        .ids(&animals_index(), SearchQuery::new().keys(keys))
        .await;
    assert_eq!(ids, vec!["1", "2", "4"]);
}

#[tokio::test]
async fn test_parsed_keys_with_exclusion() {
    let harness = TestHarness::with_items(&animals_index(), &animals()).await;
    let ids = harness
        .ids(
            &animals_index(),
            SearchQuery::new().keys(Keys::parse("cat -dog").unwrap()),
        )
        .await;
    assert_eq!(ids, vec!["1"]);

    let ids = harness
        .ids(
            &animals_index(),
            SearchQuery::new().keys(Keys::parse("bird OR dog").unwrap()),
        )
        .await;
    assert_eq!(ids, vec!["2", "3", "4"]);
}

#[tokio::test]
async fn test_repeated_word_is_stored_once_with_summed_score() {
    let harness = TestHarness::with_items(&animals_index(), &[animal("t", "test test Test")]).await;

    let descriptor = harness.descriptor(&animals_index()).await;
    let text_table = descriptor.text_table.clone().unwrap();
    let mut conn = harness.service.backend().connection().await.unwrap();
    let rows = conn
        .fetch_all(
            &format!("SELECT word, score FROM \"{text_table}\" WHERE item_id = 't'"),
            &[],
        )
        .await
        .unwrap();
    drop(conn);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1].as_i64(), Some(3000));

    let results = harness
        .service
        .search(&animals_index(), &SearchQuery::new().keys(Keys::word("test")))
        .await
        .unwrap();
    assert_eq!(results.items[0].score, 3.0);
}

#[tokio::test]
async fn test_partial_matching_with_negation() {
    let harness = harness_with(BackendConfig {
        matching: MatchingMode::Partial,
        ..BackendConfig::default()
    })
    .await;
    let ids = harness
        .ids(
            &animals_index(),
            SearchQuery::new().keys(Keys::parse("at -og").unwrap()),
        )
        .await;
    assert_eq!(ids, vec!["1"]);
}

#[tokio::test]
async fn test_prefix_matching() {
    let harness = harness_with(BackendConfig {
        matching: MatchingMode::Prefix,
        ..BackendConfig::default()
    })
    .await;
    let ids = harness
        .ids(&animals_index(), SearchQuery::new().keys(Keys::word("bi")))
        .await;
    assert_eq!(ids, vec!["4"]);
    let ids = harness
        .ids(&animals_index(), SearchQuery::new().keys(Keys::word("ird")))
        .await;
    assert!(ids.is_empty());
}

#[tokio::test]
async fn test_short_keywords_are_ignored_with_warning() {
    let harness = harness_with(BackendConfig {
        min_chars: 3,
        ..BackendConfig::default()
    })
    .await;
    let results = harness
        .service
        .search(
            &animals_index(),
            &SearchQuery::new().keys(Keys::parse("a b").unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(results.count, 0);
    assert!(results.items.is_empty());
    assert_eq!(results.ignored_keywords, vec!["a", "b"]);
    assert_eq!(results.warnings.len(), 1);

    // Short words next to usable ones are dropped from the search.
    let results = harness
        .service
        .search(
            &animals_index(),
            &SearchQuery::new().keys(Keys::parse("a cat").unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(results.ids(), vec!["1", "3"]);
    assert_eq!(results.ignored_keywords, vec!["a"]);
}

#[tokio::test]
async fn test_fulltext_search_on_string_field_is_rejected() {
    let harness = TestHarness::with_items(&animals_index(), &animals()).await;
    let err = harness
        .service
        .search(
            &animals_index(),
            &SearchQuery::new()
                .keys(Keys::word("cat"))
                .fulltext_fields(vec!["kind".into()]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[tokio::test]
async fn test_unknown_sort_field_is_rejected() {
    let harness = TestHarness::with_items(&animals_index(), &animals()).await;
    let err = harness
        .service
        .search(&animals_index(), &SearchQuery::new().sort("legs", "ASC"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownField { .. }));
}

#[tokio::test]
async fn test_keywords_ignore_diacritics() {
    let items = vec![
        animal("1", "Café crème"),
        animal("2", "cafe noir"),
        animal("3", "tea"),
    ];
    let harness = TestHarness::with_items(&animals_index(), &items).await;

    for keyword in ["cafe", "café", "CAFÉ"] {
        let results = harness
            .service
            .search(
                &animals_index(),
                &SearchQuery::new().keys(Keys::word(keyword)),
            )
            .await
            .unwrap();
        assert_eq!(results.ids(), vec!["1", "2"], "{keyword}");
        assert_eq!(results.items[0].score, results.items[1].score);
    }
    let ids = harness
        .ids(&animals_index(), SearchQuery::new().keys(Keys::word("creme")))
        .await;
    assert_eq!(ids, vec!["1"]);
}
