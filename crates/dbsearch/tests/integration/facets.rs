//! Facets through the service.

use dbsearch::{
    ConditionGroup, Conjunction, FacetOperator, FacetRequest, Keys, Operator, SearchBackend,
    SearchQuery,
};

use crate::common::{TestHarness, vehicle, vehicles_index};

fn fleet() -> Vec<dbsearch::IndexItem> {
    vec![
        vehicle("a", "red car", "red"),
        vehicle("b", "blue car", "blue"),
        vehicle("c", "red truck", "red"),
        vehicle("d", "green truck", "green"),
    ]
}

fn counts(values: &[dbsearch::FacetValue]) -> Vec<(String, u64)> {
    values.iter().map(|v| (v.filter.clone(), v.count)).collect()
}

#[tokio::test]
async fn test_facets_follow_the_result() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &fleet()).await;
    let query = SearchQuery::new()
        .keys(Keys::word("car"))
        .facet(FacetRequest::new("color"));
    let results = harness.service.search(&index, &query).await.unwrap();
    assert_eq!(
        counts(&results.facets["color"]),
        vec![("\"blue\"".to_string(), 1), ("\"red\"".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_zero_count_values_are_reported() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &fleet()).await;
    let query = SearchQuery::new()
        .keys(Keys::word("truck"))
        .facet(FacetRequest {
            min_count: 0,
            ..FacetRequest::new("color")
        });
    let results = harness.service.search(&index, &query).await.unwrap();
    assert_eq!(
        counts(&results.facets["color"]),
        vec![
            ("\"green\"".to_string(), 1),
            ("\"red\"".to_string(), 1),
            ("\"blue\"".to_string(), 0)
        ]
    );
}

#[tokio::test]
async fn test_min_count_and_limit() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &fleet()).await;
    let query = SearchQuery::new()
        .facet(FacetRequest {
            min_count: 2,
            ..FacetRequest::new("color")
        })
        .facet(FacetRequest {
            limit: 1,
            ..FacetRequest::new("title")
        });
    let results = harness.service.search(&index, &query).await.unwrap();
    assert_eq!(
        counts(&results.facets["color"]),
        vec![("\"red\"".to_string(), 2)]
    );
    assert_eq!(results.facets["title"].len(), 1);
}

#[tokio::test]
async fn test_or_facet_counts_without_own_filter() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &fleet()).await;
    let query = SearchQuery::new()
        .keys(Keys::word("truck"))
        .condition_group(
            ConditionGroup::new(Conjunction::Or)
                .condition("color", "green", Operator::Eq)
                .tag("facet:color"),
        )
        .facet(FacetRequest {
            operator: FacetOperator::Or,
            ..FacetRequest::new("color")
        });
    let results = harness.service.search(&index, &query).await.unwrap();
    assert_eq!(results.ids(), vec!["d"]);
    assert_eq!(
        counts(&results.facets["color"]),
        vec![("\"green\"".to_string(), 1), ("\"red\"".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_facets_of_empty_result() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &fleet()).await;
    let query = SearchQuery::new()
        .keys(Keys::word("boat"))
        .facet(FacetRequest::new("color"));
    let results = harness.service.search(&index, &query).await.unwrap();
    assert_eq!(results.count, 0);
    assert!(results.facets["color"].is_empty());
}
