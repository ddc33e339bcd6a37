//! Autocomplete through the service.

use dbsearch::{AutocompleteConfig, BackendConfig, Keys, SearchBackend, SearchQuery};

use crate::common::{TestHarness, vehicle, vehicles_index};

fn fleet() -> Vec<dbsearch::IndexItem> {
    vec![
        vehicle("a", "red car", "red"),
        vehicle("b", "red cart", "red"),
        vehicle("c", "blue car", "blue"),
        vehicle("d", "red bike", "red"),
    ]
}

#[tokio::test]
async fn test_completes_and_suggests() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &fleet()).await;
    let query = SearchQuery::new().keys(Keys::word("red"));
    let suggestions = harness
        .service
        .autocomplete_suggestions(&index, &query, "search_page", "car", "red car")
        .await
        .unwrap();
    let texts: Vec<String> = suggestions.iter().map(|s| s.text()).collect();
    // "cart" completes the typed word; no other word co-occurs with both.
    assert_eq!(texts, vec!["red cart"]);
    assert_eq!(suggestions[0].suffix, "t");
    assert_eq!(suggestions[0].result_count, 1);
}

#[tokio::test]
async fn test_word_suggestions_only() {
    let index = vehicles_index();
    let config = BackendConfig {
        autocomplete: AutocompleteConfig {
            suggest_suffix: false,
            suggest_words: true,
        },
        ..BackendConfig::default()
    };
    let harness = TestHarness::with_config(config).await;
    harness.service.add_index(&index).await.unwrap();
    harness.service.index_items(&index, &fleet()).await.unwrap();

    let suggestions = harness
        .service
        .autocomplete_suggestions(&index, &SearchQuery::new(), "search_page", "car", "car")
        .await
        .unwrap();
    let texts: Vec<String> = suggestions.iter().map(|s| s.text()).collect();
    assert_eq!(texts, vec!["car blue", "car red"]);
}

#[tokio::test]
async fn test_limit_is_respected() {
    let index = vehicles_index();
    let harness = TestHarness::with_items(&index, &fleet()).await;
    let suggestions = harness
        .service
        .autocomplete_suggestions(
            &index,
            &SearchQuery::new().range(0, Some(1)),
            "search_page",
            "",
            "",
        )
        .await
        .unwrap();
    assert_eq!(suggestions.len(), 1);
}
