//! Autocomplete suggestions.
//!
//! Two passes can run for one request:
//!
//! - **suffix**: complete the word being typed with indexed words that start
//!   with it, drawn from the items the current query finds
//! - **words**: suggest further words that co-occur in the items matching
//!   the whole input
//!
//! Each pass materializes its result universe into a temporary table and
//! ranks candidate words by the number of distinct items containing them.
//! Words found in nearly every result are useless as suggestions and are
//! dropped.

use std::collections::BTreeSet;

use dbsearch_core::Result;
use dbsearch_fts::descriptor::{DescriptorCache, ITEM_ID_COLUMN, IndexStorageDescriptor};
use dbsearch_fts::mapper::canonical;
use dbsearch_fts::{BackendConfig, MatchingMode};
use dbsearch_storage::{Executor, SqlValue, quote_ident};

use crate::facets::temporary_table_name;
use crate::keys::Keys;
use crate::query::{SearchQuery, Suggestion};
use crate::search::QueryPlan;
use crate::sql::{Predicate, Select, escape_like, placeholders};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Suffix,
    Words,
}

/// Computes suggestions for the input a user is typing.
///
/// `query` holds the keys the user already completed; `incomplete_key` is
/// the word being typed and `user_input` the raw input so far.
pub async fn suggest(
    exec: &mut dyn Executor,
    descriptor: &IndexStorageDescriptor,
    query: &SearchQuery,
    search_id: &str,
    incomplete_key: &str,
    user_input: &str,
    config: &BackendConfig,
) -> Result<Vec<Suggestion>> {
    let cache = descriptor.cache();
    if cache.text_table.is_none() || cache.fulltext.is_empty() {
        log::debug!(
            "Autocomplete '{search_id}': index '{}' has no fulltext fields",
            descriptor.index_id
        );
        return Ok(Vec::new());
    }

    let config = BackendConfig {
        matching: MatchingMode::Words,
        ..config.clone()
    };
    let incomplete_key = canonical(incomplete_key.trim());
    let user_input = user_input.to_lowercase();

    let mut passes = Vec::new();
    if config.autocomplete.suggest_suffix && !incomplete_key.is_empty() {
        passes.push(PassKind::Suffix);
    }
    if config.autocomplete.suggest_words
        && (incomplete_key.is_empty() || incomplete_key.chars().count() >= config.min_chars)
    {
        passes.push(PassKind::Words);
    }
    if passes.is_empty() {
        return Ok(Vec::new());
    }

    let limit = query.limit.unwrap_or(config.default_limit);
    let pass_limit = limit.div_ceil(passes.len());
    let mut suggestions = Vec::new();
    for kind in passes {
        let mut pass_query = query.clone();
        if kind == PassKind::Words && !incomplete_key.is_empty() {
            pass_query.keys = Keys::parse(&user_input);
        }
        let plan = QueryPlan::build(&cache, &pass_query, &config, None)?;
        if plan.no_results {
            continue;
        }

        let mut exclude: BTreeSet<String> = plan
            .keys
            .iter()
            .flat_map(|k| k.words())
            .map(str::to_string)
            .collect();
        if kind == PassKind::Words && !incomplete_key.is_empty() {
            exclude.insert(incomplete_key.clone());
        }

        let table = temporary_table_name();
        let items = plan.item_ids().render();
        exec.create_temporary_table(&table, &items.sql, &items.params)
            .await?;
        let outcome = candidates(
            exec,
            &cache,
            &table,
            kind,
            &incomplete_key,
            &exclude,
            pass_limit,
            config.autocomplete_max_occurrences,
        )
        .await;
        let dropped = exec.drop_temporary_table(&table).await;
        let words = outcome?;
        dropped?;

        for (word, result_count) in words {
            let suffix = match kind {
                PassKind::Suffix => word
                    .strip_prefix(incomplete_key.as_str())
                    .unwrap_or(&word)
                    .to_string(),
                PassKind::Words if user_input.is_empty() || user_input.ends_with(' ') => word,
                PassKind::Words => format!(" {word}"),
            };
            suggestions.push(Suggestion {
                user_input: user_input.clone(),
                suffix,
                result_count,
            });
        }
    }

    suggestions.truncate(limit);
    log::debug!(
        "Autocomplete '{search_id}' on '{}': {} suggestion(s)",
        descriptor.index_id,
        suggestions.len()
    );
    Ok(suggestions)
}

/// Candidate words of one pass with their distinct item counts.
#[allow(clippy::too_many_arguments)]
async fn candidates(
    exec: &mut dyn Executor,
    cache: &DescriptorCache,
    table: &str,
    kind: PassKind,
    incomplete_key: &str,
    exclude: &BTreeSet<String>,
    limit: usize,
    max_occurrences: f64,
) -> Result<Vec<(String, u64)>> {
    let Some(text_table) = cache.text_table.as_deref() else {
        return Ok(Vec::new());
    };
    let total = exec
        .fetch_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), &[])
        .await?
        .as_i64()
        .unwrap_or(0);
    if total <= 0 {
        return Ok(Vec::new());
    }
    let max = ((total as f64 * max_occurrences).floor() as i64).max(1);

    let universe = Predicate::sql(format!(
        "w.{ITEM_ID_COLUMN} IN (SELECT {ITEM_ID_COLUMN} FROM {})",
        quote_ident(table)
    ));
    let members = cache
        .fulltext_fields()
        .into_iter()
        .map(|field| {
            let mut member = Select::from_table(text_table, "w")
                .column(format!("w.{ITEM_ID_COLUMN} AS {ITEM_ID_COLUMN}"))
                .column("w.word AS word")
                .filter(Predicate::with_params(
                    "w.field_name = ?",
                    vec![SqlValue::from(field)],
                ))
                .filter(universe.clone());
            if kind == PassKind::Suffix {
                member = member
                    .filter(Predicate::with_params(
                        "w.word LIKE ? ESCAPE '\\'",
                        vec![SqlValue::from(format!("{}%", escape_like(incomplete_key)))],
                    ))
                    .filter(Predicate::with_params(
                        "w.word <> ?",
                        vec![SqlValue::from(incomplete_key)],
                    ));
            }
            if !exclude.is_empty() {
                member = member.filter(Predicate::with_params(
                    format!("w.word NOT IN ({})", placeholders(exclude.len())),
                    exclude.iter().map(|w| SqlValue::from(w.as_str())).collect(),
                ));
            }
            member
        })
        .collect();

    let select = Select::from_union(members, "c")
        .column("c.word AS word")
        .column(format!("COUNT(DISTINCT c.{ITEM_ID_COLUMN}) AS results"))
        .group_by("c.word")
        .having(Predicate::with_params(
            format!("COUNT(DISTINCT c.{ITEM_ID_COLUMN}) <= ?"),
            vec![SqlValue::Integer(max)],
        ))
        .order_by("results DESC")
        .order_by("word ASC")
        .range(0, Some(limit));
    let rendered = select.render();
    let rows = exec.fetch_all(&rendered.sql, &rendered.params).await?;
    Ok(rows
        .into_iter()
        .filter_map(|mut row| {
            let count = row.pop()?.as_i64()?;
            let word = row.pop()?.as_string()?;
            Some((word, count.max(0) as u64))
        })
        .collect())
}
