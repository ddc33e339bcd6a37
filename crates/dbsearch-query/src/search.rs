//! Search execution.
//!
//! A search is compiled into one base select over the index table (aliased
//! `t`) returning `item_id` and `score`. Keys, when present, are compiled
//! into a subquery joined to the index table; conditions are added as
//! filters and joins. The base select is then counted, sorted and paged for
//! the result list, and reused by facets.

use dbsearch_core::{Error, FIELD_RELEVANCE, Result};
use dbsearch_fts::descriptor::{DescriptorCache, ITEM_ID_COLUMN, IndexStorageDescriptor};
use dbsearch_fts::mapper::SCORE_MULTIPLIER;
use dbsearch_fts::BackendConfig;
use dbsearch_storage::{Executor, quote_ident};

use crate::compiler::{KeysContext, compile_keys};
use crate::conditions::ConditionCompiler;
use crate::facets;
use crate::keys::{Keys, prepare_keys};
use crate::query::{ResultItem, ResultSet, SearchQuery, Sort};
use crate::sql::{JoinKind, Predicate, Select};

/// Warning reported when every keyword was too short.
pub const NO_VALID_KEYS_WARNING: &str =
    "No valid search keys were present in the query; all keywords were ignored";

/// The compiled base of a search.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// `item_id, score` of every match.
    pub select: Select,
    /// Prepared keys, if any survived preparation.
    pub keys: Option<Keys>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
    /// Keywords left out.
    pub ignored: Vec<String>,
    /// Keys were given but all were ignored, so nothing can match.
    pub no_results: bool,
}

impl QueryPlan {
    /// Compiles the base select of a query.
    ///
    /// Condition groups tagged `skip_tag` are left out.
    pub fn build(
        cache: &DescriptorCache,
        query: &SearchQuery,
        config: &BackendConfig,
        skip_tag: Option<&str>,
    ) -> Result<Self> {
        let mut warnings = Vec::new();
        let prepared = match &query.keys {
            Some(keys) => prepare_keys(keys, config.min_chars),
            None => Default::default(),
        };
        let no_results = prepared.all_ignored();
        if no_results {
            log::warn!("{NO_VALID_KEYS_WARNING}: {:?}", prepared.ignored);
            warnings.push(NO_VALID_KEYS_WARNING.to_string());
        }
        let mut ignored = prepared.ignored;

        let item_column = format!("t.{ITEM_ID_COLUMN} AS {ITEM_ID_COLUMN}");
        let mut select = match &prepared.keys {
            Some(keys) => {
                let fields = fulltext_fields(cache, query)?;
                let text_table = cache.text_table.as_deref().ok_or_else(|| {
                    Error::invalid_query("Keywords were given but the index has no fulltext fields")
                })?;
                let ctx = KeysContext {
                    text_table,
                    index_table: &cache.index_table,
                    fields: &fields,
                    matching: config.matching,
                };
                let matches = compile_keys(keys, &ctx, false)?;
                Select::from_select(matches, "k")
                    .column(item_column)
                    .column("k.score AS score")
                    .join(
                        JoinKind::Inner,
                        &cache.index_table,
                        "t",
                        Predicate::sql(format!("t.{ITEM_ID_COLUMN} = k.{ITEM_ID_COLUMN}")),
                    )
            }
            None => Select::from_table(&cache.index_table, "t")
                .column(item_column)
                .column(format!("{} AS score", SCORE_MULTIPLIER as i64)),
        };

        let mut compiler = ConditionCompiler::new(cache, config);
        if let Some(tag) = skip_tag {
            compiler = compiler.skip_tag(tag);
        }
        let conditions = compiler.compile(&query.conditions)?;
        if !conditions.joins.is_empty() {
            select.set_distinct(true);
        }
        for join in conditions.joins {
            select.add_join(join);
        }
        select.add_filter(conditions.predicate);
        warnings.extend(conditions.warnings);
        ignored.extend(conditions.ignored);

        Ok(Self {
            select,
            keys: prepared.keys,
            warnings,
            ignored,
            no_results,
        })
    }

    /// `item_id` of every match, without duplicates.
    pub fn item_ids(&self) -> Select {
        Select::from_select(self.select.clone(), "r")
            .distinct()
            .column(format!("r.{ITEM_ID_COLUMN} AS {ITEM_ID_COLUMN}"))
    }
}

fn fulltext_fields(cache: &DescriptorCache, query: &SearchQuery) -> Result<Vec<String>> {
    match &query.fulltext_fields {
        None => Ok(cache.fulltext_fields()),
        Some(fields) => {
            for field in fields {
                if cache.scalar.contains_key(field) {
                    return Err(Error::type_mismatch(field));
                }
                if !cache.is_fulltext(field) {
                    return Err(Error::unknown_field(field, "fulltext search"));
                }
            }
            Ok(fields.clone())
        }
    }
}

/// Applies sorts to the base select. Ties always fall back to `item_id`.
pub fn apply_sorts(
    select: &mut Select,
    sorts: &[Sort],
    cache: &DescriptorCache,
    warnings: &mut Vec<String>,
) -> Result<()> {
    if sorts.is_empty() {
        select.add_order_by("score DESC");
    }
    for (i, sort) in sorts.iter().enumerate() {
        let direction = match sort.direction.to_uppercase().as_str() {
            "ASC" => "ASC",
            "DESC" => "DESC",
            other => {
                let warning = format!(
                    "Invalid sort direction '{other}' for field '{}'; sorting ascending",
                    sort.field
                );
                log::warn!("{warning}");
                warnings.push(warning);
                "ASC"
            }
        };
        if sort.field == FIELD_RELEVANCE {
            select.add_order_by(format!("score {direction}"));
            continue;
        }
        let info = cache
            .field(&sort.field)
            .ok_or_else(|| Error::unknown_field(&sort.field, "sort"))?;
        let alias = format!("sort_{i}");
        select.add_column(format!("t.{} AS {alias}", quote_ident(&info.column)));
        select.add_order_by(format!("{alias} {direction}"));
    }
    select.add_order_by(format!("{ITEM_ID_COLUMN} ASC"));
    Ok(())
}

/// Runs a search on one connection.
pub async fn execute(
    exec: &mut dyn Executor,
    descriptor: &IndexStorageDescriptor,
    query: &SearchQuery,
    config: &BackendConfig,
) -> Result<ResultSet> {
    let cache = descriptor.cache();
    let plan = QueryPlan::build(&cache, query, config, None)?;
    let mut results = ResultSet {
        warnings: plan.warnings.clone(),
        ignored_keywords: plan.ignored.clone(),
        ..ResultSet::default()
    };
    if plan.no_results {
        return Ok(results);
    }

    let count = Select::from_select(plan.select.clone(), "c")
        .column("COUNT(*)")
        .render();
    results.count = exec
        .fetch_scalar(&count.sql, &count.params)
        .await?
        .as_i64()
        .unwrap_or(0)
        .max(0) as u64;

    let mut page = plan.select.clone();
    apply_sorts(&mut page, &query.sorts, &cache, &mut results.warnings)?;
    page.set_range(query.offset, Some(query.limit.unwrap_or(config.default_limit)));
    let page = page.render();
    log::debug!("Search on '{}': {}", descriptor.index_id, page.sql);
    for row in exec.fetch_all(&page.sql, &page.params).await? {
        let (Some(id), Some(score)) = (
            row.first().and_then(|v| v.as_string()),
            row.get(1).and_then(|v| v.as_f64()),
        ) else {
            continue;
        };
        results.items.push(ResultItem {
            id,
            score: score / SCORE_MULTIPLIER,
        });
    }

    if !query.facets.is_empty() {
        results.facets =
            facets::compute(exec, &cache, query, &plan, config, &mut results.warnings).await?;
    }

    log::debug!(
        "Search on '{}' found {} item(s), returning {}",
        descriptor.index_id,
        results.count,
        results.items.len()
    );
    Ok(results)
}
