//! Facet counting.
//!
//! AND facets count values within the current result, which is materialized
//! once into a temporary table shared by all of them. OR facets count within
//! the result the query would have without the facet's own filters (condition
//! groups tagged `facet:{field}`), compiled as a subquery per facet.

use std::collections::BTreeMap;

use dbsearch_core::Result;
use dbsearch_fts::BackendConfig;
use dbsearch_fts::descriptor::{DescriptorCache, FieldStorageInfo, ITEM_ID_COLUMN, VALUE_COLUMN};
use dbsearch_storage::{Executor, SqlValue};

use crate::query::{FacetOperator, FacetRequest, FacetValue, SearchQuery};
use crate::search::QueryPlan;
use crate::sql::{JoinKind, Predicate, Select};

/// Filter reported for items without a value.
pub const MISSING_FILTER: &str = "!";

/// Name for a per-query temporary table.
pub fn temporary_table_name() -> String {
    format!("dbsearch_tmp_{}", uuid::Uuid::new_v4().simple())
}

/// Renders a facet value as a filter string.
pub fn filter_for(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => MISSING_FILTER.to_string(),
        other => format!("\"{other}\""),
    }
}

/// Computes the requested facets of a query.
///
/// The temporary table, when one is created, is dropped before returning on
/// every path.
pub async fn compute(
    exec: &mut dyn Executor,
    cache: &DescriptorCache,
    query: &SearchQuery,
    plan: &QueryPlan,
    config: &BackendConfig,
    warnings: &mut Vec<String>,
) -> Result<BTreeMap<String, Vec<FacetValue>>> {
    let needs_table = query
        .facets
        .iter()
        .any(|f| f.operator == FacetOperator::And && cache.field(&f.field).is_some());
    if !needs_table {
        return compute_all(exec, cache, query, None, config, warnings).await;
    }

    let table = temporary_table_name();
    let items = plan.item_ids().render();
    exec.create_temporary_table(&table, &items.sql, &items.params)
        .await?;
    let outcome = compute_all(exec, cache, query, Some(&table), config, warnings).await;
    let dropped = exec.drop_temporary_table(&table).await;
    let facets = outcome?;
    dropped?;
    Ok(facets)
}

async fn compute_all(
    exec: &mut dyn Executor,
    cache: &DescriptorCache,
    query: &SearchQuery,
    results_table: Option<&str>,
    config: &BackendConfig,
    warnings: &mut Vec<String>,
) -> Result<BTreeMap<String, Vec<FacetValue>>> {
    let mut facets = BTreeMap::new();
    for request in &query.facets {
        let Some(info) = cache.field(&request.field) else {
            let warning = format!("Unknown facet field '{}'", request.field);
            log::warn!("{warning}");
            warnings.push(warning);
            continue;
        };
        let source = match (request.operator, results_table) {
            (FacetOperator::And, Some(table)) => Select::from_table(table, "r"),
            _ => {
                let tag = format!("facet:{}", request.field);
                let plan = QueryPlan::build(cache, query, config, Some(&tag))?;
                Select::from_select(plan.item_ids(), "r")
            }
        };
        let values = facet_values(exec, &request.field, info, request, source).await?;
        facets.insert(request.field.clone(), values);
    }
    Ok(facets)
}

/// Column holding the facet value and the extra join condition of a field.
fn value_source(field: &str, info: &FieldStorageInfo) -> (String, Option<Predicate>) {
    if info.field_type.is_text() {
        (
            "v.word".to_string(),
            Some(Predicate::with_params(
                "v.field_name = ?",
                vec![SqlValue::from(field)],
            )),
        )
    } else {
        (format!("v.{VALUE_COLUMN}"), None)
    }
}

async fn facet_values(
    exec: &mut dyn Executor,
    field: &str,
    info: &FieldStorageInfo,
    request: &FacetRequest,
    source: Select,
) -> Result<Vec<FacetValue>> {
    let (value_column, field_filter) = value_source(field, info);
    let mut on = vec![Predicate::sql(format!(
        "v.{ITEM_ID_COLUMN} = r.{ITEM_ID_COLUMN}"
    ))];
    on.extend(field_filter.clone());

    let mut select = source
        .column(format!("{value_column} AS value"))
        .column(format!("COUNT(DISTINCT r.{ITEM_ID_COLUMN}) AS num"))
        .join(
            if request.missing {
                JoinKind::Left
            } else {
                JoinKind::Inner
            },
            &info.table,
            "v",
            Predicate::All(on),
        )
        .group_by(value_column.clone())
        .order_by("num DESC")
        .order_by("value ASC");
    if request.min_count > 1 {
        select = select.having(Predicate::with_params(
            format!("COUNT(DISTINCT r.{ITEM_ID_COLUMN}) >= ?"),
            vec![SqlValue::Integer(request.min_count as i64)],
        ));
    }
    if request.limit > 0 {
        select = select.range(0, Some(request.limit));
    }

    let rendered = select.render();
    let mut values: Vec<(SqlValue, u64)> = exec
        .fetch_all(&rendered.sql, &rendered.params)
        .await?
        .into_iter()
        .filter_map(|mut row| {
            let count = row.pop()?.as_i64()?;
            let value = row.pop()?;
            (count > 0).then_some((value, count as u64))
        })
        .collect();

    if request.min_count == 0 && (request.limit == 0 || values.len() < request.limit) {
        let mut all = Select::from_table(&info.table, "v")
            .distinct()
            .column(format!("{value_column} AS value"))
            .order_by("value ASC");
        if let Some(filter) = field_filter {
            all = all.filter(filter);
        }
        let rendered = all.render();
        for mut row in exec.fetch_all(&rendered.sql, &rendered.params).await? {
            if request.limit > 0 && values.len() >= request.limit {
                break;
            }
            let Some(value) = row.pop() else { continue };
            if !values.iter().any(|(v, _)| *v == value) {
                values.push((value, 0));
            }
        }
    }

    Ok(values
        .into_iter()
        .map(|(value, count)| FacetValue {
            filter: filter_for(&value),
            count,
        })
        .collect())
}
