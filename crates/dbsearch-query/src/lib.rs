//! Query compilation and execution for dbsearch.
//!
//! Searches are compiled into SQL over the tables laid out by
//! `dbsearch-fts`: keyword trees become scored subqueries against the text
//! table, field conditions become filters and joins, and the combined select
//! is counted, sorted, paged and faceted.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      dbsearch-query                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  keys          keyword trees, parsing, preparation          │
//! │  compiler      keys → scored item_id select                 │
//! │  conditions    condition groups → predicates and joins      │
//! │  search        base plan, sorting, paging                   │
//! │  facets        AND / OR facet counts                        │
//! │  autocomplete  suffix and word suggestions                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  sql           Select / Predicate builder                   │
//! │  query         SearchQuery, ResultSet, Suggestion           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All statements of one search run on a single connection, so temporary
//! tables created for facets and autocomplete stay visible.

pub mod autocomplete;
pub mod compiler;
pub mod conditions;
pub mod facets;
pub mod keys;
pub mod query;
pub mod search;
pub mod sql;

// Re-exports
pub use autocomplete::suggest;
pub use compiler::{KeysContext, compile_keys};
pub use conditions::{CompiledConditions, ConditionCompiler};
pub use keys::{Conjunction, KeyGroup, Keys, PreparedKeys, prepare_keys};
pub use query::{
    Condition, ConditionGroup, ConditionItem, ConditionValue, FacetOperator, FacetRequest,
    FacetValue, Operator, ResultItem, ResultSet, SearchQuery, Sort, Suggestion,
};
pub use search::{NO_VALID_KEYS_WARNING, QueryPlan, execute};
pub use sql::{Fragment, Predicate, Select};
