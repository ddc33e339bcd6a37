//! Field condition compilation.
//!
//! Conditions compile against the index table, aliased `t`, which holds one
//! row per item with the first value of every field. Fields that ever held
//! several values for one item are filtered through their dedicated tables
//! instead, which requires joins:
//!
//! - excluding operators (`<>`, `NOT IN`, `NOT BETWEEN`) LEFT JOIN the rows
//!   holding an excluded value and keep items where none was found;
//! - other operators join the value rows, a fresh join per condition in an
//!   AND group and one shared join per field in an OR group. Below an OR
//!   group joins are LEFT joins so they cannot drop items matched by another
//!   branch.
//!
//! Conditions on fulltext fields are keyword searches restricted to that
//! field.

use std::collections::HashMap;

use dbsearch_core::{Error, RawValue, Result};
use dbsearch_fts::descriptor::{DescriptorCache, FieldStorageInfo, ITEM_ID_COLUMN, VALUE_COLUMN};
use dbsearch_fts::mapper::convert_value;
use dbsearch_fts::{BackendConfig, MatchingMode};
use dbsearch_storage::{SqlValue, quote_ident};

use crate::compiler::{KeysContext, compile_keys};
use crate::keys::{Conjunction, Keys, prepare_keys};
use crate::query::{Condition, ConditionGroup, ConditionItem, ConditionValue, Operator};
use crate::sql::{Join, JoinKind, Predicate, placeholders};

/// Compiles condition groups of one query.
pub struct ConditionCompiler<'a> {
    cache: &'a DescriptorCache,
    min_chars: usize,
    matching: MatchingMode,
    skip_tag: Option<&'a str>,
    joins: Vec<Join>,
    warnings: Vec<String>,
    ignored: Vec<String>,
}

/// Output of [`ConditionCompiler::compile`].
#[derive(Debug, Clone)]
pub struct CompiledConditions {
    /// WHERE condition over alias `t`.
    pub predicate: Predicate,
    /// Joins the predicate needs.
    pub joins: Vec<Join>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
    /// Keywords dropped from fulltext conditions.
    pub ignored: Vec<String>,
}

impl<'a> ConditionCompiler<'a> {
    /// Compiler for the given storage layout.
    pub fn new(cache: &'a DescriptorCache, config: &BackendConfig) -> Self {
        Self {
            cache,
            min_chars: config.min_chars,
            matching: config.matching,
            skip_tag: None,
            joins: Vec::new(),
            warnings: Vec::new(),
            ignored: Vec::new(),
        }
    }

    /// Leaves out groups carrying `tag`.
    pub fn skip_tag(mut self, tag: &'a str) -> Self {
        self.skip_tag = Some(tag);
        self
    }

    /// Compiles the root group.
    pub fn compile(mut self, root: &ConditionGroup) -> Result<CompiledConditions> {
        let predicate = self.group(root, false)?;
        Ok(CompiledConditions {
            predicate,
            joins: self.joins,
            warnings: self.warnings,
            ignored: self.ignored,
        })
    }

    fn group(&mut self, group: &ConditionGroup, below_or: bool) -> Result<Predicate> {
        let below_or = below_or || group.conjunction == Conjunction::Or;
        let mut shared: HashMap<String, String> = HashMap::new();
        let mut parts = Vec::with_capacity(group.conditions.len());
        for item in &group.conditions {
            match item {
                ConditionItem::Group(nested) => {
                    if self.skip_tag.is_some_and(|tag| nested.tags.contains(tag)) {
                        continue;
                    }
                    parts.push(self.group(nested, below_or)?);
                }
                ConditionItem::Condition(condition) => {
                    parts.push(self.condition(condition, group.conjunction, below_or, &mut shared)?);
                }
            }
        }
        Ok(match group.conjunction {
            Conjunction::And => Predicate::All(parts),
            Conjunction::Or => Predicate::Any(parts),
        })
    }

    fn condition(
        &mut self,
        condition: &Condition,
        conjunction: Conjunction,
        below_or: bool,
        shared: &mut HashMap<String, String>,
    ) -> Result<Predicate> {
        let cache = self.cache;
        let info = cache
            .field(&condition.field)
            .ok_or_else(|| Error::unknown_field(&condition.field, "filter"))?;
        if info.field_type.is_text() {
            return self.fulltext(condition, info);
        }

        let column = format!("t.{}", quote_ident(&info.column));
        if condition.value.is_null() {
            return match condition.operator {
                Operator::Eq => Ok(Predicate::sql(format!("{column} IS NULL"))),
                Operator::NotEq => Ok(Predicate::sql(format!("{column} IS NOT NULL"))),
                op => Err(Error::invalid_query(format!(
                    "Operator {op} cannot compare field '{}' with NULL",
                    condition.field
                ))),
            };
        }

        let values = convert_values(condition, info)?;
        let op = condition.operator;
        if !info.multi_valued {
            let compared = compare(&column, op, &values, &condition.field)?;
            return Ok(if op.is_negative() {
                Predicate::Any(vec![compared, Predicate::sql(format!("{column} IS NULL"))])
            } else {
                compared
            });
        }

        if op.is_negative() {
            let alias = self.next_alias();
            let on = Predicate::All(vec![
                join_on(&alias),
                compare(
                    &format!("{alias}.{VALUE_COLUMN}"),
                    op.positive(),
                    &values,
                    &condition.field,
                )?,
            ]);
            self.joins.push(Join {
                kind: JoinKind::Left,
                table: info.table.clone(),
                alias: alias.clone(),
                on,
            });
            return Ok(Predicate::sql(format!("{alias}.{VALUE_COLUMN} IS NULL")));
        }

        let alias = match conjunction {
            Conjunction::Or => match shared.get(&condition.field) {
                Some(alias) => alias.clone(),
                None => {
                    let alias = self.add_value_join(info, JoinKind::Left);
                    shared.insert(condition.field.clone(), alias.clone());
                    alias
                }
            },
            Conjunction::And => {
                let kind = if below_or {
                    JoinKind::Left
                } else {
                    JoinKind::Inner
                };
                self.add_value_join(info, kind)
            }
        };
        compare(
            &format!("{alias}.{VALUE_COLUMN}"),
            op,
            &values,
            &condition.field,
        )
    }

    fn fulltext(&mut self, condition: &Condition, info: &FieldStorageInfo) -> Result<Predicate> {
        let words = condition
            .value
            .values()
            .into_iter()
            .map(|value| match value {
                RawValue::String(s) => Ok(Keys::word(s.as_str())),
                RawValue::Integer(v) => Ok(Keys::word(v.to_string())),
                other => Err(Error::invalid_query(format!(
                    "Value {other:?} cannot be searched in fulltext field '{}'",
                    condition.field
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        let keys = match (condition.operator, &condition.value) {
            (Operator::Eq | Operator::NotEq, ConditionValue::Single(_)) => {
                words.into_iter().next().ok_or_else(|| {
                    Error::invalid_query(format!("No value given for '{}'", condition.field))
                })?
            }
            (Operator::In | Operator::NotIn, ConditionValue::List(_)) => Keys::or(words),
            (op, _) => {
                return Err(Error::invalid_query(format!(
                    "Operator {op} is not supported on fulltext field '{}'",
                    condition.field
                )));
            }
        };

        let prepared = prepare_keys(&keys, self.min_chars);
        self.ignored.extend(prepared.ignored);
        let Some(keys) = prepared.keys else {
            let warning = format!(
                "Condition on fulltext field '{}' has no usable keywords and was ignored",
                condition.field
            );
            log::warn!("{warning}");
            self.warnings.push(warning);
            return Ok(Predicate::All(Vec::new()));
        };

        let fields = [condition.field.clone()];
        let ctx = KeysContext {
            text_table: &info.table,
            index_table: &self.cache.index_table,
            fields: &fields,
            matching: self.matching,
        };
        let matches = compile_keys(&keys, &ctx, true)?;
        Ok(Predicate::in_select(
            &format!("t.{ITEM_ID_COLUMN}"),
            &matches,
            condition.operator.is_negative(),
        ))
    }

    fn next_alias(&mut self) -> String {
        format!("f{}", self.joins.len())
    }

    fn add_value_join(&mut self, info: &FieldStorageInfo, kind: JoinKind) -> String {
        let alias = self.next_alias();
        self.joins.push(Join {
            kind,
            table: info.table.clone(),
            alias: alias.clone(),
            on: join_on(&alias),
        });
        alias
    }
}

fn join_on(alias: &str) -> Predicate {
    Predicate::sql(format!(
        "{alias}.{ITEM_ID_COLUMN} = t.{ITEM_ID_COLUMN}"
    ))
}

fn convert_values(condition: &Condition, info: &FieldStorageInfo) -> Result<Vec<SqlValue>> {
    condition
        .value
        .values()
        .into_iter()
        .map(|raw| {
            let converted = convert_value(raw, info.field_type, None, &condition.field)
                .value
                .into_scalar();
            if converted.is_null() && !matches!(raw, RawValue::Null) {
                Err(Error::invalid_query(format!(
                    "Value {raw:?} cannot be compared with field '{}' of type {}",
                    condition.field, info.field_type
                )))
            } else {
                Ok(converted)
            }
        })
        .collect()
}

fn compare(column: &str, op: Operator, values: &[SqlValue], field: &str) -> Result<Predicate> {
    match op {
        Operator::Eq | Operator::NotEq | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            let [value] = values else {
                return Err(Error::invalid_query(format!(
                    "Operator {op} on field '{field}' needs exactly one value"
                )));
            };
            Ok(Predicate::with_params(
                format!("{column} {op} ?"),
                vec![value.clone()],
            ))
        }
        Operator::In | Operator::NotIn => {
            if values.is_empty() {
                return Ok(Predicate::sql(if op == Operator::In {
                    "1 = 0"
                } else {
                    "1 = 1"
                }));
            }
            Ok(Predicate::with_params(
                format!("{column} {op} ({})", placeholders(values.len())),
                values.to_vec(),
            ))
        }
        Operator::Between | Operator::NotBetween => {
            let [low, high] = values else {
                return Err(Error::invalid_query(format!(
                    "Operator {op} on field '{field}' needs exactly two values"
                )));
            };
            Ok(Predicate::with_params(
                format!("{column} {op} ? AND ?"),
                vec![low.clone(), high.clone()],
            ))
        }
    }
}
