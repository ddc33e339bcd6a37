//! Keyword compilation.
//!
//! [`compile_keys`] turns a prepared keyword tree into a [`Select`] over the
//! text table returning `(item_id, score)`, or only `item_id` when the caller
//! just needs the set of matching items (the operand of a `NOT IN`).
//!
//! Every group is compiled the same way. The positive children (words and
//! non-negated subgroups) become members of a `UNION ALL`; an outer select
//! sums scores per item. For AND groups the outer select also requires every
//! child to have matched:
//!
//! - in word matching, each member row carries a `unit` column (the matched
//!   word, or a whitespace placeholder per subgroup, which can never be a
//!   stored word) and the group needs `COUNT(DISTINCT unit)` to reach the
//!   number of children;
//! - in partial and prefix matching, each member row carries one hit column
//!   per child and the group needs `SUM(h_i) >= 1` for every child, so a
//!   stored word matching several keywords is scored once but counts for
//!   each.
//!
//! Negated children are compiled to their positive match set and excluded
//! with `NOT IN`. An AND group excludes them from its positive matches; an
//! OR group starts from every item of the index instead, since any item
//! missing a negated branch matches.

use dbsearch_core::{Error, Result};
use dbsearch_fts::MatchingMode;
use dbsearch_fts::descriptor::ITEM_ID_COLUMN;
use dbsearch_fts::mapper::SCORE_MULTIPLIER;
use dbsearch_storage::SqlValue;

use crate::keys::{Conjunction, Keys};
use crate::sql::{Fragment, Predicate, Select, escape_like, placeholders};

/// Tables and options keyword compilation reads.
#[derive(Debug, Clone, Copy)]
pub struct KeysContext<'a> {
    /// Shared text table.
    pub text_table: &'a str,
    /// Index table, the universe of items for negations.
    pub index_table: &'a str,
    /// Fulltext fields to search.
    pub fields: &'a [String],
    /// Keyword matching.
    pub matching: MatchingMode,
}

impl KeysContext<'_> {
    fn like_pattern(&self, word: &str) -> String {
        match self.matching {
            MatchingMode::Prefix => format!("{}%", escape_like(word)),
            _ => format!("%{}%", escape_like(word)),
        }
    }

    fn field_filter(&self, alias: &str) -> Predicate {
        Predicate::with_params(
            format!("{alias}.field_name IN ({})", placeholders(self.fields.len())),
            self.fields.iter().map(|f| SqlValue::from(f.as_str())).collect(),
        )
    }
}

/// Compiles a prepared keyword tree.
///
/// The tree's own negation flag is not applied here: a negated subtree
/// compiles to the items matching its contents, and the caller excludes
/// them.
pub fn compile_keys(keys: &Keys, ctx: &KeysContext<'_>, scoreless: bool) -> Result<Select> {
    if ctx.fields.is_empty() {
        return Err(Error::invalid_query(
            "Keywords were given but there are no fulltext fields to search",
        ));
    }
    match keys {
        Keys::Word(_) => compile_group(ctx, Conjunction::And, std::slice::from_ref(keys), scoreless),
        Keys::Group(group) => compile_group(ctx, group.conjunction, &group.children, scoreless),
    }
}

fn compile_group(
    ctx: &KeysContext<'_>,
    conjunction: Conjunction,
    children: &[Keys],
    scoreless: bool,
) -> Result<Select> {
    let mut words = Vec::new();
    let mut nested = Vec::new();
    let mut negated = Vec::new();
    for child in children {
        match child {
            Keys::Word(word) => words.push(word.as_str()),
            Keys::Group(group) if group.negated => negated.push(child),
            Keys::Group(_) => nested.push(child),
        }
    }

    let positive = if words.is_empty() && nested.is_empty() {
        None
    } else {
        let positive_scoreless =
            scoreless || (conjunction == Conjunction::Or && !negated.is_empty());
        Some(positive_select(
            ctx,
            conjunction,
            &words,
            &nested,
            positive_scoreless,
        )?)
    };
    if negated.is_empty() {
        return positive.ok_or_else(|| Error::invalid_query("Empty keyword group"));
    }

    let mut exclusions = Vec::with_capacity(negated.len());
    for child in negated {
        let excluded = compile_keys(child, ctx, true)?;
        exclusions.push(Predicate::in_select(
            &format!("t.{ITEM_ID_COLUMN}"),
            &excluded,
            true,
        ));
    }

    Ok(match (conjunction, positive) {
        (Conjunction::And, Some(mut select)) => {
            for exclusion in exclusions {
                select.add_filter(exclusion);
            }
            select
        }
        (Conjunction::And, None) => universe(ctx, scoreless).filter(Predicate::All(exclusions)),
        (Conjunction::Or, positive) => {
            let mut any = exclusions;
            if let Some(select) = positive {
                any.push(Predicate::in_select(
                    &format!("t.{ITEM_ID_COLUMN}"),
                    &select,
                    false,
                ));
            }
            universe(ctx, scoreless).filter(Predicate::Any(any))
        }
    })
}

/// Every item of the index, each scored as one full match.
fn universe(ctx: &KeysContext<'_>, scoreless: bool) -> Select {
    let select = Select::from_table(ctx.index_table, "t")
        .distinct()
        .column(format!("t.{ITEM_ID_COLUMN} AS {ITEM_ID_COLUMN}"));
    if scoreless {
        select
    } else {
        select.column(format!("{} AS score", SCORE_MULTIPLIER as i64))
    }
}

fn positive_select(
    ctx: &KeysContext<'_>,
    conjunction: Conjunction,
    words: &[&str],
    nested: &[&Keys],
    scoreless: bool,
) -> Result<Select> {
    let partial = ctx.matching != MatchingMode::Words;
    let units = words.len() + nested.len();

    let mut members = Vec::with_capacity(nested.len() + 1);
    if !words.is_empty() {
        members.push(word_member(ctx, words, units));
    }
    for (j, group) in nested.iter().enumerate() {
        let inner = compile_keys(group, ctx, false)?;
        let mut member = Select::from_select(inner, "n")
            .column(format!("n.{ITEM_ID_COLUMN} AS {ITEM_ID_COLUMN}"))
            .column("n.score AS score");
        if partial {
            let own = words.len() + j;
            for i in 0..units {
                member = member.column(format!("{} AS h_{i}", u8::from(i == own)));
            }
        } else {
            member = member.column_fragment(Fragment::new("? AS unit").bind(" ".repeat(j + 1)));
        }
        members.push(member);
    }

    let mut outer = Select::from_union(members, "t")
        .column(format!("t.{ITEM_ID_COLUMN} AS {ITEM_ID_COLUMN}"));
    if !scoreless {
        outer = outer.column("SUM(t.score) AS score");
    }
    outer = outer.group_by(format!("t.{ITEM_ID_COLUMN}"));

    if conjunction == Conjunction::And && units > 1 {
        if partial {
            for i in 0..units {
                outer = outer.having(Predicate::sql(format!("SUM(t.h_{i}) >= 1")));
            }
        } else {
            outer = outer.having(Predicate::with_params(
                "COUNT(DISTINCT t.unit) >= ?",
                vec![SqlValue::Integer(units as i64)],
            ));
        }
    }
    Ok(outer)
}

fn word_member(ctx: &KeysContext<'_>, words: &[&str], units: usize) -> Select {
    let mut member = Select::from_table(ctx.text_table, "w")
        .column(format!("w.{ITEM_ID_COLUMN} AS {ITEM_ID_COLUMN}"))
        .column("w.score AS score")
        .filter(ctx.field_filter("w"));

    if ctx.matching == MatchingMode::Words {
        return member.column("w.word AS unit").filter(Predicate::with_params(
            format!("w.word IN ({})", placeholders(words.len())),
            words.iter().map(|w| SqlValue::from(*w)).collect(),
        ));
    }

    let mut any = Vec::with_capacity(words.len());
    for (i, word) in words.iter().enumerate() {
        let pattern = ctx.like_pattern(word);
        member = member.column_fragment(
            Fragment::new(format!(
                "CASE WHEN w.word LIKE ? ESCAPE '\\' THEN 1 ELSE 0 END AS h_{i}"
            ))
            .bind(pattern.as_str()),
        );
        any.push(Predicate::with_params(
            "w.word LIKE ? ESCAPE '\\'",
            vec![SqlValue::from(pattern)],
        ));
    }
    for i in words.len()..units {
        member = member.column(format!("0 AS h_{i}"));
    }
    member.filter(Predicate::Any(any))
}
