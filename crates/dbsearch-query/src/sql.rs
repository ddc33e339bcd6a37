//! Composable SQL fragments.
//!
//! Queries are assembled as [`Select`] values and rendered once, at the end,
//! into SQL text with positional `?` placeholders. Parameters are collected
//! in the order their placeholders appear in the text.

use dbsearch_storage::{SqlValue, quote_ident};

/// SQL text plus the parameters of its placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    /// SQL text.
    pub sql: String,
    /// Placeholder values, in textual order.
    pub params: Vec<SqlValue>,
}

impl Fragment {
    /// A fragment without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A fragment with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Appends one parameter.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    fn push(&mut self, other: &Fragment) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params.iter().cloned());
    }
}

/// `?, ?, ?` for `n` values.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Escapes `%`, `_`, and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A boolean condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// A leaf condition.
    Sql(Fragment),
    /// All must hold. Empty is true.
    All(Vec<Predicate>),
    /// Any must hold. Empty is false.
    Any(Vec<Predicate>),
}

impl Predicate {
    /// Leaf without parameters.
    pub fn sql(sql: impl Into<String>) -> Self {
        Predicate::Sql(Fragment::new(sql))
    }

    /// Leaf with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Predicate::Sql(Fragment::with_params(sql, params))
    }

    /// `column [NOT] IN (subquery)`.
    pub fn in_select(column: &str, select: &Select, negated: bool) -> Self {
        let sub = select.render();
        let op = if negated { "NOT IN" } else { "IN" };
        Predicate::with_params(format!("{column} {op} ({})", sub.sql), sub.params)
    }

    /// Whether this is an empty conjunction.
    pub fn is_trivially_true(&self) -> bool {
        matches!(self, Predicate::All(parts) if parts.iter().all(Predicate::is_trivially_true))
    }

    /// Renders the predicate.
    pub fn render(&self) -> Fragment {
        let mut out = Fragment::default();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut Fragment) {
        let (parts, glue, empty) = match self {
            Predicate::Sql(f) => {
                out.push(f);
                return;
            }
            Predicate::All(parts) => (parts, " AND ", "1 = 1"),
            Predicate::Any(parts) => (parts, " OR ", "1 = 0"),
        };
        match parts.as_slice() {
            [] => out.sql.push_str(empty),
            [single] => single.render_into(out),
            many => {
                out.sql.push('(');
                for (i, part) in many.iter().enumerate() {
                    if i > 0 {
                        out.sql.push_str(glue);
                    }
                    part.render_into(out);
                }
                out.sql.push(')');
            }
        }
    }
}

/// What a select reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A table, quoted on rendering.
    Table(String),
    /// A subquery.
    Select(Box<Select>),
    /// `UNION ALL` of subqueries.
    Union(Vec<Select>),
}

/// Join flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`.
    Inner,
    /// `LEFT JOIN`.
    Left,
}

/// A joined table.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Join flavour.
    pub kind: JoinKind,
    /// Joined table, unquoted.
    pub table: String,
    /// Alias of the joined table.
    pub alias: String,
    /// ON condition.
    pub on: Predicate,
}

/// A SELECT statement under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    distinct: bool,
    columns: Vec<Fragment>,
    from: Source,
    alias: String,
    joins: Vec<Join>,
    filters: Vec<Predicate>,
    group_by: Vec<String>,
    having: Vec<Predicate>,
    order_by: Vec<String>,
    offset: usize,
    limit: Option<usize>,
}

impl Select {
    fn with_source(from: Source, alias: &str) -> Self {
        Self {
            distinct: false,
            columns: Vec::new(),
            from,
            alias: alias.to_string(),
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    /// `SELECT ... FROM "table" alias`.
    pub fn from_table(table: &str, alias: &str) -> Self {
        Self::with_source(Source::Table(table.to_string()), alias)
    }

    /// `SELECT ... FROM (subquery) alias`.
    pub fn from_select(select: Select, alias: &str) -> Self {
        Self::with_source(Source::Select(Box::new(select)), alias)
    }

    /// `SELECT ... FROM (a UNION ALL b ...) alias`.
    pub fn from_union(selects: Vec<Select>, alias: &str) -> Self {
        Self::with_source(Source::Union(selects), alias)
    }

    /// Alias of the FROM source.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Joins added so far.
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Adds `SELECT DISTINCT`.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Sets `SELECT DISTINCT` in place.
    pub fn set_distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
    }

    /// Adds a select-list expression.
    pub fn column(mut self, sql: impl Into<String>) -> Self {
        self.columns.push(Fragment::new(sql));
        self
    }

    /// Adds a select-list expression with parameters.
    pub fn column_fragment(mut self, fragment: Fragment) -> Self {
        self.columns.push(fragment);
        self
    }

    /// Adds a select-list expression in place.
    pub fn add_column(&mut self, sql: impl Into<String>) {
        self.columns.push(Fragment::new(sql));
    }

    /// Adds a join.
    pub fn join(mut self, kind: JoinKind, table: &str, alias: &str, on: Predicate) -> Self {
        self.add_join(Join {
            kind,
            table: table.to_string(),
            alias: alias.to_string(),
            on,
        });
        self
    }

    /// Adds a join in place.
    pub fn add_join(&mut self, join: Join) {
        self.joins.push(join);
    }

    /// Adds a WHERE condition (ANDed with the others).
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.add_filter(predicate);
        self
    }

    /// Adds a WHERE condition in place.
    pub fn add_filter(&mut self, predicate: Predicate) {
        self.filters.push(predicate);
    }

    /// Adds a GROUP BY expression.
    pub fn group_by(mut self, sql: impl Into<String>) -> Self {
        self.group_by.push(sql.into());
        self
    }

    /// Adds a HAVING condition (ANDed with the others).
    pub fn having(mut self, predicate: Predicate) -> Self {
        self.having.push(predicate);
        self
    }

    /// Adds an ORDER BY term.
    pub fn order_by(mut self, sql: impl Into<String>) -> Self {
        self.add_order_by(sql);
        self
    }

    /// Adds an ORDER BY term in place.
    pub fn add_order_by(&mut self, sql: impl Into<String>) {
        self.order_by.push(sql.into());
    }

    /// Sets OFFSET and LIMIT.
    pub fn range(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.set_range(offset, limit);
        self
    }

    /// Sets OFFSET and LIMIT in place.
    pub fn set_range(&mut self, offset: usize, limit: Option<usize>) {
        self.offset = offset;
        self.limit = limit;
    }

    /// Renders the statement.
    pub fn render(&self) -> Fragment {
        let mut out = Fragment::new(if self.distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        });
        if self.columns.is_empty() {
            out.sql.push('*');
        }
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                out.sql.push_str(", ");
            }
            out.push(column);
        }

        out.sql.push_str(" FROM ");
        match &self.from {
            Source::Table(table) => out.sql.push_str(&quote_ident(table)),
            Source::Select(select) => {
                out.sql.push('(');
                out.push(&select.render());
                out.sql.push(')');
            }
            Source::Union(selects) => {
                out.sql.push('(');
                for (i, select) in selects.iter().enumerate() {
                    if i > 0 {
                        out.sql.push_str(" UNION ALL ");
                    }
                    out.push(&select.render());
                }
                out.sql.push(')');
            }
        }
        out.sql.push(' ');
        out.sql.push_str(&self.alias);

        for join in &self.joins {
            out.sql.push_str(match join.kind {
                JoinKind::Inner => " INNER JOIN ",
                JoinKind::Left => " LEFT JOIN ",
            });
            out.sql.push_str(&quote_ident(&join.table));
            out.sql.push(' ');
            out.sql.push_str(&join.alias);
            out.sql.push_str(" ON ");
            out.push(&join.on.render());
        }

        let filters: Vec<&Predicate> = self
            .filters
            .iter()
            .filter(|p| !p.is_trivially_true())
            .collect();
        if !filters.is_empty() {
            out.sql.push_str(" WHERE ");
            push_conjunction(&mut out, &filters);
        }
        if !self.group_by.is_empty() {
            out.sql.push_str(" GROUP BY ");
            out.sql.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            out.sql.push_str(" HAVING ");
            let having: Vec<&Predicate> = self.having.iter().collect();
            push_conjunction(&mut out, &having);
        }
        if !self.order_by.is_empty() {
            out.sql.push_str(" ORDER BY ");
            out.sql.push_str(&self.order_by.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), 0) => out.sql.push_str(&format!(" LIMIT {limit}")),
            (Some(limit), offset) => out.sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (None, 0) => {}
            (None, offset) => out.sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
        }
        out
    }
}

fn push_conjunction(out: &mut Fragment, parts: &[&Predicate]) {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.sql.push_str(" AND ");
        }
        part.render_into(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_simple_select() {
        let sql = Select::from_table("dbsearch_nodes", "t")
            .column("t.item_id AS item_id")
            .filter(Predicate::with_params(
                "t.status = ?",
                vec![SqlValue::Integer(1)],
            ))
            .order_by("item_id ASC")
            .range(5, Some(10))
            .render();
        assert_eq!(
            sql.sql,
            "SELECT t.item_id AS item_id FROM \"dbsearch_nodes\" t WHERE t.status = ? \
             ORDER BY item_id ASC LIMIT 10 OFFSET 5"
        );
        assert_eq!(sql.params, vec![SqlValue::Integer(1)]);
    }

    #[test]
    fn test_params_follow_text_order() {
        let inner = Select::from_table("words", "w")
            .column_fragment(Fragment::new("? AS unit").bind("a"))
            .filter(Predicate::with_params("w.word = ?", vec!["b".into()]));
        let outer = Select::from_union(vec![inner.clone(), inner], "t")
            .column("t.item_id")
            .join(
                JoinKind::Left,
                "extra",
                "e",
                Predicate::with_params("e.v = ?", vec!["c".into()]),
            )
            .filter(Predicate::with_params("t.x = ?", vec!["d".into()]))
            .having(Predicate::with_params("COUNT(*) >= ?", vec![SqlValue::Integer(2)]));
        let rendered = outer.render();
        assert_eq!(
            rendered.params,
            vec![
                SqlValue::from("a"),
                SqlValue::from("b"),
                SqlValue::from("a"),
                SqlValue::from("b"),
                SqlValue::from("c"),
                SqlValue::from("d"),
                SqlValue::Integer(2),
            ]
        );
        assert!(rendered.sql.contains(" UNION ALL "));
        assert!(rendered.sql.contains("LEFT JOIN \"extra\" e ON e.v = ?"));
    }

    #[test]
    fn test_predicate_rendering() {
        let p = Predicate::Any(vec![
            Predicate::sql("a = 1"),
            Predicate::All(vec![Predicate::sql("b = 2"), Predicate::sql("c = 3")]),
        ]);
        assert_eq!(p.render().sql, "(a = 1 OR (b = 2 AND c = 3))");
        assert_eq!(Predicate::All(vec![]).render().sql, "1 = 1");
        assert_eq!(Predicate::Any(vec![]).render().sql, "1 = 0");
        assert!(Predicate::All(vec![Predicate::All(vec![])]).is_trivially_true());
        assert!(!Predicate::Any(vec![]).is_trivially_true());
    }

    #[test]
    fn test_in_select() {
        let sub = Select::from_table("t2", "s")
            .column("s.item_id")
            .filter(Predicate::with_params("s.word = ?", vec!["x".into()]));
        let p = Predicate::in_select("t.item_id", &sub, true);
        let f = p.render();
        assert_eq!(
            f.sql,
            "t.item_id NOT IN (SELECT s.item_id FROM \"t2\" s WHERE s.word = ?)"
        );
        assert_eq!(f.params, vec![SqlValue::from("x")]);
    }

    #[test]
    fn test_offset_without_limit() {
        let sql = Select::from_table("t", "t").range(3, None).render().sql;
        assert!(sql.ends_with("LIMIT -1 OFFSET 3"));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
