//! Condition trees over dotted lookups.
//!
//! A [`Condition`] names columns by lookup path (`employee.title.salary`),
//! relative to the root table. It stays independent of any query until a
//! resolver turns each path into a column expression and splices in the
//! joins it needs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operators::LookupOp;
use crate::sql::{escape_like, fragment, lower, raw_sql, Expr, ExprExt, Literal};
use crate::value::Value;

/// Escape character used in LIKE patterns.
pub const LIKE_ESCAPE: char = '\\';

/// Value operand of a lookup, already coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LookupValue {
    Scalar(Value),
    List(Vec<Value>),
    Range(Value, Value),
    Bool(bool),
}

impl LookupValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            LookupValue::Scalar(v) => v.to_json(),
            LookupValue::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            LookupValue::Range(low, high) => {
                serde_json::Value::Array(vec![low.to_json(), high.to_json()])
            }
            LookupValue::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

/// One comparison against one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub path: String,
    pub op: LookupOp,
    pub value: LookupValue,
}

impl Lookup {
    pub fn new(path: impl Into<String>, op: LookupOp, value: LookupValue) -> Self {
        Self {
            path: path.into(),
            op,
            value,
        }
    }

    /// `path IS NULL`
    pub fn is_null(path: impl Into<String>) -> Self {
        Self::new(path, LookupOp::IsNull, LookupValue::Bool(true))
    }

    /// `path IS NOT NULL`
    pub fn not_null(path: impl Into<String>) -> Self {
        Self::new(path, LookupOp::IsNull, LookupValue::Bool(false))
    }

    /// Render against an already resolved column.
    pub fn to_expr(&self, column: Expr) -> Expr {
        match (self.op, &self.value) {
            (LookupOp::IsNull, LookupValue::Bool(false)) => column.is_not_null(),
            (LookupOp::IsNull, _) => column.is_null(),
            (LookupOp::Exact, LookupValue::Scalar(Value::Null)) => column.is_null(),
            (LookupOp::Exact, v) => column.eq(scalar(v)),
            (LookupOp::IExact, v) => lower(column).eq(lower(scalar(v))),
            (LookupOp::Contains, v) => column.like_escape(contains_pattern(v), LIKE_ESCAPE),
            (LookupOp::IContains, v) => {
                lower(column).like_escape(lower(contains_pattern(v)), LIKE_ESCAPE)
            }
            (LookupOp::In, LookupValue::List(items)) => {
                column.in_list(items.iter().map(Value::to_expr).collect())
            }
            (LookupOp::In, v) => column.in_list(vec![scalar(v)]),
            (LookupOp::Lt, v) => column.lt(scalar(v)),
            (LookupOp::Lte, v) => column.lte(scalar(v)),
            (LookupOp::Gt, v) => column.gt(scalar(v)),
            (LookupOp::Gte, v) => column.gte(scalar(v)),
            (LookupOp::Range, LookupValue::Range(low, high)) => {
                column.between(low.to_expr(), high.to_expr())
            }
            (LookupOp::Range, v) => column.eq(scalar(v)),
        }
    }
}

fn scalar(value: &LookupValue) -> Expr {
    match value {
        LookupValue::Scalar(v) => v.to_expr(),
        LookupValue::Bool(b) => Value::Bool(*b).to_expr(),
        LookupValue::List(items) => items
            .first()
            .map(Value::to_expr)
            .unwrap_or(Expr::Literal(Literal::Null)),
        LookupValue::Range(low, _) => low.to_expr(),
    }
}

fn contains_pattern(value: &LookupValue) -> Expr {
    let text = match value {
        LookupValue::Scalar(v) => v.to_string(),
        other => scalar(other).to_sql(Default::default()),
    };
    Expr::Literal(Literal::String(format!(
        "%{}%",
        escape_like(&text, LIKE_ESCAPE)
    )))
}

/// Boolean tree of lookups.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Lookup(Lookup),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        match self {
            Condition::And(mut items) => {
                items.push(other);
                Condition::And(items)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Condition) -> Condition {
        match self {
            Condition::Or(mut items) => {
                items.push(other);
                Condition::Or(items)
            }
            first => Condition::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Condition {
        Condition::Not(Box::new(self))
    }

    /// Every lookup path, in order of appearance.
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Lookup(l) => out.push(&l.path),
            Condition::And(items) | Condition::Or(items) => {
                items.iter().for_each(|c| c.collect_paths(out))
            }
            Condition::Not(inner) => inner.collect_paths(out),
        }
    }

    /// Build the SQL predicate, resolving each path through `resolve`.
    pub fn to_expr<E>(
        &self,
        resolve: &mut dyn FnMut(&str) -> Result<Expr, E>,
    ) -> Result<Expr, E> {
        match self {
            Condition::Lookup(lookup) => Ok(lookup.to_expr(resolve(&lookup.path)?)),
            Condition::And(items) => fold(items, resolve, |a, b| a.and(b)),
            Condition::Or(items) => fold(items, resolve, |a, b| a.or(b)),
            Condition::Not(inner) => Ok(inner.to_expr(resolve)?.not()),
        }
    }
}

fn fold<E>(
    items: &[Condition],
    resolve: &mut dyn FnMut(&str) -> Result<Expr, E>,
    combine: fn(Expr, Expr) -> Expr,
) -> Result<Expr, E> {
    let mut acc: Option<Expr> = None;
    for item in items {
        let expr = item.to_expr(resolve)?;
        acc = Some(match acc {
            Some(prev) => combine(prev, expr),
            None => expr,
        });
    }
    // An empty group matches everything.
    Ok(acc.unwrap_or_else(|| raw_sql("1 = 1")))
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Lookup(l) => {
                write!(f, "{}__{}={}", l.path, l.op.as_str(), l.value.to_json())
            }
            Condition::And(items) | Condition::Or(items) => {
                let sep = if matches!(self, Condition::And(_)) { " AND " } else { " OR " };
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
            Condition::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}

/// Aggregate functions available to annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    pub fn function(&self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Sum => "SUM",
            Aggregate::Avg => "AVG",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }
}

/// Named aggregate attached before filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub aggregate: Aggregate,
    /// Lookup path of the aggregated column.
    pub path: String,
    #[serde(default)]
    pub distinct: bool,
}

impl Annotation {
    pub fn to_expr(&self, column: Expr) -> Expr {
        Expr::Function {
            name: self.aggregate.function().to_string(),
            args: vec![column],
            distinct: self.distinct,
        }
    }
}

/// SQL text with `?` placeholders and the values bound to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlFragment {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn to_expr(&self) -> Expr {
        fragment(
            &self.sql,
            self.params.iter().map(Value::to_literal).collect(),
        )
    }
}

/// Raw SQL escape hatch for predicates a lookup cannot express.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extra {
    /// Predicates AND'ed into WHERE.
    #[serde(default, rename = "where")]
    pub where_: Vec<SqlFragment>,
    /// Extra tables comma-joined into FROM.
    #[serde(default)]
    pub tables: Vec<String>,
    /// Named expressions usable as lookup paths.
    #[serde(default)]
    pub select: BTreeMap<String, SqlFragment>,
}

impl Extra {
    pub fn is_empty(&self) -> bool {
        self.where_.is_empty() && self.tables.is_empty() && self.select.is_empty()
    }

    /// Lists take an order-preserving union, maps a shallow merge.
    pub fn merge(&mut self, other: &Extra) {
        for w in &other.where_ {
            if !self.where_.contains(w) {
                self.where_.push(w.clone());
            }
        }
        for t in &other.tables {
            if !self.tables.contains(t) {
                self.tables.push(t.clone());
            }
        }
        for (k, v) in &other.select {
            self.select.insert(k.clone(), v.clone());
        }
    }

    /// Collapse the where list into one disjunction.
    pub fn join_where_or(&mut self) {
        if self.where_.len() < 2 {
            return;
        }
        let sql = self
            .where_
            .iter()
            .map(|w| format!("({})", w.sql))
            .collect::<Vec<_>>()
            .join(" OR ");
        let params = self.where_.iter().flat_map(|w| w.params.clone()).collect();
        self.where_ = vec![SqlFragment::new(sql, params)];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{table_col, Dialect};

    fn render(lookup: Lookup) -> String {
        lookup
            .to_expr(table_col("title", "name"))
            .to_sql(Dialect::Sqlite)
    }

    #[test]
    fn test_lookup_rendering() {
        assert_eq!(
            render(Lookup::new("name", LookupOp::Exact, LookupValue::Scalar("CEO".into()))),
            r#""title"."name" = 'CEO'"#
        );
        assert_eq!(render(Lookup::is_null("name")), r#""title"."name" IS NULL"#);
        assert_eq!(render(Lookup::not_null("name")), r#""title"."name" IS NOT NULL"#);
        assert_eq!(
            render(Lookup::new("name", LookupOp::Exact, LookupValue::Scalar(Value::Null))),
            r#""title"."name" IS NULL"#
        );
    }

    #[test]
    fn test_contains_escapes_wildcards() {
        let sql = render(Lookup::new(
            "name",
            LookupOp::Contains,
            LookupValue::Scalar("50%_off".into()),
        ));
        assert_eq!(sql, r#""title"."name" LIKE '%50\%\_off%' ESCAPE '\'"#);
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        assert_eq!(
            render(Lookup::new("name", LookupOp::In, LookupValue::List(vec![]))),
            "0"
        );
    }

    #[test]
    fn test_condition_paths_and_display() {
        let cond = Condition::Lookup(Lookup::is_null("title.name"))
            .or(Condition::Lookup(Lookup::not_null("id")))
            .negate();
        assert_eq!(cond.paths(), vec!["title.name", "id"]);
        assert_eq!(
            cond.to_string(),
            "NOT (title.name__isnull=true OR id__isnull=false)"
        );
    }

    #[test]
    fn test_extra_merge() {
        let mut a = Extra {
            where_: vec![SqlFragment::new("a = ?", vec![Value::Int(1)])],
            tables: vec!["t1".into()],
            select: BTreeMap::from([("x".to_string(), SqlFragment::new("1", vec![]))]),
        };
        let b = Extra {
            where_: vec![
                SqlFragment::new("a = ?", vec![Value::Int(1)]),
                SqlFragment::new("b = ?", vec![Value::Int(2)]),
            ],
            tables: vec!["t2".into(), "t1".into()],
            select: BTreeMap::from([("x".to_string(), SqlFragment::new("2", vec![]))]),
        };
        a.merge(&b);
        assert_eq!(a.where_.len(), 2);
        assert_eq!(a.tables, vec!["t1", "t2"]);
        assert_eq!(a.select["x"].sql, "2");

        a.join_where_or();
        assert_eq!(a.where_.len(), 1);
        assert_eq!(a.where_[0].sql, "(a = ?) OR (b = ?)");
        assert_eq!(a.where_[0].params, vec![Value::Int(1), Value::Int(2)]);
    }
}
