//! SELECT statements assembled from expressions and rendered per dialect.

use super::dialect::{Dialect, SqlDialect};
use super::expr::{Expr, ExprExt};
use super::token::{Token, TokenStream};

/// A table in the FROM clause or a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
}

impl TableRef {
    pub fn new(name: &str) -> Self {
        Self { name: name.into() }
    }

    fn to_token(&self) -> Token {
        Token::Ident(self.name.clone())
    }
}

/// `LEFT OUTER JOIN table ON condition`. Rows of the left side survive
/// when conditions on different branches are OR'ed together, so no other
/// join kind is emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: TableRef,
    pub on: Expr,
}

impl Join {
    fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Left)
            .space()
            .push(Token::Outer)
            .space()
            .push(Token::Join)
            .space()
            .push(self.table.to_token())
            .space()
            .push(Token::On)
            .space()
            .append(&self.on.to_tokens_for_dialect(dialect));
        ts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// An ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: SortDir,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Desc,
        }
    }

    fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = self.expr.to_tokens_for_dialect(dialect);
        ts.space().push(match self.dir {
            SortDir::Asc => Token::Asc,
            SortDir::Desc => Token::Desc,
        });
        ts
    }
}

/// A SELECT query.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "Query has no effect until converted to SQL with to_sql()"]
pub struct Query {
    pub select: Vec<Expr>,
    pub distinct: bool,
    pub from: Option<TableRef>,
    /// Additional comma-joined FROM tables.
    pub extra_tables: Vec<TableRef>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the SELECT list.
    pub fn select(mut self, exprs: Vec<Expr>) -> Self {
        self.select = exprs;
        self
    }

    pub fn add_select(mut self, expr: Expr) -> Self {
        self.select.push(expr);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn from(mut self, table: TableRef) -> Self {
        self.from = Some(table);
        self
    }

    /// Add a comma-joined table to the FROM clause, unless already present.
    pub fn add_table(mut self, table: TableRef) -> Self {
        if !self.references(&table.name) {
            self.extra_tables.push(table);
        }
        self
    }

    pub fn left_join(mut self, table: TableRef, on: Expr) -> Self {
        self.joins.push(Join { table, on });
        self
    }

    /// Whether a table is already part of FROM or a join.
    pub fn references(&self, name: &str) -> bool {
        self.from
            .iter()
            .chain(&self.extra_tables)
            .chain(self.joins.iter().map(|j| &j.table))
            .any(|t| t.name == name)
    }

    /// AND a condition onto WHERE.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn having(mut self, condition: Expr) -> Self {
        self.having = Some(condition);
        self
    }

    pub fn order_by(mut self, exprs: Vec<OrderByExpr>) -> Self {
        self.order_by = exprs;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Select);
        if self.distinct {
            ts.space().push(Token::Distinct);
        }
        for (i, expr) in self.select.iter().enumerate() {
            if i > 0 {
                ts.comma();
            }
            ts.newline()
                .indent(1)
                .append(&expr.to_tokens_for_dialect(dialect));
        }

        if let Some(from) = &self.from {
            ts.newline().push(Token::From).space().push(from.to_token());
            for table in &self.extra_tables {
                ts.comma().space().push(table.to_token());
            }
        }

        for join in &self.joins {
            ts.newline().append(&join.to_tokens(dialect));
        }

        if let Some(condition) = &self.where_clause {
            ts.newline()
                .push(Token::Where)
                .space()
                .append(&condition.to_tokens_for_dialect(dialect));
        }

        if !self.group_by.is_empty() {
            ts.newline().push(Token::GroupBy).space();
            comma_list(&mut ts, &self.group_by, |e| e.to_tokens_for_dialect(dialect));
        }

        if let Some(condition) = &self.having {
            ts.newline()
                .push(Token::Having)
                .space()
                .append(&condition.to_tokens_for_dialect(dialect));
        }

        if !self.order_by.is_empty() {
            ts.newline().push(Token::OrderBy).space();
            comma_list(&mut ts, &self.order_by, |o| o.to_tokens(dialect));
        }

        let pagination = dialect.emit_limit_offset(self.limit, self.offset);
        if !pagination.is_empty() {
            ts.newline().append(&pagination);
        }

        ts
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens_for_dialect(dialect).serialize(dialect)
    }
}

fn comma_list<T>(ts: &mut TokenStream, items: &[T], render: impl Fn(&T) -> TokenStream) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            ts.comma().space();
        }
        ts.append(&render(item));
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql(Dialect::default()))
    }
}
