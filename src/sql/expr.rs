//! Expression tree for WHERE, HAVING and SELECT items.

use super::dialect::{Dialect, SqlDialect};
use super::token::{Token, TokenStream};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `table.column`, or a bare column.
    Column {
        table: Option<String>,
        column: String,
    },
    Literal(Literal),
    Binary {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    /// `NAME([DISTINCT] args...)`
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    /// `expr LIKE pattern ESCAPE 'c'`
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        escape: char,
    },
    Paren(Box<Expr>),
    /// SQL with `?` placeholders, each replaced by the matching parameter
    /// rendered as an escaped literal. Missing parameters render as NULL.
    Fragment { sql: String, params: Vec<Literal> },
    /// Trusted static SQL. Never built from user input.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

impl Literal {
    fn to_token(&self) -> Token {
        match self {
            Literal::Int(n) => Token::LitInt(*n),
            Literal::Float(f) => Token::LitFloat(*f),
            Literal::String(s) => Token::LitString(s.clone()),
            Literal::Bool(b) => Token::LitBool(*b),
            Literal::Null => Token::LitNull,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
}

impl BinaryOperator {
    fn to_token(self) -> Token {
        match self {
            BinaryOperator::Eq => Token::Eq,
            BinaryOperator::Lt => Token::Lt,
            BinaryOperator::Gt => Token::Gt,
            BinaryOperator::Lte => Token::Lte,
            BinaryOperator::Gte => Token::Gte,
            BinaryOperator::And => Token::And,
            BinaryOperator::Or => Token::Or,
        }
    }
}

impl Expr {
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        let sub = |e: &Expr| e.to_tokens_for_dialect(dialect);

        match self {
            Expr::Column { table, column } => {
                if let Some(table) = table {
                    ts.push(Token::Ident(table.clone())).push(Token::Dot);
                }
                ts.push(Token::Ident(column.clone()));
            }

            Expr::Literal(lit) => {
                ts.push(lit.to_token());
            }

            Expr::Binary { left, op, right } => {
                ts.append(&sub(left))
                    .space()
                    .push(op.to_token())
                    .space()
                    .append(&sub(right));
            }

            Expr::Not(inner) => {
                ts.push(Token::Not).space().append(&sub(inner));
            }

            Expr::Function {
                name,
                args,
                distinct,
            } => {
                ts.push(Token::FunctionName(name.clone())).lparen();
                if *distinct {
                    ts.push(Token::Distinct).space();
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&sub(arg));
                }
                ts.rparen();
            }

            // "x IN ()" is not valid SQL and matches nothing
            Expr::In { values, .. } if values.is_empty() => {
                ts.push(Token::False);
            }

            Expr::In { expr, values } => {
                ts.append(&sub(expr)).space().push(Token::In).space().lparen();
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&sub(value));
                }
                ts.rparen();
            }

            Expr::Between { expr, low, high } => {
                ts.append(&sub(expr))
                    .space()
                    .push(Token::Between)
                    .space()
                    .append(&sub(low))
                    .space()
                    .push(Token::And)
                    .space()
                    .append(&sub(high));
            }

            Expr::IsNull { expr, negated } => {
                ts.append(&sub(expr)).space().push(if *negated {
                    Token::IsNotNull
                } else {
                    Token::IsNull
                });
            }

            Expr::Like {
                expr,
                pattern,
                escape,
            } => {
                ts.append(&sub(expr))
                    .space()
                    .push(Token::Like)
                    .space()
                    .append(&sub(pattern))
                    .space()
                    .push(Token::Escape)
                    .space()
                    .push(Token::LitString(escape.to_string()));
            }

            Expr::Paren(inner) => {
                ts.lparen().append(&sub(inner)).rparen();
            }

            Expr::Fragment { sql, params } => {
                let mut params = params.iter();
                let mut pieces = sql.split('?').peekable();
                while let Some(piece) = pieces.next() {
                    if !piece.is_empty() {
                        ts.push(Token::Raw(piece.to_string()));
                    }
                    if pieces.peek().is_some() {
                        ts.push(params.next().map_or(Token::LitNull, Literal::to_token));
                    }
                }
            }

            Expr::Raw(sql) => {
                ts.push(Token::Raw(sql.clone()));
            }
        }

        ts
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens_for_dialect(dialect).serialize(dialect)
    }

    /// Parenthesize when nesting under AND, OR or NOT would change the
    /// meaning.
    pub fn nested(self) -> Expr {
        let compound = matches!(
            self,
            Expr::Binary {
                op: BinaryOperator::And | BinaryOperator::Or,
                ..
            } | Expr::Not(_)
                | Expr::Fragment { .. }
                | Expr::Raw(_)
        );
        if compound {
            Expr::Paren(Box::new(self))
        } else {
            self
        }
    }
}

pub fn col(name: &str) -> Expr {
    Expr::Column {
        table: None,
        column: name.into(),
    }
}

pub fn table_col(table: &str, column: &str) -> Expr {
    Expr::Column {
        table: Some(table.into()),
        column: column.into(),
    }
}

pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

fn call(name: &str, arg: Expr, distinct: bool) -> Expr {
    Expr::Function {
        name: name.into(),
        args: vec![arg],
        distinct,
    }
}

pub fn count(expr: Expr) -> Expr {
    call("COUNT", expr, false)
}

pub fn count_distinct(expr: Expr) -> Expr {
    call("COUNT", expr, true)
}

/// LOWER(expr), for case-insensitive comparisons.
pub fn lower(expr: Expr) -> Expr {
    call("LOWER", expr, false)
}

pub fn fragment(sql: &str, params: Vec<Literal>) -> Expr {
    Expr::Fragment {
        sql: sql.into(),
        params,
    }
}

pub fn raw_sql(sql: &str) -> Expr {
    Expr::Raw(sql.into())
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern.
pub fn escape_like(value: &str, escape_char: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '%' || c == '_' || c == escape_char {
            out.push(escape_char);
        }
        out.push(c);
    }
    out
}

/// Fluent builders over [`Expr`].
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    fn eq(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Eq, other.into())
    }

    fn gt(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Gt, other.into())
    }

    fn gte(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Gte, other.into())
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Lt, other.into())
    }

    fn lte(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Lte, other.into())
    }

    fn and(self, other: impl Into<Expr>) -> Expr {
        binary(
            self.into_expr().nested(),
            BinaryOperator::And,
            other.into().nested(),
        )
    }

    fn or(self, other: impl Into<Expr>) -> Expr {
        binary(
            self.into_expr().nested(),
            BinaryOperator::Or,
            other.into().nested(),
        )
    }

    fn not(self) -> Expr {
        Expr::Not(Box::new(self.into_expr().nested()))
    }

    fn like_escape(self, pattern: impl Into<Expr>, escape: char) -> Expr {
        Expr::Like {
            expr: Box::new(self.into_expr()),
            pattern: Box::new(pattern.into()),
            escape,
        }
    }

    #[allow(clippy::wrong_self_convention)]
    fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: false,
        }
    }

    #[allow(clippy::wrong_self_convention)]
    fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: true,
        }
    }

    fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self.into_expr()),
            values,
        }
    }

    fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        Expr::Between {
            expr: Box::new(self.into_expr()),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
        }
    }
}

fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl From<Literal> for Expr {
    fn from(lit: Literal) -> Self {
        Expr::Literal(lit)
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Literal::Int(n).into()
    }
}

impl From<f64> for Expr {
    fn from(f: f64) -> Self {
        Literal::Float(f).into()
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Literal::String(s).into()
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Literal::Bool(b).into()
    }
}
