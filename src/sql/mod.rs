//! SQL generation module.
//!
//! A type-safe SQL builder that renders SELECT statements for the
//! supported relational engines:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    col, count, count_distinct, escape_like, fragment, lit_int, lit_str, lower, raw_sql,
    table_col, BinaryOperator, Expr, ExprExt, Literal,
};
pub use query::{Join, OrderByExpr, Query, SortDir, TableRef};
pub use token::{Token, TokenStream};
