//! Shared helper functions for SQL dialect implementations.
//!
//! Reusable building blocks that dialects compose to implement
//! the `SqlDialect` trait with minimal duplication.

use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: SQLite, Postgres
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote string for MySQL, where backslash is an escape character by default.
pub fn quote_string_mysql(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: Postgres
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: SQLite, MySQL
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... (standard SQL).
/// Used by: Postgres
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit)
            .space()
            .push(Token::LitInt(lim as i64));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}

/// Emit LIMIT/OFFSET for engines that reject a bare OFFSET.
///
/// An offset without a limit is written with the engine's "unbounded" limit
/// (`-1` for SQLite, the maximum unsigned value for MySQL).
pub fn emit_limit_offset_required_limit(
    limit: Option<u64>,
    offset: Option<u64>,
    unbounded: &str,
) -> TokenStream {
    let mut ts = TokenStream::new();
    if limit.is_none() && offset.is_none() {
        return ts;
    }

    ts.push(Token::Limit).space();
    match limit {
        Some(lim) => ts.push(Token::LitInt(lim as i64)),
        None => ts.push(Token::Raw(unbounded.into())),
    };

    if let Some(off) = offset {
        ts.space()
            .push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}
