//! SQLite SQL dialect.
//!
//! SQLite differences from ANSI:
//! - Booleans are stored as integers 1/0
//! - OFFSET requires a LIMIT (`LIMIT -1` means unbounded)
//! - No server process: cancellation interrupts the connection directly

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_required_limit(limit, offset, "-1")
    }
}
