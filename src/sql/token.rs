//! Tokens the SQL builder emits, rendered per dialect.

use std::borrow::Cow;

use super::dialect::{Dialect, SqlDialect};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Select,
    Distinct,
    From,
    Left,
    Outer,
    Join,
    On,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Asc,
    Desc,
    Limit,
    Offset,
    And,
    Or,
    Not,
    In,
    Between,
    Like,
    Escape,
    IsNull,
    IsNotNull,
    True,
    False,

    // Punctuation and comparison
    Comma,
    Dot,
    LParen,
    RParen,
    Eq,
    Lt,
    Gt,
    Lte,
    Gte,

    // Layout
    Space,
    Newline,
    Indent(usize),

    /// Table, column or alias name, quoted for the dialect.
    Ident(String),
    LitInt(i64),
    LitFloat(f64),
    LitString(String),
    LitBool(bool),
    LitNull,
    /// Rendered uppercase.
    FunctionName(String),
    /// Written out untouched. Values never go here; they belong in the
    /// literal tokens, which escape for the target dialect.
    Raw(String),
}

impl Token {
    pub fn render(&self, dialect: Dialect) -> Cow<'static, str> {
        let text = match self {
            Token::Select => "SELECT",
            Token::Distinct => "DISTINCT",
            Token::From => "FROM",
            Token::Left => "LEFT",
            Token::Outer => "OUTER",
            Token::Join => "JOIN",
            Token::On => "ON",
            Token::Where => "WHERE",
            Token::GroupBy => "GROUP BY",
            Token::Having => "HAVING",
            Token::OrderBy => "ORDER BY",
            Token::Asc => "ASC",
            Token::Desc => "DESC",
            Token::Limit => "LIMIT",
            Token::Offset => "OFFSET",
            Token::And => "AND",
            Token::Or => "OR",
            Token::Not => "NOT",
            Token::In => "IN",
            Token::Between => "BETWEEN",
            Token::Like => "LIKE",
            Token::Escape => "ESCAPE",
            Token::IsNull => "IS NULL",
            Token::IsNotNull => "IS NOT NULL",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Eq => "=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Lte => "<=",
            Token::Gte => ">=",
            Token::Space => " ",
            Token::Newline => "\n",
            Token::LitNull => "NULL",
            Token::LitBool(b) => dialect.format_bool(*b),

            Token::True => return dialect.format_bool(true).to_uppercase().into(),
            Token::False => return dialect.format_bool(false).to_uppercase().into(),
            Token::Indent(depth) => return "  ".repeat(*depth).into(),
            Token::Ident(name) => return dialect.quote_identifier(name).into(),
            Token::LitInt(n) => return n.to_string().into(),
            Token::LitFloat(f) if !f.is_finite() => "NULL",
            Token::LitFloat(f) => return ryu::Buffer::new().format(*f).to_string().into(),
            Token::LitString(s) => return dialect.quote_string(s).into(),
            Token::FunctionName(name) => return name.to_uppercase().into(),
            Token::Raw(sql) => return sql.clone().into(),
        };
        Cow::Borrowed(text)
    }
}

/// Tokens in output order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend_from_slice(&other.tokens);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn serialize(&self, dialect: Dialect) -> String {
        self.tokens.iter().map(|t| t.render(dialect)).collect()
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }

    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }

    pub fn indent(&mut self, depth: usize) -> &mut Self {
        self.push(Token::Indent(depth))
    }

    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }

    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }

    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}
