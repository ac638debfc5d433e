//! Column types.
//!
//! [`InternalType`] is the physical column type as declared by the database.
//! [`SimpleType`] is the coarse semantic type clients see; it drives operator
//! selection and value coercion.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical column type.
///
/// ```ignore
/// use avocado::schema::InternalType;
///
/// assert_eq!(InternalType::parse("varchar(255)"), Some(InternalType::Varchar(255)));
/// assert_eq!(InternalType::parse("decimal(18,2)"), Some(InternalType::Decimal(18, 2)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InternalType {
    Bool,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    /// Fixed-precision decimal (precision, scale).
    Decimal(u8, u8),
    Text,
    Char(u16),
    Varchar(u16),
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Binary,
    Json,
    Uuid,
    /// A declared type we do not recognise, kept verbatim.
    Other(String),
}

impl InternalType {
    /// Parse a declared SQL column type.
    ///
    /// Returns `None` for names outside the known families; use
    /// [`InternalType::from_declared`] to fall back to SQLite affinity rules.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();

        if let Some(inner) = extract_parens(&s, "decimal").or_else(|| extract_parens(&s, "numeric"))
        {
            return parse_decimal_params(&inner);
        }

        if let Some(inner) = extract_parens(&s, "varchar")
            .or_else(|| extract_parens(&s, "character varying"))
            .or_else(|| extract_parens(&s, "nvarchar"))
        {
            return parse_length_param(&inner).map(InternalType::Varchar);
        }

        if let Some(inner) = extract_parens(&s, "char")
            .or_else(|| extract_parens(&s, "character"))
            .or_else(|| extract_parens(&s, "nchar"))
        {
            return parse_length_param(&inner).map(InternalType::Char);
        }

        match s.as_str() {
            "bool" | "boolean" | "bit" => Some(InternalType::Bool),

            "tinyint" | "smallint" | "int2" => Some(InternalType::SmallInt),
            "int" | "integer" | "int4" | "mediumint" => Some(InternalType::Integer),
            "bigint" | "int8" => Some(InternalType::BigInt),

            "real" | "float4" => Some(InternalType::Real),
            "double" | "float8" | "double precision" | "float" => Some(InternalType::Double),
            "decimal" | "numeric" | "number" => Some(InternalType::Decimal(18, 2)),

            "text" | "string" | "clob" | "ntext" => Some(InternalType::Text),
            "varchar" | "nvarchar" => Some(InternalType::Text),

            "date" => Some(InternalType::Date),
            "time" => Some(InternalType::Time),
            "timestamp" | "datetime" | "datetime2" => Some(InternalType::Timestamp),
            "timestamptz" | "timestamp with time zone" | "datetimeoffset" => {
                Some(InternalType::TimestampTz)
            }

            "binary" | "blob" | "bytea" | "varbinary" => Some(InternalType::Binary),
            "json" | "jsonb" => Some(InternalType::Json),
            "uuid" | "guid" | "uniqueidentifier" => Some(InternalType::Uuid),

            _ => None,
        }
    }

    /// Parse a declared type, applying SQLite's affinity rules to names
    /// [`InternalType::parse`] does not know.
    pub fn from_declared(s: &str) -> Self {
        if let Some(t) = Self::parse(s) {
            return t;
        }
        let upper = s.trim().to_uppercase();
        if upper.contains("INT") {
            InternalType::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            InternalType::Text
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            InternalType::Double
        } else if upper.is_empty() || upper.contains("BLOB") {
            InternalType::Binary
        } else {
            InternalType::Other(s.trim().to_lowercase())
        }
    }

    /// Family name used as the key of the internal → simple type mapping.
    pub fn family(&self) -> &str {
        match self {
            InternalType::Bool => "boolean",
            InternalType::SmallInt | InternalType::Integer | InternalType::BigInt => "integer",
            InternalType::Real | InternalType::Double => "float",
            InternalType::Decimal(_, _) => "decimal",
            InternalType::Text => "text",
            InternalType::Char(_) => "char",
            InternalType::Varchar(_) => "varchar",
            InternalType::Date => "date",
            InternalType::Time => "time",
            InternalType::Timestamp | InternalType::TimestampTz => "datetime",
            InternalType::Binary => "binary",
            InternalType::Json => "json",
            InternalType::Uuid => "uuid",
            InternalType::Other(name) => name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            InternalType::SmallInt
                | InternalType::Integer
                | InternalType::BigInt
                | InternalType::Real
                | InternalType::Double
                | InternalType::Decimal(_, _)
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            InternalType::SmallInt | InternalType::Integer | InternalType::BigInt
        )
    }
}

impl fmt::Display for InternalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalType::Bool => write!(f, "boolean"),
            InternalType::SmallInt => write!(f, "smallint"),
            InternalType::Integer => write!(f, "integer"),
            InternalType::BigInt => write!(f, "bigint"),
            InternalType::Real => write!(f, "real"),
            InternalType::Double => write!(f, "double precision"),
            InternalType::Decimal(p, s) => write!(f, "decimal({}, {})", p, s),
            InternalType::Text => write!(f, "text"),
            InternalType::Char(n) => write!(f, "char({})", n),
            InternalType::Varchar(n) => write!(f, "varchar({})", n),
            InternalType::Date => write!(f, "date"),
            InternalType::Time => write!(f, "time"),
            InternalType::Timestamp => write!(f, "timestamp"),
            InternalType::TimestampTz => write!(f, "timestamp with time zone"),
            InternalType::Binary => write!(f, "binary"),
            InternalType::Json => write!(f, "json"),
            InternalType::Uuid => write!(f, "uuid"),
            InternalType::Other(name) => f.write_str(name),
        }
    }
}

impl Serialize for InternalType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InternalType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(InternalType::from_declared(&s))
    }
}

/// Semantic type exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimpleType {
    /// Primary or foreign key column.
    Key,
    String,
    Number,
    Boolean,
    Date,
    Time,
    Datetime,
}

impl SimpleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimpleType::Key => "key",
            SimpleType::String => "string",
            SimpleType::Number => "number",
            SimpleType::Boolean => "boolean",
            SimpleType::Date => "date",
            SimpleType::Time => "time",
            SimpleType::Datetime => "datetime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "key" => Some(SimpleType::Key),
            "string" => Some(SimpleType::String),
            "number" => Some(SimpleType::Number),
            "boolean" => Some(SimpleType::Boolean),
            "date" => Some(SimpleType::Date),
            "time" => Some(SimpleType::Time),
            "datetime" => Some(SimpleType::Datetime),
            _ => None,
        }
    }
}

impl fmt::Display for SimpleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Internal → simple type mapping with per-family overrides.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    overrides: HashMap<String, SimpleType>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from settings, keyed by internal type family (e.g. `"decimal"`).
    /// Unknown simple type names are ignored.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let overrides = overrides
            .iter()
            .filter_map(|(family, simple)| {
                SimpleType::parse(simple).map(|s| (family.to_lowercase(), s))
            })
            .collect();
        Self { overrides }
    }

    pub fn simple_type(&self, internal: &InternalType) -> SimpleType {
        if let Some(simple) = self.overrides.get(internal.family()) {
            return *simple;
        }
        match internal {
            InternalType::Bool => SimpleType::Boolean,
            t if t.is_numeric() => SimpleType::Number,
            InternalType::Date => SimpleType::Date,
            InternalType::Time => SimpleType::Time,
            InternalType::Timestamp | InternalType::TimestampTz => SimpleType::Datetime,
            _ => SimpleType::String,
        }
    }
}

/// Extract content inside parentheses for a given type prefix.
/// e.g., extract_parens("decimal(10,2)", "decimal") returns Some("10,2")
fn extract_parens(s: &str, prefix: &str) -> Option<String> {
    let s = s.trim();
    if !s.starts_with(prefix) {
        return None;
    }

    let rest = s[prefix.len()..].trim();
    if !rest.starts_with('(') || !rest.ends_with(')') {
        return None;
    }

    Some(rest[1..rest.len() - 1].to_string())
}

fn parse_decimal_params(inner: &str) -> Option<InternalType> {
    let parts: Vec<&str> = inner.split(',').map(|s| s.trim()).collect();
    match parts.as_slice() {
        [p] => Some(InternalType::Decimal(p.parse().ok()?, 0)),
        [p, s] => Some(InternalType::Decimal(p.parse().ok()?, s.parse().ok()?)),
        _ => None,
    }
}

fn parse_length_param(inner: &str) -> Option<u16> {
    let inner = inner.trim();
    if inner.eq_ignore_ascii_case("max") {
        return Some(u16::MAX);
    }
    inner.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_types() {
        assert_eq!(InternalType::parse("BOOLEAN"), Some(InternalType::Bool));
        assert_eq!(InternalType::parse("integer"), Some(InternalType::Integer));
        assert_eq!(InternalType::parse("bigint"), Some(InternalType::BigInt));
        assert_eq!(InternalType::parse("double precision"), Some(InternalType::Double));
        assert_eq!(InternalType::parse("text"), Some(InternalType::Text));
        assert_eq!(InternalType::parse("datetime"), Some(InternalType::Timestamp));
        assert_eq!(InternalType::parse("jsonb"), Some(InternalType::Json));
    }

    #[test]
    fn test_parse_parameterized_types() {
        assert_eq!(InternalType::parse("decimal(10,2)"), Some(InternalType::Decimal(10, 2)));
        assert_eq!(InternalType::parse("NUMERIC(8)"), Some(InternalType::Decimal(8, 0)));
        assert_eq!(InternalType::parse("varchar(255)"), Some(InternalType::Varchar(255)));
        assert_eq!(InternalType::parse("nvarchar(max)"), Some(InternalType::Varchar(u16::MAX)));
        assert_eq!(InternalType::parse("char(1)"), Some(InternalType::Char(1)));
        assert_eq!(InternalType::parse("varchar()"), None);
    }

    #[test]
    fn test_sqlite_affinity_fallback() {
        assert_eq!(InternalType::from_declared("UNSIGNED BIG INT"), InternalType::Integer);
        assert_eq!(InternalType::from_declared("VARYING CHARACTER(20)"), InternalType::Text);
        assert_eq!(InternalType::from_declared("FLOATING"), InternalType::Double);
        assert_eq!(InternalType::from_declared(""), InternalType::Binary);
        assert_eq!(
            InternalType::from_declared("money"),
            InternalType::Other("money".into())
        );
    }

    #[test]
    fn test_default_simple_types() {
        let map = TypeMap::new();
        assert_eq!(map.simple_type(&InternalType::Bool), SimpleType::Boolean);
        assert_eq!(map.simple_type(&InternalType::Decimal(10, 2)), SimpleType::Number);
        assert_eq!(map.simple_type(&InternalType::Varchar(20)), SimpleType::String);
        assert_eq!(map.simple_type(&InternalType::TimestampTz), SimpleType::Datetime);
        assert_eq!(map.simple_type(&InternalType::Uuid), SimpleType::String);
    }

    #[test]
    fn test_simple_type_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("date".to_string(), "string".to_string());
        overrides.insert("decimal".to_string(), "bogus".to_string());
        let map = TypeMap::with_overrides(&overrides);
        assert_eq!(map.simple_type(&InternalType::Date), SimpleType::String);
        assert_eq!(map.simple_type(&InternalType::Decimal(4, 1)), SimpleType::Number);
    }

    #[test]
    fn test_serde_as_declared_string() {
        let t: InternalType = serde_json::from_str("\"varchar(40)\"").unwrap();
        assert_eq!(t, InternalType::Varchar(40));
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"varchar(40)\"");
    }
}
