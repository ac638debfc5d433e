//! Operator registry.
//!
//! Operators are a closed set of comparison kinds. Each carries its uid
//! (`-` prefixed when negated), the shape of value it accepts and the words
//! used to render a condition as text. The registry is built once and never
//! mutated.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};

use crate::schema::SimpleType;
use crate::value::Value;

/// Lists longer than this are abbreviated when rendered as text.
const TEXT_MAX_LIST_SIZE: usize = 3;

/// The underlying comparison, without negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupOp {
    Exact,
    IExact,
    Contains,
    IContains,
    In,
    Lt,
    Lte,
    Gt,
    Gte,
    Range,
    IsNull,
}

impl LookupOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOp::Exact => "exact",
            LookupOp::IExact => "iexact",
            LookupOp::Contains => "contains",
            LookupOp::IContains => "icontains",
            LookupOp::In => "in",
            LookupOp::Lt => "lt",
            LookupOp::Lte => "lte",
            LookupOp::Gt => "gt",
            LookupOp::Gte => "gte",
            LookupOp::Range => "range",
            LookupOp::IsNull => "isnull",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(LookupOp::Exact),
            "iexact" => Some(LookupOp::IExact),
            "contains" => Some(LookupOp::Contains),
            "icontains" => Some(LookupOp::IContains),
            "in" => Some(LookupOp::In),
            "lt" => Some(LookupOp::Lt),
            "lte" => Some(LookupOp::Lte),
            "gt" => Some(LookupOp::Gt),
            "gte" => Some(LookupOp::Gte),
            "range" => Some(LookupOp::Range),
            "isnull" => Some(LookupOp::IsNull),
            _ => None,
        }
    }
}

/// Shape of value an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    Scalar,
    List,
    /// Exactly two elements.
    Range,
    Boolean,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Operator {
    pub uid: &'static str,
    pub lookup: LookupOp,
    pub negated: bool,
    pub shape: ValueShape,
    pub short_name: &'static str,
    pub verbose_name: &'static str,
}

impl Operator {
    /// Does `value` have the shape this operator needs?
    pub fn check(&self, value: &serde_json::Value) -> bool {
        match (self.shape, value) {
            (ValueShape::Scalar, v) => !v.is_array() && !v.is_object(),
            (ValueShape::Boolean, v) => v.is_boolean() || v.is_null(),
            (ValueShape::List, serde_json::Value::Array(_)) => true,
            (ValueShape::Range, serde_json::Value::Array(items)) => items.len() == 2,
            _ => false,
        }
    }

    /// Human readable rendering of `operator value`, e.g. `is between 1 and 5`.
    pub fn text(&self, value: &serde_json::Value) -> String {
        match self.lookup {
            LookupOp::IsNull => self.stringify(&serde_json::Value::Null),
            LookupOp::In => {
                let items = as_items(value);
                let rendered: Vec<String> = items.iter().map(|v| self.stringify(v)).collect();
                match rendered.split_last() {
                    None => self.verbose_name.to_string(),
                    Some((last, [])) => {
                        let name = if self.negated {
                            NOT_EXACT.verbose_name
                        } else {
                            EXACT.verbose_name
                        };
                        format!("{} {}", name, last)
                    }
                    Some((last, head)) => {
                        let shown = &head[..head.len().min(TEXT_MAX_LIST_SIZE)];
                        let mut text = format!("{} {}", self.verbose_name, shown.join(", "));
                        if head.len() > TEXT_MAX_LIST_SIZE {
                            text.push_str(&format!(
                                " ... ({} more)",
                                head.len() - TEXT_MAX_LIST_SIZE
                            ));
                        }
                        format!("{} or {}", text, last)
                    }
                }
            }
            LookupOp::Range => {
                let rendered: Vec<String> =
                    as_items(value).iter().map(|v| self.stringify(v)).collect();
                format!("{} {}", self.verbose_name, rendered.join(" and "))
            }
            _ => format!("{} {}", self.verbose_name, self.stringify(value)),
        }
    }

    fn stringify(&self, value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::Null if self.negated => "has any value".to_string(),
            serde_json::Value::Null => "has no value".to_string(),
            serde_json::Value::Bool(true) => "Yes".to_string(),
            serde_json::Value::Bool(false) => "No".to_string(),
            other => match Value::from_json(other) {
                Some(v) => v.to_string(),
                None => other.to_string(),
            },
        }
    }
}

fn as_items(value: &serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.verbose_name, self.uid)
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.uid)
    }
}

macro_rules! operator {
    ($name:ident, $uid:literal, $lookup:ident, $negated:literal, $shape:ident, $short:literal, $verbose:literal) => {
        pub static $name: Operator = Operator {
            uid: $uid,
            lookup: LookupOp::$lookup,
            negated: $negated,
            shape: ValueShape::$shape,
            short_name: $short,
            verbose_name: $verbose,
        };
    };
}

operator!(EXACT, "exact", Exact, false, Scalar, "=", "is equal to");
operator!(NOT_EXACT, "-exact", Exact, true, Scalar, "!=", "is not equal to");
operator!(IEXACT, "iexact", IExact, false, Scalar, "=", "is equal to");
operator!(NOT_IEXACT, "-iexact", IExact, true, Scalar, "!=", "is not equal to");
operator!(CONTAINS, "contains", Contains, false, Scalar, "contains", "contains the text");
operator!(NOT_CONTAINS, "-contains", Contains, true, Scalar, "does not contain", "does not contain the text");
operator!(ICONTAINS, "icontains", IContains, false, Scalar, "contains", "contains the text");
operator!(NOT_ICONTAINS, "-icontains", IContains, true, Scalar, "does not contain", "does not contain the text");
operator!(IN, "in", In, false, List, "in list", "is either");
operator!(NOT_IN, "-in", In, true, List, "not in list", "is not");
operator!(LT, "lt", Lt, false, Scalar, "<", "is less than");
operator!(LTE, "lte", Lte, false, Scalar, "<=", "is less than or equal to");
operator!(GT, "gt", Gt, false, Scalar, ">", "is greater than");
operator!(GTE, "gte", Gte, false, Scalar, ">=", "is greater than or equal to");
operator!(RANGE, "range", Range, false, Range, "between", "is between");
operator!(NOT_RANGE, "-range", Range, true, Range, "not between", "is not between");
operator!(ISNULL, "isnull", IsNull, false, Boolean, "is null", "is null");
operator!(NOT_ISNULL, "-isnull", IsNull, true, Boolean, "not null", "is not null");

/// Every built-in operator, in registry order.
pub static OPERATORS: [&Operator; 18] = [
    &EXACT,
    &NOT_EXACT,
    &IEXACT,
    &NOT_IEXACT,
    &CONTAINS,
    &NOT_CONTAINS,
    &ICONTAINS,
    &NOT_ICONTAINS,
    &IN,
    &NOT_IN,
    &LT,
    &LTE,
    &GT,
    &GTE,
    &RANGE,
    &NOT_RANGE,
    &ISNULL,
    &NOT_ISNULL,
];

static BY_UID: Lazy<HashMap<&'static str, &'static Operator>> =
    Lazy::new(|| OPERATORS.iter().map(|op| (op.uid, *op)).collect());

/// Look up an operator by uid.
pub fn get(uid: &str) -> Option<&'static Operator> {
    BY_UID.get(uid).copied()
}

const GENERAL: &[&str] = &["exact", "-exact", "in", "-in"];
const STRING: &[&str] = &[
    "exact", "-exact", "iexact", "-iexact", "in", "-in", "contains", "-contains", "icontains",
    "-icontains",
];
const ORDERED: &[&str] = &[
    "exact", "-exact", "in", "-in", "lt", "lte", "gt", "gte", "range", "-range",
];
const NULL: &[&str] = &["isnull", "-isnull"];

/// Simple type → allowed operator uids.
#[derive(Debug, Clone, Default)]
pub struct OperatorMap {
    overrides: HashMap<SimpleType, Vec<String>>,
}

impl OperatorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides keyed by simple type name; unknown types and operators are
    /// dropped.
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> Self {
        let overrides = overrides
            .iter()
            .filter_map(|(simple, uids)| {
                let simple = SimpleType::parse(simple)?;
                let uids = uids.iter().filter(|u| get(u).is_some()).cloned().collect();
                Some((simple, uids))
            })
            .collect();
        Self { overrides }
    }

    /// Allowed operators for a field, in preference order. The first entry
    /// is the default when a condition omits its operator.
    pub fn allowed(&self, simple: SimpleType, nullable: bool) -> Vec<&'static Operator> {
        let base: Vec<&str> = match self.overrides.get(&simple) {
            Some(uids) => uids.iter().map(String::as_str).collect(),
            None => match simple {
                SimpleType::Key | SimpleType::Boolean => GENERAL.to_vec(),
                SimpleType::String => STRING.to_vec(),
                SimpleType::Number | SimpleType::Date | SimpleType::Time | SimpleType::Datetime => {
                    ORDERED.to_vec()
                }
            },
        };
        let nulls = if nullable { NULL } else { &[] };
        let mut ops: Vec<&'static Operator> = Vec::new();
        for uid in base.into_iter().chain(nulls.iter().copied()) {
            if let Some(op) = get(uid) {
                if !ops.iter().any(|o| o.uid == op.uid) {
                    ops.push(op);
                }
            }
        }
        ops
    }
}
