//! Translators: per-field compilers from `(operator, value)` to query
//! fragments.
//!
//! A [`Translator`] validates the operator against the field's allowed set,
//! coerces the value to the field's simple type and builds a
//! [`Translation`]: a condition over lookup paths rooted at the join
//! tree's root, plus optional annotations and raw SQL extras.
//!
//! Every condition is guarded with `root_pk IS NOT NULL`. LEFT OUTER joins
//! fill missing related rows with NULLs, so conditions matching NULL also
//! require the related row's own primary key to exist.

mod coerce;
mod condition;

pub use coerce::coerce;
pub use condition::{
    Aggregate, Annotation, Condition, Extra, Lookup, LookupValue, SqlFragment, LIKE_ESCAPE,
};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::Field;
use crate::graph::{GraphError, JoinTree};
use crate::operators::{self, LookupOp, Operator, OperatorMap, ValueShape};
use crate::schema::SimpleType;
use crate::value::Value;

/// Name of the translator used when a field names none.
pub const DEFAULT_TRANSLATOR: &str = "default";

/// Errors raised while translating a condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslateError {
    #[error("Operator '{operator}' cannot be used for field '{field}'")]
    OperatorNotPermitted { field: String, operator: String },

    #[error("'{0}' is not a valid operator")]
    InvalidOperator(String),

    #[error("Value {value} is not a valid {expected}")]
    InvalidValue { value: String, expected: String },

    #[error("Value {value} is not valid for the operator '{operator}'")]
    InvalidShape { value: String, operator: String },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Unknown translator '{0}'")]
    UnknownTranslator(String),
}

pub type TranslateResult<T> = Result<T, TranslateError>;

/// What a translator needs besides the field.
#[derive(Clone, Copy)]
pub struct TranslateContext<'a> {
    pub tree: &'a JoinTree,
    pub operators: &'a OperatorMap,
}

/// Operator and value as submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawData {
    pub operator: Option<String>,
    pub value: serde_json::Value,
}

/// Operator and value after validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedData {
    pub operator: &'static Operator,
    pub value: LookupValue,
    pub language: String,
}

/// Everything a translator produces for one condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub field_id: i64,
    pub raw: RawData,
    pub cleaned: CleanedData,
    pub condition: Option<Condition>,
    pub annotations: BTreeMap<String, Annotation>,
    pub extra: Extra,
}

/// Split `{value, label}` objects (or lists of them) into the value used
/// for the predicate and the label used for language.
pub fn split_value(raw: &serde_json::Value) -> (serde_json::Value, serde_json::Value) {
    match raw {
        serde_json::Value::Object(map) if map.contains_key("value") => {
            let value = map.get("value").cloned().unwrap_or_default();
            let label = map.get("label").cloned().unwrap_or_else(|| value.clone());
            (value, label)
        }
        serde_json::Value::Array(items) => {
            let (values, labels) = items.iter().map(split_value).unzip();
            (
                serde_json::Value::Array(values),
                serde_json::Value::Array(labels),
            )
        }
        other => (other.clone(), other.clone()),
    }
}

/// Pluggable per-field compiler.
///
/// Every method has a default; the default translator overrides nothing.
pub trait Translator: Send + Sync {
    /// Operators this translator accepts for `field`, default first.
    fn operators(&self, field: &Field, map: &OperatorMap) -> Vec<&'static Operator> {
        map.allowed(field.simple_type, field.nullable)
    }

    /// Resolve the operator and coerce the value.
    fn validate(
        &self,
        field: &Field,
        operator: Option<&str>,
        value: &serde_json::Value,
        cx: TranslateContext<'_>,
    ) -> TranslateResult<(&'static Operator, LookupValue)> {
        let allowed = self.operators(field, cx.operators);
        let op = resolve_operator(field, operator, &allowed)?;
        let value = clean_value(field, op, value)?;
        Ok((op, value))
    }

    /// Build the guarded condition.
    fn condition(
        &self,
        field: &Field,
        op: &'static Operator,
        value: &LookupValue,
        cx: TranslateContext<'_>,
    ) -> TranslateResult<Option<Condition>> {
        default_condition(field, op, value, cx.tree).map(Some)
    }

    fn annotations(
        &self,
        _field: &Field,
        _op: &'static Operator,
        _value: &LookupValue,
        _cx: TranslateContext<'_>,
    ) -> TranslateResult<BTreeMap<String, Annotation>> {
        Ok(BTreeMap::new())
    }

    fn extra(
        &self,
        _field: &Field,
        _op: &'static Operator,
        _value: &LookupValue,
        _cx: TranslateContext<'_>,
    ) -> TranslateResult<Extra> {
        Ok(Extra::default())
    }

    /// `"{field name} {operator text}"`, rendered from the submitted labels.
    fn language(&self, field: &Field, op: &'static Operator, raw: &serde_json::Value) -> String {
        let (_, label) = split_value(raw);
        let op = match (op.lookup, &label) {
            // isnull=false reads as its negation
            (LookupOp::IsNull, serde_json::Value::Bool(false)) => negation_of(op),
            _ => op,
        };
        format!("{} {}", field.name, op.text(&label))
    }

    fn translate(
        &self,
        field: &Field,
        operator: Option<&str>,
        value: &serde_json::Value,
        cx: TranslateContext<'_>,
    ) -> TranslateResult<Translation> {
        let (op, cleaned) = self.validate(field, operator, value, cx)?;
        let condition = self.condition(field, op, &cleaned, cx)?;
        let annotations = self.annotations(field, op, &cleaned, cx)?;
        let extra = self.extra(field, op, &cleaned, cx)?;
        let language = self.language(field, op, value);
        debug!(field = %field.natural_key_string(), operator = op.uid, "translated condition");

        Ok(Translation {
            field_id: field.id,
            raw: RawData {
                operator: operator.map(str::to_string),
                value: value.clone(),
            },
            cleaned: CleanedData {
                operator: op,
                value: cleaned,
                language,
            },
            condition,
            annotations,
            extra,
        })
    }
}

/// Translator used when a field names none.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTranslator;

impl Translator for DefaultTranslator {}

fn negation_of(op: &'static Operator) -> &'static Operator {
    let uid = match op.uid.strip_prefix('-') {
        Some(base) => base.to_string(),
        None => format!("-{}", op.uid),
    };
    operators::get(&uid).unwrap_or(op)
}

fn resolve_operator(
    field: &Field,
    uid: Option<&str>,
    allowed: &[&'static Operator],
) -> TranslateResult<&'static Operator> {
    let op = match uid {
        Some(uid) => {
            operators::get(uid).ok_or_else(|| TranslateError::InvalidOperator(uid.into()))?
        }
        None => *allowed
            .first()
            .ok_or_else(|| TranslateError::InvalidOperator(String::new()))?,
    };
    if !allowed.iter().any(|a| a.uid == op.uid) {
        return Err(TranslateError::OperatorNotPermitted {
            field: field.natural_key_string(),
            operator: op.uid.to_string(),
        });
    }
    Ok(op)
}

/// Coerce element-wise, then check the operator's shape.
fn clean_value(
    field: &Field,
    op: &'static Operator,
    raw: &serde_json::Value,
) -> TranslateResult<LookupValue> {
    let (value, _) = split_value(raw);
    // isnull takes a flag whatever the field's type
    let simple = if op.shape == ValueShape::Boolean {
        SimpleType::Boolean
    } else {
        field.simple_type
    };
    let coerce_one = |v: &serde_json::Value| {
        coerce(simple, v).ok_or_else(|| TranslateError::InvalidValue {
            value: v.to_string(),
            expected: simple.to_string(),
        })
    };
    let shape_error = || TranslateError::InvalidShape {
        value: value.to_string(),
        operator: op.uid.to_string(),
    };

    match (&value, op.shape) {
        (serde_json::Value::Array(items), ValueShape::List) => {
            let items = items.iter().map(coerce_one).collect::<TranslateResult<Vec<_>>>()?;
            if items.is_empty() {
                return Err(shape_error());
            }
            Ok(LookupValue::List(items))
        }
        (serde_json::Value::Array(items), ValueShape::Range) => {
            let mut items = items.iter().map(coerce_one).collect::<TranslateResult<Vec<_>>>()?;
            if items.len() != 2 || items.iter().any(Value::is_null) {
                return Err(shape_error());
            }
            items.sort_by(|a, b| a.total_cmp(b));
            let high = items.pop().ok_or_else(shape_error)?;
            let low = items.pop().ok_or_else(shape_error)?;
            Ok(LookupValue::Range(low, high))
        }
        (serde_json::Value::Array(_), _) => Err(shape_error()),
        (_, ValueShape::List | ValueShape::Range) => Err(shape_error()),
        (v, ValueShape::Boolean) => match coerce_one(v)? {
            Value::Bool(b) => Ok(LookupValue::Bool(b)),
            // a bare isnull means "is null"
            Value::Null => Ok(LookupValue::Bool(true)),
            _ => Err(shape_error()),
        },
        (v, ValueShape::Scalar) => Ok(LookupValue::Scalar(coerce_one(v)?)),
    }
}

/// Null-aware condition for one field, guarded by the root's primary key.
pub fn default_condition(
    field: &Field,
    op: &'static Operator,
    value: &LookupValue,
    tree: &JoinTree,
) -> TranslateResult<Condition> {
    let path = tree.query_string_for_field(field, None)?;
    let mut negated = op.negated;
    let mut add_null = false;
    let mut main: Option<Condition> = None;

    match (op.lookup, value) {
        (LookupOp::In, LookupValue::List(items)) => {
            let present: Vec<Value> = items.iter().filter(|v| !v.is_null()).cloned().collect();
            add_null = present.len() < items.len();
            if !present.is_empty() {
                main = Some(Condition::Lookup(Lookup::new(
                    &path,
                    LookupOp::In,
                    LookupValue::List(present),
                )));
            }
        }
        (LookupOp::Exact, LookupValue::Scalar(Value::Null)) => add_null = true,
        (LookupOp::IsNull, LookupValue::Bool(is_null)) => {
            add_null = true;
            if !is_null {
                negated = !negated;
            }
        }
        _ => main = Some(Condition::Lookup(Lookup::new(&path, op.lookup, value.clone()))),
    }

    if add_null {
        let mut null_condition = Condition::Lookup(Lookup::is_null(&path));
        if field.table != tree.root() {
            let pk = tree
                .table(&field.table)
                .map(|t| t.primary_key.clone())
                .unwrap_or_else(|| "id".to_string());
            let pk_path = tree.query_string_for_field(&(field.table.as_str(), pk.as_str()), None)?;
            null_condition = null_condition.and(Condition::Lookup(Lookup::not_null(pk_path)));
        }
        main = Some(match main {
            Some(condition) => condition.or(null_condition),
            None => null_condition,
        });
    }

    let mut condition = match main {
        Some(condition) => condition,
        // unreachable for well-formed values; keep the guard alone
        None => return Ok(Condition::Lookup(Lookup::not_null(tree.root_pk()))),
    };
    if negated {
        condition = condition.negate();
    }
    Ok(Condition::And(vec![
        condition,
        Condition::Lookup(Lookup::not_null(tree.root_pk())),
    ]))
}

/// Name to translator map. Built once, read-only afterwards.
#[derive(Clone)]
pub struct TranslatorRegistry {
    translators: HashMap<String, Arc<dyn Translator>>,
}

impl Default for TranslatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TranslatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl TranslatorRegistry {
    pub fn new() -> Self {
        let mut translators: HashMap<String, Arc<dyn Translator>> = HashMap::new();
        translators.insert(DEFAULT_TRANSLATOR.to_string(), Arc::new(DefaultTranslator));
        Self { translators }
    }

    pub fn register(&mut self, name: impl Into<String>, translator: Arc<dyn Translator>) {
        self.translators.insert(name.into(), translator);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.translators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn try_get(&self, name: &str) -> TranslateResult<Arc<dyn Translator>> {
        self.translators
            .get(name)
            .cloned()
            .ok_or_else(|| TranslateError::UnknownTranslator(name.to_string()))
    }

    /// The named translator, or the default when unnamed or unknown.
    pub fn get(&self, name: Option<&str>) -> Arc<dyn Translator> {
        let name = name.unwrap_or(DEFAULT_TRANSLATOR);
        match self.translators.get(name) {
            Some(t) => Arc::clone(t),
            None => {
                warn!(translator = name, "unknown translator, using default");
                Arc::new(DefaultTranslator)
            }
        }
    }
}
