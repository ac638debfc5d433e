//! Built-in formats.

use super::{FieldContext, Format, FormatError, FormatResult, Formatted};
use crate::catalog::Concept;
use crate::schema::SimpleType;
use crate::translate::coerce;
use crate::value::Value;

fn simple_type(cx: &FieldContext<'_>) -> Option<SimpleType> {
    cx.field.map(|f| f.simple_type)
}

/// Native booleans, including engines that store them as 0/1.
#[derive(Debug, Default, Clone, Copy)]
pub struct BooleanFormat;

impl Format for BooleanFormat {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn format_value(&self, value: &Value, cx: &FieldContext<'_>) -> FormatResult<Value> {
        match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Int(0 | 1) if simple_type(cx) == Some(SimpleType::Boolean) => {
                Ok(Value::Bool(*value == Value::Int(1)))
            }
            _ => Err(FormatError::unsupported(self.name(), value)),
        }
    }
}

/// Integers and floats; numeric text is parsed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberFormat;

impl Format for NumberFormat {
    fn name(&self) -> &'static str {
        "number"
    }

    fn format_value(&self, value: &Value, _cx: &FieldContext<'_>) -> FormatResult<Value> {
        match value {
            Value::Int(_) | Value::Float(_) => Ok(value.clone()),
            Value::Text(_) => coerce(SimpleType::Number, &value.to_json())
                .ok_or_else(|| FormatError::unsupported(self.name(), value)),
            _ => Err(FormatError::unsupported(self.name(), value)),
        }
    }
}

/// Text; missing values become the empty string.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringFormat;

impl Format for StringFormat {
    fn name(&self) -> &'static str {
        "string"
    }

    fn format_value(&self, value: &Value, _cx: &FieldContext<'_>) -> FormatResult<Value> {
        Ok(Value::Text(value.to_string()))
    }
}

/// The 1-based code of an enumerable field's value.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodedFormat;

impl Format for CodedFormat {
    fn name(&self) -> &'static str {
        "coded"
    }

    fn format_value(&self, value: &Value, cx: &FieldContext<'_>) -> FormatResult<Value> {
        let normalized = match simple_type(cx) {
            Some(simple) => coerce(simple, &value.to_json()).unwrap_or_else(|| value.clone()),
            None => value.clone(),
        };
        cx.codes
            .and_then(|codes| codes.iter().find(|(v, _)| *v == normalized))
            .map(|(_, code)| Value::Int(*code))
            .ok_or_else(|| FormatError::unsupported(self.name(), value))
    }
}

/// A concept's values joined into one escaped HTML string.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlFormat;

impl Format for HtmlFormat {
    fn name(&self) -> &'static str {
        "html"
    }

    fn process_multiple(&self) -> bool {
        true
    }

    fn emits_markup(&self) -> bool {
        true
    }

    fn format_value(&self, value: &Value, _cx: &FieldContext<'_>) -> FormatResult<Value> {
        Ok(Value::Text(escape_html(&value.to_string())))
    }

    fn format_values(
        &self,
        values: &[Value],
        fields: &[FieldContext<'_>],
        concept: Option<&Concept>,
    ) -> FormatResult<Formatted> {
        let key = match (concept, fields) {
            (Some(concept), _) => concept.name.clone(),
            (None, [only]) => only.key.to_string(),
            _ => return Err(FormatError::unsupported(self.name(), &Value::Null)),
        };
        let text = values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| escape_html(&v.to_string()))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(vec![(key, Value::Text(text))])
    }
}

/// JSON-native values: booleans normalised, non-finite floats dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

impl Format for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn format_value(&self, value: &Value, cx: &FieldContext<'_>) -> FormatResult<Value> {
        match value {
            Value::Float(f) if !f.is_finite() => Ok(Value::Null),
            Value::Int(_) if simple_type(cx) == Some(SimpleType::Boolean) => {
                BooleanFormat.format_value(value, cx)
            }
            _ => Ok(value.clone()),
        }
    }
}

/// The value untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawFormat;

impl Format for RawFormat {
    fn name(&self) -> &'static str {
        super::RAW
    }

    fn format_value(&self, value: &Value, _cx: &FieldContext<'_>) -> FormatResult<Value> {
        Ok(value.clone())
    }
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Field;
    use crate::schema::InternalType;

    fn cx<'a>(field: &'a Field, codes: Option<&'a [(Value, i64)]>) -> FieldContext<'a> {
        FieldContext {
            key: &field.column,
            field: Some(field),
            codes,
        }
    }

    fn field(column: &str, internal: InternalType, simple: SimpleType) -> Field {
        Field::new("hr", "employee", "employee", column, internal, simple)
    }

    #[test]
    fn test_boolean() {
        let flag = field("is_manager", InternalType::Bool, SimpleType::Boolean);
        let count = field("age", InternalType::Integer, SimpleType::Number);
        assert_eq!(
            BooleanFormat.format_value(&Value::Int(1), &cx(&flag, None)),
            Ok(Value::Bool(true))
        );
        assert!(BooleanFormat.format_value(&Value::Int(1), &cx(&count, None)).is_err());
        assert!(BooleanFormat.format_value(&Value::Null, &cx(&flag, None)).is_err());
    }

    #[test]
    fn test_number_and_string() {
        let f = field("salary", InternalType::Real, SimpleType::Number);
        assert_eq!(
            NumberFormat.format_value(&Value::from("7"), &cx(&f, None)),
            Ok(Value::Int(7))
        );
        assert!(NumberFormat.format_value(&Value::Null, &cx(&f, None)).is_err());
        assert_eq!(
            StringFormat.format_value(&Value::Null, &cx(&f, None)),
            Ok(Value::from(""))
        );
        assert_eq!(
            StringFormat.format_value(&Value::Float(1.5), &cx(&f, None)),
            Ok(Value::from("1.5"))
        );
    }

    #[test]
    fn test_coded() {
        let f = field("is_manager", InternalType::Bool, SimpleType::Boolean);
        let codes = vec![(Value::Bool(false), 1), (Value::Bool(true), 2)];
        assert_eq!(
            CodedFormat.format_value(&Value::Int(1), &cx(&f, Some(&codes))),
            Ok(Value::Int(2))
        );
        assert!(CodedFormat.format_value(&Value::Null, &cx(&f, Some(&codes))).is_err());
        assert!(CodedFormat.format_value(&Value::Int(1), &cx(&f, None)).is_err());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;"
        );
    }
}
