//! Catalog records: fields, concepts and categories.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::ColumnRef;
use crate::schema::{InternalType, SimpleType};
use crate::value::Value;

/// A semantic handle on one column of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub id: i64,
    pub app: String,
    pub model: String,
    pub column: String,
    /// Physical table holding the column.
    pub table: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub simple_type: SimpleType,
    pub internal_type: InternalType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub enumerable: bool,
    #[serde(default)]
    pub indexable: bool,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub archived: bool,
    /// Registered translator; `None` selects the default.
    #[serde(default)]
    pub translator: Option<String>,
    /// Sites the field is restricted to. Empty means every site.
    #[serde(default)]
    pub sites: Vec<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub choices: Option<Vec<Value>>,
    /// Set at load time when the column is missing from the schema.
    #[serde(skip)]
    pub orphaned: bool,
}

impl Field {
    pub fn new(
        app: impl Into<String>,
        model: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        internal_type: InternalType,
        simple_type: SimpleType,
    ) -> Self {
        let column = column.into();
        Self {
            id: 0,
            app: app.into(),
            model: model.into(),
            table: table.into(),
            name: display_name(&column),
            column,
            description: None,
            keywords: Vec::new(),
            simple_type,
            internal_type,
            nullable: true,
            enumerable: false,
            indexable: false,
            published: false,
            archived: false,
            translator: None,
            sites: Vec::new(),
            category_id: None,
            choices: None,
            orphaned: false,
        }
    }

    /// `(app, model, column)`
    pub fn natural_key(&self) -> (&str, &str, &str) {
        (&self.app, &self.model, &self.column)
    }

    pub fn natural_key_string(&self) -> String {
        format!("{}.{}.{}", self.app, self.model, self.column)
    }

    pub fn is_available(&self, site: Option<&str>) -> bool {
        self.published
            && !self.archived
            && !self.orphaned
            && site_allowed(&self.sites, site)
    }

    /// Is `value` one of the declared choices? Always true without choices.
    pub fn is_choice(&self, value: &Value) -> bool {
        match &self.choices {
            Some(choices) => value.is_null() || choices.contains(value),
            None => true,
        }
    }
}

impl ColumnRef for Field {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn column_name(&self) -> &str {
        &self.column
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.model)
    }
}

/// A field's position within a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptField {
    pub field: Field,
    pub order: f64,
    #[serde(default)]
    pub alternate_name: Option<String>,
}

impl ConceptField {
    /// Name shown for this field within its concept.
    pub fn display_name(&self) -> &str {
        self.alternate_name.as_deref().unwrap_or(&self.field.name)
    }
}

/// An ordered group of fields presented as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Sorted by `order`.
    #[serde(default)]
    pub fields: Vec<ConceptField>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub category_id: Option<i64>,
    /// Registered formatter; `None` selects the default.
    #[serde(default)]
    pub formatter: Option<String>,
    #[serde(default = "default_true")]
    pub queryable: bool,
    #[serde(default = "default_true")]
    pub viewable: bool,
    #[serde(default = "default_true")]
    pub sortable: bool,
    #[serde(default)]
    pub sites: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Concept {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: None,
            fields: Vec::new(),
            published: false,
            archived: false,
            category_id: None,
            formatter: None,
            queryable: true,
            viewable: true,
            sortable: true,
            sites: Vec::new(),
        }
    }

    /// Append a field after the current last one.
    pub fn with_field(mut self, field: Field) -> Self {
        let order = self.fields.last().map(|f| f.order + 1.0).unwrap_or(0.0);
        self.fields.push(ConceptField {
            field,
            order,
            alternate_name: None,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn sort_fields(&mut self) {
        self.fields.sort_by(|a, b| a.order.total_cmp(&b.order));
    }

    /// Published and every contained field usable.
    pub fn is_available(&self, site: Option<&str>) -> bool {
        self.published
            && !self.archived
            && site_allowed(&self.sites, site)
            && self.fields.iter().all(|cf| cf.field.is_available(site))
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Grouping of fields and concepts, at most one level deep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub order: f64,
    #[serde(default)]
    pub published: bool,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            parent_id: None,
            order: 0.0,
            published: false,
        }
    }
}

fn site_allowed(sites: &[String], site: Option<&str>) -> bool {
    match site {
        Some(site) => sites.is_empty() || sites.iter().any(|s| s == site),
        None => true,
    }
}

/// `first_name` -> `First Name`
pub fn display_name(column: &str) -> String {
    use inflector::Inflector;
    let stem = column.strip_suffix("_id").unwrap_or(column);
    stem.to_title_case()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salary() -> Field {
        Field::new(
            "hr",
            "title",
            "title",
            "salary",
            InternalType::Double,
            SimpleType::Number,
        )
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("first_name"), "First Name");
        assert_eq!(display_name("title_id"), "Title");
        assert_eq!(salary().name, "Salary");
    }

    #[test]
    fn test_field_availability() {
        let mut field = salary();
        assert!(!field.is_available(None));
        field.published = true;
        assert!(field.is_available(None));

        field.sites = vec!["internal".into()];
        assert!(field.is_available(Some("internal")));
        assert!(!field.is_available(Some("public")));

        field.sites.clear();
        field.orphaned = true;
        assert!(!field.is_available(None));
    }

    #[test]
    fn test_concept_requires_published_fields() {
        let mut field = salary();
        field.published = true;
        let mut concept = Concept::new("Salary").with_field(field);
        concept.published = true;
        assert!(concept.is_available(None));

        concept.fields[0].field.archived = true;
        assert!(!concept.is_available(None));
    }

    #[test]
    fn test_concept_field_order() {
        let mut concept = Concept::new("Name")
            .with_field(salary())
            .with_field(salary());
        assert_eq!(concept.fields[1].order, 1.0);
        concept.fields[0].order = 5.0;
        concept.sort_fields();
        assert_eq!(concept.fields[1].order, 5.0);
        assert_eq!(concept.len(), 2);
    }

    #[test]
    fn test_choices() {
        let mut field = salary();
        assert!(field.is_choice(&Value::Int(1)));
        field.choices = Some(vec![Value::Int(1), Value::Int(2)]);
        assert!(field.is_choice(&Value::Int(2)));
        assert!(!field.is_choice(&Value::Int(3)));
        assert!(field.is_choice(&Value::Null));
    }
}
