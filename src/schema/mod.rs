//! Schema description.
//!
//! The description lists every table Avocado may query, its columns and the
//! relations between tables. It is loaded from TOML or produced by
//! introspecting a SQLite database, and it is the only input the schema
//! graph and the catalog initialiser need.
//!
//! ```toml
//! [[tables]]
//! name = "employee"
//! app = "hr"
//! primary_key = "id"
//!
//! [[tables.columns]]
//! name = "first_name"
//! type = "varchar(50)"
//! nullable = false
//!
//! [[tables.relations]]
//! name = "title"
//! kind = "foreign_key"
//! target = "title"
//! column = "title_id"
//! ```

pub mod introspect;
mod types;

pub use types::{InternalType, SimpleType, TypeMap};

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Errors raised while loading or validating a schema description.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Duplicate table '{0}'")]
    DuplicateTable(String),

    #[error("Table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("Relation '{relation}' on '{table}' targets unknown table '{target}'")]
    UnknownTarget {
        table: String,
        relation: String,
        target: String,
    },

    #[error("Many-to-many relation '{relation}' on '{table}' has no association table")]
    MissingThrough { table: String, relation: String },
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// All tables known to Avocado.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    /// Application label, first part of a field's natural key.
    #[serde(default = "default_app")]
    pub app: String,
    /// Model name, second part of the natural key. Defaults to the table name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub relations: Vec<RelationDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub internal_type: InternalType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Fixed set of allowed values; values outside it produce a warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ForeignKey,
    OneToOne,
    ManyToMany,
}

/// A relation declared on its owning (source) table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Lookup name used when walking from the source to the target.
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    /// Column on the source table. Defaults to `{name}_id` for foreign keys
    /// and the source primary key for many-to-many.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Column on the target table. Defaults to the target primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<ThroughDef>,
    /// Lookup name used when walking back from the target. Defaults to the
    /// source table name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_name: Option<String>,
}

/// Association table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughDef {
    pub table: String,
    /// Column referencing the source table.
    pub source_column: String,
    /// Column referencing the target table.
    pub target_column: String,
}

fn default_app() -> String {
    "default".to_string()
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_true() -> bool {
    true
}

impl SchemaDescription {
    pub fn from_toml(source: &str) -> SchemaResult<Self> {
        let description: SchemaDescription = toml::from_str(source)?;
        description.validate()?;
        Ok(description)
    }

    pub fn load(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Find a table by its `(app, model)` pair.
    pub fn table_by_model(&self, app: &str, model: &str) -> Option<&TableDef> {
        self.tables
            .iter()
            .find(|t| t.app == app && t.model_name() == model)
    }

    /// Check that names are unique and every relation points somewhere real.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(SchemaError::DuplicateTable(table.name.clone()));
            }
        }

        for table in &self.tables {
            for rel in &table.relations {
                let target = self.table(&rel.target).ok_or_else(|| SchemaError::UnknownTarget {
                    table: table.name.clone(),
                    relation: rel.name.clone(),
                    target: rel.target.clone(),
                })?;

                if rel.kind == RelationKind::ManyToMany && rel.through.is_none() {
                    return Err(SchemaError::MissingThrough {
                        table: table.name.clone(),
                        relation: rel.name.clone(),
                    });
                }

                let column = rel.source_column(table);
                if !table.has_column(&column) {
                    return Err(SchemaError::UnknownColumn {
                        table: table.name.clone(),
                        column,
                    });
                }
                let target_column = rel.target_column(target);
                if !target.has_column(&target_column) {
                    return Err(SchemaError::UnknownColumn {
                        table: target.name.clone(),
                        column: target_column,
                    });
                }
            }
        }
        Ok(())
    }
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            app: default_app(),
            model: None,
            primary_key: default_primary_key(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary key is always considered present even when not listed.
    pub fn has_column(&self, name: &str) -> bool {
        name == self.primary_key || self.column(name).is_some()
    }

    /// Whether `column` is the primary key or the local side of a relation.
    pub fn is_key_column(&self, column: &str) -> bool {
        column == self.primary_key
            || self.relations.iter().any(|r| {
                r.kind != RelationKind::ManyToMany && r.source_column(self) == column
            })
    }
}

impl RelationDef {
    pub fn source_column(&self, source: &TableDef) -> String {
        match (&self.column, self.kind) {
            (Some(c), _) => c.clone(),
            (None, RelationKind::ManyToMany) => source.primary_key.clone(),
            (None, _) => format!("{}_id", self.name),
        }
    }

    pub fn target_column(&self, target: &TableDef) -> String {
        self.target_column
            .clone()
            .unwrap_or_else(|| target.primary_key.clone())
    }

    pub fn reverse_name(&self, source: &TableDef) -> String {
        self.reverse_name
            .clone()
            .unwrap_or_else(|| source.model_name().to_string())
    }
}
