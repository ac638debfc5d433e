//! Metadata catalog.
//!
//! Fields, concepts and categories persisted in a [`CatalogStore`], fronted
//! by the process-wide [`Cache`]. Published records are written to the cache
//! on save and evicted on delete; lookups by primary key consult the cache
//! before the store.
//!
//! Data derived from a field (distinct values, value labels) is cached under
//! a version token computed from the field record, so editing the field
//! retires the old entries.

mod models;
mod store;

pub use models::{display_name, Category, Concept, ConceptField, Field};
pub use store::{CatalogStore, StoredDocument};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{version_token, Cache, CacheError, CacheKey};
use crate::config::CatalogSettings;
use crate::engine::{Engine, EngineError};
use crate::operators::OperatorMap;
use crate::schema::{SchemaDescription, SimpleType, TypeMap};
use crate::sql::{count_distinct, table_col, OrderByExpr, Query, TableRef};
use crate::translate::coerce;
use crate::value::Value;

/// Cache namespace for catalog records.
const CACHE_APP: &str = "avocado";

/// Label shown for a missing value.
pub const NULL_LABEL: &str = "No Data";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Catalog store version {found} does not match {expected}")]
    StoreVersion { found: String, expected: i32 },

    #[error("Field '{0}' does not exist")]
    FieldNotFound(String),

    #[error("Field reference '{reference}' matches {matches} fields")]
    AmbiguousField { reference: String, matches: usize },

    #[error("Concept '{0}' does not exist")]
    ConceptNotFound(String),

    #[error("Context {0} does not exist")]
    ContextNotFound(i64),

    #[error("View {0} does not exist")]
    ViewNotFound(i64),

    #[error("Field '{0}' must be saved before it is added to a concept")]
    UnsavedField(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// A reference to a field as it appears in documents: a primary key, a
/// dotted natural key or a natural key list. Partial keys (`model.column`
/// or `column`) resolve when they match exactly one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldRef {
    Id(i64),
    Key(String),
    Parts(Vec<String>),
}

impl FieldRef {
    /// Natural key parts, most specific last.
    fn parts(&self) -> Vec<&str> {
        match self {
            FieldRef::Id(_) => Vec::new(),
            FieldRef::Key(key) => key.split('.').collect(),
            FieldRef::Parts(parts) => parts.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Id(id) => write!(f, "{}", id),
            FieldRef::Key(key) => f.write_str(key),
            FieldRef::Parts(parts) => f.write_str(&parts.join(".")),
        }
    }
}

impl From<i64> for FieldRef {
    fn from(id: i64) -> Self {
        FieldRef::Id(id)
    }
}

impl From<&str> for FieldRef {
    fn from(key: &str) -> Self {
        FieldRef::Key(key.to_string())
    }
}

/// Per-user access checks, consulted only when permissions are enabled.
pub trait Permissions: Send + Sync {
    fn can_view_field(&self, user: Option<&str>, field: &Field) -> bool;

    fn can_view_concept(&self, user: Option<&str>, concept: &Concept) -> bool;
}

/// One distinct value of a field and its display label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueLabel {
    pub value: Value,
    pub label: String,
}

/// Options for [`Catalog::init_from_schema`].
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Register primary and foreign key columns too.
    pub include_keys: bool,
    /// Publish the created records.
    pub publish: bool,
    /// Create a single-field concept per new field.
    pub concepts: bool,
    /// Re-apply heuristics to fields that already exist.
    pub force: bool,
}

/// What [`Catalog::init_from_schema`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
}

/// The catalog service.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<CatalogStore>,
    cache: Cache,
    settings: CatalogSettings,
    type_map: TypeMap,
    operators: OperatorMap,
    schema: Option<Arc<SchemaDescription>>,
    permissions: Option<Arc<dyn Permissions>>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("settings", &self.settings)
            .field("has_schema", &self.schema.is_some())
            .finish_non_exhaustive()
    }
}

impl Catalog {
    pub fn new(store: CatalogStore, cache: Cache, settings: CatalogSettings) -> Self {
        let type_map = TypeMap::with_overrides(&settings.simple_types);
        let operators = OperatorMap::with_overrides(&settings.operators);
        Self {
            store: Arc::new(store),
            cache,
            settings,
            type_map,
            operators,
            schema: None,
            permissions: None,
        }
    }

    /// Open the store named by the settings, or an in-memory one.
    pub fn open(settings: &CatalogSettings, cache: Cache) -> CatalogResult<Self> {
        let store = match &settings.path {
            Some(path) => CatalogStore::open(path)?,
            None => CatalogStore::open_in_memory()?,
        };
        Ok(Self::new(store, cache, settings.clone()))
    }

    /// Mark fields whose column is missing from `schema` as orphaned.
    pub fn with_schema(mut self, schema: Arc<SchemaDescription>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn Permissions>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    pub fn operators(&self) -> &OperatorMap {
        &self.operators
    }

    pub fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    // Fields

    pub fn field(&self, id: i64) -> CatalogResult<Field> {
        let key = CacheKey::instance(CACHE_APP, "field", id);
        let mut field = match self.cache.get::<Field>(&key)? {
            Some(field) => field,
            None => {
                let field = self
                    .store
                    .get_field(id)?
                    .ok_or_else(|| CatalogError::FieldNotFound(id.to_string()))?;
                if field.published {
                    self.cache.set(&key, &field)?;
                }
                field
            }
        };
        self.mark_orphan(&mut field);
        Ok(field)
    }

    /// Resolve any document form of a field reference.
    pub fn resolve_field(&self, reference: &FieldRef) -> CatalogResult<Field> {
        if let FieldRef::Id(id) = reference {
            return self.field(*id);
        }
        let parts = reference.parts();
        let (app, model, column) = match parts.as_slice() {
            [column] => (None, None, *column),
            [model, column] => (None, Some(*model), *column),
            [app, model, column] => (Some(*app), Some(*model), *column),
            _ => return Err(CatalogError::FieldNotFound(reference.to_string())),
        };
        let mut matches = self.store.find_fields(app, model, column)?;
        match matches.len() {
            0 => Err(CatalogError::FieldNotFound(reference.to_string())),
            1 => {
                let mut field = matches.remove(0);
                self.mark_orphan(&mut field);
                Ok(field)
            }
            n => Err(CatalogError::AmbiguousField {
                reference: reference.to_string(),
                matches: n,
            }),
        }
    }

    /// Persist a field and refresh the cache entries depending on it.
    pub fn save_field(&self, field: &mut Field) -> CatalogResult<()> {
        self.store.save_field(field)?;
        self.evict("field", field.id)?;
        if field.published {
            self.cache
                .set(&CacheKey::instance(CACHE_APP, "field", field.id), &*field)?;
        }
        for concept_id in self.store.concepts_with_field(field.id)? {
            self.evict("concept", concept_id)?;
        }
        debug!(field = %field.natural_key_string(), id = field.id, "saved field");
        Ok(())
    }

    pub fn delete_field(&self, id: i64) -> CatalogResult<bool> {
        for concept_id in self.store.concepts_with_field(id)? {
            self.evict("concept", concept_id)?;
        }
        self.evict("field", id)?;
        self.store.delete_field(id)
    }

    pub fn fields(&self) -> CatalogResult<Vec<Field>> {
        let mut fields = self.store.fields()?;
        for field in &mut fields {
            self.mark_orphan(field);
        }
        Ok(fields)
    }

    /// Fields visible to `user` on the configured site.
    pub fn published_fields(&self, user: Option<&str>) -> CatalogResult<Vec<Field>> {
        let mut out = Vec::new();
        for field in self.fields()? {
            if self.is_field_published(&field, user)? {
                out.push(field);
            }
        }
        Ok(out)
    }

    pub fn is_field_published(&self, field: &Field, user: Option<&str>) -> CatalogResult<bool> {
        if !field.is_available(self.site()) || !self.category_published(field.category_id)? {
            return Ok(false);
        }
        Ok(self.permitted(|p| p.can_view_field(user, field)))
    }

    // Concepts

    pub fn concept(&self, id: i64) -> CatalogResult<Concept> {
        let key = CacheKey::instance(CACHE_APP, "concept", id);
        let mut concept = match self.cache.get::<Concept>(&key)? {
            Some(concept) => concept,
            None => {
                let concept = self
                    .store
                    .get_concept(id)?
                    .ok_or_else(|| CatalogError::ConceptNotFound(id.to_string()))?;
                if concept.published {
                    self.cache.set(&key, &concept)?;
                }
                concept
            }
        };
        for cf in &mut concept.fields {
            self.mark_orphan(&mut cf.field);
        }
        Ok(concept)
    }

    /// The only concept named `name`.
    pub fn concept_named(&self, name: &str) -> CatalogResult<Concept> {
        match self.store.concept_ids_named(name)?.as_slice() {
            [id] => self.concept(*id),
            _ => Err(CatalogError::ConceptNotFound(name.to_string())),
        }
    }

    pub fn save_concept(&self, concept: &mut Concept) -> CatalogResult<()> {
        self.store.save_concept(concept)?;
        self.evict("concept", concept.id)?;
        if concept.published {
            self.cache.set(
                &CacheKey::instance(CACHE_APP, "concept", concept.id),
                &*concept,
            )?;
        }
        debug!(concept = %concept.name, id = concept.id, "saved concept");
        Ok(())
    }

    pub fn delete_concept(&self, id: i64) -> CatalogResult<bool> {
        self.evict("concept", id)?;
        self.store.delete_concept(id)
    }

    pub fn concepts(&self) -> CatalogResult<Vec<Concept>> {
        self.store
            .concept_ids()?
            .into_iter()
            .map(|id| self.concept(id))
            .collect()
    }

    /// Concepts visible to `user`: published, every field usable and the
    /// category published.
    pub fn published_concepts(&self, user: Option<&str>) -> CatalogResult<Vec<Concept>> {
        let mut out = Vec::new();
        for concept in self.concepts()? {
            if self.is_concept_published(&concept, user)? {
                out.push(concept);
            }
        }
        Ok(out)
    }

    pub fn is_concept_published(
        &self,
        concept: &Concept,
        user: Option<&str>,
    ) -> CatalogResult<bool> {
        if !concept.is_available(self.site()) || !self.category_published(concept.category_id)? {
            return Ok(false);
        }
        Ok(self.permitted(|p| p.can_view_concept(user, concept)))
    }

    // Categories

    pub fn save_category(&self, category: &mut Category) -> CatalogResult<()> {
        self.store.save_category(category)
    }

    pub fn category(&self, id: i64) -> CatalogResult<Option<Category>> {
        self.store.get_category(id)
    }

    /// A category and its parent must both be published.
    fn category_published(&self, id: Option<i64>) -> CatalogResult<bool> {
        let Some(id) = id else {
            return Ok(true);
        };
        let Some(category) = self.store.get_category(id)? else {
            return Ok(false);
        };
        if !category.published {
            return Ok(false);
        }
        match category.parent_id {
            Some(parent) => Ok(self
                .store
                .get_category(parent)?
                .is_some_and(|p| p.published)),
            None => Ok(true),
        }
    }

    // Documents

    pub fn save_context(&self, doc: &mut StoredDocument) -> CatalogResult<()> {
        self.store.save_context(doc)
    }

    /// A stored context visible to `user`.
    pub fn context(&self, id: i64, user: Option<&str>) -> CatalogResult<StoredDocument> {
        self.store
            .get_context(id)?
            .filter(|doc| doc.visible_to(user))
            .ok_or(CatalogError::ContextNotFound(id))
    }

    pub fn save_view(&self, doc: &mut StoredDocument) -> CatalogResult<()> {
        self.store.save_view(doc)
    }

    pub fn view(&self, id: i64, user: Option<&str>) -> CatalogResult<StoredDocument> {
        self.store
            .get_view(id)?
            .filter(|doc| doc.visible_to(user))
            .ok_or(CatalogError::ViewNotFound(id))
    }

    // Initialisation

    /// Register a field (and optionally a concept) for every column in
    /// `schema`, applying the type and enumerability heuristics.
    ///
    /// Distinct counts run through `engine` when one is given; without it a
    /// string field is only enumerable when it declares choices.
    pub fn init_from_schema(
        &self,
        schema: &SchemaDescription,
        engine: Option<&dyn Engine>,
        options: &InitOptions,
    ) -> CatalogResult<InitReport> {
        let mut report = InitReport::default();
        for table in &schema.tables {
            let model = table.model_name();
            for column in &table.columns {
                let is_key = table.is_key_column(&column.name);
                let natural_key = format!("{}.{}.{}", table.app, model, column.name);
                if is_key && !options.include_keys {
                    continue;
                }

                let existing = self
                    .store
                    .find_fields(Some(&table.app), Some(model), &column.name)?
                    .into_iter()
                    .next();
                if existing.is_some() && !options.force {
                    report.skipped.push(natural_key);
                    continue;
                }

                let simple = if is_key {
                    SimpleType::Key
                } else {
                    self.type_map.simple_type(&column.internal_type)
                };
                let mut field = existing.clone().unwrap_or_else(|| {
                    Field::new(
                        &table.app,
                        model,
                        &table.name,
                        &column.name,
                        column.internal_type.clone(),
                        simple,
                    )
                });
                field.simple_type = simple;
                field.internal_type = column.internal_type.clone();
                field.nullable = column.nullable;
                field.choices = column.choices.clone();
                if field.description.is_none() {
                    field.description = column.description.clone();
                }
                field.enumerable = self.is_enumerable(&field, engine)?;
                field.indexable = field.enumerable || simple == SimpleType::String;
                if existing.is_none() {
                    field.published = options.publish;
                }
                self.save_field(&mut field)?;

                if existing.is_some() {
                    report.updated.push(natural_key);
                    continue;
                }
                if options.concepts {
                    let mut concept = Concept::new(field.name.clone()).with_field(field.clone());
                    concept.description = field.description.clone();
                    concept.published = options.publish;
                    self.save_concept(&mut concept)?;
                }
                report.created.push(natural_key);
            }
        }
        info!(
            created = report.created.len(),
            updated = report.updated.len(),
            skipped = report.skipped.len(),
            "initialised catalog from schema"
        );
        Ok(report)
    }

    fn is_enumerable(&self, field: &Field, engine: Option<&dyn Engine>) -> CatalogResult<bool> {
        if field.choices.is_some() {
            return Ok(true);
        }
        if !matches!(field.simple_type, SimpleType::String | SimpleType::Boolean) {
            return Ok(false);
        }
        let Some(engine) = engine else {
            return Ok(field.simple_type == SimpleType::Boolean);
        };
        let count = self.distinct_count(field, engine)?;
        Ok(count <= self.settings.enumerable_maximum)
    }

    fn distinct_count(&self, field: &Field, engine: &dyn Engine) -> CatalogResult<u64> {
        let sql = Query::new()
            .select(vec![count_distinct(table_col(&field.table, &field.column))])
            .from(TableRef::new(&field.table))
            .to_sql(engine.dialect());
        let mut conn = engine.connect()?;
        let count = conn
            .query(&sql)?
            .next()
            .and_then(|row| row.into_iter().next())
            .and_then(|v| match v {
                Value::Int(n) => u64::try_from(n).ok(),
                _ => None,
            })
            .unwrap_or(0);
        Ok(count)
    }

    // Derived data

    /// Distinct values of the field in sort order. Declared choices win
    /// over the data.
    pub fn distinct_values(&self, field: &Field, engine: &dyn Engine) -> CatalogResult<Vec<Value>> {
        if let Some(choices) = &field.choices {
            return Ok(choices.clone());
        }
        self.derived(field, "values", || {
            let column = table_col(&field.table, &field.column);
            let sql = Query::new()
                .select(vec![column.clone()])
                .distinct()
                .from(TableRef::new(&field.table))
                .order_by(vec![OrderByExpr::asc(column)])
                .to_sql(engine.dialect());
            let mut conn = engine.connect()?;
            let values = conn
                .query(&sql)?
                .filter_map(|row| row.into_iter().next())
                .map(|v| normalize(field.simple_type, v))
                .collect();
            Ok(values)
        })
    }

    /// Distinct values paired with display labels.
    pub fn value_labels(
        &self,
        field: &Field,
        engine: &dyn Engine,
    ) -> CatalogResult<Vec<ValueLabel>> {
        let values = self.distinct_values(field, engine)?;
        Ok(values
            .into_iter()
            .map(|value| ValueLabel {
                label: label_for(&value),
                value,
            })
            .collect())
    }

    /// Non-null distinct values numbered from 1 in sort order.
    pub fn coded_values(
        &self,
        field: &Field,
        engine: &dyn Engine,
    ) -> CatalogResult<Vec<(Value, i64)>> {
        let values = self.distinct_values(field, engine)?;
        Ok(values
            .into_iter()
            .filter(|v| !v.is_null())
            .zip(1..)
            .collect())
    }

    fn derived<T, F>(&self, field: &Field, label: &str, compute: F) -> CatalogResult<T>
    where
        T: Serialize + serde::de::DeserializeOwned,
        F: FnOnce() -> CatalogResult<T>,
    {
        if !self.settings.data_cache_enabled || field.id == 0 {
            return compute();
        }
        let version = version_token(field)?;
        let key = CacheKey::derived(CACHE_APP, "field", field.id, Some(&version), label);
        self.cache.get_or_insert_with(&key, compute)
    }

    // Helpers

    fn site(&self) -> Option<&str> {
        self.settings.site.as_deref()
    }

    fn permitted(&self, check: impl FnOnce(&dyn Permissions) -> bool) -> bool {
        if !self.settings.permissions_enabled {
            return true;
        }
        match &self.permissions {
            Some(p) => check(p.as_ref()),
            None => {
                warn!("permissions enabled but no checker configured");
                false
            }
        }
    }

    fn mark_orphan(&self, field: &mut Field) {
        if let Some(schema) = &self.schema {
            field.orphaned = !schema
                .table(&field.table)
                .is_some_and(|t| t.has_column(&field.column));
        }
    }

    /// Drop a record and everything derived from it.
    fn evict(&self, model: &str, id: i64) -> CatalogResult<()> {
        self.cache.delete(&CacheKey::instance(CACHE_APP, model, id))?;
        self.cache
            .delete_prefix(&CacheKey::instance_prefix(CACHE_APP, model, id))?;
        Ok(())
    }
}

/// Engines without a boolean type hand booleans back as integers.
fn normalize(simple: SimpleType, value: Value) -> Value {
    if simple == SimpleType::Boolean {
        if let Some(b @ Value::Bool(_)) = coerce(SimpleType::Boolean, &value.to_json()) {
            return b;
        }
    }
    value
}

fn label_for(value: &Value) -> String {
    match value {
        Value::Null => NULL_LABEL.to_string(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        other => other.to_string(),
    }
}
