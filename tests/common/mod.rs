//! Shared fixture: a small HR database with a published catalog over it.

#![allow(dead_code)]

use std::sync::Arc;

use avocado::cache::Cache;
use avocado::catalog::{Catalog, CatalogStore, Concept, Field, InitOptions};
use avocado::config::CatalogSettings;
use avocado::engine::{Engine, SqliteEngine};
use avocado::graph::{JoinTree, SchemaGraph};
use avocado::query::{ContextParser, Executor, ParsedContext, ParsedView, QueryProcessor, ViewParser};
use avocado::schema::SchemaDescription;
use avocado::translate::TranslatorRegistry;
use avocado::value::{Row, Value};
use serde_json::Value as Json;
use tempfile::TempDir;

pub const SCHEMA: &str = r#"
[[tables]]
name = "employee"
app = "hr"
columns = [
    { name = "first_name", type = "text", nullable = false },
    { name = "last_name", type = "text" },
    { name = "is_manager", type = "boolean", nullable = false },
    { name = "title_id", type = "integer" },
    { name = "office_id", type = "integer" },
]
relations = [
    { name = "title", kind = "foreign_key", target = "title" },
    { name = "office", kind = "foreign_key", target = "office" },
    { name = "projects", kind = "many_to_many", target = "project", reverse_name = "employees", through = { table = "employee_projects", source_column = "employee_id", target_column = "project_id" } },
]

[[tables]]
name = "title"
app = "hr"
columns = [
    { name = "name", type = "text" },
    { name = "salary", type = "real" },
]

[[tables]]
name = "office"
app = "hr"
columns = [{ name = "location", type = "text" }]

[[tables]]
name = "project"
app = "hr"
columns = [
    { name = "name", type = "text" },
    { name = "manager_id", type = "integer" },
]
relations = [
    { name = "manager", kind = "foreign_key", target = "employee" },
]
"#;

pub const DATA: &str = "
CREATE TABLE title (id INTEGER PRIMARY KEY, name TEXT, salary REAL);
CREATE TABLE office (id INTEGER PRIMARY KEY, location TEXT);
CREATE TABLE employee (
    id INTEGER PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT,
    is_manager BOOLEAN NOT NULL DEFAULT 0,
    title_id INTEGER REFERENCES title (id),
    office_id INTEGER REFERENCES office (id)
);
CREATE TABLE project (
    id INTEGER PRIMARY KEY,
    name TEXT,
    manager_id INTEGER REFERENCES employee (id)
);
CREATE TABLE employee_projects (
    employee_id INTEGER REFERENCES employee (id),
    project_id INTEGER REFERENCES project (id)
);

INSERT INTO title VALUES
    (1, 'CEO', 250000), (2, 'CTO', 200000), (3, 'Programmer', 80000),
    (4, 'Analyst', NULL), (5, NULL, 60000);
INSERT INTO office VALUES (1, 'Boston'), (2, 'Denver');
INSERT INTO employee VALUES
    (1, 'Eric', 'Smith', 1, 1, 1),
    (2, 'Erin', 'Jones', 1, 2, 1),
    (3, 'Zac', 'Brown', 0, 3, 2),
    (4, 'Mel', 'Lee', 0, 3, 2),
    (5, 'Ann', 'Kay', 0, 4, NULL),
    (6, 'Bob', 'Ray', 0, NULL, 1),
    (7, 'Kim', 'Cho', 0, 5, 2);
INSERT INTO project VALUES (1, 'Alpha', 1), (2, 'Beta', 2);
INSERT INTO employee_projects VALUES (1, 1), (3, 1), (4, 1), (3, 2);
";

/// Published single-purpose concepts, by unique name.
const CONCEPTS: &[(&str, &[&str])] = &[
    ("Name", &["hr.employee.first_name", "hr.employee.last_name"]),
    ("First Name", &["hr.employee.first_name"]),
    ("Manager", &["hr.employee.is_manager"]),
    ("Title", &["hr.title.name"]),
    ("Salary", &["hr.title.salary"]),
    ("Office", &["hr.office.location"]),
    ("Project", &["hr.project.name"]),
];

pub struct Hr {
    pub dir: TempDir,
    pub engine: Arc<dyn Engine>,
    pub schema: Arc<SchemaDescription>,
    pub catalog: Catalog,
    pub translators: TranslatorRegistry,
    pub tree: Arc<JoinTree>,
}

impl Hr {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let engine: Arc<dyn Engine> = Arc::new(SqliteEngine::new(dir.path().join("hr.db")));
        engine.connect().unwrap().execute(DATA).unwrap();

        let schema = Arc::new(SchemaDescription::from_toml(SCHEMA).unwrap());
        let catalog = Catalog::new(
            CatalogStore::open_in_memory().unwrap(),
            Cache::memory(),
            CatalogSettings::default(),
        )
        .with_schema(schema.clone());
        let options = InitOptions {
            publish: true,
            ..Default::default()
        };
        catalog
            .init_from_schema(&schema, Some(engine.as_ref()), &options)
            .unwrap();

        for (name, keys) in CONCEPTS {
            let mut concept = Concept::new(*name);
            for key in keys.iter() {
                concept = concept.with_field(catalog.resolve_field(&(*key).into()).unwrap());
            }
            concept.published = true;
            catalog.save_concept(&mut concept).unwrap();
        }

        let tree = SchemaGraph::from_description(&schema)
            .unwrap()
            .tree("employee", &[], &[])
            .unwrap();

        Self {
            dir,
            engine,
            schema,
            catalog,
            translators: TranslatorRegistry::new(),
            tree: Arc::new(tree),
        }
    }

    pub fn field(&self, key: &str) -> Field {
        self.catalog.resolve_field(&key.into()).unwrap()
    }

    pub fn concept(&self, name: &str) -> Concept {
        self.catalog.concept_named(name).unwrap()
    }

    pub fn context(&self, document: Json) -> ParsedContext {
        ContextParser::new(&self.catalog, &self.translators, &self.tree)
            .parse(&document, None)
            .unwrap()
    }

    pub fn view(&self, document: Json) -> ParsedView {
        ViewParser::new(&self.catalog).parse(&document, None).unwrap()
    }

    pub fn executor(&self) -> Executor {
        Executor::new(self.engine.clone())
    }

    pub fn processor(&self) -> QueryProcessor {
        QueryProcessor::new(self.tree.clone())
    }
}

/// First column of each row as an id, sorted.
pub fn ids(rows: Vec<Row>) -> Vec<i64> {
    let mut ids: Vec<i64> = rows
        .into_iter()
        .map(|row| match row.first() {
            Some(Value::Int(id)) => *id,
            other => panic!("expected an integer id, got {:?}", other),
        })
        .collect();
    ids.sort_unstable();
    ids
}

/// Rows of `processor` executed unsliced on an unnamed connection.
pub fn fetch(hr: &Hr, processor: &QueryProcessor) -> Vec<Row> {
    processor
        .get_iterable(&hr.executor(), None, None, None)
        .unwrap()
        .fetch_all()
}
