//! SQLite catalog store.
//!
//! Records are kept as JSON documents next to the columns they are looked
//! up by. Concept membership lives in `concept_fields` so a field edit is
//! seen by every concept holding it.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::models::{Category, Concept, ConceptField, Field};
use super::{CatalogError, CatalogResult};

/// Current store schema version. Bump this when the table layout changes.
const STORE_VERSION: i32 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fields (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app TEXT NOT NULL,
    model TEXT NOT NULL,
    column_name TEXT NOT NULL,
    data TEXT NOT NULL,
    UNIQUE (app, model, column_name)
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS concepts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS concept_fields (
    concept_id INTEGER NOT NULL REFERENCES concepts (id) ON DELETE CASCADE,
    field_id INTEGER NOT NULL REFERENCES fields (id) ON DELETE CASCADE,
    ord REAL NOT NULL,
    alternate_name TEXT
);

CREATE TABLE IF NOT EXISTS contexts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user TEXT,
    name TEXT,
    json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS views (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user TEXT,
    name TEXT,
    json TEXT NOT NULL
);
";

/// A stored context or view document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    #[serde(default)]
    pub id: i64,
    /// Owner; `None` for shared documents.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub json: serde_json::Value,
}

impl StoredDocument {
    pub fn new(json: serde_json::Value) -> Self {
        Self {
            id: 0,
            user: None,
            name: None,
            json,
        }
    }

    pub fn for_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Shared documents are visible to everyone.
    pub fn visible_to(&self, user: Option<&str>) -> bool {
        match (&self.user, user) {
            (None, _) => true,
            (Some(owner), Some(user)) => owner == user,
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DocumentTable {
    Contexts,
    Views,
}

impl DocumentTable {
    fn name(self) -> &'static str {
        match self {
            DocumentTable::Contexts => "contexts",
            DocumentTable::Views => "views",
        }
    }
}

pub struct CatalogStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStore").finish_non_exhaustive()
    }
}

impl CatalogStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> CatalogResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> CatalogResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;

        let stored: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                row.get(0)
            })
            .optional()?;
        match stored {
            Some(v) if v != STORE_VERSION.to_string() => {
                return Err(CatalogError::StoreVersion {
                    found: v,
                    expected: STORE_VERSION,
                });
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('version', ?)",
                    params![STORE_VERSION.to_string()],
                )?;
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // Fields

    /// Insert or update a field, keyed by id or else by natural key.
    /// Assigns the id on insert.
    pub fn save_field(&self, field: &mut Field) -> CatalogResult<()> {
        let conn = self.conn.lock();
        if field.id == 0 {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM fields WHERE app = ? AND model = ? AND column_name = ?",
                    params![field.app, field.model, field.column],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                field.id = id;
            }
        }

        if field.id == 0 {
            conn.execute(
                "INSERT INTO fields (app, model, column_name, data) VALUES (?, ?, ?, '{}')",
                params![field.app, field.model, field.column],
            )?;
            field.id = conn.last_insert_rowid();
        }
        let data = serde_json::to_string(&*field)?;
        conn.execute(
            "UPDATE fields SET app = ?, model = ?, column_name = ?, data = ? WHERE id = ?",
            params![field.app, field.model, field.column, data, field.id],
        )?;
        Ok(())
    }

    pub fn get_field(&self, id: i64) -> CatalogResult<Option<Field>> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row("SELECT data FROM fields WHERE id = ?", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        data.map(|d| decode_field(id, &d)).transpose()
    }

    /// Fields matching every given part of the natural key.
    pub fn find_fields(
        &self,
        app: Option<&str>,
        model: Option<&str>,
        column: &str,
    ) -> CatalogResult<Vec<Field>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, data FROM fields
             WHERE column_name = ?1
               AND (?2 IS NULL OR app = ?2)
               AND (?3 IS NULL OR model = ?3)
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![column, app, model], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut fields = Vec::new();
        for row in rows {
            let (id, data) = row?;
            fields.push(decode_field(id, &data)?);
        }
        Ok(fields)
    }

    pub fn fields(&self) -> CatalogResult<Vec<Field>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, data FROM fields ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut fields = Vec::new();
        for row in rows {
            let (id, data) = row?;
            fields.push(decode_field(id, &data)?);
        }
        Ok(fields)
    }

    /// Ids of concepts containing the field.
    pub fn concepts_with_field(&self, field_id: i64) -> CatalogResult<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT DISTINCT concept_id FROM concept_fields WHERE field_id = ? ORDER BY 1")?;
        let ids = stmt
            .query_map(params![field_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn delete_field(&self, id: i64) -> CatalogResult<bool> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM fields WHERE id = ?", params![id])? > 0)
    }

    // Categories

    pub fn save_category(&self, category: &mut Category) -> CatalogResult<()> {
        let conn = self.conn.lock();
        if category.id == 0 {
            conn.execute("INSERT INTO categories (data) VALUES ('{}')", [])?;
            category.id = conn.last_insert_rowid();
        }
        let data = serde_json::to_string(&*category)?;
        conn.execute(
            "UPDATE categories SET data = ? WHERE id = ?",
            params![data, category.id],
        )?;
        Ok(())
    }

    pub fn get_category(&self, id: i64) -> CatalogResult<Option<Category>> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM categories WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| {
            let mut category: Category = serde_json::from_str(&d)?;
            category.id = id;
            Ok(category)
        })
        .transpose()
    }

    // Concepts

    /// Insert or update a concept and replace its field memberships.
    /// Every contained field must already be saved.
    pub fn save_concept(&self, concept: &mut Concept) -> CatalogResult<()> {
        if let Some(unsaved) = concept.fields.iter().find(|cf| cf.field.id == 0) {
            return Err(CatalogError::UnsavedField(unsaved.field.natural_key_string()));
        }
        concept.sort_fields();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        if concept.id == 0 {
            tx.execute(
                "INSERT INTO concepts (name, data) VALUES (?, '{}')",
                params![concept.name],
            )?;
            concept.id = tx.last_insert_rowid();
        }
        let mut header = concept.clone();
        header.fields.clear();
        tx.execute(
            "UPDATE concepts SET name = ?, data = ? WHERE id = ?",
            params![concept.name, serde_json::to_string(&header)?, concept.id],
        )?;
        tx.execute(
            "DELETE FROM concept_fields WHERE concept_id = ?",
            params![concept.id],
        )?;
        for cf in &concept.fields {
            tx.execute(
                "INSERT INTO concept_fields (concept_id, field_id, ord, alternate_name)
                 VALUES (?, ?, ?, ?)",
                params![concept.id, cf.field.id, cf.order, cf.alternate_name],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_concept(&self, id: i64) -> CatalogResult<Option<Concept>> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row("SELECT data FROM concepts WHERE id = ?", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(data) = data else {
            return Ok(None);
        };
        let mut concept: Concept = serde_json::from_str(&data)?;
        concept.id = id;

        let mut stmt = conn.prepare(
            "SELECT f.id, f.data, cf.ord, cf.alternate_name
             FROM concept_fields cf JOIN fields f ON f.id = cf.field_id
             WHERE cf.concept_id = ?
             ORDER BY cf.ord, f.id",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        for row in rows {
            let (field_id, field_data, order, alternate_name) = row?;
            concept.fields.push(ConceptField {
                field: decode_field(field_id, &field_data)?,
                order,
                alternate_name,
            });
        }
        Ok(Some(concept))
    }

    pub fn concept_ids(&self) -> CatalogResult<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM concepts ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Concepts named exactly `name`.
    pub fn concept_ids_named(&self, name: &str) -> CatalogResult<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM concepts WHERE name = ? ORDER BY id")?;
        let ids = stmt
            .query_map(params![name], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn delete_concept(&self, id: i64) -> CatalogResult<bool> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM concepts WHERE id = ?", params![id])? > 0)
    }

    // Contexts and views

    pub fn save_context(&self, doc: &mut StoredDocument) -> CatalogResult<()> {
        self.save_document(DocumentTable::Contexts, doc)
    }

    pub fn get_context(&self, id: i64) -> CatalogResult<Option<StoredDocument>> {
        self.get_document(DocumentTable::Contexts, id)
    }

    pub fn save_view(&self, doc: &mut StoredDocument) -> CatalogResult<()> {
        self.save_document(DocumentTable::Views, doc)
    }

    pub fn get_view(&self, id: i64) -> CatalogResult<Option<StoredDocument>> {
        self.get_document(DocumentTable::Views, id)
    }

    fn save_document(&self, table: DocumentTable, doc: &mut StoredDocument) -> CatalogResult<()> {
        let conn = self.conn.lock();
        let json = serde_json::to_string(&doc.json)?;
        if doc.id == 0 {
            conn.execute(
                &format!(
                    "INSERT INTO {} (user, name, json) VALUES (?, ?, ?)",
                    table.name()
                ),
                params![doc.user, doc.name, json],
            )?;
            doc.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {} (id, user, name, json) VALUES (?, ?, ?, ?)",
                    table.name()
                ),
                params![doc.id, doc.user, doc.name, json],
            )?;
        }
        Ok(())
    }

    fn get_document(&self, table: DocumentTable, id: i64) -> CatalogResult<Option<StoredDocument>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT user, name, json FROM {} WHERE id = ?", table.name()),
                params![id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(user, name, json)| {
            Ok(StoredDocument {
                id,
                user,
                name,
                json: serde_json::from_str(&json)?,
            })
        })
        .transpose()
    }
}

fn decode_field(id: i64, data: &str) -> CatalogResult<Field> {
    let mut field: Field = serde_json::from_str(data)?;
    field.id = id;
    Ok(field)
}
