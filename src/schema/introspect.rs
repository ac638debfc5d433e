//! Build a [`SchemaDescription`] from a live SQLite database.
//!
//! Tables and columns come from `PRAGMA table_info`, relations from
//! `PRAGMA foreign_key_list`. A table made of nothing but two foreign keys
//! (plus an optional surrogate key) is treated as the association table of
//! a many-to-many relation rather than a table in its own right.

use inflector::Inflector;
use rusqlite::Connection;
use tracing::debug;

use super::{
    ColumnDef, InternalType, RelationDef, RelationKind, SchemaDescription, SchemaResult,
    TableDef, ThroughDef,
};

#[derive(Debug, Clone)]
struct RawColumn {
    name: String,
    declared: String,
    not_null: bool,
    pk: bool,
}

#[derive(Debug, Clone)]
struct RawForeignKey {
    from: String,
    table: String,
    to: Option<String>,
}

#[derive(Debug, Clone)]
struct RawTable {
    name: String,
    columns: Vec<RawColumn>,
    foreign_keys: Vec<RawForeignKey>,
}

impl RawTable {
    fn primary_key(&self) -> Option<&str> {
        let mut pks = self.columns.iter().filter(|c| c.pk);
        match (pks.next(), pks.next()) {
            (Some(c), None) => Some(&c.name),
            _ => None,
        }
    }

    /// Two single-column foreign keys and nothing else but a surrogate key.
    fn is_association(&self) -> bool {
        if self.foreign_keys.len() != 2 {
            return false;
        }
        let pk = self.primary_key();
        self.columns.iter().all(|c| {
            Some(c.name.as_str()) == pk || self.foreign_keys.iter().any(|fk| fk.from == c.name)
        })
    }
}

/// Introspect every user table of `conn` under application label `app`.
pub fn introspect_sqlite(conn: &Connection, app: &str) -> SchemaResult<SchemaDescription> {
    let raw = read_tables(conn)?;

    let mut tables = Vec::new();
    for table in raw.iter().filter(|t| !t.is_association()) {
        let primary_key = table.primary_key().unwrap_or("rowid").to_string();

        let columns = table
            .columns
            .iter()
            .filter(|c| c.name != primary_key)
            .map(|c| ColumnDef {
                name: c.name.clone(),
                internal_type: InternalType::from_declared(&c.declared),
                nullable: !c.not_null,
                choices: None,
                description: None,
            })
            .collect();

        let relations = table
            .foreign_keys
            .iter()
            .map(|fk| {
                let kind = if fk.from == primary_key {
                    RelationKind::OneToOne
                } else {
                    RelationKind::ForeignKey
                };
                RelationDef {
                    name: relation_name(&fk.from, &fk.table),
                    kind,
                    target: fk.table.clone(),
                    column: Some(fk.from.clone()),
                    target_column: fk.to.clone(),
                    through: None,
                    reverse_name: None,
                }
            })
            .collect();

        tables.push(TableDef {
            name: table.name.clone(),
            app: app.to_string(),
            model: None,
            primary_key,
            columns,
            relations,
        });
    }

    for assoc in raw.iter().filter(|t| t.is_association()) {
        let (first, second) = (&assoc.foreign_keys[0], &assoc.foreign_keys[1]);
        let Some(owner) = tables.iter_mut().find(|t| t.name == first.table) else {
            continue;
        };
        debug!(
            table = %assoc.name,
            source = %first.table,
            target = %second.table,
            "association table"
        );
        owner.relations.push(RelationDef {
            name: second.table.to_plural(),
            kind: RelationKind::ManyToMany,
            target: second.table.clone(),
            column: first.to.clone(),
            target_column: second.to.clone(),
            through: Some(ThroughDef {
                table: assoc.name.clone(),
                source_column: first.from.clone(),
                target_column: second.from.clone(),
            }),
            reverse_name: Some(first.table.to_plural()),
        });
    }

    debug!(tables = tables.len(), "introspected sqlite schema");
    let description = SchemaDescription { tables };
    description.validate()?;
    Ok(description)
}

/// `title_id` -> `title`; a column without the suffix is named after its
/// target table.
fn relation_name(column: &str, target: &str) -> String {
    match column.strip_suffix("_id") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => target.to_string(),
    }
}

fn read_tables(conn: &Connection) -> SchemaResult<Vec<RawTable>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let columns = conn
            .prepare(&format!("PRAGMA table_info(\"{}\")", name.replace('"', "\"\"")))?
            .query_map([], |row| {
                Ok(RawColumn {
                    name: row.get(1)?,
                    declared: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    not_null: row.get::<_, i64>(3)? != 0,
                    pk: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut foreign_keys = conn
            .prepare(&format!(
                "PRAGMA foreign_key_list(\"{}\")",
                name.replace('"', "\"\"")
            ))?
            .query_map([], |row| {
                Ok(RawForeignKey {
                    table: row.get(2)?,
                    from: row.get(3)?,
                    to: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        // Follow column order so the association owner is stable.
        foreign_keys.sort_by_key(|fk| {
            columns
                .iter()
                .position(|c| c.name == fk.from)
                .unwrap_or(usize::MAX)
        });

        tables.push(RawTable {
            name,
            columns,
            foreign_keys,
        });
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE title (id INTEGER PRIMARY KEY, name VARCHAR(50) NOT NULL, salary REAL);
            CREATE TABLE employee (
                id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                title_id INTEGER REFERENCES title(id)
            );
            CREATE TABLE project (id INTEGER PRIMARY KEY, name TEXT);
            CREATE TABLE employee_projects (
                id INTEGER PRIMARY KEY,
                employee_id INTEGER REFERENCES employee(id),
                project_id INTEGER REFERENCES project(id)
            );
            ",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_introspect_tables_and_columns() {
        let schema = introspect_sqlite(&fixture(), "hr").unwrap();
        let names: Vec<_> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["employee", "project", "title"]);

        let title = schema.table("title").unwrap();
        assert_eq!(title.primary_key, "id");
        assert_eq!(title.app, "hr");
        let name = title.column("name").unwrap();
        assert_eq!(name.internal_type, InternalType::Varchar(50));
        assert!(!name.nullable);
        assert!(title.column("salary").unwrap().nullable);
    }

    #[test]
    fn test_introspect_relations() {
        let schema = introspect_sqlite(&fixture(), "hr").unwrap();
        let employee = schema.table("employee").unwrap();

        let fk = employee.relations.iter().find(|r| r.name == "title").unwrap();
        assert_eq!(fk.kind, RelationKind::ForeignKey);
        assert_eq!(fk.column.as_deref(), Some("title_id"));

        let m2m = employee.relations.iter().find(|r| r.name == "projects").unwrap();
        assert_eq!(m2m.kind, RelationKind::ManyToMany);
        let through = m2m.through.as_ref().unwrap();
        assert_eq!(through.table, "employee_projects");
        assert_eq!(through.source_column, "employee_id");
        assert_eq!(through.target_column, "project_id");
        assert_eq!(m2m.reverse_name.as_deref(), Some("employees"));
    }

    #[test]
    fn test_relation_name() {
        assert_eq!(relation_name("title_id", "title"), "title");
        assert_eq!(relation_name("boss", "employee"), "employee");
        assert_eq!(relation_name("_id", "office"), "office");
    }
}
