//! Join trees over an introspected database.

#[path = "../common/mod.rs"]
mod common;

use avocado::graph::{JoinKind, SchemaGraph};
use avocado::schema::introspect::introspect_sqlite;
use avocado::sql::{table_col, Dialect};
use rusqlite::Connection;

use common::Hr;

fn introspected(hr: &Hr) -> SchemaGraph {
    let conn = Connection::open(hr.dir.path().join("hr.db")).unwrap();
    let description = introspect_sqlite(&conn, "hr").unwrap();
    SchemaGraph::from_description(&description).unwrap()
}

#[test]
fn test_introspected_graph_matches_declared_paths() {
    let hr = Hr::new();
    let tree = introspected(&hr).tree("employee", &[], &[]).unwrap();

    assert_eq!(
        tree.query_string_for_field(&("office", "location"), None).unwrap(),
        "office.location"
    );
    assert_eq!(
        tree.query_string_for_field(&("title", "salary"), Some("range")).unwrap(),
        "title.salary.range"
    );
    // the association table wins the tie with project.manager_id
    let path = tree.path_to("project").unwrap();
    assert_eq!(path.len(), 1);
    assert_eq!(path[0].kind, JoinKind::ManyToMany);
    assert_eq!(
        tree.query_string_for_field(&("project", "name"), None).unwrap(),
        hr.tree.query_string_for_field(&("project", "name"), None).unwrap()
    );
}

#[test]
fn test_association_table_is_not_a_node() {
    let hr = Hr::new();
    let graph = introspected(&hr);
    assert!(!graph.has_table("employee_projects"));
    assert_eq!(graph.table_count(), 4);
}

#[test]
fn test_rooted_elsewhere() {
    let hr = Hr::new();
    let tree = introspected(&hr).tree("office", &[], &[]).unwrap();
    let names: Vec<_> = tree
        .path_to("project")
        .unwrap()
        .iter()
        .map(|r| r.related_name.as_str())
        .collect();
    assert_eq!(names.len(), 2);
    assert_eq!(names[0], "employee");
}

#[test]
fn test_left_joins_keep_unmatched_rows() {
    let hr = Hr::new();
    let base = hr
        .tree
        .base_query()
        .add_select(table_col("employee", "id"))
        .add_select(table_col("project", "name"));
    let query = hr.tree.add_joins("project", &base).unwrap();
    let sql = query.to_sql(Dialect::Sqlite);
    assert!(sql.contains("LEFT OUTER JOIN \"employee_projects\""));

    let rows = hr.executor().query(&sql, None).unwrap().fetch_all();
    // four memberships plus four employees on no project
    assert_eq!(rows.len(), 8);
}

#[test]
fn test_excluded_table_is_unreachable() {
    let hr = Hr::new();
    let tree = introspected(&hr)
        .tree("employee", &["office".to_string()], &[])
        .unwrap();
    assert!(tree.path_to("office").is_err());
    assert!(tree.path_to("title").is_ok());
}
