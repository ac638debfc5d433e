//! Tests for the schema graph and join tree.

use super::*;
use crate::schema::SchemaDescription;
use crate::sql::{table_col, Dialect};

const SCHEMA: &str = r#"
[[tables]]
name = "employee"
app = "hr"
columns = [
    { name = "first_name", type = "text", nullable = false },
    { name = "is_manager", type = "boolean" },
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

fn graph() -> SchemaGraph {
    let description = SchemaDescription::from_toml(SCHEMA).unwrap();
    SchemaGraph::from_description(&description).unwrap()
}

#[test]
fn test_from_description() {
    let graph = graph();
    assert_eq!(graph.table_count(), 4);
    // 4 relations, each walkable both ways
    assert_eq!(graph.edge_count(), 8);
    assert_eq!(graph.table("title").unwrap().primary_key, "id");
}

#[test]
fn test_reverse_edges() {
    let graph = graph();
    let reverse = graph
        .relations("title")
        .into_iter()
        .find(|r| r.target == "employee")
        .unwrap()
        .clone();
    assert_eq!(reverse.direction, Direction::Reverse);
    assert_eq!(reverse.kind, JoinKind::OneToMany);
    assert_eq!(reverse.related_name, "employee");
    assert_eq!(reverse.source_column, "id");
    assert_eq!(reverse.target_column, "title_id");
}

#[test]
fn test_path_to_root_is_empty() {
    let tree = graph().tree("employee", &[], &[]).unwrap();
    assert!(tree.path_to("employee").unwrap().is_empty());
    assert_eq!(tree.root_pk(), "id");
}

#[test]
fn test_path_to_direct_relation() {
    let tree = graph().tree("employee", &[], &[]).unwrap();
    let path = tree.path_to("title").unwrap();
    assert_eq!(path.len(), 1);
    assert_eq!(path[0].related_name, "title");
    assert_eq!(path[0].kind, JoinKind::ManyToOne);
}

#[test]
fn test_equal_depth_tie_break_is_sorted() {
    // employee reaches project through the association table and through
    // project.manager_id; "employee_projects" sorts before "manager_id".
    let tree = graph().tree("employee", &[], &[]).unwrap();
    let path = tree.path_to("project").unwrap();
    assert_eq!(path.len(), 1);
    assert_eq!(path[0].related_name, "projects");
    assert_eq!(path[0].kind, JoinKind::ManyToMany);
    assert_eq!(path[0].segments().len(), 2);
}

#[test]
fn test_route_selects_join_column() {
    let routes = vec![Route::new("employee", "project").with_join_column("manager_id")];
    let tree = graph().tree("employee", &[], &routes).unwrap();
    let path = tree.path_to("project").unwrap();
    assert_eq!(path[0].related_name, "project");
    assert_eq!(path[0].kind, JoinKind::OneToMany);
}

#[test]
fn test_symmetrical_route() {
    let routes = vec![Route::new("employee", "project")
        .with_join_column("manager_id")
        .symmetrical()];
    let tree = graph().tree("project", &[], &routes).unwrap();
    let path = tree.path_to("employee").unwrap();
    assert_eq!(path[0].related_name, "manager");
}

#[test]
fn test_route_restricts_source() {
    // title may only be reached from project, which has no edge to it.
    let routes = vec![Route::new("project", "title")];
    let tree = graph().tree("employee", &[], &routes).unwrap();
    assert!(matches!(
        tree.path_to("title"),
        Err(GraphError::UnreachableTable { .. })
    ));
}

#[test]
fn test_excluded_table_unreachable() {
    let tree = graph().tree("employee", &["title".to_string()], &[]).unwrap();
    let err = tree.path_to("title").unwrap_err();
    assert_eq!(
        err,
        GraphError::UnreachableTable {
            root: "employee".into(),
            target: "title".into()
        }
    );
}

#[test]
fn test_unknown_root() {
    let err = graph().tree("payroll", &[], &[]).unwrap_err();
    assert_eq!(err, GraphError::UnknownTable("payroll".into()));
}

#[test]
fn test_multi_hop_path() {
    let tree = graph().tree("office", &[], &[]).unwrap();
    let names: Vec<_> = tree
        .path_to("title")
        .unwrap()
        .iter()
        .map(|r| r.related_name.as_str())
        .collect();
    assert_eq!(names, vec!["employee", "title"]);
    assert_eq!(tree.tables()[0], "office");
}

#[test]
fn test_query_string_for_field() {
    let tree = graph().tree("office", &[], &[]).unwrap();
    assert_eq!(
        tree.query_string_for_field(&("title", "salary"), Some("range"))
            .unwrap(),
        "employee.title.salary.range"
    );
    assert_eq!(
        tree.query_string_for_field(&("office", "location"), None)
            .unwrap(),
        "location"
    );
}

#[test]
fn test_resolve_related_names() {
    let tree = graph().tree("office", &[], &[]).unwrap();
    assert_eq!(tree.resolve_related_names(&["employee", "title"]).unwrap(), "title");
    assert_eq!(tree.resolve_related_names(&[]).unwrap(), "office");
    assert!(matches!(
        tree.resolve_related_names(&["title"]),
        Err(GraphError::UnknownLookup { .. })
    ));
}

#[test]
fn test_add_joins_many_to_many() {
    let tree = graph().tree("employee", &[], &[]).unwrap();
    let base = tree.base_query().add_select(table_col("employee", "id"));
    let query = tree.add_joins("project", &base).unwrap();
    assert_eq!(query.joins.len(), 2);
    insta::assert_snapshot!(query.to_sql(Dialect::Sqlite), @r#"
    SELECT
      "employee"."id"
    FROM "employee"
    LEFT OUTER JOIN "employee_projects" ON "employee"."id" = "employee_projects"."employee_id"
    LEFT OUTER JOIN "project" ON "employee_projects"."project_id" = "project"."id"
    "#);
}

#[test]
fn test_add_joins_is_idempotent() {
    let tree = graph().tree("office", &[], &[]).unwrap();
    let once = tree.add_joins("title", &tree.base_query()).unwrap();
    let twice = tree.add_joins("employee", &once).unwrap();
    assert_eq!(once, twice);
}
