//! Lookup-path query builder.
//!
//! A [`QuerySet`] collects conditions, annotations, extras, projections and
//! ordering as dotted lookup paths rooted at the join tree's root, and
//! compiles them into one [`Query`]. Every path contributes the joins on
//! its way from the root, once, as LEFT OUTER joins.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::graph::{GraphError, GraphResult, JoinTree};
use crate::sql::{table_col, Dialect, Expr, OrderByExpr, Query, TableRef};
use crate::translate::{Annotation, Condition, Extra};

/// One ORDER BY term over a lookup path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub path: String,
    pub descending: bool,
}

impl OrderTerm {
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            descending: false,
        }
    }

    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuerySet {
    tree: Arc<JoinTree>,
    condition: Option<Condition>,
    annotations: BTreeMap<String, Annotation>,
    extra: Extra,
    select: Vec<String>,
    order: Vec<OrderTerm>,
    distinct: bool,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl QuerySet {
    /// Every row of the root table.
    pub fn new(tree: Arc<JoinTree>) -> Self {
        Self {
            tree,
            condition: None,
            annotations: BTreeMap::new(),
            extra: Extra::default(),
            select: Vec::new(),
            order: Vec::new(),
            distinct: false,
            offset: None,
            limit: None,
        }
    }

    pub fn tree(&self) -> &JoinTree {
        &self.tree
    }

    /// AND a condition onto the existing one.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn annotate(mut self, annotations: &BTreeMap<String, Annotation>) -> Self {
        self.annotations
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn extra(mut self, extra: &Extra) -> Self {
        self.extra.merge(extra);
        self
    }

    /// Replace the projection.
    pub fn select(mut self, paths: Vec<String>) -> Self {
        self.select = paths;
        self
    }

    pub fn add_select(mut self, path: impl Into<String>) -> Self {
        self.select.push(path.into());
        self
    }

    /// Append ORDER BY terms after the existing ones.
    pub fn order_by(mut self, terms: Vec<OrderTerm>) -> Self {
        self.order.extend(terms);
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn slice(mut self, offset: Option<u64>, limit: Option<u64>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Projected lookup paths, in order.
    pub fn selected(&self) -> &[String] {
        &self.select
    }

    pub fn ordering(&self) -> &[OrderTerm] {
        &self.order
    }

    /// Compile to a query over the root table.
    pub fn compile(&self) -> GraphResult<Query> {
        let mut compiler = Compiler {
            qs: self,
            query: self.tree.base_query(),
        };

        let root_pk = table_col(self.tree.root(), self.tree.root_pk());

        let select = if self.select.is_empty() {
            vec![root_pk.clone()]
        } else {
            self.select
                .iter()
                .map(|p| compiler.column(p))
                .collect::<GraphResult<Vec<_>>>()?
        };

        if let Some(condition) = &self.condition {
            let references_annotation = condition
                .paths()
                .iter()
                .any(|p| self.annotations.contains_key(*p));
            let expr = condition.to_expr(&mut |path| compiler.resolve(path))?;
            compiler.query = if references_annotation {
                compiler.query.having(expr)
            } else {
                compiler.query.filter(expr)
            };
        }

        for table in &self.extra.tables {
            compiler.query = compiler.query.add_table(TableRef::new(table));
        }
        for fragment in &self.extra.where_ {
            compiler.query = compiler.query.filter(fragment.to_expr());
        }

        let order = self
            .order
            .iter()
            .map(|term| {
                let expr = compiler.resolve(&term.path)?;
                Ok(if term.descending {
                    OrderByExpr::desc(expr)
                } else {
                    OrderByExpr::asc(expr)
                })
            })
            .collect::<GraphResult<Vec<_>>>()?;

        let mut query = compiler.query;
        if !self.annotations.is_empty() {
            let mut group = select.clone();
            if !group.contains(&root_pk) {
                group.push(root_pk);
            }
            query = query.group_by(group);
        }
        query = query.select(select);
        if !order.is_empty() {
            query = query.order_by(order);
        }
        if self.distinct {
            query = query.distinct();
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        Ok(query)
    }

    pub fn to_sql(&self, dialect: Dialect) -> GraphResult<String> {
        let sql = self.compile()?.to_sql(dialect);
        debug!(root = self.tree.root(), %sql, "compiled queryset");
        Ok(sql)
    }
}

struct Compiler<'a> {
    qs: &'a QuerySet,
    query: Query,
}

impl Compiler<'_> {
    /// Any lookup path: annotation name, extra select name or column.
    fn resolve(&mut self, path: &str) -> GraphResult<Expr> {
        if let Some(annotation) = self.qs.annotations.get(path) {
            let column = self.column(&annotation.path)?;
            return Ok(annotation.to_expr(column));
        }
        if let Some(fragment) = self.qs.extra.select.get(path) {
            return Ok(fragment.to_expr());
        }
        self.column(path)
    }

    /// A column path, adding the joins it needs.
    fn column(&mut self, path: &str) -> GraphResult<Expr> {
        let tree = &self.qs.tree;
        let mut parts: Vec<&str> = path.split('.').collect();
        let column = parts.pop().filter(|c| !c.is_empty()).ok_or_else(|| {
            GraphError::UnknownLookup {
                table: tree.root().to_string(),
                lookup: path.to_string(),
            }
        })?;
        let table = tree.resolve_related_names(&parts)?.to_string();
        if table != tree.root() {
            self.query = tree.add_joins(&table, &self.query)?;
        }
        Ok(table_col(&table, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SchemaGraph;
    use crate::operators::LookupOp;
    use crate::schema::SchemaDescription;
    use crate::translate::{Aggregate, Lookup, LookupValue, SqlFragment};
    use crate::value::Value;

    const SCHEMA: &str = r#"
[[tables]]
name = "employee"
app = "hr"
columns = [
    { name = "first_name", type = "text" },
    { name = "title_id", type = "integer" },
]
relations = [
    { name = "title", kind = "foreign_key", target = "title" },
    { name = "projects", kind = "many_to_many", target = "project", reverse_name = "employees", through = { table = "employee_projects", source_column = "employee_id", target_column = "project_id" } },
]

[[tables]]
name = "title"
app = "hr"
columns = [{ name = "name", type = "text" }, { name = "salary", type = "real" }]

[[tables]]
name = "project"
app = "hr"
columns = [{ name = "name", type = "text" }]
"#;

    fn queryset() -> QuerySet {
        let description = SchemaDescription::from_toml(SCHEMA).unwrap();
        let tree = SchemaGraph::from_description(&description)
            .unwrap()
            .tree("employee", &[], &[])
            .unwrap();
        QuerySet::new(Arc::new(tree))
    }

    fn lookup(path: &str, op: LookupOp, value: LookupValue) -> Condition {
        Condition::Lookup(Lookup::new(path, op, value))
    }

    #[test]
    fn test_default_projection_is_root_pk() {
        insta::assert_snapshot!(queryset().to_sql(Dialect::Sqlite).unwrap(), @r#"
        SELECT
          "employee"."id"
        FROM "employee"
        "#);
    }

    #[test]
    fn test_paths_add_joins_once() {
        let qs = queryset()
            .select(vec!["first_name".into(), "title.name".into()])
            .filter(lookup("title.salary", LookupOp::Gt, LookupValue::Scalar(Value::Int(10))))
            .order_by(vec![OrderTerm::desc("title.name")])
            .distinct(true)
            .slice(Some(20), Some(10));
        insta::assert_snapshot!(qs.to_sql(Dialect::Sqlite).unwrap(), @r#"
        SELECT DISTINCT
          "employee"."first_name",
          "title"."name"
        FROM "employee"
        LEFT OUTER JOIN "title" ON "employee"."title_id" = "title"."id"
        WHERE "title"."salary" > 10
        ORDER BY "title"."name" DESC
        LIMIT 10 OFFSET 20
        "#);
    }

    #[test]
    fn test_many_to_many_path_joins_through_table() {
        let sql = queryset()
            .select(vec!["projects.name".into()])
            .to_sql(Dialect::Sqlite)
            .unwrap();
        assert!(sql.contains(
            r#"LEFT OUTER JOIN "employee_projects" ON "employee"."id" = "employee_projects"."employee_id""#
        ));
        assert!(sql.contains(
            r#"LEFT OUTER JOIN "project" ON "employee_projects"."project_id" = "project"."id""#
        ));
    }

    #[test]
    fn test_annotation_conditions_go_to_having() {
        let annotations = BTreeMap::from([(
            "project_count".to_string(),
            Annotation {
                aggregate: Aggregate::Count,
                path: "projects.id".into(),
                distinct: true,
            },
        )]);
        let qs = queryset()
            .annotate(&annotations)
            .select(vec!["first_name".into()])
            .filter(lookup(
                "project_count",
                LookupOp::Gte,
                LookupValue::Scalar(Value::Int(2)),
            ));
        let sql = qs.to_sql(Dialect::Sqlite).unwrap();
        assert!(sql.contains(r#"GROUP BY "employee"."first_name", "employee"."id""#));
        assert!(sql.contains(r#"HAVING COUNT(DISTINCT "project"."id") >= 2"#));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_extras() {
        let extra = Extra {
            where_: vec![SqlFragment::new(
                "\"employee\".\"first_name\" <> ?",
                vec![Value::from("O'Neil")],
            )],
            tables: vec!["audit".into()],
            select: BTreeMap::from([(
                "initial".to_string(),
                SqlFragment::new("substr(\"employee\".\"first_name\", 1, 1)", vec![]),
            )]),
        };
        let sql = queryset()
            .extra(&extra)
            .order_by(vec![OrderTerm::asc("initial")])
            .to_sql(Dialect::Sqlite)
            .unwrap();
        assert!(sql.contains(r#"FROM "employee", "audit""#));
        assert!(sql.contains(r#"WHERE "employee"."first_name" <> 'O''Neil'"#));
        assert!(sql.contains(r#"ORDER BY substr("employee"."first_name", 1, 1) ASC"#));
    }

    #[test]
    fn test_unknown_lookup() {
        let err = queryset()
            .select(vec!["office.location".into()])
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownLookup { .. }));
    }
}
