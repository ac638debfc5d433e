//! Join tree: one chosen path from a root table to every reachable table.
//!
//! The tree is built by BFS, so every table is reached at its shortest
//! depth. Candidate edges leaving a table are visited sorted by
//! `(target_table, join_column)`, which makes ties between equal-depth
//! paths deterministic. Routes narrow the candidates further.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GraphError, GraphResult, Relation, SchemaGraph, TableNode};
use crate::sql::{table_col, ExprExt, Query, TableRef};

/// Explicit edge-selection rule.
///
/// `to` may only be reached from `from`; when `join_column` is set, only
/// edges over that column qualify. A symmetrical route also binds the pair
/// in the opposite direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_column: Option<String>,
    #[serde(default)]
    pub symmetrical: bool,
}

impl Route {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            join_column: None,
            symmetrical: false,
        }
    }

    pub fn with_join_column(mut self, column: impl Into<String>) -> Self {
        self.join_column = Some(column.into());
        self
    }

    pub fn symmetrical(mut self) -> Self {
        self.symmetrical = true;
        self
    }
}

/// Anything that names one column of one table.
pub trait ColumnRef {
    fn table_name(&self) -> &str;
    fn column_name(&self) -> &str;
}

impl ColumnRef for (&str, &str) {
    fn table_name(&self) -> &str {
        self.0
    }

    fn column_name(&self) -> &str {
        self.1
    }
}

/// Parent information for path reconstruction.
struct ParentInfo {
    parent: NodeIndex,
    edge_idx: EdgeIndex,
}

/// Compiled route constraints.
#[derive(Default)]
struct RouteRules {
    /// target -> the only source allowed to reach it
    required_joins: HashMap<String, String>,
    /// (source, target) -> the only join column allowed
    required_columns: HashMap<(String, String), String>,
}

impl RouteRules {
    fn new(routes: &[Route]) -> Self {
        let mut rules = RouteRules::default();
        for route in routes {
            rules.bind(&route.from, &route.to, route.join_column.as_deref());
            if route.symmetrical {
                rules.bind(&route.to, &route.from, route.join_column.as_deref());
            }
        }
        rules
    }

    fn bind(&mut self, from: &str, to: &str, column: Option<&str>) {
        self.required_joins.insert(to.to_string(), from.to_string());
        if let Some(column) = column {
            self.required_columns
                .insert((from.to_string(), to.to_string()), column.to_string());
        }
    }

    fn allows(&self, relation: &Relation) -> bool {
        if let Some(from) = self.required_joins.get(&relation.target) {
            if *from != relation.source {
                return false;
            }
        }
        let pair = (relation.source.clone(), relation.target.clone());
        match self.required_columns.get(&pair) {
            Some(column) => *column == relation.join_column,
            None => true,
        }
    }
}

/// A tree of joins rooted at one table.
///
/// Paths are resolved once at construction; the tree owns its data and is
/// cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct JoinTree {
    root: TableNode,
    /// Reachable tables in BFS order, root first.
    order: Vec<String>,
    paths: HashMap<String, Vec<Relation>>,
    nodes: HashMap<String, TableNode>,
}

impl JoinTree {
    pub(super) fn build(
        graph: &SchemaGraph,
        root: &str,
        exclude: &[String],
        routes: &[Route],
    ) -> GraphResult<Self> {
        let root_idx = graph.index(root)?;
        let inner = graph.inner();
        let rules = RouteRules::new(routes);
        let excluded: HashSet<&str> = exclude.iter().map(String::as_str).collect();

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut parents: HashMap<NodeIndex, ParentInfo> = HashMap::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        let mut order = vec![root.to_string()];

        queue.push_back(root_idx);
        visited.insert(root_idx);

        while let Some(current) = queue.pop_front() {
            let mut candidates: Vec<_> = inner.edges(current).collect();
            candidates.sort_by(|a, b| {
                let (ra, rb) = (a.weight(), b.weight());
                (&ra.target, &ra.join_column).cmp(&(&rb.target, &rb.join_column))
            });

            for edge_ref in candidates {
                let neighbor = edge_ref.target();
                let relation = edge_ref.weight();

                // The root is visited, so edges back to it drop out here.
                if visited.contains(&neighbor)
                    || excluded.contains(relation.target.as_str())
                    || !rules.allows(relation)
                {
                    continue;
                }

                parents.insert(
                    neighbor,
                    ParentInfo {
                        parent: current,
                        edge_idx: edge_ref.id(),
                    },
                );
                visited.insert(neighbor);
                order.push(relation.target.clone());
                queue.push_back(neighbor);
            }
        }

        let mut paths = HashMap::with_capacity(order.len());
        let mut nodes = HashMap::with_capacity(order.len());
        for table in &order {
            let idx = graph.index(table)?;
            paths.insert(table.clone(), reconstruct_path(graph, root_idx, idx, &parents));
            nodes.insert(table.clone(), inner[idx].clone());
        }

        debug!(root, reachable = order.len(), "built join tree");
        Ok(Self {
            root: inner[root_idx].clone(),
            order,
            paths,
            nodes,
        })
    }

    pub fn root(&self) -> &str {
        &self.root.name
    }

    pub fn root_pk(&self) -> &str {
        &self.root.primary_key
    }

    /// Reachable tables in BFS order, root first.
    pub fn tables(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, table: &str) -> bool {
        self.paths.contains_key(table)
    }

    /// Node of a reachable table.
    pub fn table(&self, name: &str) -> Option<&TableNode> {
        self.nodes.get(name)
    }

    /// Edges from the root to `target`; empty for the root itself.
    pub fn path_to(&self, target: &str) -> GraphResult<&[Relation]> {
        self.paths
            .get(target)
            .map(Vec::as_slice)
            .ok_or_else(|| GraphError::UnreachableTable {
                root: self.root.name.clone(),
                target: target.to_string(),
            })
    }

    /// Dotted lookup from the root to a column: the related names along
    /// the path, then the column, then the operator when given.
    ///
    /// ```ignore
    /// tree.query_string_for_field(&("title", "salary"), Some("range"))
    /// // "title.salary.range"
    /// ```
    pub fn query_string_for_field(
        &self,
        field: &dyn ColumnRef,
        operator: Option<&str>,
    ) -> GraphResult<String> {
        let path = self.path_to(field.table_name())?;
        let mut parts: Vec<&str> = path.iter().map(|r| r.related_name.as_str()).collect();
        parts.push(field.column_name());
        if let Some(op) = operator {
            parts.push(op);
        }
        Ok(parts.join("."))
    }

    /// Resolve the relation part of a dotted lookup to the table it ends on.
    ///
    /// `names` are the related names only (no column, no operator).
    pub fn resolve_related_names(&self, names: &[&str]) -> GraphResult<&str> {
        let mut table = self.root.name.as_str();
        let mut depth = 0;
        for name in names {
            let next = self
                .order
                .iter()
                .filter_map(|t| self.paths.get(t))
                .filter(|p| p.len() == depth + 1)
                .map(|p| &p[depth])
                .find(|r| r.source == table && r.related_name == *name)
                .ok_or_else(|| GraphError::UnknownLookup {
                    table: table.to_string(),
                    lookup: (*name).to_string(),
                })?;
            table = &next.target;
            depth += 1;
        }
        Ok(table)
    }

    /// Add every join on the path to `target`, skipping tables the query
    /// already references. All joins are LEFT OUTER so rows survive when
    /// conditions on different branches are OR'ed together.
    pub fn add_joins(&self, target: &str, query: &Query) -> GraphResult<Query> {
        let mut query = query.clone();
        for relation in self.path_to(target)? {
            for seg in relation.segments() {
                if query.references(&seg.to_table) {
                    continue;
                }
                let on = table_col(&seg.from_table, &seg.from_column)
                    .eq(table_col(&seg.to_table, &seg.to_column));
                query = query.left_join(TableRef::new(&seg.to_table), on);
            }
        }
        Ok(query)
    }

    /// Base query selecting from the root table.
    pub fn base_query(&self) -> Query {
        Query::new().from(TableRef::new(&self.root.name))
    }
}

/// Walk parent pointers back from `to_idx`, then reverse.
fn reconstruct_path(
    graph: &SchemaGraph,
    from_idx: NodeIndex,
    to_idx: NodeIndex,
    parents: &HashMap<NodeIndex, ParentInfo>,
) -> Vec<Relation> {
    let inner = graph.inner();
    let mut edges = Vec::new();
    let mut current = to_idx;

    while current != from_idx {
        let Some(info) = parents.get(&current) else {
            break;
        };
        edges.push(inner[info.edge_idx].clone());
        current = info.parent;
    }

    edges.reverse();
    edges
}
