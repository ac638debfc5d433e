//! Schema graph and join resolver.
//!
//! [`SchemaGraph`] is a directed multigraph over tables. Every declared
//! relation contributes two edges, one per direction, so a query rooted at
//! any table can walk relations both ways. [`JoinTree`] fixes a root and
//! picks exactly one path to every reachable table.
//!
//! The module is organized into submodules:
//! - `tree`: route-constrained BFS and the join tree queries

mod tree;

#[cfg(test)]
mod tests;

pub use tree::{ColumnRef, JoinTree, Route};

use std::collections::HashMap;
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::schema::{RelationKind, SchemaDescription, TableDef};

/// Errors raised by graph construction and path queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Table '{target}' is not reachable from '{root}'")]
    UnreachableTable { root: String, target: String },

    #[error("Unknown lookup '{lookup}' on '{table}'")]
    UnknownLookup { table: String, lookup: String },
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Cardinality of an edge, read from source to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl JoinKind {
    /// Does following this edge multiply rows?
    pub fn causes_fanout(&self) -> bool {
        matches!(self, JoinKind::OneToMany | JoinKind::ManyToMany)
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinKind::OneToOne => "1:1",
            JoinKind::ManyToOne => "N:1",
            JoinKind::OneToMany => "1:N",
            JoinKind::ManyToMany => "M:N",
        };
        f.write_str(s)
    }
}

/// Whether an edge follows the relation as declared or walks it backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reverse,
}

/// A node in the schema graph.
#[derive(Debug, Clone)]
pub struct TableNode {
    pub name: String,
    pub app: String,
    pub model: String,
    pub primary_key: String,
}

impl From<&TableDef> for TableNode {
    fn from(table: &TableDef) -> Self {
        Self {
            name: table.name.clone(),
            app: table.app.clone(),
            model: table.model_name().to_string(),
            primary_key: table.primary_key.clone(),
        }
    }
}

/// Association table an M:N edge passes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Through {
    pub table: String,
    /// Column on the association table referencing the edge source.
    pub source_column: String,
    /// Column on the association table referencing the edge target.
    pub target_column: String,
}

/// One `JOIN ... ON left = right` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSegment {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

/// Edge data: one direction of one declared relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub source: String,
    pub target: String,
    /// Lookup name used to walk this edge in a query string.
    pub related_name: String,
    pub kind: JoinKind,
    pub direction: Direction,
    pub source_column: String,
    pub target_column: String,
    pub through: Option<Through>,
    /// Column of the underlying foreign key (or the association table name
    /// for M:N). Routes bind to this.
    pub join_column: String,
}

impl Relation {
    /// The JOIN clauses needed to follow this edge. M:N edges need two.
    pub fn segments(&self) -> Vec<JoinSegment> {
        match &self.through {
            None => vec![JoinSegment {
                from_table: self.source.clone(),
                from_column: self.source_column.clone(),
                to_table: self.target.clone(),
                to_column: self.target_column.clone(),
            }],
            Some(through) => vec![
                JoinSegment {
                    from_table: self.source.clone(),
                    from_column: self.source_column.clone(),
                    to_table: through.table.clone(),
                    to_column: through.source_column.clone(),
                },
                JoinSegment {
                    from_table: through.table.clone(),
                    from_column: through.target_column.clone(),
                    to_table: self.target.clone(),
                    to_column: self.target_column.clone(),
                },
            ],
        }
    }
}

/// Directed multigraph of tables and relation edges.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    graph: DiGraph<TableNode, Relation>,
    node_indices: HashMap<String, NodeIndex>,
}

impl SchemaGraph {
    /// Build the graph from a schema description.
    ///
    /// Every relation yields a forward and a reverse edge. The description is
    /// assumed valid (see [`SchemaDescription::validate`]).
    pub fn from_description(description: &SchemaDescription) -> GraphResult<Self> {
        let mut graph = SchemaGraph::default();
        for table in &description.tables {
            let idx = graph.graph.add_node(TableNode::from(table));
            graph.node_indices.insert(table.name.clone(), idx);
        }

        for table in &description.tables {
            for rel in &table.relations {
                let target = description
                    .table(&rel.target)
                    .ok_or_else(|| GraphError::UnknownTable(rel.target.clone()))?;
                let source_column = rel.source_column(table);
                let target_column = rel.target_column(target);
                let (forward_kind, reverse_kind) = match rel.kind {
                    RelationKind::ForeignKey => (JoinKind::ManyToOne, JoinKind::OneToMany),
                    RelationKind::OneToOne => (JoinKind::OneToOne, JoinKind::OneToOne),
                    RelationKind::ManyToMany => (JoinKind::ManyToMany, JoinKind::ManyToMany),
                };
                let through = rel.through.as_ref();
                let join_column = match through {
                    Some(t) => t.table.clone(),
                    None => source_column.clone(),
                };

                let forward = Relation {
                    source: table.name.clone(),
                    target: target.name.clone(),
                    related_name: rel.name.clone(),
                    kind: forward_kind,
                    direction: Direction::Forward,
                    source_column: source_column.clone(),
                    target_column: target_column.clone(),
                    through: through.map(|t| Through {
                        table: t.table.clone(),
                        source_column: t.source_column.clone(),
                        target_column: t.target_column.clone(),
                    }),
                    join_column: join_column.clone(),
                };
                let reverse = Relation {
                    source: target.name.clone(),
                    target: table.name.clone(),
                    related_name: rel.reverse_name(table),
                    kind: reverse_kind,
                    direction: Direction::Reverse,
                    source_column: target_column,
                    target_column: source_column,
                    through: through.map(|t| Through {
                        table: t.table.clone(),
                        source_column: t.target_column.clone(),
                        target_column: t.source_column.clone(),
                    }),
                    join_column,
                };

                graph.add_edge(forward)?;
                graph.add_edge(reverse)?;
            }
        }

        debug!(
            tables = graph.table_count(),
            edges = graph.edge_count(),
            "built schema graph"
        );
        Ok(graph)
    }

    fn add_edge(&mut self, relation: Relation) -> GraphResult<()> {
        let from = self.index(&relation.source)?;
        let to = self.index(&relation.target)?;
        self.graph.add_edge(from, to, relation);
        Ok(())
    }

    pub(crate) fn index(&self, table: &str) -> GraphResult<NodeIndex> {
        self.node_indices
            .get(table)
            .copied()
            .ok_or_else(|| GraphError::UnknownTable(table.to_string()))
    }

    pub(crate) fn inner(&self) -> &DiGraph<TableNode, Relation> {
        &self.graph
    }

    pub fn table(&self, name: &str) -> Option<&TableNode> {
        self.node_indices.get(name).map(|idx| &self.graph[*idx])
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.node_indices.contains_key(name)
    }

    pub fn table_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outgoing edges of a table.
    pub fn relations(&self, table: &str) -> Vec<&Relation> {
        match self.node_indices.get(table) {
            Some(idx) => self.graph.edges(*idx).map(|e| e.weight()).collect(),
            None => Vec::new(),
        }
    }

    /// Build a join tree rooted at `root`.
    pub fn tree(
        &self,
        root: &str,
        exclude: &[String],
        routes: &[Route],
    ) -> GraphResult<JoinTree> {
        JoinTree::build(self, root, exclude, routes)
    }
}
