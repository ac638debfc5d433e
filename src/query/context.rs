//! Context documents: boolean filter trees over catalog fields.
//!
//! A context node is one of
//!
//! - a condition `{"field": <ref>, "operator": <uid>, "value": <v>}`,
//! - a branch `{"type": "and"|"or", "children": [...]}`,
//! - a composite `{"composite": <context id>}` embedding a stored context,
//! - the empty document `{}` or `null`.
//!
//! Parsing never fails on a bad node. The problem is recorded on the node
//! as an [`ErrorKey`] (which disables it) or a [`WarningKey`], and the
//! remaining nodes still compile.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value as Json};
use tracing::{debug, warn};

use super::{ErrorKey, ParseError, ParseResult, QuerySet, WarningKey};
use crate::catalog::{Catalog, CatalogError, Concept, Field, FieldRef};
use crate::graph::JoinTree;
use crate::translate::{
    coerce, split_value, Annotation, Condition, Extra, TranslateContext, TranslateError,
    Translation, TranslatorRegistry,
};
use crate::value::Value;

/// Keys owned by the parser; stripped from input and written on output.
const ANNOTATION_KEYS: [&str; 4] = ["errors", "warnings", "language", "enabled"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchType {
    And,
    Or,
}

impl BranchType {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Some(BranchType::And),
            "or" => Some(BranchType::Or),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BranchType::And => "and",
            BranchType::Or => "or",
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Matches everything.
    Empty,
    Condition {
        field: Option<Field>,
        translation: Option<Translation>,
    },
    Branch {
        branch_type: Option<BranchType>,
        children: Vec<ContextNode>,
    },
    Composite {
        id: i64,
        inner: Option<Box<ContextNode>>,
    },
}

/// One parsed node with its validation annotations.
#[derive(Debug, Clone)]
pub struct ContextNode {
    pub kind: NodeKind,
    /// Input without parser annotations.
    pub data: Json,
    pub errors: Vec<ErrorKey>,
    pub warnings: Vec<WarningKey>,
    pub enabled: bool,
}

impl ContextNode {
    fn new(kind: NodeKind, data: Json) -> Self {
        Self {
            kind,
            data,
            errors: Vec::new(),
            warnings: Vec::new(),
            enabled: true,
        }
    }

    fn error(&mut self, key: ErrorKey) {
        if !self.errors.contains(&key) {
            self.errors.push(key);
        }
        self.enabled = false;
    }

    fn warn(&mut self, key: WarningKey) {
        if !self.warnings.contains(&key) {
            self.warnings.push(key);
        }
    }

    /// Compiled condition; `None` when the node contributes no predicate.
    pub fn condition(&self) -> Option<Condition> {
        if !self.enabled {
            return None;
        }
        match &self.kind {
            NodeKind::Empty => None,
            NodeKind::Condition { translation, .. } => {
                translation.as_ref().and_then(|t| t.condition.clone())
            }
            NodeKind::Branch {
                branch_type,
                children,
            } => {
                let mut conditions = children.iter().filter_map(ContextNode::condition);
                let first = conditions.next()?;
                Some(conditions.fold(first, |acc, c| match branch_type {
                    Some(BranchType::Or) => acc.or(c),
                    _ => acc.and(c),
                }))
            }
            NodeKind::Composite { inner, .. } => inner.as_ref().and_then(|n| n.condition()),
        }
    }

    /// Annotations of every enabled node below, merged by name.
    pub fn annotations(&self) -> BTreeMap<String, Annotation> {
        let mut out = BTreeMap::new();
        if !self.enabled {
            return out;
        }
        match &self.kind {
            NodeKind::Empty => {}
            NodeKind::Condition { translation, .. } => {
                if let Some(t) = translation {
                    out.extend(t.annotations.clone());
                }
            }
            NodeKind::Branch { children, .. } => {
                for child in children {
                    out.extend(child.annotations());
                }
            }
            NodeKind::Composite { inner, .. } => {
                if let Some(inner) = inner {
                    out = inner.annotations();
                }
            }
        }
        out
    }

    /// Extras of every enabled node below. OR branches collapse their
    /// `where` fragments into one disjunction.
    pub fn extra(&self) -> Extra {
        let mut out = Extra::default();
        if !self.enabled {
            return out;
        }
        match &self.kind {
            NodeKind::Empty => {}
            NodeKind::Condition { translation, .. } => {
                if let Some(t) = translation {
                    out.merge(&t.extra);
                }
            }
            NodeKind::Branch {
                branch_type,
                children,
            } => {
                for child in children {
                    out.merge(&child.extra());
                }
                if *branch_type == Some(BranchType::Or) {
                    out.join_where_or();
                }
            }
            NodeKind::Composite { inner, .. } => {
                if let Some(inner) = inner {
                    out = inner.extra();
                }
            }
        }
        out
    }

    /// Human-readable rendering: a string per condition, nested by branch.
    pub fn language(&self) -> Json {
        match &self.kind {
            NodeKind::Empty => Json::Null,
            NodeKind::Condition { translation, .. } => translation
                .as_ref()
                .map(|t| Json::String(t.cleaned.language.clone()))
                .unwrap_or(Json::Null),
            NodeKind::Branch {
                branch_type,
                children,
            } => json!({
                "type": branch_type.map(|t| t.as_str()),
                "children": children
                    .iter()
                    .filter(|c| c.enabled)
                    .map(ContextNode::language)
                    .collect::<Vec<_>>(),
            }),
            NodeKind::Composite { inner, .. } => {
                inner.as_ref().map(|n| n.language()).unwrap_or(Json::Null)
            }
        }
    }

    fn has_errors(&self) -> bool {
        if !self.errors.is_empty() {
            return true;
        }
        match &self.kind {
            NodeKind::Branch { children, .. } => children.iter().any(ContextNode::has_errors),
            NodeKind::Composite { inner, .. } => inner.as_ref().is_some_and(|n| n.has_errors()),
            _ => false,
        }
    }

    /// The input document annotated with `errors`, `warnings`, `language`
    /// and `enabled` (written only when false).
    pub fn to_json(&self) -> Json {
        let Json::Object(data) = &self.data else {
            return self.data.clone();
        };
        let mut out = data.clone();
        if let NodeKind::Branch { children, .. } = &self.kind {
            out.insert(
                "children".into(),
                Json::Array(children.iter().map(ContextNode::to_json).collect()),
            );
        }
        if let NodeKind::Condition {
            translation: Some(t),
            ..
        } = &self.kind
        {
            out.insert("language".into(), Json::String(t.cleaned.language.clone()));
        }
        if !self.errors.is_empty() {
            out.insert("errors".into(), json!(self.errors));
        }
        if !self.warnings.is_empty() {
            out.insert("warnings".into(), json!(self.warnings));
        }
        if !self.enabled {
            out.insert("enabled".into(), Json::Bool(false));
        }
        Json::Object(out)
    }
}

/// A parsed context document.
#[derive(Debug, Clone)]
pub struct ParsedContext {
    root: ContextNode,
    distinct: bool,
}

impl ParsedContext {
    pub fn root(&self) -> &ContextNode {
        &self.root
    }

    pub fn condition(&self) -> Option<Condition> {
        self.root.condition()
    }

    pub fn annotations(&self) -> BTreeMap<String, Annotation> {
        self.root.annotations()
    }

    pub fn extra(&self) -> Extra {
        self.root.extra()
    }

    pub fn language(&self) -> Json {
        self.root.language()
    }

    /// No node anywhere in the tree carries an error.
    pub fn is_valid(&self) -> bool {
        !self.root.has_errors()
    }

    pub fn to_json(&self) -> Json {
        self.root.to_json()
    }

    /// Layer annotations, the filter, extras and distinct onto `qs`.
    pub fn apply(&self, qs: QuerySet) -> QuerySet {
        let mut qs = qs;
        let annotations = self.annotations();
        if !annotations.is_empty() {
            qs = qs.annotate(&annotations);
        }
        if let Some(condition) = self.condition() {
            qs = qs.filter(condition);
        }
        let extra = self.extra();
        if !extra.is_empty() {
            qs = qs.extra(&extra);
        }
        if self.distinct {
            qs = qs.distinct(true);
        }
        qs
    }
}

/// Compiles context documents against one join tree.
pub struct ContextParser<'a> {
    catalog: &'a Catalog,
    translators: &'a TranslatorRegistry,
    tree: &'a JoinTree,
    distinct: bool,
}

impl<'a> ContextParser<'a> {
    pub fn new(
        catalog: &'a Catalog,
        translators: &'a TranslatorRegistry,
        tree: &'a JoinTree,
    ) -> Self {
        Self {
            catalog,
            translators,
            tree,
            distinct: true,
        }
    }

    /// Whether [`ParsedContext::apply`] makes the query distinct.
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Parse a document. `user` scopes composite lookups and, when set,
    /// restricts fields and concepts to those published for the user.
    pub fn parse(&self, document: &Json, user: Option<&str>) -> ParseResult<ParsedContext> {
        let mut ancestors = Vec::new();
        let root = self.node(document, user, &mut ancestors)?;
        Ok(ParsedContext {
            root,
            distinct: self.distinct,
        })
    }

    fn node(
        &self,
        data: &Json,
        user: Option<&str>,
        ancestors: &mut Vec<i64>,
    ) -> ParseResult<ContextNode> {
        let map = match data {
            Json::Null => return Ok(ContextNode::new(NodeKind::Empty, Json::Null)),
            Json::Object(map) => strip_annotations(map),
            other => {
                return Err(ParseError::Input(format!(
                    "expected an object, got {}",
                    other
                )))
            }
        };
        if map.is_empty() {
            return Ok(ContextNode::new(NodeKind::Empty, Json::Object(map)));
        }
        let enabled = data.get("enabled").and_then(Json::as_bool).unwrap_or(true);

        // disabled branches and composites still parse so their nodes get
        // annotated; disabled conditions are not translated
        if map.contains_key("composite") {
            let mut node = self.composite(map, user, ancestors)?;
            node.enabled &= enabled;
            Ok(node)
        } else if map.contains_key("children") || map.contains_key("type") {
            let mut node = self.branch(map, user, ancestors)?;
            node.enabled &= enabled;
            Ok(node)
        } else if ["field", "id", "value", "operator"].iter().any(|k| map.contains_key(*k)) {
            if !enabled {
                let mut node = ContextNode::new(
                    NodeKind::Condition {
                        field: None,
                        translation: None,
                    },
                    Json::Object(map),
                );
                node.enabled = false;
                return Ok(node);
            }
            self.condition(map, user)
        } else {
            Err(ParseError::Input(format!(
                "object is neither a branch nor a condition: {}",
                Json::Object(map)
            )))
        }
    }

    fn branch(
        &self,
        map: Map<String, Json>,
        user: Option<&str>,
        ancestors: &mut Vec<i64>,
    ) -> ParseResult<ContextNode> {
        let children = match map.get("children") {
            Some(Json::Array(children)) => children.clone(),
            Some(_) => return Err(ParseError::Input("branch children must be a list".into())),
            None => return Err(ParseError::Input("branch is missing its children".into())),
        };
        let branch_type = map.get("type").and_then(Json::as_str).and_then(BranchType::parse);

        let mut parsed = Vec::with_capacity(children.len());
        let mut invalid_child = false;
        for child in &children {
            match self.node(child, user, ancestors) {
                Ok(node) => parsed.push(node),
                Err(ParseError::Input(reason)) => {
                    debug!(%reason, "skipping invalid context child");
                    let mut node = ContextNode::new(NodeKind::Empty, child.clone());
                    node.enabled = false;
                    parsed.push(node);
                    invalid_child = true;
                }
                Err(err) => return Err(err),
            }
        }

        let mut node = ContextNode::new(
            NodeKind::Branch {
                branch_type,
                children: parsed,
            },
            Json::Object(map),
        );
        if branch_type.is_none() {
            node.error(ErrorKey::InvalidBranchType);
        }
        match children.len() {
            0 => node.error(ErrorKey::EmptyBranch),
            1 => node.warn(WarningKey::TooFewChildren),
            _ => {}
        }
        if invalid_child {
            node.warn(WarningKey::InvalidChild);
        }
        Ok(node)
    }

    fn composite(
        &self,
        map: Map<String, Json>,
        user: Option<&str>,
        ancestors: &mut Vec<i64>,
    ) -> ParseResult<ContextNode> {
        // `{"composite": true, "id": n}` is the older spelling
        let id = match map.get("composite") {
            Some(Json::Bool(true)) => map.get("id").and_then(Json::as_i64),
            Some(value) => value.as_i64(),
            None => None,
        }
        .ok_or_else(|| ParseError::Input("composite must name a context id".into()))?;

        if ancestors.contains(&id) {
            return Err(ParseError::CompositeCycle(id));
        }

        let mut node = ContextNode::new(NodeKind::Composite { id, inner: None }, Json::Object(map));
        let stored = match self.catalog.context(id, user) {
            Ok(doc) => doc,
            Err(CatalogError::ContextNotFound(_)) => {
                node.error(ErrorKey::ContextDoesNotExist);
                return Ok(node);
            }
            Err(err) => return Err(err.into()),
        };

        debug!(context = id, "expanding composite context");
        ancestors.push(id);
        let inner = self.node(&stored.json, user, ancestors);
        ancestors.pop();
        node.kind = NodeKind::Composite {
            id,
            inner: Some(Box::new(inner?)),
        };
        Ok(node)
    }

    fn condition(&self, map: Map<String, Json>, user: Option<&str>) -> ParseResult<ContextNode> {
        let mut node = ContextNode::new(
            NodeKind::Condition {
                field: None,
                translation: None,
            },
            Json::Null,
        );

        let concept = match map.get("concept") {
            Some(Json::Null) | None => None,
            Some(raw) => match self.concept(raw, user)? {
                Ok(concept) => Some(concept),
                Err(key) => {
                    node.error(key);
                    None
                }
            },
        };

        let field = if node.errors.is_empty() {
            match self.field(&map, concept.as_ref(), user)? {
                Ok(field) => Some(field),
                Err(key) => {
                    node.error(key);
                    None
                }
            }
        } else {
            None
        };

        let mut translation = None;
        if let Some(field) = &field {
            let value = map.get("value").cloned().unwrap_or(Json::Null);
            let operator = map.get("operator").and_then(Json::as_str);
            check_value(field, &value, &mut node);

            let translator = self.translators.get(field.translator.as_deref());
            let cx = TranslateContext {
                tree: self.tree,
                operators: self.catalog.operators(),
            };
            match translator.translate(field, operator, &value, cx) {
                Ok(t) => translation = Some(t),
                Err(TranslateError::Graph(err)) => return Err(err.into()),
                Err(err) => {
                    warn!(field = %field.natural_key_string(), error = %err, "condition disabled");
                    node.error(match err {
                        TranslateError::InvalidValue { .. } | TranslateError::InvalidShape { .. } => {
                            ErrorKey::InvalidValueType
                        }
                        _ => ErrorKey::InvalidOperator,
                    });
                }
            }
        }

        node.kind = NodeKind::Condition { field, translation };
        node.data = Json::Object(map);
        Ok(node)
    }

    /// The concept named by id. Inner `Err` is the key to record.
    fn concept(&self, raw: &Json, user: Option<&str>) -> ParseResult<Result<Concept, ErrorKey>> {
        let Some(id) = raw.as_i64() else {
            return Ok(Err(ErrorKey::ConceptDoesNotExist));
        };
        let concept = match self.catalog.concept(id) {
            Ok(concept) => concept,
            Err(CatalogError::ConceptNotFound(_)) => return Ok(Err(ErrorKey::ConceptDoesNotExist)),
            Err(err) => return Err(err.into()),
        };
        if user.is_some() && !self.catalog.is_concept_published(&concept, user)? {
            return Ok(Err(ErrorKey::ConceptDoesNotExist));
        }
        if !concept.queryable {
            return Ok(Err(ErrorKey::ConceptNotQueryable));
        }
        Ok(Ok(concept))
    }

    /// The field named by `field` (or legacy `id`), restricted to the
    /// concept's fields when a concept is given.
    fn field(
        &self,
        map: &Map<String, Json>,
        concept: Option<&Concept>,
        user: Option<&str>,
    ) -> ParseResult<Result<Field, ErrorKey>> {
        let Some(raw) = map.get("field").or_else(|| map.get("id")) else {
            return Ok(Err(ErrorKey::FieldDoesNotExist));
        };
        let Ok(reference) = serde_json::from_value::<FieldRef>(raw.clone()) else {
            return Ok(Err(ErrorKey::FieldDoesNotExist));
        };
        let field = match self.catalog.resolve_field(&reference) {
            Ok(field) => field,
            Err(CatalogError::FieldNotFound(_)) => return Ok(Err(ErrorKey::FieldDoesNotExist)),
            Err(CatalogError::AmbiguousField { .. }) => return Ok(Err(ErrorKey::AmbiguousField)),
            Err(err) => return Err(err.into()),
        };
        if let Some(concept) = concept {
            if !concept.fields.iter().any(|cf| cf.field.id == field.id) {
                return Ok(Err(ErrorKey::FieldDoesNotExist));
            }
        } else if user.is_some() && !self.catalog.is_field_published(&field, user)? {
            return Ok(Err(ErrorKey::FieldDoesNotExist));
        }
        Ok(Ok(field))
    }
}

fn strip_annotations(map: &Map<String, Json>) -> Map<String, Json> {
    map.iter()
        .filter(|(k, _)| !ANNOTATION_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Warnings that leave the condition usable.
fn check_value(field: &Field, raw: &Json, node: &mut ContextNode) {
    let (value, _) = split_value(raw);
    let items = match &value {
        Json::Array(items) => items.clone(),
        other => vec![other.clone()],
    };
    if !field.nullable && items.iter().any(Json::is_null) {
        node.warn(WarningKey::FieldNotNullable);
    }
    if field.choices.is_some() {
        let outside = items
            .iter()
            .filter_map(|v| coerce(field.simple_type, v))
            .any(|v: Value| !field.is_choice(&v));
        if outside {
            node.warn(WarningKey::ValueNotAChoice);
        }
    }
}
