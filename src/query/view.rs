//! View documents: ordered concept selections with optional sorting.
//!
//! ```json
//! [{"concept": 3}, {"concept": 7, "sort": "desc", "sort_index": 0, "visible": false}]
//! ```
//!
//! The older `{"columns": [...], "ordering": [[id, "asc"], ...]}` form is
//! converted to a facet list on parse.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use tracing::debug;

use super::{ErrorKey, OrderTerm, ParseError, ParseResult, QuerySet, WarningKey};
use crate::catalog::{Catalog, CatalogError, Concept};
use crate::graph::GraphResult;

const ANNOTATION_KEYS: [&str; 3] = ["errors", "warnings", "enabled"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// One concept in a view.
#[derive(Debug, Clone)]
pub struct Facet {
    pub concept: Option<Concept>,
    pub sort: Option<SortDirection>,
    pub sort_index: Option<i64>,
    pub visible: bool,
    pub enabled: bool,
    pub errors: Vec<ErrorKey>,
    pub warnings: Vec<WarningKey>,
    data: Map<String, Json>,
}

impl Facet {
    fn error(&mut self, key: ErrorKey) {
        self.errors.push(key);
        self.enabled = false;
    }

    /// Enabled with a resolved concept.
    pub fn is_active(&self) -> bool {
        self.enabled && self.concept.is_some()
    }

    /// Hidden facets are projected only to carry their sort columns.
    pub fn is_projected(&self) -> bool {
        self.is_active() && (self.visible || self.sort.is_some())
    }

    pub fn to_json(&self) -> Json {
        let mut out = self.data.clone();
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

/// A parsed view document.
#[derive(Debug, Clone, Default)]
pub struct ParsedView {
    facets: Vec<Facet>,
}

impl ParsedView {
    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    /// Facets contributing columns, in projection order.
    pub fn projected(&self) -> impl Iterator<Item = &Facet> {
        self.facets.iter().filter(|f| f.is_projected())
    }

    /// Some projected column must be dropped from client output.
    pub fn has_hidden(&self) -> bool {
        self.projected().any(|f| !f.visible)
    }

    pub fn is_valid(&self) -> bool {
        self.facets.iter().all(|f| f.errors.is_empty())
    }

    pub fn to_json(&self) -> Json {
        Json::Array(self.facets.iter().map(Facet::to_json).collect())
    }

    /// Sorted facets by `sort_index`, unindexed last in input order; one
    /// term per contained field.
    pub fn order_terms(&self, qs: &QuerySet) -> GraphResult<Vec<OrderTerm>> {
        let mut sorted: Vec<&Facet> = self
            .facets
            .iter()
            .filter(|f| f.is_active() && f.sort.is_some())
            .collect();
        sorted.sort_by_key(|f| (f.sort_index.is_none(), f.sort_index));

        let mut terms = Vec::new();
        for facet in sorted {
            let Some(concept) = &facet.concept else {
                continue;
            };
            for cf in &concept.fields {
                let path = qs.tree().query_string_for_field(&cf.field, None)?;
                terms.push(match facet.sort {
                    Some(SortDirection::Desc) => OrderTerm::desc(path),
                    _ => OrderTerm::asc(path),
                });
            }
        }
        Ok(terms)
    }

    /// Lookup paths of the projected columns, root primary key first when
    /// `include_pk`.
    pub fn select_paths(&self, qs: &QuerySet, include_pk: bool) -> GraphResult<Vec<String>> {
        let mut paths = Vec::new();
        if include_pk {
            paths.push(qs.tree().root_pk().to_string());
        }
        for facet in self.projected() {
            if let Some(concept) = &facet.concept {
                for cf in &concept.fields {
                    paths.push(qs.tree().query_string_for_field(&cf.field, None)?);
                }
            }
        }
        Ok(paths)
    }

    /// Add projections and ordering to `qs`.
    pub fn apply(&self, qs: QuerySet, include_pk: bool) -> GraphResult<QuerySet> {
        let paths = self.select_paths(&qs, include_pk)?;
        let terms = self.order_terms(&qs)?;
        let mut qs = qs;
        if !paths.is_empty() {
            qs = qs.select(paths);
        }
        Ok(qs.order_by(terms))
    }
}

/// Resolves view documents against the catalog.
pub struct ViewParser<'a> {
    catalog: &'a Catalog,
}

impl<'a> ViewParser<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Parse a document. With a `user`, only concepts published for the
    /// user resolve.
    pub fn parse(&self, document: &Json, user: Option<&str>) -> ParseResult<ParsedView> {
        let items = match document {
            Json::Null => return Ok(ParsedView::default()),
            Json::Array(items) => items.clone(),
            Json::Object(map) if map.is_empty() => return Ok(ParsedView::default()),
            Json::Object(map) if map.contains_key("columns") || map.contains_key("ordering") => {
                debug!("converting legacy view document");
                convert_legacy(map)?
            }
            other => {
                return Err(ParseError::Input(format!(
                    "expected a list of facets, got {}",
                    other
                )))
            }
        };

        let facets = items
            .iter()
            .map(|item| self.facet(item, user))
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(ParsedView { facets })
    }

    fn facet(&self, item: &Json, user: Option<&str>) -> ParseResult<Facet> {
        let Json::Object(map) = item else {
            return Err(ParseError::Input(format!("facet must be an object, got {}", item)));
        };
        let data: Map<String, Json> = map
            .iter()
            .filter(|(k, _)| !ANNOTATION_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut facet = Facet {
            concept: None,
            sort: None,
            sort_index: map.get("sort_index").and_then(Json::as_i64),
            visible: map.get("visible").and_then(Json::as_bool).unwrap_or(true),
            enabled: map.get("enabled").and_then(Json::as_bool).unwrap_or(true),
            errors: Vec::new(),
            warnings: Vec::new(),
            data,
        };
        if !facet.enabled {
            return Ok(facet);
        }

        match self.concept(map.get("concept"), user)? {
            Ok(concept) => facet.concept = Some(concept),
            Err(key) => {
                facet.error(key);
                return Ok(facet);
            }
        }

        match map.get("sort") {
            None | Some(Json::Null) => {}
            Some(raw) => match raw.as_str().and_then(SortDirection::parse) {
                None => facet.warnings.push(WarningKey::InvalidSort),
                Some(_) if facet.concept.as_ref().is_some_and(|c| !c.sortable) => {
                    facet.warnings.push(WarningKey::ConceptNotSortable)
                }
                Some(direction) => facet.sort = Some(direction),
            },
        }
        Ok(facet)
    }

    fn concept(
        &self,
        raw: Option<&Json>,
        user: Option<&str>,
    ) -> ParseResult<Result<Concept, ErrorKey>> {
        let found = match raw {
            Some(Json::Number(n)) => match n.as_i64() {
                Some(id) => self.catalog.concept(id),
                None => return Ok(Err(ErrorKey::ConceptDoesNotExist)),
            },
            Some(Json::String(name)) => self.catalog.concept_named(name),
            _ => return Ok(Err(ErrorKey::ConceptDoesNotExist)),
        };
        let concept = match found {
            Ok(concept) => concept,
            Err(CatalogError::ConceptNotFound(_)) => return Ok(Err(ErrorKey::ConceptDoesNotExist)),
            Err(err) => return Err(err.into()),
        };
        if user.is_some() && !self.catalog.is_concept_published(&concept, user)? {
            return Ok(Err(ErrorKey::ConceptDoesNotExist));
        }
        if !concept.viewable {
            return Ok(Err(ErrorKey::ConceptNotViewable));
        }
        Ok(Ok(concept))
    }
}

/// `columns` become visible facets; each `ordering` entry sorts its
/// column's facet or appends a hidden one.
fn convert_legacy(map: &Map<String, Json>) -> ParseResult<Vec<Json>> {
    let mut facets: Vec<Map<String, Json>> = Vec::new();
    if let Some(columns) = map.get("columns") {
        let columns = columns
            .as_array()
            .ok_or_else(|| ParseError::Input("columns must be a list".into()))?;
        for id in columns {
            let mut facet = Map::new();
            facet.insert("concept".into(), id.clone());
            facets.push(facet);
        }
    }

    if let Some(ordering) = map.get("ordering") {
        let ordering = ordering
            .as_array()
            .ok_or_else(|| ParseError::Input("ordering must be a list".into()))?;
        for (index, entry) in ordering.iter().enumerate() {
            let (id, direction) = match entry.as_array().map(Vec::as_slice) {
                Some([id, direction]) => (id, direction),
                _ => {
                    return Err(ParseError::Input(format!(
                        "ordering entries are [concept, direction] pairs, got {}",
                        entry
                    )))
                }
            };
            let position = facets
                .iter()
                .position(|f| f.get("concept") == Some(id) && !f.contains_key("sort"));
            let facet = match position {
                Some(i) => &mut facets[i],
                None => {
                    let mut hidden = Map::new();
                    hidden.insert("concept".into(), id.clone());
                    hidden.insert("visible".into(), Json::Bool(false));
                    facets.push(hidden);
                    let last = facets.len() - 1;
                    &mut facets[last]
                }
            };
            facet.insert("sort".into(), direction.clone());
            facet.insert("sort_index".into(), json!(index));
        }
    }
    Ok(facets.into_iter().map(Json::Object).collect())
}
