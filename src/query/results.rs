//! Paged result reads for clients.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tracing::info;

use super::{Executor, PipelineError, PipelineResult, QueryProcessor};
use crate::config::{ExportSettings, QuerySettings};
use crate::export::{Codes, Exporter, ReadMode, ReadOptions, Record};
use crate::format::FormatterRegistry;
use crate::Result;

/// Page size used when neither the request nor the settings give one.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// A request for one or more consecutive pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultRequest {
    /// 1-based.
    pub page: u64,
    pub limit: u64,
    /// Last page to read, inclusive.
    pub stop_page: Option<u64>,
    /// Runs the query on a cancellable named connection.
    pub query_name: Option<String>,
    pub reader: ReadMode,
}

impl Default for ResultRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            stop_page: None,
            query_name: None,
            reader: ReadMode::default(),
        }
    }
}

impl ResultRequest {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page,
            limit,
            ..Self::default()
        }
    }

    /// First page, sized by `default_limit`.
    pub fn from_settings(settings: &QuerySettings) -> Self {
        Self::new(1, settings.default_limit.unwrap_or(DEFAULT_PAGE_SIZE))
    }

    pub fn stop_page(mut self, stop_page: u64) -> Self {
        self.stop_page = Some(stop_page);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.query_name = Some(name.into());
        self
    }

    pub fn reader(mut self, reader: ReadMode) -> Self {
        self.reader = reader;
        self
    }

    /// Row offset and count covering `page..=stop_page`.
    pub fn bounds(&self) -> PipelineResult<(u64, u64)> {
        if self.page < 1 {
            return Err(PipelineError::Input("page must be 1 or greater".into()));
        }
        if self.limit < 1 {
            return Err(PipelineError::Input("limit must be 1 or greater".into()));
        }
        let stop_page = self.stop_page.unwrap_or(self.page);
        if stop_page < self.page {
            return Err(PipelineError::Input(format!(
                "stop page {} comes before page {}",
                stop_page, self.page
            )));
        }
        let offset = self.limit * (self.page - 1);
        let limit = self.limit * (stop_page - self.page + 1);
        Ok((offset, limit))
    }

    /// Hidden facets force manual reads, so sort-only columns cannot
    /// duplicate visible rows.
    pub fn read_mode(&self, processor: &QueryProcessor) -> ReadMode {
        if processor.has_hidden() {
            ReadMode::Manual
        } else {
            self.reader
        }
    }

    /// Execute the request and format its rows with `exporter`'s formats.
    ///
    /// A named request first cancels whatever still runs under its name.
    /// In manual mode the engine returns every row and the page is cut
    /// while reading.
    pub fn execute(
        &self,
        processor: &QueryProcessor,
        executor: &Executor,
        exporter: Arc<dyn Exporter>,
        formats: &FormatterRegistry,
        codes: &Codes,
        settings: &ExportSettings,
    ) -> Result<ResultPage> {
        let (offset, limit) = self.bounds()?;
        let name = self.query_name.as_deref();
        if let Some(name) = name {
            executor.cancel(name)?;
        }

        let mode = self.read_mode(processor);
        let mut options = ReadOptions::from_settings(settings).mode(mode);
        let cursor = if mode == ReadMode::Manual {
            options = options.slice(Some(offset as usize), Some(limit as usize));
            processor.get_iterable(executor, None, None, name)?
        } else {
            processor.get_iterable(executor, Some(offset), Some(limit), name)?
        };

        let export = processor.get_exporter(exporter, formats, codes);
        let keys = export.header().into_iter().map(|h| h.key).collect();
        let rows = export
            .read(cursor, options)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        info!(page = self.page, read_mode = %mode, rows = rows.len(), "read result page");

        Ok(ResultPage {
            page: self.page,
            stop_page: self.stop_page.unwrap_or(self.page),
            limit: self.limit,
            keys,
            rows,
        })
    }
}

/// Formatted rows of a [`ResultRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    pub page: u64,
    pub stop_page: u64,
    pub limit: u64,
    pub keys: Vec<String>,
    pub rows: Vec<Record>,
}

impl ResultPage {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_json(&self) -> Json {
        let items = self
            .rows
            .iter()
            .map(|row| {
                let values = row.iter().map(|(_, v)| v.to_json()).collect();
                Json::Array(values)
            })
            .collect();
        let mut map = Map::new();
        map.insert("page".into(), self.page.into());
        map.insert("stop_page".into(), self.stop_page.into());
        map.insert("limit".into(), self.limit.into());
        map.insert("keys".into(), self.keys.clone().into());
        map.insert("items".into(), Json::Array(items));
        Json::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert_eq!(ResultRequest::new(1, 20).bounds().unwrap(), (0, 20));
        assert_eq!(ResultRequest::new(3, 10).bounds().unwrap(), (20, 10));
        assert_eq!(
            ResultRequest::new(2, 10).stop_page(4).bounds().unwrap(),
            (10, 30)
        );
    }

    #[test]
    fn test_bounds_rejects_bad_pages() {
        assert!(matches!(
            ResultRequest::new(0, 10).bounds(),
            Err(PipelineError::Input(_))
        ));
        assert!(matches!(
            ResultRequest::new(3, 10).stop_page(2).bounds(),
            Err(PipelineError::Input(_))
        ));
        assert!(matches!(
            ResultRequest::new(1, 0).bounds(),
            Err(PipelineError::Input(_))
        ));
    }

    #[test]
    fn test_request_from_json() {
        let request: ResultRequest =
            serde_json::from_str(r#"{"page": 2, "query_name": "q", "reader": "cached"}"#).unwrap();
        assert_eq!(request.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(request.query_name.as_deref(), Some("q"));
        assert_eq!(request.reader, ReadMode::Cached);

        let settings = QuerySettings {
            default_limit: Some(50),
            ..QuerySettings::default()
        };
        assert_eq!(ResultRequest::from_settings(&settings).limit, 50);
    }
}
