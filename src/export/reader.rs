//! Pulls rows from a cursor and formats them in batches.

use std::collections::{HashSet, VecDeque};

use dashmap::DashMap;
use rayon::prelude::*;
use tracing::debug;

use super::{Export, ExportError, ExportResult, ReadMode, Record};
use crate::config::ExportSettings;
use crate::engine::Cursor;
use crate::format::Formatted;
use crate::value::{Row, Value};

/// Formatter output keyed by slot and the debug form of its slice.
type SliceCache = DashMap<(usize, String), Formatted>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub mode: ReadMode,
    /// Worker threads of the threaded modes.
    pub threads: usize,
    /// Rows pulled from the cursor per batch.
    pub chunk_size: usize,
    /// Rows skipped while reading. Manual mode only.
    pub offset: Option<usize>,
    /// Rows returned at most. Manual mode only.
    pub limit: Option<usize>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::from_settings(&ExportSettings::default())
    }
}

impl ReadOptions {
    pub fn from_settings(settings: &ExportSettings) -> Self {
        Self {
            mode: settings.read_mode,
            threads: settings.threads,
            chunk_size: settings.chunk_size,
            offset: None,
            limit: None,
        }
    }

    pub fn mode(mut self, mode: ReadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn slice(mut self, offset: Option<usize>, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// Formatted records of an [`Export`], in cursor order.
pub struct Records<'a> {
    export: &'a Export,
    cursor: Cursor,
    options: ReadOptions,
    pool: Option<rayon::ThreadPool>,
    cache: Option<SliceCache>,
    seen: HashSet<String>,
    skipped: usize,
    taken: usize,
    buffer: VecDeque<Record>,
    checked: bool,
    done: bool,
}

impl<'a> Records<'a> {
    pub(super) fn new(export: &'a Export, cursor: Cursor, options: ReadOptions) -> ExportResult<Self> {
        let pool = if options.mode.is_threaded() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.threads.max(1))
                .build()
                .map_err(|e| ExportError::ThreadPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        let cache = options.mode.is_cached().then(DashMap::new);
        debug!(mode = %options.mode, chunk_size = options.chunk_size, "reading rows");
        Ok(Self {
            export,
            cursor,
            options,
            pool,
            cache,
            seen: HashSet::new(),
            skipped: 0,
            taken: 0,
            buffer: VecDeque::new(),
            checked: false,
            done: false,
        })
    }

    /// Next batch of raw rows, after manual dedupe and slicing.
    fn next_rows(&mut self) -> ExportResult<Vec<Row>> {
        let chunk = self.options.chunk_size.max(1);
        if self.options.mode != ReadMode::Manual {
            return Ok(self.cursor.by_ref().take(chunk).collect());
        }

        let mut rows = Vec::with_capacity(chunk);
        while rows.len() < chunk {
            if self.options.limit.is_some_and(|limit| self.taken >= limit) {
                break;
            }
            let Some(row) = self.cursor.next() else {
                break;
            };
            let key = format!("{:?}", self.export.visible_values(&row)?);
            if !self.seen.insert(key) {
                continue;
            }
            if self.skipped < self.options.offset.unwrap_or(0) {
                self.skipped += 1;
                continue;
            }
            self.taken += 1;
            rows.push(row);
        }
        Ok(rows)
    }

    fn fill(&mut self) -> ExportResult<()> {
        let rows = self.next_rows()?;
        if rows.is_empty() {
            self.done = true;
            return Ok(());
        }
        if !self.checked {
            self.export.check_header(&rows[0])?;
            self.checked = true;
        }

        let export = self.export;
        let cache = self.cache.as_ref();
        let records: Vec<Record> = match &self.pool {
            Some(pool) => pool.install(|| {
                rows.par_iter()
                    .map(|row| format_row(export, cache, row))
                    .collect::<ExportResult<_>>()
            })?,
            None => rows
                .iter()
                .map(|row| format_row(export, cache, row))
                .collect::<ExportResult<_>>()?,
        };
        self.buffer.extend(records);
        Ok(())
    }
}

impl Iterator for Records<'_> {
    type Item = ExportResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.fill() {
                self.done = true;
                return Some(Err(err));
            }
        }
    }
}

fn format_row(export: &Export, cache: Option<&SliceCache>, row: &[Value]) -> ExportResult<Record> {
    let mut record = Record::new();
    for (idx, (values, slot)) in export.slices(row)?.into_iter().zip(&export.slots).enumerate() {
        if !slot.visible {
            continue;
        }
        match cache {
            Some(cache) => {
                let key = (idx, format!("{:?}", values));
                let formatted = cache
                    .entry(key)
                    .or_insert_with(|| slot.formatter.format(values))
                    .clone();
                record.extend(formatted);
            }
            None => record.extend(slot.formatter.format(values)),
        }
    }
    Ok(record)
}
