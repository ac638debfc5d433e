//! Destinations for exporter output.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ExportError, ExportResult};

/// Where an exporter writes its files. Most exporters write one file;
/// script exporters write a data file and a script.
pub trait ExportSink {
    fn open<'a>(&'a mut self, name: &str) -> ExportResult<Box<dyn Write + 'a>>;
}

/// A single writer, such as stdout or an HTTP body. Holds one file only.
#[derive(Debug)]
pub struct StreamSink<W: Write> {
    inner: W,
    opened: Option<String>,
}

impl<W: Write> StreamSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            opened: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ExportSink for StreamSink<W> {
    fn open<'a>(&'a mut self, name: &str) -> ExportResult<Box<dyn Write + 'a>> {
        if let Some(first) = &self.opened {
            return Err(ExportError::SingleStream {
                first: first.clone(),
                file: name.to_string(),
            });
        }
        self.opened = Some(name.to_string());
        Ok(Box::new(&mut self.inner))
    }
}

/// In-memory files, by name.
#[derive(Debug, Default, Clone)]
pub struct BundleSink {
    files: BTreeMap<String, Vec<u8>>,
}

impl BundleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    pub fn into_files(self) -> BTreeMap<String, Vec<u8>> {
        self.files
    }
}

impl ExportSink for BundleSink {
    fn open<'a>(&'a mut self, name: &str) -> ExportResult<Box<dyn Write + 'a>> {
        let buf = self.files.entry(name.to_string()).or_default();
        buf.clear();
        Ok(Box::new(buf))
    }
}

/// Files created in a directory.
#[derive(Debug, Clone)]
pub struct DirSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ExportSink for DirSink {
    fn open<'a>(&'a mut self, name: &str) -> ExportResult<Box<dyn Write + 'a>> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        debug!(path = %path.display(), "writing export file");
        let file = File::create(&path)?;
        self.written.push(path);
        Ok(Box::new(BufWriter::new(file)))
    }
}
