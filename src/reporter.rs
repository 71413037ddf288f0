//! Synchronized collector for per-record validation failures.
//!
//! Verifier workers record categorized entries from any thread; the driver
//! flushes them once the pipeline settles. Flush keeps insertion order and
//! never creates an empty report file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::paths;

/// Failure categories written to the report file. The names are part of the
/// report format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    InvalidJson,
    FileNotFound,
    FileStatError,
    RetrieveMetaFail,
    MetaMismatch,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::InvalidJson => "InvalidJSON",
            Category::FileNotFound => "FileNotFound",
            Category::FileStatError => "FileStatError",
            Category::RetrieveMetaFail => "RetrieveMetaFail",
            Category::MetaMismatch => "MetaMismatch",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    category: Category,
    detail: String,
}

/// Thread-safe accumulator of `(category, detail)` entries.
pub struct Reporter {
    entries: Mutex<Vec<Entry>>,
    output_path: PathBuf,
}

impl Reporter {
    pub fn new(output_path: &Path) -> std::io::Result<Self> {
        Ok(Reporter {
            entries: Mutex::new(Vec::new()),
            output_path: paths::absolute(output_path)?,
        })
    }

    /// Appends one entry. Safe to call from any worker.
    pub fn record(&self, category: Category, detail: String) {
        let mut entries = self.entries.lock().expect("reporter lock poisoned");
        entries.push(Entry { category, detail });
    }

    /// Number of entries recorded so far.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("reporter lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes all entries as `[<category>] <detail>` lines, in insertion
    /// order, to the configured report path. Idempotent; callable on any
    /// exit path. With zero entries the report file is not created.
    pub fn flush(&self) -> std::io::Result<()> {
        let entries = self.entries.lock().expect("reporter lock poisoned");
        if entries.is_empty() {
            return Ok(());
        }

        let mut out = BufWriter::new(File::create(&self.output_path)?);
        for entry in entries.iter() {
            writeln!(out, "[{}] {}", entry.category, entry.detail)?;
        }
        out.flush()
    }
}
