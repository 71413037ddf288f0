//! The generate pipeline.
//!
//! One walker feeds a pool of extractor workers over a capacity-1 channel;
//! the extractors feed a pool of writer workers the same way. Each writer
//! owns a shard file in the scratch directory and a private counter slot.
//! When every worker has drained, the driver sums the slots, writes the
//! header, concatenates the shards into the final snapshot, and removes the
//! scratch directory. The scratch directory is removed on error paths too.
//!
//! The first error cancels the pipeline: the failing worker raises the
//! cancel flag and returns; its channel ends close, which unblocks the
//! remaining stages. Errors from sibling workers after the first are
//! discarded.

use crossbeam_channel::{bounded, Receiver, Sender};
use scopeguard::defer;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::error::CheckError;
use crate::meta::{self, MetaRecord};
use crate::paths;
use crate::progress::{ProgressWatcher, WorkerCounters};
use crate::snapshot::{SnapshotHeader, SHARD_PREFIX};
use crate::walker::{WalkItem, Walker};

/// Configuration for one generate run. Paths may be relative; they are
/// resolved against the working directory on entry.
pub struct GenerateConfig {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Basename of the final snapshot inside `output_dir`.
    pub out_name: String,
    /// Extractor workers: stat, hash, and build records.
    pub reader_count: usize,
    /// Writer workers: spool records into shard files.
    pub writer_count: usize,
}

#[derive(Debug)]
pub struct GenerateSummary {
    pub item_count: u64,
    pub snapshot_path: PathBuf,
}

/// Runs the full generate pipeline and merges the snapshot.
pub fn generate(config: &GenerateConfig) -> Result<GenerateSummary, CheckError> {
    if config.reader_count == 0 {
        return Err(CheckError::Config("reader count must be greater than 0".to_string()));
    }
    if config.writer_count == 0 {
        return Err(CheckError::Config("writer count must be greater than 0".to_string()));
    }

    let source_dir = abs(&config.source_dir)?;
    let output_dir = abs(&config.output_dir)?;
    let temp_dir = output_dir.join(paths::TEMP_DIR_NAME);

    // A stale scratch tree from a crashed run must not leak into this one.
    match fs::remove_dir_all(&temp_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(CheckError::Write {
                source: e,
                path: temp_dir,
            })
        }
    }
    fs::create_dir_all(&temp_dir).map_err(|e| CheckError::Write {
        source: e,
        path: temp_dir.clone(),
    })?;

    defer! {
        let _ = fs::remove_dir_all(&temp_dir);
    }

    info!(
        source = %source_dir.display(),
        output = %output_dir.display(),
        readers = config.reader_count,
        writers = config.writer_count,
        "starting snapshot generation"
    );

    let walker = Walker::new(&source_dir, &temp_dir).map_err(|e| CheckError::Stat {
        source: e,
        path: source_dir.clone(),
    })?;
    let counters = WorkerCounters::new(config.writer_count);
    let watcher = ProgressWatcher::spawn("GENERATE", Arc::clone(&counters), None);
    let cancel = AtomicBool::new(false);

    let (item_tx, item_rx) = bounded::<WalkItem>(1);
    let (record_tx, record_rx) = bounded::<MetaRecord>(1);

    let mut first_error: Option<CheckError> = None;
    std::thread::scope(|s| {
        let mut handles = Vec::new();

        {
            let walker = &walker;
            let cancel = &cancel;
            handles.push(s.spawn(move || {
                let res = walker.run(item_tx, cancel);
                if res.is_err() {
                    cancel.store(true, Ordering::Relaxed);
                }
                res
            }));
        }

        for _ in 0..config.reader_count {
            let items = item_rx.clone();
            let records = record_tx.clone();
            let cancel = &cancel;
            handles.push(s.spawn(move || extract_worker(items, records, cancel)));
        }
        drop(item_rx);
        drop(record_tx);

        for slot in 0..config.writer_count {
            let records = record_rx.clone();
            let counters = Arc::clone(&counters);
            let cancel = &cancel;
            let temp_dir = &temp_dir;
            handles.push(s.spawn(move || writer_worker(slot, records, temp_dir, &counters, cancel)));
        }
        drop(record_rx);

        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(_) => {
                    if first_error.is_none() {
                        first_error = Some(CheckError::Other("a worker thread panicked".to_string()));
                    }
                }
            }
        }
    });
    watcher.stop();

    if let Some(e) = first_error {
        return Err(e);
    }

    let item_count = counters.total();
    let header = SnapshotHeader {
        source_dir: source_dir.to_string_lossy().into_owned(),
        item_count,
    };
    let snapshot_path = output_dir.join(&config.out_name);
    merge_shards(&temp_dir, &snapshot_path, &header)?;

    info!(
        items = item_count,
        snapshot = %snapshot_path.display(),
        "snapshot generation complete"
    );
    Ok(GenerateSummary {
        item_count,
        snapshot_path,
    })
}

/// Consumes walker items, builds full metadata records, and pushes them
/// downstream. Any extraction failure is fatal for the pipeline.
fn extract_worker(
    items: Receiver<WalkItem>,
    records: Sender<MetaRecord>,
    cancel: &AtomicBool,
) -> Result<(), CheckError> {
    for item in items.iter() {
        if cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
        let record = match meta::collect_fs_meta(&item.path, &item.meta) {
            Ok(r) => r,
            Err(e) => {
                cancel.store(true, Ordering::Relaxed);
                return Err(e);
            }
        };
        if records.send(record).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

/// Spools records into this worker's shard file, one JSON line per record,
/// counting writes in the worker's private slot.
fn writer_worker(
    slot: usize,
    records: Receiver<MetaRecord>,
    temp_dir: &Path,
    counters: &WorkerCounters,
    cancel: &AtomicBool,
) -> Result<(), CheckError> {
    let shard = tempfile::Builder::new()
        .prefix(SHARD_PREFIX)
        .tempfile_in(temp_dir)
        .map_err(|e| CheckError::Write {
            source: e,
            path: temp_dir.to_path_buf(),
        })?;
    // The shard must outlive this handle; the merge step reads it and the
    // driver removes the whole scratch tree afterwards.
    let (file, shard_path) = shard.keep().map_err(|e| CheckError::Write {
        source: e.error,
        path: temp_dir.to_path_buf(),
    })?;
    let mut out = BufWriter::new(file);

    for record in records.iter() {
        if cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
        let line = match record.to_line() {
            Ok(l) => l,
            Err(e) => {
                cancel.store(true, Ordering::Relaxed);
                return Err(e);
            }
        };
        if let Err(e) = writeln!(out, "{}", line) {
            cancel.store(true, Ordering::Relaxed);
            return Err(CheckError::Write {
                source: e,
                path: shard_path,
            });
        }
        counters.bump(slot);
    }

    out.flush().map_err(|e| {
        cancel.store(true, Ordering::Relaxed);
        CheckError::Write {
            source: e,
            path: shard_path.clone(),
        }
    })
}

/// Writes the header line, then appends every `temp-*` shard in the scratch
/// directory to the final snapshot. Shards are newline-terminated, so plain
/// concatenation preserves the one-record-per-line invariant.
fn merge_shards(
    temp_dir: &Path,
    snapshot_path: &Path,
    header: &SnapshotHeader,
) -> Result<(), CheckError> {
    let write_err = |e: std::io::Error, path: &Path| CheckError::Write {
        source: e,
        path: path.to_path_buf(),
    };

    let out_file = File::create(snapshot_path).map_err(|e| write_err(e, snapshot_path))?;
    let mut out = BufWriter::new(out_file);
    let header_line = header.to_line()?;
    writeln!(out, "{}", header_line).map_err(|e| write_err(e, snapshot_path))?;

    let entries = fs::read_dir(temp_dir).map_err(|e| write_err(e, temp_dir))?;
    for entry in entries {
        let entry = entry.map_err(|e| write_err(e, temp_dir))?;
        let file_type = entry.file_type().map_err(|e| write_err(e, &entry.path()))?;
        if !file_type.is_file() || !entry.file_name().to_string_lossy().starts_with(SHARD_PREFIX) {
            continue;
        }
        let shard_path = entry.path();
        let mut shard = File::open(&shard_path).map_err(|e| write_err(e, &shard_path))?;
        std::io::copy(&mut shard, &mut out).map_err(|e| write_err(e, snapshot_path))?;
    }

    out.flush().map_err(|e| write_err(e, snapshot_path))
}

fn abs(path: &Path) -> Result<PathBuf, CheckError> {
    paths::absolute(path).map_err(|e| CheckError::Stat {
        source: e,
        path: path.to_path_buf(),
    })
}
