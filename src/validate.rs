//! The validate pipeline.
//!
//! One reader streams snapshot lines to a pool of verifier workers over a
//! capacity-1 channel. Workers re-stat the target, rebuild the metadata
//! record with the same policy generate used, compare field by field, and
//! hand categorized failures to the reporter. Per-record failures never
//! cancel the pipeline; reader I/O errors and a final count mismatch do.

use crossbeam_channel::{bounded, Receiver};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::error::CheckError;
use crate::meta::{self, FileKind, MetaRecord};
use crate::paths;
use crate::progress::{ProgressWatcher, WorkerCounters};
use crate::reporter::{Category, Reporter};
use crate::snapshot::{self, SnapshotHeader};

/// Configuration for one validate run. Paths may be relative; they are
/// resolved against the working directory on entry.
pub struct ValidateConfig {
    pub target_dir: PathBuf,
    pub meta_path: PathBuf,
    pub validator_count: usize,
}

pub struct ValidateSummary {
    /// Records that parsed as JSON, whether or not they verified cleanly.
    pub processed: u64,
    /// Entries handed to the reporter.
    pub failures: usize,
}

/// Replays the snapshot against the target tree. Returns the first fatal
/// error, a count mismatch, or a summary; divergences land in `reporter`.
pub fn validate(config: &ValidateConfig, reporter: &Reporter) -> Result<ValidateSummary, CheckError> {
    if config.validator_count == 0 {
        return Err(CheckError::Config("validator count must be greater than 0".to_string()));
    }

    let target_dir = abs(&config.target_dir)?;
    let meta_path = abs(&config.meta_path)?;

    let meta_file = File::open(&meta_path).map_err(|e| CheckError::SnapshotIo {
        source: e,
        path: meta_path.clone(),
    })?;
    let mut reader = BufReader::new(meta_file);

    let mut line = String::new();
    if !snapshot::read_line_capped(&mut reader, &mut line, &meta_path)? {
        return Err(CheckError::SnapshotFormat("missing header line".to_string()));
    }
    let header = SnapshotHeader::from_line(&line)?;

    info!(
        meta = %meta_path.display(),
        target = %target_dir.display(),
        items = header.item_count,
        validators = config.validator_count,
        "starting snapshot validation"
    );

    let counters = WorkerCounters::new(config.validator_count);
    let watcher = ProgressWatcher::spawn("VALIDATE", Arc::clone(&counters), Some(header.item_count));
    let cancel = AtomicBool::new(false);
    let (line_tx, line_rx) = bounded::<String>(1);

    let target_str = target_dir.to_string_lossy().into_owned();

    let mut first_error: Option<CheckError> = None;
    std::thread::scope(|s| {
        let mut handles = Vec::new();

        {
            let cancel = &cancel;
            let meta_path = &meta_path;
            handles.push(s.spawn(move || {
                let mut reader = reader;
                let mut line = String::new();
                loop {
                    if cancel.load(Ordering::Relaxed) {
                        return Ok(());
                    }
                    match snapshot::read_line_capped(&mut reader, &mut line, meta_path) {
                        Ok(true) => {
                            if line_tx.send(line.clone()).is_err() {
                                return Ok(());
                            }
                        }
                        Ok(false) => return Ok(()),
                        Err(e) => {
                            cancel.store(true, Ordering::Relaxed);
                            return Err(e);
                        }
                    }
                }
            }));
        }

        for slot in 0..config.validator_count {
            let lines = line_rx.clone();
            let counters = Arc::clone(&counters);
            let header = &header;
            let target_str = target_str.as_str();
            handles.push(s.spawn(move || {
                verify_worker(slot, lines, header, target_str, reporter, &counters);
                Ok(())
            }));
        }
        drop(line_rx);

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

    let processed = counters.total();
    if processed != header.item_count {
        return Err(CheckError::CountMismatch {
            expected: header.item_count,
            actual: processed,
        });
    }

    info!(
        processed,
        failures = reporter.len(),
        "snapshot validation complete"
    );
    Ok(ValidateSummary {
        processed,
        failures: reporter.len(),
    })
}

/// Checks every record this worker receives against the target tree. All
/// failures are categorized and recorded; nothing here is fatal.
fn verify_worker(
    slot: usize,
    lines: Receiver<String>,
    header: &SnapshotHeader,
    target_dir: &str,
    reporter: &Reporter,
    counters: &WorkerCounters,
) {
    for line in lines.iter() {
        let record = match MetaRecord::from_line(&line) {
            Ok(r) => r,
            Err(e) => {
                reporter.record(
                    Category::InvalidJson,
                    format!("source: {}, error: {}", line, e),
                );
                continue;
            }
        };
        counters.bump(slot);

        // Single-substring replacement on purpose: the recorded path is
        // absolute and starts with the snapshot's source root.
        let target_path = record
            .common
            .path
            .replacen(header.source_dir.as_str(), target_dir, 1);
        let target_path = Path::new(&target_path);

        if !probe_target(target_path, &record, reporter, &line) {
            continue;
        }

        let target_meta = match fs::symlink_metadata(target_path) {
            Ok(m) => m,
            Err(e) => {
                reporter.record(
                    Category::RetrieveMetaFail,
                    format!("source: {}, error: {}", line, e),
                );
                continue;
            }
        };
        let target_record = match meta::collect_fs_meta(target_path, &target_meta) {
            Ok(r) => r,
            Err(e) => {
                reporter.record(
                    Category::RetrieveMetaFail,
                    format!("source: {}, error: {}", line, e),
                );
                continue;
            }
        };

        let reasons = record.equals(&target_record);
        if !reasons.is_empty() {
            reporter.record(
                Category::MetaMismatch,
                format!("source: {}, error: {}", line, reasons.join(",")),
            );
        }
    }
}

/// Existence and stat check for the target object. Records the failure and
/// returns `false` when the record should be skipped. Sockets cannot be
/// opened with `open(2)`, so they are probed with lstat instead; everything
/// else is opened (non-blocking, so fifos do not stall) and statted through
/// the handle, which is closed immediately.
fn probe_target(target_path: &Path, record: &MetaRecord, reporter: &Reporter, line: &str) -> bool {
    eprintln!("DEBUG probe_target: {:?}", target_path);
    let source_kind = record.fs.as_ref().map(|f| f.kind);
    if source_kind == Some(FileKind::Socket) {
        if let Err(e) = fs::symlink_metadata(target_path) {
            reporter.record(
                Category::FileNotFound,
                format!("source: {}, error: {}", line, e),
            );
            return false;
        }
        return true;
    }

    eprintln!("DEBUG probe_target: opening {:?}", target_path);
    let file = match open_for_stat(target_path) {
        Ok(f) => f,
        Err(e) => {
            reporter.record(
                Category::FileNotFound,
                format!("source: {}, error: {}", line, e),
            );
            return false;
        }
    };
    if let Err(e) = file.metadata() {
        reporter.record(
            Category::FileStatError,
            format!("source: {}, error: {}", line, e),
        );
        return false;
    }
    true
}

#[cfg(unix)]
fn open_for_stat(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
fn open_for_stat(path: &Path) -> std::io::Result<File> {
    File::open(path)
}

fn abs(path: &Path) -> Result<PathBuf, CheckError> {
    paths::absolute(path).map_err(|e| CheckError::Stat {
        source: e,
        path: path.to_path_buf(),
    })
}
