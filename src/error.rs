use std::io;
use std::path::PathBuf;

/// The primary error type for all operations in the `clonecheck` crate.
///
/// Record-level validation failures (missing target, metadata mismatch, ...)
/// are not errors; they go to the [`Reporter`](crate::reporter::Reporter).
/// Every variant here is fatal for the pipeline that raised it.
#[derive(Debug)]
pub enum CheckError {
    /// Invalid configuration, detected before any I/O is performed.
    Config(String),

    /// Traversal of the source tree failed.
    Walk(walkdir::Error),

    /// A file could not be opened or read while hashing its content.
    Hash { source: io::Error, path: PathBuf },

    /// A stat call failed while building a metadata record.
    Stat { source: io::Error, path: PathBuf },

    /// Reading a symlink target failed.
    Readlink { source: io::Error, path: PathBuf },

    /// Writing a shard file, the snapshot, or the report failed.
    Write { source: io::Error, path: PathBuf },

    /// Reading the snapshot file failed.
    SnapshotIo { source: io::Error, path: PathBuf },

    /// The snapshot file is malformed (bad header, over-long line, non-UTF-8).
    SnapshotFormat(String),

    /// The number of processed records does not match the snapshot header.
    CountMismatch { expected: u64, actual: u64 },

    /// A record could not be serialized.
    Serde(serde_json::Error),

    /// A wrapper for failures that have no dedicated variant, such as a
    /// panicked worker thread.
    Other(String),
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            CheckError::Walk(e) => write!(f, "walk error: {}", e),
            CheckError::Hash { source, path } => {
                write!(f, "failed to hash '{}': {}", path.display(), source)
            }
            CheckError::Stat { source, path } => {
                write!(f, "failed to stat '{}': {}", path.display(), source)
            }
            CheckError::Readlink { source, path } => {
                write!(f, "failed to read link target of '{}': {}", path.display(), source)
            }
            CheckError::Write { source, path } => {
                write!(f, "failed to write '{}': {}", path.display(), source)
            }
            CheckError::SnapshotIo { source, path } => {
                write!(f, "failed to read snapshot '{}': {}", path.display(), source)
            }
            CheckError::SnapshotFormat(msg) => write!(f, "malformed snapshot: {}", msg),
            CheckError::CountMismatch { expected, actual } => {
                write!(f, "item count mismatch: header says {}, processed {}", expected, actual)
            }
            CheckError::Serde(e) => write!(f, "serialization error: {}", e),
            CheckError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CheckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckError::Walk(e) => Some(e),
            CheckError::Hash { source, .. }
            | CheckError::Stat { source, .. }
            | CheckError::Readlink { source, .. }
            | CheckError::Write { source, .. }
            | CheckError::SnapshotIo { source, .. } => Some(source),
            CheckError::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl From<walkdir::Error> for CheckError {
    fn from(err: walkdir::Error) -> Self {
        CheckError::Walk(err)
    }
}

impl From<serde_json::Error> for CheckError {
    fn from(err: serde_json::Error) -> Self {
        CheckError::Serde(err)
    }
}
