//! Snapshot file layout: one header line, then one JSON record per line.
//!
//! The header carries the source root and the exact number of record lines
//! that follow. Record order is unspecified; permuting the record lines of a
//! snapshot does not change its meaning.

use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;

use crate::error::CheckError;

/// Default basename of the snapshot inside the output directory.
pub const SNAPSHOT_FILE_NAME: &str = "meta.out";

/// Shard files written by generate writers carry this basename prefix; the
/// merger only concatenates files matching it.
pub const SHARD_PREFIX: &str = "temp-";

/// Hard cap on a single snapshot line. Generous enough for multi-megabyte
/// xattr values after base64; a line that hits the cap without a terminator
/// marks the snapshot as malformed.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// First line of every snapshot.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SnapshotHeader {
    /// Absolute path of the source root at generate time. A prefix of every
    /// record's `Common.Path`.
    #[serde(rename = "SourceDir")]
    pub source_dir: String,

    /// Number of record lines following the header.
    #[serde(rename = "ItemCount")]
    pub item_count: u64,
}

impl SnapshotHeader {
    pub fn to_line(&self) -> Result<String, CheckError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_line(line: &str) -> Result<Self, CheckError> {
        serde_json::from_str(line)
            .map_err(|e| CheckError::SnapshotFormat(format!("bad header line: {}", e)))
    }
}

/// Reads one LF-terminated line into `line` (terminator stripped), honoring
/// [`MAX_LINE_BYTES`]. Returns `Ok(false)` at clean end of file. `path` is
/// only used for error context.
pub fn read_line_capped<R: BufRead>(
    reader: &mut R,
    line: &mut String,
    path: &Path,
) -> Result<bool, CheckError> {
    line.clear();
    let mut bytes: Vec<u8> = Vec::new();

    loop {
        let available = reader.fill_buf().map_err(|e| CheckError::SnapshotIo {
            source: e,
            path: path.to_path_buf(),
        })?;
        if available.is_empty() {
            break; // EOF; whatever is buffered is the (unterminated) last line
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                bytes.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                break;
            }
            None => {
                bytes.extend_from_slice(available);
                let n = available.len();
                reader.consume(n);
            }
        }

        if bytes.len() > MAX_LINE_BYTES {
            return Err(CheckError::SnapshotFormat(format!(
                "line exceeds the {} byte cap",
                MAX_LINE_BYTES
            )));
        }
    }

    if bytes.is_empty() {
        return Ok(false);
    }
    if bytes.len() > MAX_LINE_BYTES {
        return Err(CheckError::SnapshotFormat(format!(
            "line exceeds the {} byte cap",
            MAX_LINE_BYTES
        )));
    }

    match String::from_utf8(bytes) {
        Ok(text) => {
            line.push_str(&text);
            Ok(true)
        }
        Err(_) => Err(CheckError::SnapshotFormat("non-UTF-8 line".to_string())),
    }
}
