//! Streaming MD5 of file content.
//!
//! MD5 is not collision-resistant and the snapshot makes no authenticity
//! claims; the digest only has to catch accidental corruption during a copy.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::CheckError;

/// Computes the MD5 digest of the file at `path` and returns it as a
/// lowercase hexadecimal string. The file is streamed through a fixed
/// buffer, so arbitrarily large files use constant memory.
pub fn md5_hex(path: &Path) -> Result<String, CheckError> {
    let mut file = File::open(path).map_err(|e| CheckError::Hash {
        source: e,
        path: path.to_path_buf(),
    })?;

    let mut hasher = Md5::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| CheckError::Hash {
            source: e,
            path: path.to_path_buf(),
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
