//! Per-OS extraction of stat-level attributes and extended attributes.
//!
//! On Unix the real stat block is available and extended attributes are read
//! with lstat semantics (the attribute calls never follow symlinks). On any
//! other target the stubs record neutral values, which mirrors what happens
//! when the platform stat block is missing.

use std::fs;
use std::path::Path;

use crate::error::CheckError;
use crate::meta::{ExtendedAttribute, FileKind};

/// Permission bits plus setuid/setgid/sticky plus the type bits. Everything
/// else in `st_mode` is noise for snapshot purposes.
#[cfg(unix)]
const MODE_MASK: u32 = 0o170000 | 0o7777;

#[cfg(unix)]
pub fn file_kind(path: &Path, meta: &fs::Metadata) -> FileKind {
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::fs::MetadataExt;

    let ft = meta.file_type();
    if ft.is_file() {
        FileKind::File
    } else if ft.is_dir() {
        FileKind::Dir
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_char_device() {
        FileKind::Chardev
    } else if ft.is_block_device() {
        FileKind::Dev
    } else if ft.is_fifo() {
        FileKind::Fifo
    } else if ft.is_socket() {
        FileKind::Socket
    } else {
        tracing::warn!(
            path = %path.display(),
            mode = format_args!("{:o}", meta.mode()),
            "unknown file type"
        );
        FileKind::Unknown
    }
}

#[cfg(unix)]
pub fn mode_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode() & MODE_MASK
}

#[cfg(unix)]
pub fn owner_ids(meta: &fs::Metadata) -> (u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (meta.uid(), meta.gid())
}

#[cfg(unix)]
pub fn link_count(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.nlink()
}

/// Lists and reads every extended attribute of `path`, preserving the order
/// of the platform listing call. Filesystems without xattr support yield an
/// empty list. A failure to read one attribute skips that attribute; the
/// rest of the record is unaffected.
#[cfg(unix)]
pub fn collect_xattrs(path: &Path) -> Result<Vec<ExtendedAttribute>, CheckError> {
    let names = match xattr::list(path) {
        Ok(names) => names,
        Err(e) if xattr_absent(&e) => return Ok(Vec::new()),
        Err(e) => {
            return Err(CheckError::Stat {
                source: e,
                path: path.to_path_buf(),
            })
        }
    };

    let mut attrs = Vec::new();
    for name in names {
        let key = name.to_string_lossy().into_owned();
        match xattr::get(path, &name) {
            Ok(Some(value)) => attrs.push(ExtendedAttribute { key, value }),
            // Removed between list and get; same as never listed.
            Ok(None) => {}
            Err(e) if xattr_absent(&e) => {}
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    xattr = %key,
                    error = %e,
                    "failed to read extended attribute, skipping"
                );
            }
        }
    }
    Ok(attrs)
}

#[cfg(target_os = "linux")]
const NO_ATTR: i32 = libc::ENODATA;
#[cfg(all(unix, not(target_os = "linux")))]
const NO_ATTR: i32 = libc::ENOATTR;

#[cfg(unix)]
fn xattr_absent(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(code) if code == libc::ENOTSUP || code == NO_ATTR)
}

// ---------------------------------------------------------------------------
// Non-Unix stubs: no stat block, no xattrs, neutral owner information.
// ---------------------------------------------------------------------------

#[cfg(not(unix))]
pub fn file_kind(_path: &Path, meta: &fs::Metadata) -> FileKind {
    let ft = meta.file_type();
    if ft.is_file() {
        FileKind::File
    } else if ft.is_dir() {
        FileKind::Dir
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::Unknown
    }
}

#[cfg(not(unix))]
pub fn mode_bits(_meta: &fs::Metadata) -> u32 {
    0
}

#[cfg(not(unix))]
pub fn owner_ids(_meta: &fs::Metadata) -> (u32, u32) {
    (0, 0)
}

#[cfg(not(unix))]
pub fn link_count(_meta: &fs::Metadata) -> u64 {
    0
}

#[cfg(not(unix))]
pub fn collect_xattrs(_path: &Path) -> Result<Vec<ExtendedAttribute>, CheckError> {
    Ok(Vec::new())
}
