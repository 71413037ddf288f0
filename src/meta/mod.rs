//! Metadata record schema, serialization, and field-by-field comparison.
//!
//! A [`MetaRecord`] is the unit of the snapshot: one record per filesystem
//! object, serialized as a single JSON line. The field names in the JSON are
//! part of the snapshot format and must stay in sync between generate and
//! validate.

pub mod platform;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::error::CheckError;
use crate::hasher;
use crate::paths;

/// Closed set of filesystem object types carried in the snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    Chardev,
    Dev,
    Fifo,
    Socket,
    Unknown,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileKind::File => "file",
            FileKind::Dir => "dir",
            FileKind::Symlink => "symlink",
            FileKind::Chardev => "chardev",
            FileKind::Dev => "dev",
            FileKind::Fifo => "fifo",
            FileKind::Socket => "socket",
            FileKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Attributes shared by every storage backend.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CommonAttrs {
    /// Absolute path on the source at generate time.
    #[serde(rename = "Path")]
    pub path: String,

    /// Basename, without any directory component.
    #[serde(rename = "Name")]
    pub name: String,

    /// Byte length; populated for regular files only.
    #[serde(rename = "Size", default)]
    pub size: u64,

    /// Lowercase hex MD5 of the content; empty for non-regular files.
    #[serde(rename = "Hash", default)]
    pub hash: String,
}

/// Attributes specific to filesystem sources.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileSystemAttrs {
    #[serde(rename = "Type")]
    pub kind: FileKind,

    /// Permission bits plus setuid/setgid/sticky plus type bits.
    #[serde(rename = "Mode")]
    pub mode: u32,

    /// Seconds since the Unix epoch.
    #[serde(rename = "ModTime")]
    pub mod_time: u64,

    #[serde(rename = "UID")]
    pub uid: u32,

    #[serde(rename = "GID")]
    pub gid: u32,

    /// Hard-link count; zero when the platform stat does not carry it or the
    /// type does not track links.
    #[serde(rename = "Links", default)]
    pub links: u64,

    /// Readlink result for symlinks; empty otherwise.
    #[serde(rename = "LinkTarget", default)]
    pub link_target: String,
}

/// Attributes specific to object-storage sources. The object-storage walk is
/// a stub; the slot exists so snapshots stay forward-compatible.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ObjectStorageAttrs {
    #[serde(rename = "StorageClass")]
    pub storage_class: String,

    #[serde(rename = "LastModified")]
    pub last_modified: u64,
}

/// One extended attribute. Values are opaque bytes and travel through the
/// JSON snapshot as standard base64.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExtendedAttribute {
    #[serde(rename = "Key")]
    pub key: String,

    #[serde(rename = "Value", with = "b64_bytes")]
    pub value: Vec<u8>,
}

mod b64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// One entry per filesystem object, immutable once emitted.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetaRecord {
    #[serde(rename = "Common")]
    pub common: CommonAttrs,

    #[serde(rename = "FileSystem")]
    pub fs: Option<FileSystemAttrs>,

    #[serde(rename = "ObjectStorage")]
    pub object_storage: Option<ObjectStorageAttrs>,

    /// Ordered as returned by the platform listing call.
    #[serde(rename = "ExtendedAttributes", default)]
    pub xattrs: Vec<ExtendedAttribute>,
}

impl MetaRecord {
    /// Serializes the record as a single JSON line (no trailing newline).
    pub fn to_line(&self) -> Result<String, CheckError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a record from one snapshot line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Compares two records field by field and returns a human-readable
    /// reason per divergence. An empty list means the records are equal.
    ///
    /// `Common.Path` is deliberately excluded: source and target live at
    /// different roots. When both sides are sockets the remaining filesystem
    /// fields are skipped and a single informational reason is returned,
    /// because socket mod-times and link counts are unstable after a copy.
    pub fn equals(&self, other: &MetaRecord) -> Vec<String> {
        let mut reasons = Vec::new();

        diff(&mut reasons, "name", &self.common.name, &other.common.name);
        diff(&mut reasons, "size", &self.common.size, &other.common.size);
        diff(&mut reasons, "hash", &self.common.hash, &other.common.hash);

        match (&self.fs, &other.fs) {
            (None, None) => {}
            (Some(a), Some(b)) => {
                if a.kind == FileKind::Socket && b.kind == FileKind::Socket {
                    reasons.push("ignore type: socket".to_string());
                } else {
                    diff(&mut reasons, "type", &a.kind, &b.kind);
                    if a.mode != b.mode {
                        reasons.push(format!("mode: {:o} != {:o}", a.mode, b.mode));
                    }
                    diff(&mut reasons, "mod time", &a.mod_time, &b.mod_time);
                    diff(&mut reasons, "uid", &a.uid, &b.uid);
                    diff(&mut reasons, "gid", &a.gid, &b.gid);
                    diff(&mut reasons, "links", &a.links, &b.links);
                    diff(&mut reasons, "link target", &a.link_target, &b.link_target);
                }
            }
            _ => reasons.push("file system meta: one is nil, the other is not".to_string()),
        }

        match (&self.object_storage, &other.object_storage) {
            (None, None) => {}
            (Some(a), Some(b)) => {
                diff(&mut reasons, "storage class", &a.storage_class, &b.storage_class);
                diff(&mut reasons, "last modified", &a.last_modified, &b.last_modified);
            }
            _ => reasons.push("object storage meta: one is nil, the other is not".to_string()),
        }

        if self.xattrs.len() != other.xattrs.len() {
            reasons.push(format!(
                "xattrs length: {} != {}",
                self.xattrs.len(),
                other.xattrs.len()
            ));
        } else {
            for (a, b) in self.xattrs.iter().zip(other.xattrs.iter()) {
                if a.key != b.key {
                    reasons.push(format!("xattr key: {} != {}", a.key, b.key));
                } else if a.value != b.value {
                    reasons.push(format!("xattr {}: values differ", a.key));
                }
            }
        }

        reasons
    }
}

fn diff<T: PartialEq + std::fmt::Display>(reasons: &mut Vec<String>, field: &str, a: &T, b: &T) {
    if a != b {
        reasons.push(format!("{}: {} != {}", field, a, b));
    }
}

/// Builds the full metadata record for one filesystem object.
///
/// `meta` must come from an lstat-style call: symlinks are described as
/// themselves, never followed. Regular files are re-opened for hashing;
/// the stat size wins over anything observed while reading.
pub fn collect_fs_meta(path: &Path, meta: &fs::Metadata) -> Result<MetaRecord, CheckError> {
    let path = paths::absolute(path).map_err(|e| CheckError::Stat {
        source: e,
        path: path.to_path_buf(),
    })?;

    let kind = platform::file_kind(&path, meta);
    let mod_time = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let (uid, gid) = platform::owner_ids(meta);

    let mut common = CommonAttrs {
        path: path.to_string_lossy().into_owned(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: 0,
        hash: String::new(),
    };
    let mut fs_attrs = FileSystemAttrs {
        kind,
        mode: platform::mode_bits(meta),
        mod_time,
        uid,
        gid,
        links: 0,
        link_target: String::new(),
    };

    match kind {
        FileKind::File => {
            common.size = meta.len();
            common.hash = hasher::md5_hex(&path)?;
            fs_attrs.links = platform::link_count(meta);
        }
        FileKind::Symlink => {
            fs_attrs.links = platform::link_count(meta);
            fs_attrs.link_target = fs::read_link(&path)
                .map_err(|e| CheckError::Readlink {
                    source: e,
                    path: path.clone(),
                })?
                .to_string_lossy()
                .into_owned();
        }
        FileKind::Chardev | FileKind::Dev => {
            fs_attrs.links = platform::link_count(meta);
        }
        FileKind::Dir | FileKind::Fifo | FileKind::Socket | FileKind::Unknown => {}
    }

    Ok(MetaRecord {
        common,
        fs: Some(fs_attrs),
        object_storage: None,
        xattrs: platform::collect_xattrs(&path)?,
    })
}
