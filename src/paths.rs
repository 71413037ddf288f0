//! Path helpers shared by both pipelines.
//!
//! Every I/O operation in the crate works on absolute paths; relative inputs
//! are resolved against the process working directory exactly once, at the
//! pipeline boundary.

use std::io;
use std::path::{Path, PathBuf};

/// Name of the scratch directory created inside the output directory during
/// generate. Shard files live here until the merge step.
pub const TEMP_DIR_NAME: &str = "temp_dir";

/// Returns `path` unchanged if it is already absolute, otherwise resolves it
/// against the current working directory.
pub fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// True when `child`'s absolute form starts with `parent`'s absolute form.
///
/// The comparison is component-wise, so `/a/bc` is not a subpath of `/a/b`.
pub fn is_subpath(parent: &Path, child: &Path) -> io::Result<bool> {
    let parent = absolute(parent)?;
    let child = absolute(child)?;
    Ok(child.starts_with(&parent))
}

/// Absolute path of the scratch directory for the given output directory.
pub fn temp_dir_path(out_dir: &Path) -> io::Result<PathBuf> {
    Ok(absolute(out_dir)?.join(TEMP_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_keeps_absolute_paths() {
        let p = Path::new("/tmp/some/where");
        assert_eq!(absolute(p).unwrap(), p);
    }

    #[test]
    fn absolute_resolves_relative_against_cwd() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute(Path::new("x/y")).unwrap(), cwd.join("x/y"));
    }

    #[test]
    fn subpath_is_component_wise() {
        assert!(is_subpath(Path::new("/a/b"), Path::new("/a/b/c")).unwrap());
        assert!(is_subpath(Path::new("/a/b"), Path::new("/a/b")).unwrap());
        assert!(!is_subpath(Path::new("/a/b"), Path::new("/a/bc")).unwrap());
        assert!(!is_subpath(Path::new("/a/b"), Path::new("/a")).unwrap());
    }

    #[test]
    fn temp_dir_is_under_out_dir() {
        let t = temp_dir_path(Path::new("/out")).unwrap();
        assert_eq!(t, Path::new("/out").join(TEMP_DIR_NAME));
    }
}
