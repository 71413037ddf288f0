//! Single-producer traversal of the source tree.
//!
//! Traversal is sequential by design: the directory-walk API yields entries
//! one at a time, and a second walker over the same tree would race it.
//! Parallelism lives downstream, in the extractor workers.

use crossbeam_channel::Sender;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

use crate::error::CheckError;
use crate::paths;

/// One traversal item: an absolute path plus its lstat block.
pub struct WalkItem {
    pub path: PathBuf,
    pub meta: fs::Metadata,
}

/// Recursive walker rooted at the source directory.
pub struct Walker {
    root: PathBuf,
    skip_dir: PathBuf,
}

impl Walker {
    /// `skip_dir` is the output scratch directory; everything under it is
    /// excluded so the snapshot never captures its own shard files.
    pub fn new(root: &Path, skip_dir: &Path) -> std::io::Result<Self> {
        Ok(Walker {
            root: paths::absolute(root)?,
            skip_dir: paths::absolute(skip_dir)?,
        })
    }

    /// Walks the tree and sends `(path, lstat)` items downstream. The source
    /// root itself is not emitted. Symlinks are never followed; each link is
    /// described as itself. Dropping `items` on return closes the channel,
    /// which is the completion signal for the extractor workers.
    pub fn run(&self, items: Sender<WalkItem>, cancel: &AtomicBool) -> Result<(), CheckError> {
        let walk = WalkDir::new(&self.root)
            .follow_links(false)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !e.path().starts_with(&self.skip_dir));

        for entry in walk {
            if cancel.load(Ordering::Relaxed) {
                return Ok(());
            }

            let entry = entry?;
            eprintln!("DEBUG walker: about to stat {:?}", entry.path());
            let meta = entry.metadata()?;
            eprintln!("DEBUG walker: statted {:?}", entry.path());
            let item = WalkItem {
                path: entry.into_path(),
                meta,
            };
            if items.send(item).is_err() {
                // Downstream is gone; the driver already knows why.
                return Ok(());
            }
        }
        Ok(())
    }
}
