// src/staging.rs

//! Working-tree preparation for one transaction.
//!
//! Clearing and populating are separate steps with separate error variants,
//! so a failed clean can be told apart from a failed populate.

use crate::error::{Error, Result};
use crate::model::{StreamRef, TransactionId};
use crate::source::SourceControl;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory entries that survive a clean
const PRESERVED_DIR: &str = ".git";
const PRESERVED_FILE: &str = ".gitignore";

const DELETE_ATTEMPTS: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct WorkingTree {
    root: PathBuf,
}

impl WorkingTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Leaves the working tree holding exactly the files of `transaction`.
    pub fn stage(
        &self,
        source: &dyn SourceControl,
        stream: &StreamRef,
        transaction: TransactionId,
    ) -> Result<()> {
        self.clean()?;
        source.populate(stream, transaction, &self.root)
    }

    /// Removes everything under the root except the git metadata directory
    /// and the ignore file.
    pub fn clean(&self) -> Result<()> {
        let entries = fs::read_dir(&self.root)
            .map_err(|source| Error::Clean { path: self.root.clone(), source })?;
        for entry in entries {
            let entry = entry.map_err(|source| Error::Clean { path: self.root.clone(), source })?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|source| Error::Clean { path: path.clone(), source })?;
            let name = entry.file_name();

            if file_type.is_dir() {
                if name == PRESERVED_DIR {
                    continue;
                }
                remove_dir_with_retry(&path)?;
            } else if name != PRESERVED_FILE {
                retry(&path, || fs::remove_file(&path))?;
            }
        }
        Ok(())
    }
}

/// Tries a plain recursive delete first, then falls back to deleting the
/// tree depth-first with each entry retried on its own.
fn remove_dir_with_retry(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => return Ok(()),
        Err(e) => debug!("Recursive delete of {} failed ({}), retrying depth-first", dir.display(), e),
    }

    for entry in WalkDir::new(dir).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => continue,
            Err(e) => {
                let path = e.path().unwrap_or(dir).to_path_buf();
                return Err(Error::Clean { path, source: e.into() });
            }
        };
        let path = entry.path();
        if entry.file_type().is_dir() {
            retry(path, || fs::remove_dir(path))?;
        } else {
            retry(path, || fs::remove_file(path))?;
        }
    }
    Ok(())
}

fn retry(path: &Path, mut op: impl FnMut() -> io::Result<()>) -> Result<()> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) if attempt < DELETE_ATTEMPTS => {
                warn!("Could not delete {} (attempt {}): {}", path.display(), attempt, e);
                attempt += 1;
                thread::sleep(RETRY_DELAY);
            }
            Err(source) => return Err(Error::Clean { path: path.to_path_buf(), source }),
        }
    }
}
