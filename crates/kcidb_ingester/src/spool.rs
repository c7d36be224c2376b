//! Spool directory layout and file moves.
//!
//! ```text
//! <root>/            pending submissions (*.json)
//! <root>/archive/    ingested, byte-for-byte
//! <root>/failed/     quarantined, byte-for-byte
//! ```

use crate::error::{ConfigError, SpoolError};
use crate::lifecycle::SpoolState;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const ARCHIVE_DIR: &str = "archive";
pub const FAILED_DIR: &str = "failed";
pub const DEFAULT_SUFFIX: &str = ".json";

const WRITE_CHECK_FILE: &str = ".kcidb-ingester-write-check";

/// A candidate file in the spool root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Verified spool directories.
#[derive(Debug, Clone)]
pub struct SpoolDirs {
    root: PathBuf,
    archive: PathBuf,
    failed: PathBuf,
    suffix: String,
}

impl SpoolDirs {
    /// Make sure the root, `failed/` and `archive/` exist and are writable.
    pub fn verify(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let root = root.into();
        let dirs = Self {
            archive: root.join(ARCHIVE_DIR),
            failed: root.join(FAILED_DIR),
            root,
            suffix: DEFAULT_SUFFIX.to_string(),
        };

        verify_dir(&dirs.root)?;
        verify_dir(&dirs.failed)?;
        verify_dir(&dirs.archive)?;
        Ok(dirs)
    }

    /// Only pick up files ending with `suffix`.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive
    }

    pub fn failed_dir(&self) -> &Path {
        &self.failed
    }

    /// Regular files in the root carrying the suffix, in directory order.
    pub fn pending_files(&self) -> Result<Vec<SpoolFile>, SpoolError> {
        let list_err = |source| SpoolError::List {
            path: self.root.clone(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(list_err)? {
            let entry = entry.map_err(list_err)?;
            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };
            if !name.ends_with(&self.suffix) {
                continue;
            }
            // Follows symlinks: a link to a regular file is ingested and the
            // link itself is what gets moved. Producers may remove files under
            // us; skip what we cannot stat.
            let Ok(metadata) = fs::metadata(entry.path()) else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            files.push(SpoolFile {
                path: entry.path(),
                name,
                size: metadata.len(),
            });
        }
        Ok(files)
    }

    /// Perform the filesystem side effect of a terminal state.
    ///
    /// Returns where the file ended up (`None` once deleted).
    pub fn apply(&self, file: &SpoolFile, state: SpoolState) -> Result<Option<PathBuf>, SpoolError> {
        let target_dir = match state {
            SpoolState::Archived => &self.archive,
            SpoolState::Failed => &self.failed,
            SpoolState::Deleted => {
                fs::remove_file(&file.path).map_err(|source| SpoolError::Remove {
                    path: file.path.clone(),
                    source,
                })?;
                debug!(file = %file.name, "Removed empty file");
                return Ok(None);
            }
            SpoolState::Pending | SpoolState::Processing => {
                return Err(SpoolError::NotTerminal(state));
            }
        };

        let destination = target_dir.join(&file.name);
        fs::rename(&file.path, &destination).map_err(|source| SpoolError::Move {
            from: file.path.clone(),
            to: destination.clone(),
            source,
        })?;
        debug!(file = %file.name, to = %destination.display(), "Moved spool file");
        Ok(Some(destination))
    }
}

fn verify_dir(dir: &Path) -> Result<(), ConfigError> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "Directory does not exist, creating it");
        fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        info!(dir = %dir.display(), "Directory created");
    }
    if !dir.is_dir() {
        return Err(ConfigError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    check_writable(dir)?;
    info!(dir = %dir.display(), "Directory is valid and writable");
    Ok(())
}

fn check_writable(dir: &Path) -> Result<(), ConfigError> {
    let marker = dir.join(WRITE_CHECK_FILE);
    let not_writable = |source| ConfigError::NotWritable {
        path: dir.to_path_buf(),
        source,
    };

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&marker)
        .map_err(not_writable)?;
    fs::remove_file(&marker).map_err(not_writable)?;
    Ok(())
}
