//! Uploaded bytes below `<data_dir>/files`, grouped by upload date.
//!
//! Locations handed out and accepted here are relative to the files root and
//! use `/` separators, which is also how they are stored in clip records.

use crate::types::{ContentHash, sanitize_filename};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::warn;

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum FileStorageError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("File name is not valid UTF-8")]
        NonUtf8FileName,
    }
}

use error::FileStorageError;

pub struct FileStorage {
    pub files_path: PathBuf,
}

/// A file found while walking the files root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: String,
    pub modified: SystemTime,
}

/// Upload operations.
impl FileStorage {
    /// Returns a fresh relative location for an upload named `filename`,
    /// creating its date directory.
    ///
    /// Layout is `YYYY/MM/DD/<16 hex>_<sanitized name>` with the UTC date of `now`.
    pub fn reserve_upload_path(
        &self,
        now: SystemTime,
        filename: &str,
    ) -> Result<String, FileStorageError> {
        let date = DateTime::<Utc>::from(now).format("%Y/%m/%d").to_string();
        std::fs::create_dir_all(self.files_path.join(&date))?;

        let token: u64 = rand::random();
        Ok(format!(
            "{date}/{token:016x}_{}",
            sanitize_filename(filename)
        ))
    }

    /// Converts a path below the files root into its stored form.
    pub fn relative(&self, absolute: &Path) -> Result<String, FileStorageError> {
        let rel = absolute.strip_prefix(&self.files_path).unwrap_or(absolute);
        let parts = rel
            .components()
            .map(|c| c.as_os_str().to_str().ok_or(FileStorageError::NonUtf8FileName))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join("/"))
    }
}

/// File access.
impl FileStorage {
    pub fn absolute(&self, rel: &str) -> PathBuf {
        rel.split('/').fold(self.files_path.clone(), |path, part| path.join(part))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.absolute(rel).is_file()
    }

    pub fn open(&self, rel: &str) -> std::io::Result<File> {
        File::open(self.absolute(rel))
    }

    /// Hashes the bytes at `rel` and returns them with their length.
    pub fn measure(&self, rel: &str) -> std::io::Result<(ContentHash, u64)> {
        let path = self.absolute(rel);
        let hash = ContentHash::of_file(&path)?;
        let size = std::fs::metadata(&path)?.len();
        Ok((hash, size))
    }

    /// Deletes the file at `rel`. Returns `false` if it was already gone.
    pub fn remove(&self, rel: &str) -> Result<bool, FileStorageError> {
        match std::fs::remove_file(self.absolute(rel)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Cleanup operations.
impl FileStorage {
    /// Lists every regular file below the files root.
    pub fn list_files(&self) -> Result<Vec<StoredFile>, FileStorageError> {
        let mut files = Vec::new();
        if self.files_path.exists() {
            self.collect_files(&self.files_path, &mut files)?;
        }
        Ok(files)
    }

    fn collect_files(&self, dir: &Path, out: &mut Vec<StoredFile>) -> Result<(), FileStorageError> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();

            if file_type.is_dir() {
                self.collect_files(&path, out)?;
            } else if file_type.is_file() {
                let Ok(rel) = self.relative(&path) else {
                    warn!(path = %path.display(), "skipping file with non UTF-8 name");
                    continue;
                };
                out.push(StoredFile {
                    path: rel,
                    modified: entry.metadata()?.modified()?,
                });
            }
        }
        Ok(())
    }

    /// Removes empty directories below the files root, deepest first.
    ///
    /// The root itself is kept, as is any directory modified within `grace`
    /// of `now`. Returns how many directories were removed.
    pub fn remove_empty_dirs(&self, now: SystemTime, grace: Duration) -> usize {
        if !self.files_path.is_dir() {
            return 0;
        }
        let mut removed = 0;
        Self::prune_dir(&self.files_path, now, grace, &mut removed);
        removed
    }

    /// Returns whether `dir` still has entries after pruning its children.
    fn prune_dir(dir: &Path, now: SystemTime, grace: Duration, removed: &mut usize) -> bool {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to read directory");
                return true;
            }
        };

        let mut non_empty = false;
        for entry in entries {
            let Ok(entry) = entry else {
                non_empty = true;
                continue;
            };
            let path = entry.path();
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());

            if !is_dir || Self::prune_dir(&path, now, grace, removed) {
                non_empty = true;
                continue;
            }

            if Self::is_recent(&path, now, grace) {
                non_empty = true;
                continue;
            }

            match std::fs::remove_dir(&path) {
                Ok(()) => *removed += 1,
                Err(e) => {
                    warn!(dir = %path.display(), error = %e, "failed to remove empty directory");
                    non_empty = true;
                }
            }
        }

        non_empty
    }

    fn is_recent(path: &Path, now: SystemTime, grace: Duration) -> bool {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(|modified| now.duration_since(modified).map(|age| age < grace).unwrap_or(true))
            .unwrap_or(true)
    }
}
