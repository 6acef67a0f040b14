//! Passthrough copy of static files.
//!
//! Configured sources are copied into the output directory unmodified,
//! keeping their path relative to the project root.

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::deps::normalize_path;

/// Passthrough copy errors.
#[derive(Debug, Error)]
pub enum PassthroughError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Source path is outside the project root.
    #[error("invalid passthrough path: {0}")]
    InvalidPath(PathBuf),
}

/// Result type for passthrough operations.
pub type Result<T> = std::result::Result<T, PassthroughError>;

/// Copies configured files and directories into the output.
#[derive(Debug, Clone)]
pub struct PassthroughCopy {
    root: PathBuf,
    sources: Vec<PathBuf>,
}

impl PassthroughCopy {
    /// Create a copier for `sources`, given relative to `root`.
    #[must_use]
    pub fn new<I, S>(root: impl Into<PathBuf>, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let root = root.into();
        let sources = sources
            .into_iter()
            .map(|source| root.join(source.as_ref()))
            .collect();
        Self { root, sources }
    }

    /// Absolute (root-joined) source paths.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Whether `path` is one of the sources or inside one.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        self.sources
            .iter()
            .any(|source| path.starts_with(normalize_path(source)))
    }

    /// Copy every source into `dest`. Returns the number of files copied.
    pub fn copy_all(&self, dest: &Path) -> Result<usize> {
        let mut copied = 0;
        for source in &self.sources {
            copied += self.copy_source(source, dest)?;
        }

        info!(count = copied, "passthrough files copied");
        Ok(copied)
    }

    /// Copy only the sources that contain one of `changed`.
    pub fn copy_matching(&self, dest: &Path, changed: &[PathBuf]) -> Result<usize> {
        let changed: Vec<PathBuf> = changed.iter().map(|p| normalize_path(p)).collect();

        let mut copied = 0;
        for source in &self.sources {
            let normalized = normalize_path(source);
            if changed.iter().any(|path| path.starts_with(&normalized)) {
                copied += self.copy_source(source, dest)?;
            }
        }

        if copied > 0 {
            debug!(count = copied, "passthrough files refreshed");
        }
        Ok(copied)
    }

    fn copy_source(&self, source: &Path, dest: &Path) -> Result<usize> {
        if !source.exists() {
            debug!(source = %source.display(), "passthrough source does not exist, skipping");
            return Ok(0);
        }

        if source.is_file() {
            self.copy_file(source, dest)?;
            return Ok(1);
        }

        self.copy_dir(source, dest)
    }

    /// Recursively copy a directory, skipping hidden entries.
    fn copy_dir(&self, dir: &Path, dest: &Path) -> Result<usize> {
        let mut copied = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();

            if is_hidden(&path) {
                continue;
            }

            if path.is_dir() {
                copied += self.copy_dir(&path, dest)?;
            } else if path.is_file() {
                self.copy_file(&path, dest)?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    fn copy_file(&self, file: &Path, dest: &Path) -> Result<()> {
        let relative = file
            .strip_prefix(&self.root)
            .map_err(|_| PassthroughError::InvalidPath(file.to_path_buf()))?;
        let dest_path = dest.join(relative);

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(file, &dest_path)?;

        debug!(src = %file.display(), dest = %dest_path.display(), "copied file");
        Ok(())
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}
