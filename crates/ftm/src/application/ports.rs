//! Ports: the traits the application layer depends on.
//!
//! Each trait is implemented once in `infrastructure` against the real file
//! system or a real subprocess, and again in tests by fakes that record calls
//! or fail on demand.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use ftm_core::{ApplyError, ProbeOutcome, Snapshot, SnapshotId, ThemeDescriptor, ThemeOrigin};
use thiserror::Error;

/// Finds the active configuration and the candidate themes.
pub trait ConfigLocator: Send + Sync {
    /// Resolves the single active configuration path.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::NotFound`] when no path can be determined.
    fn locate(&self) -> Result<PathBuf, ApplyError>;

    /// Lists themes across all search roots, deduplicated by precedence and
    /// optionally restricted to one origin.
    fn discover(&self, origin: Option<ThemeOrigin>) -> Vec<ThemeDescriptor>;

    /// Describes an arbitrary file as an ad-hoc user theme, if it is a regular file.
    fn describe_file(&self, path: &Path) -> Option<ThemeDescriptor>;

    /// Reads the content of a theme.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::NotFound`] if the file vanished since discovery,
    /// or [`ApplyError::Io`] for other read failures.
    fn read_theme(&self, theme: &ThemeDescriptor) -> Result<Vec<u8>, ApplyError>;
}

/// Error type for backup store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A write was attempted on a path the given snapshot does not cover.
    #[error(
        "snapshot {id} was taken of {} and cannot guard a write to {}",
        snapshot_path.display(),
        path.display()
    )]
    SnapshotMismatch {
        id: SnapshotId,
        snapshot_path: PathBuf,
        path: PathBuf,
    },

    /// Snapshot metadata could not be read or written.
    #[error("snapshot metadata {} is invalid: {detail}", path.display())]
    Metadata { path: PathBuf, detail: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// The path the failed operation was about.
    pub fn path(&self) -> &Path {
        match self {
            StoreError::Io { path, .. }
            | StoreError::SnapshotMismatch { path, .. }
            | StoreError::Metadata { path, .. } => path,
        }
    }
}

impl From<StoreError> for ApplyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io { path, source } => ApplyError::Io { path, source },
            other => ApplyError::Io {
                path: other.path().to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
            },
        }
    }
}

/// Creates, holds and restores snapshots of the active configuration.
///
/// `commit` and `restore` take the [`Snapshot`] by reference: new content
/// can only be written by a caller that already holds a snapshot of the
/// same path.
pub trait BackupStore: Send + Sync {
    /// Reads the full content at `path` and stores it durably.
    fn snapshot(&self, path: &Path) -> Result<Snapshot, StoreError>;

    /// Replaces the content at `path`; `snapshot` must have been taken of `path`.
    fn commit(&self, snapshot: &Snapshot, path: &Path, content: &[u8]) -> Result<(), StoreError>;

    /// Writes the snapshot's payload back to `path` (or removes `path` if the
    /// snapshot recorded that it did not exist).
    fn restore(&self, snapshot: &Snapshot, path: &Path) -> Result<(), StoreError>;
}

/// Runs the display program once against a configuration and classifies the result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    /// Checks that the program can be started at all.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::NotFound`] if the program is not installed.
    fn ensure_available(&self) -> Result<(), ApplyError>;

    /// Runs the program against `config_path`, killing it once `timeout` elapses.
    async fn run(&self, config_path: &Path, timeout: Duration) -> ProbeOutcome;
}
