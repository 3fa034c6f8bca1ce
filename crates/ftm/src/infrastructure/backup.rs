//! Durable on-disk [`BackupStore`].
//!
//! Each snapshot is stored as two files in the backup directory:
//!
//! - `<millis>-<uuid>.snapshot` – the raw payload bytes;
//! - `<millis>-<uuid>.toml`     – a [`SnapshotRecord`] describing it.
//!
//! The payload is written and synced before its record, so a record always
//! points at a complete payload.  Snapshot timestamps strictly increase
//! within a store, so file names sort in the order snapshots were taken.
//!
//! Writes to the active configuration go through a temporary file next to
//! the real file followed by a rename, so a crash mid-write never leaves a
//! truncated configuration behind.  A symlinked configuration is written
//! through the link, and the replaced file's permissions carry over.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use ftm_core::{Snapshot, SnapshotId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::ports::{BackupStore, StoreError};

/// Number of snapshots retained when not configured otherwise.
pub const DEFAULT_KEEP: usize = 5;

const PAYLOAD_EXT: &str = "snapshot";
const RECORD_EXT: &str = "toml";

/// Metadata stored next to every snapshot payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: SnapshotId,
    /// Milliseconds since the Unix epoch.
    pub taken_at_ms: u64,
    /// The configuration path the payload was read from.
    pub origin_path: PathBuf,
    /// `false` when there was no configuration to back up.
    pub existed: bool,
    /// Payload size in bytes.
    pub size: u64,
}

/// A retained snapshot as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub record: SnapshotRecord,
    pub payload_path: PathBuf,
    record_path: PathBuf,
}

impl SnapshotEntry {
    /// Returns `true` if the entry's id starts with `prefix` (case-insensitive).
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.record
            .id
            .to_string()
            .starts_with(&prefix.to_ascii_lowercase())
    }
}

/// Keeps snapshots in a directory and writes configurations atomically.
#[derive(Debug, Clone)]
pub struct FileBackupStore {
    dir: PathBuf,
    keep: usize,
}

impl FileBackupStore {
    /// Creates a store rooted at `dir` retaining `keep` snapshots (at least one).
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep: keep.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Retained snapshots, newest first.  Records that cannot be parsed or whose
    /// payload is missing are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the backup directory exists but cannot be read.
    pub fn list(&self) -> Result<Vec<SnapshotEntry>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&self.dir, err)),
        };

        let mut snapshots = Vec::new();
        for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            match read_record(&path) {
                Ok(record) => {
                    let payload_path = path.with_extension(PAYLOAD_EXT);
                    if payload_path.is_file() {
                        snapshots.push(SnapshotEntry {
                            record,
                            payload_path,
                            record_path: path,
                        });
                    } else {
                        warn!(record = %path.display(), "snapshot payload missing; skipped");
                    }
                }
                Err(err) => warn!(error = %err, "unreadable snapshot record skipped"),
            }
        }

        snapshots.sort_by(|a, b| {
            b.record
                .taken_at_ms
                .cmp(&a.record.taken_at_ms)
                .then_with(|| b.payload_path.cmp(&a.payload_path))
        });
        Ok(snapshots)
    }

    /// Reads a retained snapshot back into memory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the payload cannot be read.
    pub fn load(&self, entry: &SnapshotEntry) -> Result<Snapshot, StoreError> {
        let payload = fs::read(&entry.payload_path)
            .map_err(|err| StoreError::io(&entry.payload_path, err))?;
        let taken_at = UNIX_EPOCH + Duration::from_millis(entry.record.taken_at_ms);

        Ok(Snapshot {
            id: entry.record.id,
            taken_at,
            origin_path: entry.record.origin_path.clone(),
            payload,
            existed: entry.record.existed,
            location: Some(entry.payload_path.clone()),
        })
    }

    /// Removes all but the newest `keep` snapshots (at least one is always
    /// kept).  Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be listed.  Failures to
    /// remove individual files are logged and skipped.
    pub fn prune(&self, keep: usize) -> Result<usize, StoreError> {
        self.prune_except(keep.max(1), None)
    }

    /// Timestamp of the newest retained snapshot.
    fn newest_millis(&self) -> Option<u64> {
        self.list()
            .ok()?
            .first()
            .map(|entry| entry.record.taken_at_ms)
    }

    /// Like [`prune`](Self::prune), but never removes `protected`.
    fn prune_except(&self, keep: usize, protected: Option<SnapshotId>) -> Result<usize, StoreError> {
        let mut kept = 0;
        let mut removed = 0;
        for entry in self.list()? {
            if Some(entry.record.id) == protected || kept < keep {
                kept += 1;
                continue;
            }
            for path in [&entry.record_path, &entry.payload_path] {
                if let Err(err) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %err, "could not remove old snapshot file");
                }
            }
            debug!(snapshot = %entry.record.id, "old snapshot pruned");
            removed += 1;
        }
        Ok(removed)
    }

    fn file_stem(snapshot: &Snapshot) -> String {
        format!("{:013}-{}", snapshot.taken_at_millis(), snapshot.id)
    }
}

fn read_record(path: &Path) -> Result<SnapshotRecord, StoreError> {
    let text = fs::read_to_string(path).map_err(|err| StoreError::io(path, err))?;
    toml::from_str(&text).map_err(|err| StoreError::Metadata {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })
}

/// Creates (or truncates) `path`, writes `content` and syncs it to disk.
fn write_durable(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}

/// The file a write to `path` lands in.  Symlinks are followed, so writing
/// replaces the link's target and leaves the link itself in place.
fn write_target(path: &Path) -> Result<PathBuf, StoreError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => match fs::canonicalize(path) {
            Ok(target) => Ok(target),
            // Dangling link: write the file it names.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let link = fs::read_link(path).map_err(|err| StoreError::io(path, err))?;
                Ok(match path.parent() {
                    Some(dir) => dir.join(link),
                    None => link,
                })
            }
            Err(err) => Err(StoreError::io(path, err)),
        },
        _ => Ok(path.to_path_buf()),
    }
}

/// Replaces `path` with `content` via a synced temp file and a rename.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let target = write_target(path)?;
    let dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|err| StoreError::io(dir, err))?;
    let permissions = fs::metadata(&target).ok().map(|meta| meta.permissions());

    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    let written = write_durable(&temp_path, content).and_then(|()| match permissions {
        Some(permissions) => fs::set_permissions(&temp_path, permissions),
        None => Ok(()),
    });
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io(&temp_path, err));
    }
    if let Err(err) = fs::rename(&temp_path, &target) {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io(&target, err));
    }
    if target != path {
        debug!(link = %path.display(), target = %target.display(), "wrote through symlink");
    }
    Ok(())
}

/// Why a retained snapshot cannot be restored onto the active configuration.
#[derive(Debug, Error)]
pub enum RestoreSelectError {
    #[error("no snapshots of {} retained", .0.display())]
    NoSnapshots(PathBuf),

    #[error("no snapshot id starts with '{0}'")]
    NoMatch(String),

    #[error("snapshot id prefix '{0}' is ambiguous")]
    Ambiguous(String),

    #[error("snapshot {0} records that no configuration existed; nothing to restore")]
    NothingToRestore(SnapshotId),

    #[error(
        "snapshot {id} was taken of {}, not of the active configuration {}; \
         select it with --active {}",
        origin.display(),
        active.display(),
        origin.display()
    )]
    OtherConfig {
        id: SnapshotId,
        origin: PathBuf,
        active: PathBuf,
    },
}

/// Picks the snapshot to restore onto `active` from `entries` (newest first).
///
/// Without a prefix the newest snapshot of `active` is chosen.  A prefix must
/// match exactly one snapshot id, and that snapshot must have been taken of
/// `active`.  Snapshots recording an absent configuration are refused.
///
/// # Errors
///
/// Returns the [`RestoreSelectError`] describing why nothing can be restored.
pub fn select_restorable<'a>(
    entries: &'a [SnapshotEntry],
    prefix: Option<&str>,
    active: &Path,
) -> Result<&'a SnapshotEntry, RestoreSelectError> {
    let entry = match prefix {
        None => entries
            .iter()
            .find(|entry| entry.record.origin_path == active)
            .ok_or_else(|| RestoreSelectError::NoSnapshots(active.to_path_buf()))?,
        Some(prefix) => {
            let mut matching = entries.iter().filter(|entry| entry.matches_prefix(prefix));
            let entry = matching
                .next()
                .ok_or_else(|| RestoreSelectError::NoMatch(prefix.to_string()))?;
            if matching.next().is_some() {
                return Err(RestoreSelectError::Ambiguous(prefix.to_string()));
            }
            if entry.record.origin_path != active {
                return Err(RestoreSelectError::OtherConfig {
                    id: entry.record.id,
                    origin: entry.record.origin_path.clone(),
                    active: active.to_path_buf(),
                });
            }
            entry
        }
    };

    if !entry.record.existed {
        return Err(RestoreSelectError::NothingToRestore(entry.record.id));
    }
    Ok(entry)
}

impl BackupStore for FileBackupStore {
    fn snapshot(&self, path: &Path) -> Result<Snapshot, StoreError> {
        let content = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(StoreError::io(path, err)),
        };

        fs::create_dir_all(&self.dir).map_err(|err| StoreError::io(&self.dir, err))?;
        let mut snapshot = Snapshot::capture(path, content);
        if let Some(newest) = self.newest_millis() {
            if snapshot.taken_at_millis() <= newest {
                snapshot.taken_at = UNIX_EPOCH + Duration::from_millis(newest + 1);
            }
        }
        let stem = Self::file_stem(&snapshot);
        let payload_path = self.dir.join(format!("{stem}.{PAYLOAD_EXT}"));
        let record_path = self.dir.join(format!("{stem}.{RECORD_EXT}"));

        write_durable(&payload_path, &snapshot.payload)
            .map_err(|err| StoreError::io(&payload_path, err))?;

        let record = SnapshotRecord {
            id: snapshot.id,
            taken_at_ms: snapshot.taken_at_millis(),
            origin_path: snapshot.origin_path.clone(),
            existed: snapshot.existed,
            size: snapshot.payload.len() as u64,
        };
        let text = toml::to_string_pretty(&record).map_err(|err| StoreError::Metadata {
            path: record_path.clone(),
            detail: err.to_string(),
        })?;
        write_durable(&record_path, text.as_bytes())
            .map_err(|err| StoreError::io(&record_path, err))?;

        info!(
            snapshot = %snapshot.id,
            path = %payload_path.display(),
            existed = snapshot.existed,
            "snapshot stored"
        );

        // Pruning never blocks an apply; the new snapshot is already durable.
        if let Err(err) = self.prune_except(self.keep, Some(snapshot.id)) {
            warn!(error = %err, "pruning old snapshots failed");
        }

        Ok(snapshot.with_location(payload_path))
    }

    fn commit(&self, snapshot: &Snapshot, path: &Path, content: &[u8]) -> Result<(), StoreError> {
        if !snapshot.covers(path) {
            return Err(StoreError::SnapshotMismatch {
                id: snapshot.id,
                snapshot_path: snapshot.origin_path.clone(),
                path: path.to_path_buf(),
            });
        }
        write_atomic(path, content)?;
        debug!(path = %path.display(), bytes = content.len(), "configuration written");
        Ok(())
    }

    fn restore(&self, snapshot: &Snapshot, path: &Path) -> Result<(), StoreError> {
        if snapshot.existed {
            write_atomic(path, &snapshot.payload)?;
        } else {
            let target = write_target(path)?;
            match fs::remove_file(&target) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(StoreError::io(&target, err)),
            }
        }
        info!(path = %path.display(), snapshot = %snapshot.id, "snapshot restored");
        Ok(())
    }
}
