//! Snapshot of the active configuration.
//!
//! A [`Snapshot`] is taken before every apply attempt and is the only thing
//! that makes a rollback possible.  It records the exact bytes of the active
//! configuration, or the fact that no active configuration existed yet.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Unique identifier of a snapshot.
pub type SnapshotId = Uuid;

/// A saved copy of the active configuration's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Unique identifier, also used to name the durable copy.
    pub id: SnapshotId,
    /// When the snapshot was taken.
    pub taken_at: SystemTime,
    /// The configuration path the payload was read from.
    pub origin_path: PathBuf,
    /// Byte content of `origin_path` at snapshot time.  Empty if `existed` is false.
    pub payload: Vec<u8>,
    /// `false` when `origin_path` did not exist; restoring then removes the file.
    pub existed: bool,
    /// Durable on-disk copy of the payload, if the store keeps one.
    pub location: Option<PathBuf>,
}

impl Snapshot {
    /// Captures the content of `origin_path`.  `None` means the file was absent.
    pub fn capture(origin_path: impl Into<PathBuf>, content: Option<Vec<u8>>) -> Self {
        let existed = content.is_some();
        Self {
            id: Uuid::new_v4(),
            taken_at: SystemTime::now(),
            origin_path: origin_path.into(),
            payload: content.unwrap_or_default(),
            existed,
            location: None,
        }
    }

    /// Records where the durable copy of the payload lives.
    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Returns `true` if this snapshot was taken of `path`.
    ///
    /// Committing new content is only allowed for the path that was snapshotted.
    pub fn covers(&self, path: &Path) -> bool {
        self.origin_path == path
    }

    /// Milliseconds since the Unix epoch, used to order snapshots on disk.
    pub fn taken_at_millis(&self) -> u64 {
        self.taken_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_of_existing_file_keeps_payload() {
        let snap = Snapshot::capture("/cfg/config.jsonc", Some(b"{}".to_vec()));
        assert!(snap.existed);
        assert_eq!(snap.payload, b"{}");
        assert!(snap.location.is_none());
    }

    #[test]
    fn test_capture_of_missing_file_is_marked_absent() {
        let snap = Snapshot::capture("/cfg/config.jsonc", None);
        assert!(!snap.existed);
        assert!(snap.payload.is_empty());
    }

    #[test]
    fn test_covers_only_the_snapshotted_path() {
        let snap = Snapshot::capture("/cfg/config.jsonc", None);
        assert!(snap.covers(Path::new("/cfg/config.jsonc")));
        assert!(!snap.covers(Path::new("/cfg/other.jsonc")));
    }

    #[test]
    fn test_each_capture_gets_a_fresh_id() {
        let a = Snapshot::capture("/c", None);
        let b = Snapshot::capture("/c", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_with_location_records_durable_copy() {
        let snap = Snapshot::capture("/c", None).with_location("/backups/1.snapshot");
        assert_eq!(snap.location.as_deref(), Some(Path::new("/backups/1.snapshot")));
        assert!(snap.taken_at_millis() > 0);
    }
}
