//! SnapshotStore - Alert Snapshot Persistence
//!
//! ## Responsibilities
//!
//! - Durable per-track snapshot writes, scoped to a firing batch
//! - Best-effort bulk clear of persisted batches
//!
//! Each firing writes into its own `firing-<seq>` subdirectory, so a stale
//! clear can never delete another firing's writes and an orphaned batch
//! from a failed send is never confused with a later one.

use crate::error::{Error, Result};
use std::path::PathBuf;
use tokio::fs;

/// SnapshotStore instance
pub struct SnapshotStore {
    /// Root directory batches are written under
    root: PathBuf,
}

impl SnapshotStore {
    /// Create a new store, ensuring the root directory exists
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Directory a firing's batch is written into
    pub fn batch_dir(&self, firing_seq: u64) -> PathBuf {
        self.root.join(format!("firing-{:06}", firing_seq))
    }

    /// Persist one cropped snapshot into a firing's batch.
    ///
    /// The write is durable (visible to a subsequent read) before this
    /// returns. Returns the path of the written file.
    pub async fn put(&self, firing_seq: u64, track_id: u32, data: &[u8]) -> Result<PathBuf> {
        let dir = self.batch_dir(firing_seq);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::SnapshotWrite {
                track_id,
                message: format!("batch dir: {}", e),
            })?;

        let path = dir.join(format!("intruder_{}.jpg", track_id));
        fs::write(&path, data)
            .await
            .map_err(|e| Error::SnapshotWrite {
                track_id,
                message: e.to_string(),
            })?;

        tracing::debug!(
            firing_seq,
            track_id,
            path = %path.display(),
            size = data.len(),
            "Snapshot written"
        );

        Ok(path)
    }

    /// Remove every persisted batch.
    ///
    /// Best effort per item: a failure to remove one entry does not abort
    /// removal of the rest. Returns the number of entries removed.
    pub async fn clear_all(&self) -> usize {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                let err = Error::Cleanup(format!("{}: {}", self.root.display(), e));
                tracing::warn!(error = %err, "Snapshot clear could not list root");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    let result = if path.is_dir() {
                        fs::remove_dir_all(&path).await
                    } else {
                        fs::remove_file(&path).await
                    };

                    match result {
                        Ok(()) => removed += 1,
                        Err(e) => {
                            let err = Error::Cleanup(format!("{}: {}", path.display(), e));
                            tracing::warn!(error = %err, "Snapshot clear entry failed");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let err = Error::Cleanup(format!("{}: {}", self.root.display(), e));
                    tracing::warn!(error = %err, "Snapshot clear aborted while listing");
                    break;
                }
            }
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().to_path_buf()).await.unwrap();

        let path = store.put(1, 7, b"jpeg-bytes").await.unwrap();
        let read_back = fs::read(&path).await.unwrap();
        assert_eq!(read_back, b"jpeg-bytes");
        assert!(path.ends_with("firing-000001/intruder_7.jpg"));
    }

    #[tokio::test]
    async fn test_batches_are_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().to_path_buf()).await.unwrap();

        let a = store.put(1, 7, b"a").await.unwrap();
        let b = store.put(2, 7, b"b").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(fs::read(&a).await.unwrap(), b"a");
        assert_eq!(fs::read(&b).await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_clear_all_removes_every_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().to_path_buf()).await.unwrap();

        store.put(1, 1, b"x").await.unwrap();
        store.put(1, 2, b"y").await.unwrap();
        store.put(2, 1, b"z").await.unwrap();

        // Two batch directories, each removed as one entry
        assert_eq!(store.clear_all().await, 2);

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_all_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(store.clear_all().await, 0);
    }
}
