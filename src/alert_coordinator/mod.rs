//! AlertCoordinator - Alert Dispatch Orchestration
//!
//! ## Responsibilities
//!
//! - Decide when a detection set opens a new intrusion firing
//! - Orchestrate the firing sequence: write batch, notify, clear
//! - Keep firings serialized and their side effects ordered
//!
//! One firing runs write → notify → clear in strict order: the notifier
//! only ever attaches snapshots that are already durable, and cleanup can
//! only run after the send that used them has completed. Snapshot writes
//! within the batch run concurrently and are joined before the send.

use crate::alert_log::FiringRecord;
use crate::detection_source::{BoundingBox, TrackedDetection};
use crate::error::{Error, Result};
use crate::notifier::{Notifier, SnapshotAttachment};
use crate::snapshot_store::SnapshotStore;
use crate::video_source::{encode_jpeg, Frame};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Pixels kept above a detection box so heads stay in the snapshot
const CROP_HEADROOM_PX: u32 = 25;

/// Episode state: whether an intrusion population is currently alerted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    /// No active intrusion
    Idle,
    /// An intrusion population has been alerted
    Alerted { population: usize },
}

impl EpisodeState {
    /// Population at the time of the last firing (0 when idle)
    pub fn baseline(&self) -> usize {
        match self {
            EpisodeState::Idle => 0,
            EpisodeState::Alerted { population } => *population,
        }
    }
}

/// What one frame's detection set means for the episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Zero detections: the episode ends, baseline resets
    Reset,
    /// Count exceeds the baseline: a new firing
    Fire,
    /// Population present but not grown: nothing to do
    Hold,
}

/// Pure trigger rule: fires exactly when the count exceeds the baseline.
///
/// Covers the 0 -> N first-detection case since the idle baseline is 0.
pub fn decide(state: EpisodeState, count: usize) -> Decision {
    if count == 0 {
        Decision::Reset
    } else if count > state.baseline() {
        Decision::Fire
    } else {
        Decision::Hold
    }
}

/// Crop one detection out of the frame and encode it for the batch
fn crop_snapshot(frame: &Frame, bbox: &BoundingBox) -> Result<Vec<u8>> {
    let (width, height) = frame.image.dimensions();
    let (x, y, w, h) = bbox.pixel_rect(width, height, CROP_HEADROOM_PX);
    let crop = image::imageops::crop_imm(&frame.image, x, y, w, h).to_image();
    encode_jpeg(&crop)
}

/// AlertCoordinator instance
///
/// Owns the episode state exclusively; `evaluate` is the only mutation
/// point. Callers drive it one frame at a time, which serializes firings.
pub struct AlertCoordinator<N: Notifier> {
    store: Arc<SnapshotStore>,
    notifier: Arc<N>,
    state: EpisodeState,
    firing_seq: u64,
    send_timeout: Duration,
}

impl<N: Notifier> AlertCoordinator<N> {
    /// Create a new coordinator in the idle state
    pub fn new(store: Arc<SnapshotStore>, notifier: Arc<N>, send_timeout: Duration) -> Self {
        Self {
            store,
            notifier,
            state: EpisodeState::Idle,
            firing_seq: 0,
            send_timeout,
        }
    }

    /// Current episode state
    pub fn state(&self) -> EpisodeState {
        self.state
    }

    /// The notifier this coordinator delivers through
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Consume one frame's detection set.
    ///
    /// Returns the firing record when this frame triggered an alert. No
    /// alert-path failure surfaces as an error here; they degrade the
    /// firing and are captured in the record and the log.
    pub async fn evaluate(
        &mut self,
        frame: &Frame,
        detections: &[TrackedDetection],
    ) -> Option<FiringRecord> {
        let count = detections.len();

        match decide(self.state, count) {
            Decision::Reset => {
                if self.state != EpisodeState::Idle {
                    tracing::debug!("Episode ended, baseline reset");
                    self.state = EpisodeState::Idle;
                }
                None
            }
            Decision::Hold => None,
            Decision::Fire => {
                let record = self.fire(frame, detections).await;
                // Baseline advances whether or not the send succeeded, so a
                // failed notification is not re-fired every frame
                self.state = EpisodeState::Alerted { population: count };
                Some(record)
            }
        }
    }

    /// Run one firing: write batch, notify, clear
    async fn fire(&mut self, frame: &Frame, detections: &[TrackedDetection]) -> FiringRecord {
        self.firing_seq += 1;
        let firing_seq = self.firing_seq;
        let count = detections.len();

        tracing::info!(firing_seq, count, "Intrusion firing started");

        // (a) Persist the batch. Writes run concurrently; the join below is
        // the barrier that keeps the send from seeing a partial batch.
        let mut writes: JoinSet<Result<(u32, Vec<u8>)>> = JoinSet::new();
        let mut write_failures = 0usize;

        for detection in detections {
            match crop_snapshot(frame, &detection.bbox) {
                Ok(jpeg) => {
                    let store = self.store.clone();
                    let track_id = detection.track_id;
                    writes.spawn(async move {
                        store.put(firing_seq, track_id, &jpeg).await?;
                        Ok((track_id, jpeg))
                    });
                }
                Err(e) => {
                    write_failures += 1;
                    tracing::warn!(
                        firing_seq,
                        track_id = detection.track_id,
                        error = %e,
                        "Snapshot crop failed, attachment dropped"
                    );
                }
            }
        }

        let mut attachments: Vec<SnapshotAttachment> = Vec::with_capacity(count);
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok(Ok((track_id, jpeg))) => attachments.push(SnapshotAttachment {
                    filename: format!("intruder_{}.jpg", track_id),
                    data: jpeg,
                }),
                Ok(Err(e)) => {
                    write_failures += 1;
                    tracing::warn!(firing_seq, error = %e, "Snapshot write failed, attachment dropped");
                }
                Err(e) => {
                    write_failures += 1;
                    tracing::warn!(firing_seq, error = %e, "Snapshot write task aborted");
                }
            }
        }
        // Join order is completion order; keep attachments deterministic
        attachments.sort_by(|a, b| a.filename.cmp(&b.filename));

        // (b) One alert message for the firing, bounded so a hung transport
        // cannot stall the frame loop
        let sent = match tokio::time::timeout(
            self.send_timeout,
            self.notifier.send(count, &attachments),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(firing_seq, error = %e, "Alert notification failed, snapshots retained");
                false
            }
            Err(_) => {
                let e = Error::Notify(format!(
                    "send timed out after {}s",
                    self.send_timeout.as_secs()
                ));
                tracing::error!(firing_seq, error = %e, "Alert notification timed out, snapshots retained");
                false
            }
        };

        // (c) Clear only after the send that used the snapshots completed
        let cleared = if sent {
            let removed = self.store.clear_all().await;
            tracing::debug!(firing_seq, removed, "Snapshot batches cleared");
            Some(removed)
        } else {
            None
        };

        tracing::info!(
            firing_seq,
            count,
            attached = attachments.len(),
            write_failures,
            sent,
            "Intrusion firing finished"
        );

        FiringRecord {
            firing_seq,
            fired_at: Utc::now(),
            count,
            attached: attachments.len(),
            write_failures,
            sent,
            cleared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    fn frame(index: u64) -> Frame {
        Frame {
            image: RgbImage::from_pixel(64, 64, Rgb([10, 20, 30])),
            index,
        }
    }

    fn detection(track_id: u32) -> TrackedDetection {
        TrackedDetection {
            track_id,
            bbox: BoundingBox::new(4.0, 4.0, 40.0, 60.0),
        }
    }

    fn detections(ids: &[u32]) -> Vec<TrackedDetection> {
        ids.iter().copied().map(detection).collect()
    }

    /// Records each send; optionally fails; asserts every attachment is
    /// durable on disk at send time.
    struct RecordingNotifier {
        snapshot_root: PathBuf,
        fail: AtomicBool,
        calls: Mutex<Vec<(usize, Vec<String>)>>,
    }

    impl RecordingNotifier {
        fn new(snapshot_root: PathBuf) -> Self {
            Self {
                snapshot_root,
                fail: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn find_on_disk(root: &Path, filename: &str) -> Option<PathBuf> {
            for batch in std::fs::read_dir(root).ok()? {
                let candidate = batch.ok()?.path().join(filename);
                if candidate.exists() {
                    return Some(candidate);
                }
            }
            None
        }
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, count: usize, attachments: &[SnapshotAttachment]) -> Result<()> {
            // Every attachment must already be durable: the write barrier
            // ran before this call
            for attachment in attachments {
                let path = Self::find_on_disk(&self.snapshot_root, &attachment.filename)
                    .unwrap_or_else(|| panic!("{} not on disk at send time", attachment.filename));
                let on_disk = std::fs::read(path).unwrap();
                assert_eq!(on_disk, attachment.data, "send saw a partial write");
                assert!(!on_disk.is_empty());
            }

            self.calls.lock().await.push((
                count,
                attachments.iter().map(|a| a.filename.clone()).collect(),
            ));

            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Notify("mock send failure".to_string()));
            }
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    async fn make_coordinator(
        dir: &tempfile::TempDir,
    ) -> (AlertCoordinator<RecordingNotifier>, Arc<RecordingNotifier>) {
        let store = Arc::new(
            SnapshotStore::new(dir.path().to_path_buf())
                .await
                .unwrap(),
        );
        let notifier = Arc::new(RecordingNotifier::new(dir.path().to_path_buf()));
        (
            AlertCoordinator::new(store, notifier.clone(), Duration::from_secs(5)),
            notifier,
        )
    }

    #[test]
    fn test_decide_fires_only_above_baseline() {
        assert_eq!(decide(EpisodeState::Idle, 1), Decision::Fire);
        assert_eq!(decide(EpisodeState::Alerted { population: 1 }, 1), Decision::Hold);
        assert_eq!(decide(EpisodeState::Alerted { population: 1 }, 2), Decision::Fire);
        assert_eq!(decide(EpisodeState::Alerted { population: 2 }, 1), Decision::Hold);
        assert_eq!(decide(EpisodeState::Alerted { population: 2 }, 0), Decision::Reset);
        assert_eq!(decide(EpisodeState::Idle, 0), Decision::Reset);
    }

    #[tokio::test]
    async fn test_firing_indices_for_count_sequence() {
        // [0,1,1,2,2,0,1] fires at indices 1, 4, 6 only
        let dir = tempfile::tempdir().unwrap();
        let (mut coordinator, notifier) = make_coordinator(&dir).await;

        let counts = [0usize, 1, 1, 2, 2, 0, 1];
        let mut fired_at = Vec::new();
        for (index, &count) in counts.iter().enumerate() {
            let ids: Vec<u32> = (1..=count as u32).collect();
            let record = coordinator
                .evaluate(&frame(index as u64), &detections(&ids))
                .await;
            if record.is_some() {
                fired_at.push(index);
            }
        }

        assert_eq!(fired_at, vec![1, 4, 6]);
        assert_eq!(notifier.calls.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn test_zero_detections_resets_and_never_fires() {
        let dir = tempfile::tempdir().unwrap();
        let (mut coordinator, notifier) = make_coordinator(&dir).await;

        coordinator.evaluate(&frame(0), &detections(&[1, 2])).await;
        assert_eq!(coordinator.state().baseline(), 2);

        let record = coordinator.evaluate(&frame(1), &[]).await;
        assert!(record.is_none());
        assert_eq!(coordinator.state(), EpisodeState::Idle);
        assert_eq!(notifier.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_growing_episode_fires_twice_with_clear_between() {
        // [] -> [A] -> [A,B] -> [A,B] -> [] yields exactly two firings
        let dir = tempfile::tempdir().unwrap();
        let (mut coordinator, notifier) = make_coordinator(&dir).await;

        assert!(coordinator.evaluate(&frame(0), &[]).await.is_none());

        let first = coordinator
            .evaluate(&frame(1), &detections(&[1]))
            .await
            .expect("first firing");
        assert_eq!(first.count, 1);
        assert_eq!(first.attached, 1);
        // Post-send clear removed this firing's own batch
        assert_eq!(first.cleared, Some(1));

        let second = coordinator
            .evaluate(&frame(2), &detections(&[1, 2]))
            .await
            .expect("second firing");
        assert_eq!(second.count, 2);
        assert_eq!(second.attached, 2);
        assert_eq!(second.cleared, Some(1));

        assert!(coordinator
            .evaluate(&frame(3), &detections(&[1, 2]))
            .await
            .is_none());
        assert!(coordinator.evaluate(&frame(4), &[]).await.is_none());
        assert_eq!(coordinator.state(), EpisodeState::Idle);

        let calls = notifier.calls.lock().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (1, vec!["intruder_1.jpg".to_string()]));
        assert_eq!(
            calls[1],
            (
                2,
                vec!["intruder_1.jpg".to_string(), "intruder_2.jpg".to_string()]
            )
        );
    }

    #[tokio::test]
    async fn test_send_failure_skips_clear_and_advances_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let (mut coordinator, notifier) = make_coordinator(&dir).await;
        notifier.fail.store(true, Ordering::SeqCst);

        let record = coordinator
            .evaluate(&frame(0), &detections(&[1, 2, 3]))
            .await
            .expect("firing");

        assert!(!record.sent);
        assert_eq!(record.cleared, None);
        assert_eq!(record.count, 3);
        assert_eq!(coordinator.state().baseline(), 3);

        // Snapshots retained for diagnostics
        let batch = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .expect("orphaned batch dir")
            .unwrap();
        assert_eq!(std::fs::read_dir(batch.path()).unwrap().count(), 3);

        // A later successful firing uses a fresh batch and is not confused
        // with the orphaned one
        notifier.fail.store(false, Ordering::SeqCst);
        let record = coordinator
            .evaluate(&frame(1), &detections(&[1, 2, 3, 4]))
            .await
            .expect("re-fire");
        assert!(record.sent);
        assert_eq!(record.attached, 4);
        // Clear removed both the orphan and the new batch
        assert_eq!(record.cleared, Some(2));
    }

    #[tokio::test]
    async fn test_successful_firing_leaves_store_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (mut coordinator, _notifier) = make_coordinator(&dir).await;

        coordinator.evaluate(&frame(0), &detections(&[1])).await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_send_timeout_counts_as_failure() {
        struct HangingNotifier;

        #[async_trait::async_trait]
        impl Notifier for HangingNotifier {
            async fn send(&self, _count: usize, _attachments: &[SnapshotAttachment]) -> Result<()> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }

            async fn close(&self) -> Result<()> {
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SnapshotStore::new(dir.path().to_path_buf())
                .await
                .unwrap(),
        );
        let mut coordinator = AlertCoordinator::new(
            store,
            Arc::new(HangingNotifier),
            Duration::from_millis(50),
        );

        let record = coordinator
            .evaluate(&frame(0), &detections(&[1]))
            .await
            .expect("firing");
        assert!(!record.sent);
        assert_eq!(record.cleared, None);
        // Snapshot retained because cleanup was skipped
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
