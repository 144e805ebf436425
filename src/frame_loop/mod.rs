//! FrameLoop - Capture and Evaluation Orchestration
//!
//! ## Responsibilities
//!
//! - Pull frames in capture order and run detection on each
//! - Forward detection sets to the AlertCoordinator, one frame at a time
//! - Graceful drain on stop: an in-flight firing finishes before teardown
//!
//! The decision step for frame N+1 is not taken until firing N has fully
//! completed, because `evaluate` is awaited inline. That is the
//! back-pressure that keeps firings from ever overlapping.

use crate::alert_coordinator::AlertCoordinator;
use crate::alert_log::AlertLogService;
use crate::detection_source::DetectionSource;
use crate::error::Result;
use crate::notifier::Notifier;
use crate::video_source::FrameSource;
use std::sync::Arc;
use tokio::sync::watch;

/// FrameLoop instance
pub struct FrameLoop<F, D, N>
where
    F: FrameSource,
    D: DetectionSource,
    N: Notifier,
{
    frame_source: F,
    detection_source: Arc<D>,
    coordinator: AlertCoordinator<N>,
    alert_log: Arc<AlertLogService>,
    stop: watch::Receiver<bool>,
}

impl<F, D, N> FrameLoop<F, D, N>
where
    F: FrameSource,
    D: DetectionSource,
    N: Notifier,
{
    /// Create a new loop; `stop` signals a graceful drain
    pub fn new(
        frame_source: F,
        detection_source: Arc<D>,
        coordinator: AlertCoordinator<N>,
        alert_log: Arc<AlertLogService>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            frame_source,
            detection_source,
            coordinator,
            alert_log,
            stop,
        }
    }

    /// Run until the stream ends, a stop is signalled, or a fatal
    /// capture/detector error occurs.
    ///
    /// The notifier session is closed after the drain in every case.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!("Frame loop started");

        let result = self.drive().await;

        if let Err(e) = self.coordinator.notifier().close().await {
            tracing::warn!(error = %e, "Notifier close failed");
        }
        tracing::info!("Frame loop stopped");

        result
    }

    async fn drive(&mut self) -> Result<()> {
        loop {
            // A dropped stop sender also means the process is shutting down
            let frame = tokio::select! {
                biased;
                _ = self.stop.changed() => {
                    tracing::info!("Stop signalled, draining frame loop");
                    return Ok(());
                }
                frame = self.frame_source.next_frame() => frame?,
            };

            let Some(frame) = frame else {
                tracing::info!("Frame stream ended");
                return Ok(());
            };

            // Capture or detector failure is fatal; alert-path failures
            // never surface here
            let detections = self.detection_source.detect(&frame).await?;

            // Awaited inline: firing N completes before frame N+1's
            // decision step, and a stop cannot cancel an in-flight firing
            if let Some(record) = self.coordinator.evaluate(&frame, &detections).await {
                self.alert_log.record(record).await;
            }
        }
    }
}
