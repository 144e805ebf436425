//! IntrusAlerts - Video Intrusion Watcher
//!
//! Watches a video stream for intruding persons and emails snapshot alerts
//! the first time a new intrusion episode is observed, suppressing repeat
//! alerts while the same tracked population remains in frame.
//!
//! ## Architecture (7 Components)
//!
//! 1. VideoSource - Frame acquisition (ffmpeg adapter)
//! 2. DetectionSource - Tracked person detection boundary (HTTP adapter)
//! 3. AlertCoordinator - Firing decision and write/notify/clear orchestration
//! 4. SnapshotStore - Firing-scoped snapshot batches
//! 5. Notifier - Alert delivery (SMTP adapter)
//! 6. AlertLog - Recent firing records (ring buffer)
//! 7. FrameLoop - Capture-order orchestration glue
//!
//! ## Design Principles
//!
//! - Firings are serialized: write batch, then notify, then clear
//! - Alert-path failures degrade and log; only capture/detector failures
//!   stop the loop

pub mod alert_coordinator;
pub mod alert_log;
pub mod detection_source;
pub mod error;
pub mod frame_loop;
pub mod notifier;
pub mod snapshot_store;
pub mod state;
pub mod video_source;

pub use error::{Error, Result};
pub use state::AppConfig;
