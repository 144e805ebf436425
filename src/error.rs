//! Error handling for the intrusion watcher

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame capture or detector failure. Fatal: the frame loop stops.
    #[error("Detection unavailable: {0}")]
    Detection(String),

    /// Per-item snapshot write failure. Non-fatal: the firing proceeds
    /// with a degraded attachment set.
    #[error("Snapshot write failed for track {track_id}: {message}")]
    SnapshotWrite { track_id: u32, message: String },

    /// Notification delivery failure. Non-fatal: cleanup is skipped for
    /// that firing and the snapshots are retained.
    #[error("Notification failed: {0}")]
    Notify(String),

    /// Snapshot cleanup failure. Non-fatal, never blocks the next frame.
    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
