//! IntrusAlerts - Video Intrusion Watcher
//!
//! Main entry point for the watcher application.

use intrusalerts::{
    alert_coordinator::AlertCoordinator,
    alert_log::AlertLogService,
    detection_source::HttpDetectionSource,
    frame_loop::FrameLoop,
    notifier::EmailNotifier,
    snapshot_store::SnapshotStore,
    state::AppConfig,
    video_source::FfmpegFrameSource,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intrusalerts=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting IntrusAlerts v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    config.validate()?;
    tracing::info!(
        capture_url = %config.capture_url,
        detector_url = %config.detector_url,
        smtp_host = %config.smtp_host,
        snapshot_dir = %config.snapshot_dir.display(),
        send_timeout_sec = config.send_timeout.as_secs(),
        "Configuration loaded"
    );

    let ffmpeg_version = FfmpegFrameSource::check_ffmpeg().await?;
    tracing::info!(version = %ffmpeg_version, "ffmpeg available");

    // Initialize components
    let store = Arc::new(SnapshotStore::new(config.snapshot_dir.clone()).await?);
    tracing::info!("SnapshotStore initialized");

    let notifier = Arc::new(EmailNotifier::new(
        &config.smtp_host,
        &config.from_email,
        &config.to_email,
        &config.smtp_password,
    )?);
    tracing::info!(to = %config.to_email, "EmailNotifier initialized");

    let detection_source = Arc::new(HttpDetectionSource::new(config.detector_url.clone()));
    let alert_log = Arc::new(AlertLogService::default());
    let coordinator = AlertCoordinator::new(store, notifier, config.send_timeout);

    let frames = FfmpegFrameSource::new(
        config.capture_url.clone(),
        config.capture_timeout,
        config.capture_width,
    );

    // ctrl-c triggers a graceful drain: an in-flight firing finishes its
    // write/notify/clear sequence before the loop tears down
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Stop signal received");
            let _ = stop_tx.send(true);
        }
    });

    let frame_loop = FrameLoop::new(frames, detection_source, coordinator, alert_log, stop_rx);
    frame_loop.run().await?;

    Ok(())
}
