//! Application configuration
//!
//! Environment-driven settings, loaded once at startup

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Capture source handed to ffmpeg: RTSP URL, device path or file
    pub capture_url: String,
    /// Detection/tracking server base URL
    pub detector_url: String,
    /// SMTP relay host
    pub smtp_host: String,
    /// Sender address (doubles as the SMTP login)
    pub from_email: String,
    /// Recipient address
    pub to_email: String,
    /// SMTP password
    pub smtp_password: String,
    /// Directory snapshot batches are written under
    pub snapshot_dir: PathBuf,
    /// Upper bound on one notification send
    pub send_timeout: Duration,
    /// Timeout for one ffmpeg frame grab
    pub capture_timeout: Duration,
    /// Width frames are scaled to at capture
    pub capture_width: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture_url: std::env::var("INTRUSALERTS_CAPTURE_URL")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            detector_url: std::env::var("INTRUSALERTS_DETECTOR_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            smtp_host: std::env::var("INTRUSALERTS_SMTP_HOST")
                .unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            from_email: std::env::var("INTRUSALERTS_FROM_EMAIL").unwrap_or_default(),
            to_email: std::env::var("INTRUSALERTS_TO_EMAIL").unwrap_or_default(),
            smtp_password: std::env::var("INTRUSALERTS_PASSWORD").unwrap_or_default(),
            snapshot_dir: std::env::var("INTRUSALERTS_SNAPSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./images")),
            send_timeout: Duration::from_secs(
                std::env::var("INTRUSALERTS_SEND_TIMEOUT_SEC")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            capture_timeout: Duration::from_secs(
                std::env::var("INTRUSALERTS_CAPTURE_TIMEOUT_SEC")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            capture_width: std::env::var("INTRUSALERTS_CAPTURE_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(640),
        }
    }
}

impl AppConfig {
    /// Reject configurations that cannot possibly deliver an alert
    pub fn validate(&self) -> Result<()> {
        if self.from_email.is_empty() {
            return Err(Error::Config(
                "INTRUSALERTS_FROM_EMAIL is not set".to_string(),
            ));
        }
        if self.to_email.is_empty() {
            return Err(Error::Config("INTRUSALERTS_TO_EMAIL is not set".to_string()));
        }
        if self.smtp_password.is_empty() {
            return Err(Error::Config("INTRUSALERTS_PASSWORD is not set".to_string()));
        }
        Ok(())
    }
}
