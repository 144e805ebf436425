//! VideoSource - Frame Acquisition
//!
//! ## Responsibilities
//!
//! - Frame grabs from an RTSP URL, capture device or file via ffmpeg
//! - JPEG decode into frames the pipeline can crop
//! - ffmpeg availability probe at startup

use crate::error::{Error, Result};
use image::RgbImage;
use std::time::Duration;
use tokio::process::Command;

/// One captured frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded pixels
    pub image: RgbImage,
    /// Monotonic capture index
    pub index: u64,
}

/// Encode pixels as JPEG for transport and snapshot persistence
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90);
    encoder.encode_image(image)?;
    Ok(buf)
}

/// Boundary to frame acquisition.
///
/// Frames come back in capture order; `None` means the stream ended.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Pull the next frame
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Frame source that grabs single frames with ffmpeg
///
/// One grab per call keeps the source stateless between frames: an
/// unresponsive camera costs one timeout, never a wedged decoder.
pub struct FfmpegFrameSource {
    capture_url: String,
    timeout: Duration,
    scale_width: u32,
    next_index: u64,
}

impl FfmpegFrameSource {
    /// Create a new source for the given capture URL
    pub fn new(capture_url: String, timeout: Duration, scale_width: u32) -> Self {
        Self {
            capture_url,
            timeout,
            scale_width,
            next_index: 0,
        }
    }

    /// Grab one frame as JPEG bytes
    ///
    /// Uses kill_on_drop(true) so that when the timeout cancels the wait,
    /// dropping the Child sends SIGKILL to ffmpeg. This prevents zombie
    /// ffmpeg processes from accumulating when the camera is unresponsive.
    async fn grab_jpeg(&self) -> Result<Option<Vec<u8>>> {
        use std::process::Stdio;

        let mut args: Vec<String> = Vec::new();
        // TCP transport only applies to RTSP sources
        if self.capture_url.starts_with("rtsp://") {
            args.extend(["-rtsp_transport".to_string(), "tcp".to_string()]);
        }
        args.extend([
            "-i".to_string(),
            self.capture_url.clone(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale={}:-1", self.scale_width),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-vcodec".to_string(),
            "mjpeg".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-".to_string(),
        ]);

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Detection(format!("ffmpeg spawn failed: {}", e)))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Detection(format!(
                        "ffmpeg failed: {}",
                        stderr.trim()
                    )));
                }

                if output.stdout.is_empty() {
                    // Clean exit with no frame: the stream ended
                    return Ok(None);
                }

                Ok(Some(output.stdout))
            }
            Ok(Err(e)) => Err(Error::Detection(format!("ffmpeg execution failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    timeout_sec = self.timeout.as_secs(),
                    capture_url = %self.capture_url,
                    "ffmpeg grab timeout, process killed via kill_on_drop"
                );
                Err(Error::Detection(format!(
                    "frame grab timeout ({}s)",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    /// Check if ffmpeg is available
    pub async fn check_ffmpeg() -> Result<String> {
        let output = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::Detection(format!("ffmpeg not found: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Detection(
                "ffmpeg version check failed".to_string(),
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        let first_line = version.lines().next().unwrap_or("unknown");
        Ok(first_line.to_string())
    }
}

#[async_trait::async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(jpeg) = self.grab_jpeg().await? else {
            return Ok(None);
        };

        let image = image::load_from_memory(&jpeg)
            .map_err(|e| Error::Detection(format!("frame decode failed: {}", e)))?
            .to_rgb8();

        let index = self.next_index;
        self.next_index += 1;

        tracing::debug!(
            index,
            width = image.width(),
            height = image.height(),
            "Frame captured"
        );

        Ok(Some(Frame { image, index }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_encode_jpeg_roundtrip() {
        let image = RgbImage::from_pixel(32, 24, Rgb([120, 30, 200]));
        let jpeg = encode_jpeg(&image).unwrap();
        assert!(!jpeg.is_empty());

        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (32, 24));
    }

    #[tokio::test]
    async fn test_check_ffmpeg() {
        // Probe only verifies the error shape when ffmpeg is missing;
        // the success path needs ffmpeg on PATH
        match FfmpegFrameSource::check_ffmpeg().await {
            Ok(version) => assert!(!version.is_empty()),
            Err(e) => assert!(e.to_string().contains("ffmpeg")),
        }
    }
}
