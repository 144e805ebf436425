//! DetectionSource - Tracked Person Detection Boundary
//!
//! ## Responsibilities
//!
//! - Define the detection/tracking boundary: one frame in, tracked persons out
//! - HTTP adapter for an external detect+track server
//! - Person-class filtering on parse

use crate::error::{Error, Result};
use crate::video_source::{encode_jpeg, Frame};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Class label the pipeline cares about
const PERSON_LABEL: &str = "person";

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Clamp to an integer pixel rect inside a width x height frame.
    ///
    /// `headroom` extends the crop above y_min so heads sitting on the box
    /// edge stay in the snapshot. Degenerate boxes clamp to a 1px rect.
    pub fn pixel_rect(&self, width: u32, height: u32, headroom: u32) -> (u32, u32, u32, u32) {
        let x0 = (self.x_min.max(0.0) as u32).min(width.saturating_sub(1));
        let y0 = ((self.y_min - headroom as f32).max(0.0) as u32).min(height.saturating_sub(1));
        let x1 = (self.x_max.max(0.0) as u32).min(width);
        let y1 = (self.y_max.max(0.0) as u32).min(height);

        let w = x1.saturating_sub(x0).max(1);
        let h = y1.saturating_sub(y0).max(1);
        (x0, y0, w, h)
    }
}

/// One tracked person detection
///
/// Produced fresh each frame; the track id is tracker-assigned and stable
/// across consecutive frames for the same physical person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedDetection {
    pub track_id: u32,
    pub bbox: BoundingBox,
}

/// Boundary to the external detection/tracking model.
///
/// Implementations must return detections already filtered to persons.
#[async_trait::async_trait]
pub trait DetectionSource: Send + Sync {
    /// Run detection and tracking on one frame
    async fn detect(&self, frame: &Frame) -> Result<Vec<TrackedDetection>>;
}

/// Request metadata sent alongside the frame
#[derive(Debug, Clone, Serialize)]
struct DetectRequest {
    frame_index: u64,
    captured_at: String,
}

/// One detection as reported by the server
#[derive(Debug, Clone, Deserialize)]
struct WireDetection {
    track_id: u32,
    label: String,
    #[allow(dead_code)]
    conf: f32,
    /// x_min, y_min, x_max, y_max
    bbox: [f32; 4],
}

/// Detection server response
#[derive(Debug, Clone, Deserialize)]
struct DetectResponse {
    detections: Vec<WireDetection>,
}

/// Keep person-class detections only and lift them into pipeline types.
///
/// The server contract already filters to persons; this mirrors it so a
/// misconfigured model cannot leak other classes into the alert path.
fn parse_detections(response: DetectResponse) -> Vec<TrackedDetection> {
    response
        .detections
        .into_iter()
        .filter(|d| d.label == PERSON_LABEL)
        .map(|d| TrackedDetection {
            track_id: d.track_id,
            bbox: BoundingBox::new(d.bbox[0], d.bbox[1], d.bbox[2], d.bbox[3]),
        })
        .collect()
}

/// HTTP adapter for a detect+track server
pub struct HttpDetectionSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDetectionSource {
    /// Create a new adapter for the given server base URL
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }
}

#[async_trait::async_trait]
impl DetectionSource for HttpDetectionSource {
    async fn detect(&self, frame: &Frame) -> Result<Vec<TrackedDetection>> {
        let jpeg = encode_jpeg(&frame.image)?;

        let request = DetectRequest {
            frame_index: frame.index,
            captured_at: chrono::Utc::now().to_rfc3339(),
        };

        let form = Form::new()
            .part(
                "image",
                Part::bytes(jpeg)
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|e| Error::Detection(format!("multipart build failed: {}", e)))?,
            )
            .text("request", serde_json::to_string(&request)?);

        let url = format!("{}/v1/track", self.base_url);
        let resp = self.client.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Detection(format!(
                "detector returned {}",
                resp.status()
            )));
        }

        let response: DetectResponse = resp
            .json()
            .await
            .map_err(|e| Error::Detection(format!("detector response parse failed: {}", e)))?;

        let detections = parse_detections(response);
        tracing::debug!(
            frame_index = frame.index,
            count = detections.len(),
            "Detections received"
        );

        Ok(detections)
    }
}
