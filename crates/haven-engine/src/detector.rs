//! External detector client.
//!
//! The detector is a separate inference service with a narrow contract: one
//! JPEG frame in, labelled bounding boxes out. The engine only consumes
//! person-labelled boxes.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use haven_models::{Detection, Frame};

use crate::error::{EngineError, EngineResult};

/// Per-frame subject detection.
#[async_trait]
pub trait SubjectDetector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> EngineResult<Vec<Detection>>;
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<Detection>,
}

/// HTTP client for the detector service.
pub struct HttpDetector {
    http: Client,
    base_url: String,
}

impl HttpDetector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("DETECTOR_URL").unwrap_or_else(|_| "http://localhost:8500".to_string()),
        )
    }
}

#[async_trait]
impl SubjectDetector for HttpDetector {
    async fn detect(&self, frame: &Frame) -> EngineResult<Vec<Detection>> {
        let jpeg = encode_jpeg(frame)?;
        let url = format!("{}/detect", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("content-type", "image/jpeg")
            .body(jpeg)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::detection_failed(format!(
                "detector returned {}: {}",
                status, body
            )));
        }

        let result: DetectResponse = response.json().await?;
        debug!(
            "Frame {}: {} detections",
            frame.index,
            result.detections.len()
        );
        Ok(result.detections)
    }
}

/// JPEG-encode a packed RGB24 frame for the detector request.
fn encode_jpeg(frame: &Frame) -> EngineResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 85);
    encoder
        .encode(&frame.data, frame.width, frame.height, image::ColorType::Rgb8)
        .map_err(|e| EngineError::detection_failed(format!("JPEG encode failed: {}", e)))?;
    Ok(buf)
}
