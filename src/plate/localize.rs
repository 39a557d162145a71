//! Plate localization capability.
//!
//! The production localizer calls a hosted object-detection model over HTTP
//! (Roboflow-compatible inference API). The request carries the frame as a
//! base64 JPEG body; the response lists center-based boxes in pixel space,
//! ranked by the service.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use serde::Deserialize;
use url::Url;

use crate::detect::BoundingBox;
use crate::error::DetectorFailure;
use crate::frame::DecodedImage;

/// One candidate region reported by a localizer.
#[derive(Clone, Debug, PartialEq)]
pub struct Localization {
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    pub class: Option<String>,
}

/// Finds plate-like regions in a frame.
///
/// Results are in the service's own ranking order; callers take the first.
/// Implementations must be safe for concurrent use.
pub trait Localizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn locate(&self, image: &DecodedImage) -> Result<Vec<Localization>, DetectorFailure>;

    fn shutdown(&self) {}
}

#[derive(Clone, Debug)]
pub struct HttpLocalizerConfig {
    /// Base URL of the inference service.
    pub api_url: String,
    /// API key sent as the `api_key` query parameter.
    pub api_key: String,
    /// Model path appended to `api_url`, e.g. `plates/2`.
    pub model_id: String,
    pub timeout: Duration,
    pub jpeg_quality: u8,
}

impl Default for HttpLocalizerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://serverless.roboflow.com".to_string(),
            api_key: String::new(),
            model_id: "deteccion-de-placas-peruanas-ybiq9/2".to_string(),
            timeout: Duration::from_secs(3),
            jpeg_quality: 90,
        }
    }
}

/// Localizer backed by a hosted inference endpoint.
///
/// `ureq::Agent` pools connections and is safe to share across worker threads.
pub struct HttpLocalizer {
    agent: ureq::Agent,
    endpoint: Url,
    jpeg_quality: u8,
}

impl HttpLocalizer {
    pub fn new(config: HttpLocalizerConfig) -> Result<Self> {
        let endpoint = build_endpoint(&config)?;
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        log::info!(
            "plate localizer endpoint {}{}",
            endpoint.origin().ascii_serialization(),
            endpoint.path()
        );
        Ok(Self {
            agent,
            endpoint,
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        })
    }

    fn encode_jpeg(&self, image: &DecodedImage) -> Result<Vec<u8>, DetectorFailure> {
        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality)
            .encode_image(image.pixels())
            .map_err(|e| DetectorFailure::Image(format!("jpeg encode: {}", e)))?;
        Ok(buf.into_inner())
    }
}

impl Localizer for HttpLocalizer {
    fn name(&self) -> &'static str {
        "http"
    }

    fn locate(&self, image: &DecodedImage) -> Result<Vec<Localization>, DetectorFailure> {
        let body = STANDARD.encode(self.encode_jpeg(image)?);
        let response = self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", "application/x-www-form-urlencoded")
            .send_string(&body)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    DetectorFailure::Service(format!("localizer returned HTTP {}", code))
                }
                ureq::Error::Transport(transport) => {
                    DetectorFailure::Service(format!("localizer transport: {}", transport))
                }
            })?;
        let text = response
            .into_string()
            .map_err(|e| DetectorFailure::MalformedResponse(format!("localizer body: {}", e)))?;
        parse_predictions(&text)
    }
}

fn build_endpoint(config: &HttpLocalizerConfig) -> Result<Url> {
    let base = format!("{}/", config.api_url.trim_end_matches('/'));
    let base = Url::parse(&base).context("parse localizer api url")?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(anyhow!(
            "unsupported localizer scheme '{}'; expected http(s)",
            base.scheme()
        ));
    }
    let model = config.model_id.trim_matches('/');
    if model.is_empty() {
        return Err(anyhow!("localizer model id must not be empty"));
    }
    let mut endpoint = base.join(model).context("build localizer endpoint")?;
    if !config.api_key.is_empty() {
        endpoint
            .query_pairs_mut()
            .append_pair("api_key", &config.api_key);
    }
    Ok(endpoint)
}

#[derive(Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    predictions: Option<Vec<Prediction>>,
}

#[derive(Deserialize)]
struct Prediction {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    class: Option<String>,
}

/// Parse an inference response. A missing `predictions` key means no detection.
pub fn parse_predictions(body: &str) -> Result<Vec<Localization>, DetectorFailure> {
    let response: InferenceResponse = serde_json::from_str(body)
        .map_err(|e| DetectorFailure::MalformedResponse(format!("localizer json: {}", e)))?;
    Ok(response
        .predictions
        .unwrap_or_default()
        .into_iter()
        .map(|p| Localization {
            bounding_box: BoundingBox::new(p.x, p.y, p.width, p.height),
            confidence: p.confidence,
            class: p.class,
        })
        .collect())
}
