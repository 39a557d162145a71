//! Text recognition capability.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};
use url::Url;

use super::text::PLATE_ALPHABET;
use crate::error::DetectorFailure;

/// One reading proposed by a recognizer.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub confidence: f32,
}

impl Candidate {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Reads a single line of plate text from a normalized, binarized image.
///
/// Implementations are constrained to `PLATE_ALPHABET` and single-line mode,
/// and must be safe for concurrent use; an engine that is not must serialize
/// access internally.
pub trait Recognizer: Send + Sync {
    /// Backend label reported alongside plate readings.
    fn name(&self) -> &'static str;

    fn recognize(&self, image: &GrayImage) -> Result<Vec<Candidate>, DetectorFailure>;

    fn shutdown(&self) {}
}

/// Highest-confidence candidate; the first one wins ties.
pub fn select_best(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(current) if current.confidence >= candidate.confidence => Some(current),
        _ if candidate.confidence.is_nan() => best,
        _ => Some(candidate),
    })
}

#[derive(Clone, Debug)]
pub struct HttpRecognizerConfig {
    pub url: String,
    pub timeout: Duration,
}

impl Default for HttpRecognizerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8866/recognize".to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Serialize)]
struct RecognitionRequest<'a> {
    image: String,
    alphabet: &'a str,
    mode: &'a str,
}

#[derive(Deserialize)]
struct RecognitionResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// Recognizer backed by an HTTP text-recognition service.
pub struct HttpRecognizer {
    agent: ureq::Agent,
    url: Url,
}

impl HttpRecognizer {
    pub fn new(config: HttpRecognizerConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse recognizer url")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported recognizer scheme '{}'; expected http(s)",
                url.scheme()
            ));
        }
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self { agent, url })
    }
}

impl Recognizer for HttpRecognizer {
    fn name(&self) -> &'static str {
        "http"
    }

    fn recognize(&self, image: &GrayImage) -> Result<Vec<Candidate>, DetectorFailure> {
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| DetectorFailure::Image(format!("png encode: {}", e)))?;

        let request = RecognitionRequest {
            image: STANDARD.encode(png.into_inner()),
            alphabet: PLATE_ALPHABET,
            mode: "single_line",
        };
        let response = self
            .agent
            .post(self.url.as_str())
            .send_json(&request)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    DetectorFailure::Service(format!("recognizer returned HTTP {}", code))
                }
                ureq::Error::Transport(transport) => {
                    DetectorFailure::Service(format!("recognizer transport: {}", transport))
                }
            })?;
        let body: RecognitionResponse = response
            .into_json()
            .map_err(|e| DetectorFailure::MalformedResponse(format!("recognizer json: {}", e)))?;
        Ok(body.candidates)
    }
}
