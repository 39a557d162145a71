use std::time::{SystemTime, UNIX_EPOCH};

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

/// Center-based box in image pixel space. All fields are non-negative.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Build a box, mapping negative or non-finite inputs to zero.
    pub fn new(center_x: f32, center_y: f32, width: f32, height: f32) -> Self {
        Self {
            center_x: non_negative(center_x),
            center_y: non_negative(center_y),
            width: non_negative(width),
            height: non_negative(height),
        }
    }

    /// `"x,y"` of the box center, truncated to whole pixels.
    pub fn coords(&self) -> String {
        format!("{},{}", self.center_x as i64, self.center_y as i64)
    }
}

fn non_negative(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// A positive detection.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub bounding_box: BoundingBox,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    /// Detector-specific fields merged into the outbound JSON.
    pub extra: Map<String, Value>,
}

impl Detection {
    pub fn new(label: impl Into<String>, bounding_box: BoundingBox, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            label: label.into(),
            bounding_box,
            confidence,
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Result of one detector on one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionOutcome {
    Found(Detection),
    NotFound,
}

impl DetectionOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, DetectionOutcome::Found(_))
    }

    pub fn detection(&self) -> Option<&Detection> {
        match self {
            DetectionOutcome::Found(detection) => Some(detection),
            DetectionOutcome::NotFound => None,
        }
    }
}

/// One detector's slot in an `AnalysisResult`.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorReport {
    pub name: String,
    /// JSON key carrying the label, e.g. `plate`.
    pub label_field: &'static str,
    pub outcome: DetectionOutcome,
}

impl Serialize for DetectorReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.outcome {
            DetectionOutcome::NotFound => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("found", &false)?;
                map.serialize_entry(self.label_field, "0")?;
                map.serialize_entry("coords", "0")?;
                map.end()
            }
            DetectionOutcome::Found(detection) => {
                let mut map = serializer.serialize_map(Some(4 + detection.extra.len()))?;
                map.serialize_entry("found", &true)?;
                map.serialize_entry(self.label_field, &detection.label)?;
                map.serialize_entry("coords", &detection.bounding_box.coords())?;
                map.serialize_entry("confidence", &detection.confidence)?;
                for (key, value) in &detection.extra {
                    if matches!(key.as_str(), "found" | "coords" | "confidence")
                        || key == self.label_field
                    {
                        continue;
                    }
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Success,
    Error,
}

/// Failure reason for one detector, kept for observability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailureNote {
    pub detector: String,
    pub reason: String,
}

/// Consolidated outcome of every registered detector for one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisResult {
    status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(serialize_with = "serialize_reports")]
    detections: Vec<DetectorReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<FailureNote>,
    timestamp: f64,
}

fn serialize_reports<S: Serializer>(
    reports: &[DetectorReport],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(reports.len()))?;
    for report in reports {
        map.serialize_entry(&report.name, report)?;
    }
    map.end()
}

impl AnalysisResult {
    /// Merge per-detector outcomes. Status is `error` only when every detector failed.
    pub fn merge(detections: Vec<DetectorReport>, failures: Vec<FailureNote>) -> Self {
        let status = if !detections.is_empty() && failures.len() >= detections.len() {
            AnalysisStatus::Error
        } else {
            AnalysisStatus::Success
        };
        let message = match status {
            AnalysisStatus::Error => Some("all detectors failed".to_string()),
            AnalysisStatus::Success => None,
        };
        Self {
            status,
            message,
            detections,
            failures,
            timestamp: now_secs(),
        }
    }

    /// Error result with a `NotFound` placeholder for every detector slot.
    pub fn failed(slots: &[(String, &'static str)], message: impl Into<String>) -> Self {
        let detections = slots
            .iter()
            .map(|(name, label_field)| DetectorReport {
                name: name.clone(),
                label_field: *label_field,
                outcome: DetectionOutcome::NotFound,
            })
            .collect();
        Self {
            status: AnalysisStatus::Error,
            message: Some(message.into()),
            detections,
            failures: Vec::new(),
            timestamp: now_secs(),
        }
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn detections(&self) -> &[DetectorReport] {
        &self.detections
    }

    pub fn outcome(&self, detector: &str) -> Option<&DetectionOutcome> {
        self.detections
            .iter()
            .find(|report| report.name == detector)
            .map(|report| &report.outcome)
    }

    pub fn failures(&self) -> &[FailureNote] {
        &self.failures
    }

    /// Wall-clock seconds since the Unix epoch at merge time.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}
