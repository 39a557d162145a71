use std::time::Duration;

use crate::detect::detector::Detector;
use crate::detect::result::{BoundingBox, Detection, DetectionOutcome};
use crate::error::DetectorFailure;
use crate::frame::DecodedImage;

/// Returns the same outcome for every frame.
pub struct FixedDetector {
    name: &'static str,
    label_field: &'static str,
    outcome: DetectionOutcome,
}

impl FixedDetector {
    pub fn new(name: &'static str, label_field: &'static str, outcome: DetectionOutcome) -> Self {
        Self {
            name,
            label_field,
            outcome,
        }
    }

    /// Stand-in for a vehicle classifier that always reports `label`.
    pub fn vehicle(label: &str) -> Self {
        let bbox = BoundingBox::new(200.0, 150.0, 120.0, 80.0);
        Self::new(
            "vehicle",
            "type",
            DetectionOutcome::Found(Detection::new(label, bbox, 0.9)),
        )
    }

    /// Stand-in for a weapon classifier that never fires.
    pub fn weapon_absent() -> Self {
        Self::new("weapon", "weapon_type", DetectionOutcome::NotFound)
    }
}

impl Detector for FixedDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn label_field(&self) -> &'static str {
        self.label_field
    }

    fn detect(&self, _image: &DecodedImage) -> Result<DetectionOutcome, DetectorFailure> {
        Ok(self.outcome.clone())
    }
}

/// Always fails with the configured reason.
pub struct FailingDetector {
    name: &'static str,
    failure: DetectorFailure,
}

impl FailingDetector {
    pub fn new(name: &'static str, failure: DetectorFailure) -> Self {
        Self { name, failure }
    }
}

impl Detector for FailingDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn detect(&self, _image: &DecodedImage) -> Result<DetectionOutcome, DetectorFailure> {
        Err(self.failure.clone())
    }
}

/// Blocks its worker thread before reporting `NotFound`.
pub struct SlowDetector {
    name: &'static str,
    delay: Duration,
}

impl SlowDetector {
    pub fn new(name: &'static str, delay: Duration) -> Self {
        Self { name, delay }
    }
}

impl Detector for SlowDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn detect(&self, _image: &DecodedImage) -> Result<DetectionOutcome, DetectorFailure> {
        std::thread::sleep(self.delay);
        Ok(DetectionOutcome::NotFound)
    }
}

pub struct PanickingDetector {
    name: &'static str,
}

impl PanickingDetector {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl Detector for PanickingDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn detect(&self, _image: &DecodedImage) -> Result<DetectionOutcome, DetectorFailure> {
        panic!("detector '{}' blew up", self.name);
    }
}

/// Reports the frame size as its label after a delay, and tracks how many
/// calls overlap.
pub struct ProbeDetector {
    delay: Duration,
    running: std::sync::atomic::AtomicUsize,
    peak: std::sync::atomic::AtomicUsize,
    calls: std::sync::atomic::AtomicUsize,
}

impl ProbeDetector {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            running: Default::default(),
            peak: Default::default(),
            calls: Default::default(),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Detector for ProbeDetector {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn label_field(&self) -> &'static str {
        "size"
    }

    fn detect(&self, image: &DecodedImage) -> Result<DetectionOutcome, DetectorFailure> {
        use std::sync::atomic::Ordering;

        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.running.fetch_sub(1, Ordering::SeqCst);

        let label = format!("{}x{}", image.width(), image.height());
        let bbox = BoundingBox::new(0.0, 0.0, image.width() as f32, image.height() as f32);
        Ok(DetectionOutcome::Found(Detection::new(label, bbox, 1.0)))
    }
}
