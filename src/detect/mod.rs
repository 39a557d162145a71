//! Detector capability, registry, and per-frame result types.

#[cfg(test)]
pub(crate) mod backends;
mod detector;
mod registry;
mod result;

pub use detector::Detector;
pub use registry::DetectorRegistry;
pub use result::{
    AnalysisResult, AnalysisStatus, BoundingBox, Detection, DetectionOutcome, DetectorReport,
    FailureNote,
};
