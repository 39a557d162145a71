//! Test doubles for the `Detector` capability.

pub mod stub;

pub use stub::{FailingDetector, FixedDetector, PanickingDetector, ProbeDetector, SlowDetector};
