use anyhow::Result;

use crate::detect::result::DetectionOutcome;
use crate::error::DetectorFailure;
use crate::frame::DecodedImage;

/// A component that inspects one decoded frame and reports one outcome.
///
/// `detect` is blocking and is always called from the orchestrator's worker
/// pool, never from the connection scheduler. Implementations must be safe to
/// call concurrently from several frames; any client handle they own is
/// initialized once and never mutated from outside.
///
/// An `Err` is not fatal: the orchestrator converts it to `NotFound` for this
/// detector's slot and records the reason.
pub trait Detector: Send + Sync {
    /// Key under which this detector's outcome appears in a result.
    fn name(&self) -> &'static str;

    /// JSON field that carries the detection label, e.g. `plate`.
    fn label_field(&self) -> &'static str {
        "label"
    }

    /// Run detection on a frame.
    fn detect(&self, image: &DecodedImage) -> Result<DetectionOutcome, DetectorFailure>;

    /// Optional warm-up hook, called once at startup.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    /// Release external resources. Called once at shutdown.
    fn shutdown(&self) {}
}
