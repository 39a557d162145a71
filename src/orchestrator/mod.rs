//! Per-frame detection orchestrator.
//!
//! For each frame: decode once, fan the decoded image out to every registered
//! detector on the shared worker pool, and fan the outcomes back in to one
//! `AnalysisResult`. A detector that errors, panics, or misses its deadline is
//! reported as `NotFound` and never aborts the other detectors.

mod pool;

pub use pool::WorkerPool;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::future::join_all;
use tokio::time::{timeout_at, Instant};

use crate::codec;
use crate::detect::{
    AnalysisResult, DetectionOutcome, Detector, DetectorRegistry, DetectorReport, FailureNote,
};
use crate::error::DetectorFailure;
use crate::frame::{DecodedImage, RawFrame};

/// Time bounds applied to each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrchestratorLimits {
    /// Upper bound for a single detector call, including time spent queued for a worker.
    pub detector_timeout: Duration,
    /// Upper bound for the whole frame; detectors still running at this point report `NotFound`.
    pub frame_deadline: Duration,
}

impl Default for OrchestratorLimits {
    fn default() -> Self {
        Self {
            detector_timeout: Duration::from_secs(2),
            frame_deadline: Duration::from_secs(5),
        }
    }
}

pub struct DetectionOrchestrator {
    registry: Arc<DetectorRegistry>,
    pool: Arc<WorkerPool>,
    limits: OrchestratorLimits,
}

impl DetectionOrchestrator {
    pub fn new(
        registry: Arc<DetectorRegistry>,
        pool: Arc<WorkerPool>,
        limits: OrchestratorLimits,
    ) -> Result<Self> {
        if registry.is_empty() {
            return Err(anyhow!("orchestrator requires at least one detector"));
        }
        Ok(Self {
            registry,
            pool,
            limits,
        })
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn limits(&self) -> OrchestratorLimits {
        self.limits
    }

    /// Placeholder error result carrying a `NotFound` slot for every detector.
    pub fn failure_result(&self, message: impl Into<String>) -> AnalysisResult {
        AnalysisResult::failed(&self.registry.slots(), message)
    }

    /// Analyze one frame. Never fails: every problem is folded into the result.
    ///
    /// Decoding runs on the worker pool along with the detectors; the calling
    /// task only waits.
    pub async fn analyze(&self, raw: RawFrame) -> AnalysisResult {
        let digest = raw.digest();
        let image = match self.pool.run(move || codec::decode(&raw)).await {
            Ok(Ok(image)) => Arc::new(image),
            Ok(Err(err)) => {
                log::warn!("frame {} rejected by decoder: {}", digest, err);
                return self.failure_result(err.to_string());
            }
            Err(failure) => {
                log::warn!("frame {} could not be decoded: {}", digest, failure);
                return self.failure_result(failure.to_string());
            }
        };
        log::debug!(
            "frame {} decoded ({}x{})",
            digest,
            image.width(),
            image.height()
        );

        let frame_deadline = Instant::now() + self.limits.frame_deadline;
        let slots = self.registry.iter().map(|detector| {
            self.run_detector(detector.clone(), image.clone(), frame_deadline)
        });
        let outcomes = join_all(slots).await;

        let mut reports = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (detector, outcome) in self.registry.iter().zip(outcomes) {
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(failure) => {
                    log::warn!("detector '{}' failed: {}", detector.name(), failure);
                    failures.push(FailureNote {
                        detector: detector.name().to_string(),
                        reason: failure.to_string(),
                    });
                    DetectionOutcome::NotFound
                }
            };
            reports.push(DetectorReport {
                name: detector.name().to_string(),
                label_field: detector.label_field(),
                outcome,
            });
        }

        AnalysisResult::merge(reports, failures)
    }

    async fn run_detector(
        &self,
        detector: Arc<dyn Detector>,
        image: Arc<DecodedImage>,
        frame_deadline: Instant,
    ) -> Result<DetectionOutcome, DetectorFailure> {
        let started = Instant::now();
        let deadline = frame_deadline.min(started + self.limits.detector_timeout);
        let job = self.pool.run(move || detector.detect(&image));
        match timeout_at(deadline, job).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(failure)) => Err(failure),
            Err(_) => Err(DetectorFailure::Timeout(started.elapsed())),
        }
    }
}
