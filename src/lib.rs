//! Eagle-Eye frame analysis service
//!
//! Receives a live stream of video frames over WebSocket, runs every
//! registered detector on each frame concurrently, and answers each frame with
//! one consolidated result before the next frame of that connection is
//! analyzed.
//!
//! # Module Structure
//!
//! - `frame`: frame containers (`RawFrame`, `DecodedImage`)
//! - `codec`: inbound message parsing and image decoding
//! - `detect`: the `Detector` capability, registry, and result types
//! - `orchestrator`: per-frame fan-out/fan-in over a bounded worker pool
//! - `plate`: license-plate recognition, registered as the `plate` detector
//! - `session`: per-connection state machine and the connection registry
//! - `server`: HTTP and WebSocket endpoints
//! - `config`: file and environment configuration
//!
//! # Guarantees
//!
//! - A connection never has more than one frame under analysis.
//! - Replies leave in the order their frames arrived.
//! - A detector that fails, panics, or overruns its deadline reports
//!   `NotFound` and never hides the other detectors' outcomes.
//! - Frame bytes are never logged and are zeroized once decoded.

pub mod codec;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod orchestrator;
pub mod plate;
pub mod server;
pub mod session;

use std::sync::Arc;

use anyhow::{Context, Result};

pub use codec::{InboundFormat, InboundMessage};
pub use config::{RecognizerBackend, ServiceConfig};
pub use detect::{
    AnalysisResult, AnalysisStatus, BoundingBox, Detection, DetectionOutcome, Detector,
    DetectorRegistry,
};
pub use error::{DecodeError, DetectorFailure, ProtocolViolation, SessionTerminated};
pub use frame::{DecodedImage, ImageEncoding, RawFrame};
pub use orchestrator::{DetectionOrchestrator, OrchestratorLimits, WorkerPool};
pub use plate::{PlateRecognitionPipeline, PlateSettings};
pub use server::{Server, ServerConfig, ServerHandle};
pub use session::{BackpressurePolicy, SessionConfig, StreamSession};

/// Build the configured text recognizer.
pub fn build_recognizer(config: &ServiceConfig) -> Result<Arc<dyn plate::Recognizer>> {
    match config.recognizer.backend {
        RecognizerBackend::Http => {
            let recognizer = plate::HttpRecognizer::new(config.recognizer.http.clone())
                .context("configure http recognizer")?;
            log::info!("plate recognizer: http {}", config.recognizer.http.url);
            Ok(Arc::new(recognizer))
        }
        #[cfg(feature = "ocr-tesseract")]
        RecognizerBackend::Tesseract => {
            let recognizer =
                plate::TesseractRecognizer::spawn(&config.recognizer.tesseract_language)?;
            Ok(Arc::new(recognizer))
        }
        #[cfg(not(feature = "ocr-tesseract"))]
        RecognizerBackend::Tesseract => Err(anyhow::anyhow!(
            "recognizer backend 'tesseract' requires the ocr-tesseract feature"
        )),
    }
}

/// Build the production detector registry: the plate pipeline over the
/// configured localizer and recognizer.
pub fn build_registry(config: &ServiceConfig) -> Result<DetectorRegistry> {
    let localizer = plate::HttpLocalizer::new(config.localizer.clone())
        .context("configure plate localizer")?;
    let recognizer = build_recognizer(config)?;
    let pipeline = PlateRecognitionPipeline::new(Arc::new(localizer), recognizer, config.plate);

    let mut registry = DetectorRegistry::new();
    registry.register(pipeline)?;
    Ok(registry)
}

/// Wire the registry into an orchestrator over a fresh worker pool.
pub fn build_orchestrator(
    config: &ServiceConfig,
    registry: DetectorRegistry,
) -> Result<Arc<DetectionOrchestrator>> {
    let pool = Arc::new(WorkerPool::new(config.worker_threads));
    let orchestrator = DetectionOrchestrator::new(Arc::new(registry), pool, config.limits)?;
    Ok(Arc::new(orchestrator))
}
