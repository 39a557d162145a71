use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use super::detector::Detector;

/// Ordered set of detectors consulted for every frame.
///
/// Detectors are shared as `Arc<dyn Detector>` because `Detector::detect` takes
/// `&self`; the orchestrator hands clones to worker threads. Registration order
/// is the order of slots in every `AnalysisResult`.
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Register a detector. Names must be unique.
    pub fn register<D: Detector + 'static>(&mut self, detector: D) -> Result<()> {
        self.register_shared(Arc::new(detector))
    }

    /// Register a detector that is also held elsewhere.
    pub fn register_shared(&mut self, detector: Arc<dyn Detector>) -> Result<()> {
        let name = detector.name();
        if self.get(name).is_some() {
            return Err(anyhow!("detector '{}' already registered", name));
        }
        self.detectors.push(detector);
        Ok(())
    }

    /// Get detector by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Detector>> {
        self.detectors
            .iter()
            .find(|detector| detector.name() == name)
            .cloned()
    }

    /// List registered detector names in slot order.
    pub fn list(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|detector| detector.name()).collect()
    }

    /// `(name, label_field)` for every slot, used for placeholder results.
    pub fn slots(&self) -> Vec<(String, &'static str)> {
        self.detectors
            .iter()
            .map(|detector| (detector.name().to_string(), detector.label_field()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Detector>> {
        self.detectors.iter()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector's warm-up hook, failing on the first error.
    pub fn warm_up(&self) -> Result<()> {
        for detector in &self.detectors {
            detector
                .warm_up()
                .with_context(|| format!("warm-up failed for detector '{}'", detector.name()))?;
        }
        Ok(())
    }

    /// Shut down every detector in reverse registration order.
    pub fn shutdown(&self) {
        for detector in self.detectors.iter().rev() {
            log::debug!("shutting down detector '{}'", detector.name());
            detector.shutdown();
        }
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
