//! License-plate recognition, registered as the `plate` detector.
//!
//! Stages, in order: localize the plate region, crop it with padding,
//! normalize the crop for recognition, read candidate text, then clean and
//! format the best reading. Every stage that comes up empty ends the frame
//! with `NotFound`; a failing external service surfaces as a
//! `DetectorFailure`, which the orchestrator also turns into `NotFound`.

mod localize;
mod preprocess;
mod recognize;
mod region;
#[cfg(feature = "ocr-tesseract")]
mod tesseract;
mod text;

use std::sync::Arc;

pub use localize::{parse_predictions, HttpLocalizer, HttpLocalizerConfig, Localization, Localizer};
pub use preprocess::{equalize_adaptive, normalize_for_recognition, NormalizeSettings};
pub use recognize::{select_best, Candidate, HttpRecognizer, HttpRecognizerConfig, Recognizer};
pub use region::CropRect;
#[cfg(feature = "ocr-tesseract")]
pub use tesseract::TesseractRecognizer;
pub use text::{clean_plate_text, PLATE_ALPHABET};

use crate::detect::{Detection, DetectionOutcome, Detector};
use crate::error::DetectorFailure;
use crate::frame::DecodedImage;

pub const PLATE_DETECTOR: &str = "plate";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlateSettings {
    /// Pixels added on every side of the localized box before cropping.
    pub padding: u32,
    pub normalize: NormalizeSettings,
    /// Shortest cleaned reading accepted as a plate.
    pub min_plate_len: usize,
}

impl Default for PlateSettings {
    fn default() -> Self {
        Self {
            padding: 5,
            normalize: NormalizeSettings::default(),
            min_plate_len: 3,
        }
    }
}

pub struct PlateRecognitionPipeline {
    localizer: Arc<dyn Localizer>,
    recognizer: Arc<dyn Recognizer>,
    settings: PlateSettings,
}

impl PlateRecognitionPipeline {
    pub fn new(
        localizer: Arc<dyn Localizer>,
        recognizer: Arc<dyn Recognizer>,
        settings: PlateSettings,
    ) -> Self {
        Self {
            localizer,
            recognizer,
            settings,
        }
    }
}

impl Detector for PlateRecognitionPipeline {
    fn name(&self) -> &'static str {
        PLATE_DETECTOR
    }

    fn label_field(&self) -> &'static str {
        "plate"
    }

    fn detect(&self, image: &DecodedImage) -> Result<DetectionOutcome, DetectorFailure> {
        let localizations = self.localizer.locate(image)?;
        let Some(region) = localizations.into_iter().next() else {
            log::debug!("plate: no region localized");
            return Ok(DetectionOutcome::NotFound);
        };

        let Some(rect) = CropRect::from_box(
            &region.bounding_box,
            self.settings.padding,
            image.width(),
            image.height(),
        ) else {
            log::debug!("plate: localized region lies outside the frame");
            return Ok(DetectionOutcome::NotFound);
        };

        let crop = rect.crop(image.pixels());
        let normalized = normalize_for_recognition(&crop, &self.settings.normalize);

        let candidates = self.recognizer.recognize(&normalized)?;
        let Some(best) = select_best(&candidates) else {
            log::debug!("plate: recognizer returned no text");
            return Ok(DetectionOutcome::NotFound);
        };

        let Some(plate) = clean_plate_text(&best.text, self.settings.min_plate_len) else {
            log::debug!(
                "plate: reading too short after cleaning ({} chars raw)",
                best.text.chars().count()
            );
            return Ok(DetectionOutcome::NotFound);
        };

        log::info!(
            "plate: read {} (ocr {:.2}, loc {:.2}) via {}",
            plate,
            best.confidence,
            region.confidence,
            self.recognizer.name()
        );
        let detection = Detection::new(plate, region.bounding_box, best.confidence)
            .with_field("ocr_backend", self.recognizer.name())
            .with_field("localization_confidence", f64::from(region.confidence));
        Ok(DetectionOutcome::Found(detection))
    }

    fn shutdown(&self) {
        self.localizer.shutdown();
        self.recognizer.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use image::{GrayImage, Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedLocalizer {
        result: Result<Vec<Localization>, DetectorFailure>,
        shut_down: AtomicUsize,
    }

    impl FixedLocalizer {
        fn with(result: Result<Vec<Localization>, DetectorFailure>) -> Arc<Self> {
            Arc::new(Self {
                result,
                shut_down: AtomicUsize::new(0),
            })
        }

        fn one(x: f32, y: f32, w: f32, h: f32) -> Arc<Self> {
            Self::with(Ok(vec![Localization {
                bounding_box: BoundingBox::new(x, y, w, h),
                confidence: 0.88,
                class: Some("plate".into()),
            }]))
        }
    }

    impl Localizer for FixedLocalizer {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn locate(&self, _image: &DecodedImage) -> Result<Vec<Localization>, DetectorFailure> {
            self.result.clone()
        }

        fn shutdown(&self) {
            self.shut_down.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingRecognizer {
        candidates: Vec<Candidate>,
        calls: AtomicUsize,
        seen: Mutex<Vec<(u32, u32)>>,
    }

    impl CountingRecognizer {
        fn returning(candidates: Vec<Candidate>) -> Arc<Self> {
            Arc::new(Self {
                candidates,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Recognizer for CountingRecognizer {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn recognize(&self, image: &GrayImage) -> Result<Vec<Candidate>, DetectorFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(image.dimensions());
            Ok(self.candidates.clone())
        }
    }

    fn frame() -> DecodedImage {
        DecodedImage::new(RgbImage::from_pixel(640, 480, Rgb([180, 180, 180])))
    }

    #[test]
    fn empty_localization_skips_recognition() {
        let recognizer = CountingRecognizer::returning(vec![Candidate::new("BKA123", 0.9)]);
        let pipeline = PlateRecognitionPipeline::new(
            FixedLocalizer::with(Ok(Vec::new())),
            recognizer.clone(),
            PlateSettings::default(),
        );
        assert_eq!(pipeline.detect(&frame()).unwrap(), DetectionOutcome::NotFound);
        assert_eq!(recognizer.calls(), 0);
    }

    #[test]
    fn reads_and_formats_the_best_candidate() {
        let recognizer = CountingRecognizer::returning(vec![
            Candidate::new("bka 12", 0.4),
            Candidate::new("b k a 1 2 3", 0.8),
            Candidate::new("XXX999", 0.8),
        ]);
        let pipeline = PlateRecognitionPipeline::new(
            FixedLocalizer::one(320.0, 240.0, 90.0, 30.0),
            recognizer.clone(),
            PlateSettings::default(),
        );
        let outcome = pipeline.detect(&frame()).unwrap();
        let detection = outcome.detection().expect("plate found");
        assert_eq!(detection.label, "BKA-123");
        assert_eq!(detection.bounding_box.coords(), "320,240");
        assert_eq!(detection.confidence, 0.8);
        assert_eq!(detection.extra["ocr_backend"], "counting");
        assert!(detection.extra.contains_key("localization_confidence"));

        // 90x30 box + 5px padding on each side, upscaled x4.
        assert_eq!(recognizer.seen.lock().unwrap()[0], (400, 160));
    }

    #[test]
    fn only_the_first_localization_is_read() {
        let localizer = FixedLocalizer::with(Ok(vec![
            Localization {
                bounding_box: BoundingBox::new(100.0, 100.0, 40.0, 10.0),
                confidence: 0.3,
                class: None,
            },
            Localization {
                bounding_box: BoundingBox::new(500.0, 400.0, 80.0, 20.0),
                confidence: 0.99,
                class: None,
            },
        ]));
        let recognizer = CountingRecognizer::returning(vec![Candidate::new("ABC123", 0.7)]);
        let pipeline =
            PlateRecognitionPipeline::new(localizer, recognizer.clone(), PlateSettings::default());
        let outcome = pipeline.detect(&frame()).unwrap();
        assert_eq!(outcome.detection().unwrap().bounding_box.coords(), "100,100");
        assert_eq!(recognizer.calls(), 1);
    }

    #[test]
    fn short_or_missing_text_is_not_a_plate() {
        let short = PlateRecognitionPipeline::new(
            FixedLocalizer::one(320.0, 240.0, 90.0, 30.0),
            CountingRecognizer::returning(vec![Candidate::new("A1", 0.95)]),
            PlateSettings::default(),
        );
        assert_eq!(short.detect(&frame()).unwrap(), DetectionOutcome::NotFound);

        let silent = PlateRecognitionPipeline::new(
            FixedLocalizer::one(320.0, 240.0, 90.0, 30.0),
            CountingRecognizer::returning(Vec::new()),
            PlateSettings::default(),
        );
        assert_eq!(silent.detect(&frame()).unwrap(), DetectionOutcome::NotFound);
    }

    #[test]
    fn region_outside_the_frame_is_not_found() {
        let recognizer = CountingRecognizer::returning(vec![Candidate::new("ABC123", 0.7)]);
        let pipeline = PlateRecognitionPipeline::new(
            FixedLocalizer::one(5000.0, 5000.0, 20.0, 20.0),
            recognizer.clone(),
            PlateSettings::default(),
        );
        assert_eq!(pipeline.detect(&frame()).unwrap(), DetectionOutcome::NotFound);
        assert_eq!(recognizer.calls(), 0);
    }

    #[test]
    fn localizer_failure_propagates() {
        let recognizer = CountingRecognizer::returning(Vec::new());
        let pipeline = PlateRecognitionPipeline::new(
            FixedLocalizer::with(Err(DetectorFailure::Service("HTTP 503".into()))),
            recognizer.clone(),
            PlateSettings::default(),
        );
        assert!(matches!(
            pipeline.detect(&frame()),
            Err(DetectorFailure::Service(_))
        ));
        assert_eq!(recognizer.calls(), 0);
    }

    #[test]
    fn shutdown_reaches_the_localizer() {
        let localizer = FixedLocalizer::with(Ok(Vec::new()));
        let pipeline = PlateRecognitionPipeline::new(
            localizer.clone(),
            CountingRecognizer::returning(Vec::new()),
            PlateSettings::default(),
        );
        pipeline.shutdown();
        assert_eq!(localizer.shut_down.load(Ordering::SeqCst), 1);
    }
}
