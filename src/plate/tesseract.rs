//! Local Tesseract recognizer.
//!
//! A Tesseract handle is neither `Send` nor reentrant, so one engine lives on a
//! dedicated thread and requests reach it through a single-slot queue. Callers
//! on worker threads block on their own reply channel.

use std::io::Cursor;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, ImageFormat};
use leptess::{LepTess, Variable};

use super::recognize::{Candidate, Recognizer};
use super::text::PLATE_ALPHABET;
use crate::error::DetectorFailure;

/// Treat the image as a single text line.
const PSM_SINGLE_LINE: &str = "7";

struct Job {
    png: Vec<u8>,
    reply: mpsc::Sender<Result<Vec<Candidate>, DetectorFailure>>,
}

pub struct TesseractRecognizer {
    jobs: Mutex<Option<SyncSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TesseractRecognizer {
    /// Start the engine thread. `language` is a traineddata name such as `eng`.
    pub fn spawn(language: &str) -> Result<Self> {
        let (jobs_tx, jobs_rx) = mpsc::sync_channel::<Job>(1);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let language = language.to_string();

        let worker = std::thread::Builder::new()
            .name("tesseract".into())
            .spawn(move || match init_engine(&language) {
                Ok(engine) => {
                    let _ = ready_tx.send(Ok(()));
                    serve(engine, jobs_rx);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("spawn tesseract thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::info!("tesseract recognizer ready (psm {})", PSM_SINGLE_LINE);
                Ok(Self {
                    jobs: Mutex::new(Some(jobs_tx)),
                    worker: Mutex::new(Some(worker)),
                })
            }
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(anyhow!(err))
            }
            Err(_) => {
                let _ = worker.join();
                Err(anyhow!("tesseract thread exited during startup"))
            }
        }
    }

    fn sender(&self) -> Option<SyncSender<Job>> {
        self.jobs.lock().ok().and_then(|guard| guard.clone())
    }
}

fn init_engine(language: &str) -> Result<LepTess, String> {
    let mut engine = LepTess::new(None, language)
        .map_err(|e| format!("initialize tesseract with language '{}': {}", language, e))?;
    engine
        .set_variable(Variable::TesseditPagesegMode, PSM_SINGLE_LINE)
        .map_err(|e| format!("set page segmentation mode: {}", e))?;
    engine
        .set_variable(Variable::TesseditCharWhitelist, PLATE_ALPHABET)
        .map_err(|e| format!("set character whitelist: {}", e))?;
    Ok(engine)
}

fn serve(mut engine: LepTess, jobs: Receiver<Job>) {
    while let Ok(job) = jobs.recv() {
        let result = read_line(&mut engine, &job.png);
        let _ = job.reply.send(result);
    }
    log::debug!("tesseract queue closed");
}

fn read_line(engine: &mut LepTess, png: &[u8]) -> Result<Vec<Candidate>, DetectorFailure> {
    engine
        .set_image_from_mem(png)
        .map_err(|e| DetectorFailure::Image(format!("tesseract image: {}", e)))?;
    let text = engine
        .get_utf8_text()
        .map_err(|e| DetectorFailure::Service(format!("tesseract text: {}", e)))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let confidence = (engine.mean_text_conf().max(0) as f32 / 100.0).min(1.0);
    Ok(vec![Candidate::new(text, confidence)])
}

impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&self, image: &GrayImage) -> Result<Vec<Candidate>, DetectorFailure> {
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| DetectorFailure::Image(format!("png encode: {}", e)))?;

        let sender = self
            .sender()
            .ok_or_else(|| DetectorFailure::Service("tesseract recognizer is shut down".into()))?;
        let (reply_tx, reply_rx) = mpsc::channel();
        sender
            .send(Job {
                png: png.into_inner(),
                reply: reply_tx,
            })
            .map_err(|_| DetectorFailure::Service("tesseract thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| DetectorFailure::Service("tesseract dropped the request".into()))?
    }

    fn shutdown(&self) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.take();
        }
        let handle = self.worker.lock().ok().and_then(|mut worker| worker.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!("tesseract thread panicked during shutdown");
            }
        }
    }
}

impl Drop for TesseractRecognizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
