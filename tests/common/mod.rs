#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use image::{GrayImage, ImageFormat, Rgb, RgbImage};

use eagle_eye::plate::{Candidate, Localization, Localizer, Recognizer};
use eagle_eye::{
    BoundingBox, DecodedImage, DetectionOrchestrator, DetectorFailure, DetectorRegistry,
    OrchestratorLimits, PlateRecognitionPipeline, PlateSettings, WorkerPool,
};

pub struct StubLocalizer {
    result: Result<Vec<Localization>, DetectorFailure>,
}

impl StubLocalizer {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self { result: Ok(Vec::new()) })
    }

    pub fn at(x: f32, y: f32, w: f32, h: f32) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(vec![Localization {
                bounding_box: BoundingBox::new(x, y, w, h),
                confidence: 0.9,
                class: Some("plate".into()),
            }]),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(DetectorFailure::Service(reason.to_string())),
        })
    }
}

impl Localizer for StubLocalizer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn locate(&self, _image: &DecodedImage) -> Result<Vec<Localization>, DetectorFailure> {
        self.result.clone()
    }
}

pub struct StubRecognizer {
    candidates: Vec<Candidate>,
    calls: AtomicUsize,
}

impl StubRecognizer {
    pub fn reading(text: &str, confidence: f32) -> Arc<Self> {
        Arc::new(Self {
            candidates: vec![Candidate::new(text, confidence)],
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Recognizer for StubRecognizer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn recognize(&self, _image: &GrayImage) -> Result<Vec<Candidate>, DetectorFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.candidates.clone())
    }
}

pub fn plate_orchestrator(
    localizer: Arc<StubLocalizer>,
    recognizer: Arc<StubRecognizer>,
) -> Arc<DetectionOrchestrator> {
    let pipeline = PlateRecognitionPipeline::new(localizer, recognizer, PlateSettings::default());
    let mut registry = DetectorRegistry::new();
    registry.register(pipeline).expect("register plate pipeline");
    Arc::new(
        DetectionOrchestrator::new(
            Arc::new(registry),
            Arc::new(WorkerPool::new(3)),
            OrchestratorLimits::default(),
        )
        .expect("orchestrator"),
    )
}

pub fn encoded_frame(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).expect("encode frame");
    buf.into_inner()
}

/// A request captured by `OneShotServer`.
#[derive(Debug)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Answers exactly one HTTP request with a canned response.
pub struct OneShotServer {
    pub addr: SocketAddr,
    captured: mpsc::Receiver<CapturedRequest>,
    join: Option<JoinHandle<()>>,
}

impl OneShotServer {
    pub fn start(status: u16, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind one-shot server");
        let addr = listener.local_addr().expect("local addr");
        let body = body.to_string();
        let (tx, rx) = mpsc::channel();
        let join = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let request = read_request(&mut stream);
            let _ = tx.send(request);
            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).expect("write response");
        });
        Self {
            addr,
            captured: rx,
            join: Some(join),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn request(mut self) -> CapturedRequest {
        let request = self.captured.recv().expect("captured request");
        if let Some(join) = self.join.take() {
            join.join().expect("server thread");
        }
        request
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> CapturedRequest {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut buf).expect("read request");
        assert!(n > 0, "client closed before sending headers");
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let length: usize = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);

    let mut body = data[header_end..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut buf).expect("read body");
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    CapturedRequest {
        request_line,
        headers,
        body,
    }
}
