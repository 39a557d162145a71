use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::codec::InboundFormat;
use crate::orchestrator::OrchestratorLimits;
use crate::plate::{HttpLocalizerConfig, HttpRecognizerConfig, PlateSettings};
use crate::session::{BackpressurePolicy, SessionConfig};

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_WORKER_THREADS: usize = 3;
const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_TESSERACT_LANGUAGE: &str = "eng";

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    listen_addr: Option<String>,
    inbound_format: Option<InboundFormat>,
    backpressure: Option<BackpressurePolicy>,
    max_frame_bytes: Option<usize>,
    workers: Option<WorkersConfigFile>,
    timeouts: Option<TimeoutsConfigFile>,
    localizer: Option<LocalizerConfigFile>,
    recognizer: Option<RecognizerConfigFile>,
    plate: Option<PlateConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct WorkersConfigFile {
    threads: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TimeoutsConfigFile {
    detector_ms: Option<u64>,
    frame_deadline_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct LocalizerConfigFile {
    api_url: Option<String>,
    api_key: Option<String>,
    model_id: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RecognizerConfigFile {
    backend: Option<RecognizerBackend>,
    url: Option<String>,
    language: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PlateConfigFile {
    padding: Option<u32>,
    min_len: Option<usize>,
}

/// Which engine reads plate text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerBackend {
    /// External text-recognition service over HTTP.
    #[default]
    Http,
    /// In-process Tesseract; requires the `ocr-tesseract` feature.
    Tesseract,
}

impl FromStr for RecognizerBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(RecognizerBackend::Http),
            "tesseract" => Ok(RecognizerBackend::Tesseract),
            other => Err(anyhow!(
                "unknown recognizer backend '{}'; expected http or tesseract",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecognizerSettings {
    pub backend: RecognizerBackend,
    pub http: HttpRecognizerConfig,
    pub tesseract_language: String,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: String,
    pub session: SessionConfig,
    pub worker_threads: usize,
    pub limits: OrchestratorLimits,
    pub localizer: HttpLocalizerConfig,
    pub recognizer: RecognizerSettings,
    pub plate: PlateSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_file(ServiceConfigFile::default())
    }
}

impl ServiceConfig {
    /// Defaults, then the file named by `EAGLE_CONFIG`, then `EAGLE_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = env_string("EAGLE_CONFIG");
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit config file instead of `EAGLE_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Self {
        let session = SessionConfig {
            inbound_format: file.inbound_format.unwrap_or_default(),
            backpressure: file.backpressure.unwrap_or_default(),
            max_frame_bytes: file.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES),
        };

        let default_limits = OrchestratorLimits::default();
        let timeouts = file.timeouts.unwrap_or_default();
        let limits = OrchestratorLimits {
            detector_timeout: timeouts
                .detector_ms
                .map(Duration::from_millis)
                .unwrap_or(default_limits.detector_timeout),
            frame_deadline: timeouts
                .frame_deadline_ms
                .map(Duration::from_millis)
                .unwrap_or(default_limits.frame_deadline),
        };

        let default_localizer = HttpLocalizerConfig::default();
        let localizer_file = file.localizer.unwrap_or_default();
        let localizer = HttpLocalizerConfig {
            api_url: localizer_file.api_url.unwrap_or(default_localizer.api_url),
            api_key: localizer_file.api_key.unwrap_or(default_localizer.api_key),
            model_id: localizer_file.model_id.unwrap_or(default_localizer.model_id),
            timeout: localizer_file
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default_localizer.timeout),
            ..default_localizer
        };

        let default_http = HttpRecognizerConfig::default();
        let recognizer_file = file.recognizer.unwrap_or_default();
        let recognizer = RecognizerSettings {
            backend: recognizer_file.backend.unwrap_or_default(),
            http: HttpRecognizerConfig {
                url: recognizer_file.url.unwrap_or(default_http.url),
                timeout: recognizer_file
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(default_http.timeout),
            },
            tesseract_language: recognizer_file
                .language
                .unwrap_or_else(|| DEFAULT_TESSERACT_LANGUAGE.to_string()),
        };

        let default_plate = PlateSettings::default();
        let plate_file = file.plate.unwrap_or_default();
        let plate = PlateSettings {
            padding: plate_file.padding.unwrap_or(default_plate.padding),
            min_plate_len: plate_file.min_len.unwrap_or(default_plate.min_plate_len),
            ..default_plate
        };

        Self {
            listen_addr: file
                .listen_addr
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            session,
            worker_threads: file
                .workers
                .and_then(|workers| workers.threads)
                .unwrap_or(DEFAULT_WORKER_THREADS),
            limits,
            localizer,
            recognizer,
            plate,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_string("EAGLE_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(format) = env_parse("EAGLE_INBOUND_FORMAT")? {
            self.session.inbound_format = format;
        }
        if let Some(policy) = env_parse("EAGLE_BACKPRESSURE")? {
            self.session.backpressure = policy;
        }
        if let Some(bytes) = env_parse("EAGLE_MAX_FRAME_BYTES")? {
            self.session.max_frame_bytes = bytes;
        }
        if let Some(threads) = env_parse("EAGLE_WORKER_THREADS")? {
            self.worker_threads = threads;
        }
        if let Some(ms) = env_parse("EAGLE_DETECTOR_TIMEOUT_MS")? {
            self.limits.detector_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("EAGLE_FRAME_DEADLINE_MS")? {
            self.limits.frame_deadline = Duration::from_millis(ms);
        }
        if let Some(url) = env_string("EAGLE_LOCALIZER_URL") {
            self.localizer.api_url = url;
        }
        if let Some(key) = env_string("EAGLE_LOCALIZER_API_KEY") {
            self.localizer.api_key = key;
        }
        if let Some(model) = env_string("EAGLE_LOCALIZER_MODEL") {
            self.localizer.model_id = model;
        }
        if let Some(backend) = env_parse("EAGLE_RECOGNIZER")? {
            self.recognizer.backend = backend;
        }
        if let Some(url) = env_string("EAGLE_RECOGNIZER_URL") {
            self.recognizer.http.url = url;
        }
        if let Some(len) = env_parse("EAGLE_MIN_PLATE_LEN")? {
            self.plate.min_plate_len = len;
        }
        Ok(())
    }

    /// Normalize and check the settings. Call again after changing fields by hand.
    pub fn validate(&mut self) -> Result<()> {
        self.listen_addr = self.listen_addr.trim().to_string();
        if self.listen_addr.is_empty() {
            return Err(anyhow!("listen address must not be empty"));
        }
        if self.worker_threads == 0 {
            return Err(anyhow!("worker threads must be at least 1"));
        }
        if self.limits.detector_timeout.is_zero() || self.limits.frame_deadline.is_zero() {
            return Err(anyhow!("detector timeout and frame deadline must be greater than zero"));
        }
        if self.session.max_frame_bytes == 0 {
            return Err(anyhow!("max frame bytes must be greater than zero"));
        }
        if self.plate.min_plate_len == 0 {
            return Err(anyhow!("minimum plate length must be at least 1"));
        }
        if self.localizer.model_id.trim().is_empty() {
            return Err(anyhow!("localizer model id must not be empty"));
        }
        if self.recognizer.backend == RecognizerBackend::Tesseract && !cfg!(feature = "ocr-tesseract")
        {
            return Err(anyhow!(
                "recognizer backend 'tesseract' requires building with the ocr-tesseract feature"
            ));
        }
        if self.localizer.api_key.is_empty() {
            log::warn!("localizer api key is not set; requests will be unauthenticated");
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("invalid value '{}' for {}: {}", value, key, e)),
        None => Ok(None),
    }
}
