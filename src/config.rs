use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{PostprocessConfig, CONFIDENCE_THRESHOLD, IOU_THRESHOLD, MAX_DETECTED_OBJECTS};
use crate::ingest::SourceConfig;
use crate::occupancy::INFERENCE_INTERVAL_MS;
use crate::session::SessionConfig;

const DEFAULT_DB_PATH: &str = "courts.db";
const DEFAULT_SOURCE_URL: &str = "stub://court_camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MODEL_PATH: &str = "yolov5.onnx";
const DEFAULT_LABELS_PATH: &str = "coco_labels.txt";
const DEFAULT_MODEL_INPUT: u32 = 640;

const BACKENDS: &[&str] = &["stub", "tract"];

#[derive(Debug, Deserialize, Default)]
struct CourtwatchConfigFile {
    db_path: Option<String>,
    complex_id: Option<String>,
    source: Option<SourceConfigFile>,
    model: Option<ModelConfigFile>,
    detection: Option<DetectionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    rotation_degrees: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    inference_interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CourtwatchConfig {
    pub db_path: String,
    pub complex_id: String,
    pub source: SourceConfig,
    pub model: ModelSettings,
    pub detection: DetectionSettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub inference_interval: Duration,
}

impl CourtwatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("COURTWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CourtwatchConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            complex_id: file.complex_id.unwrap_or_default(),
            source: SourceConfig {
                url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
                rotation_degrees: source.rotation_degrees.unwrap_or(0),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            },
            model: ModelSettings {
                backend: model.backend.unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: model
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                labels_path: model
                    .labels_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS_PATH)),
                input_width: model.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: model.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
            },
            detection: DetectionSettings {
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(CONFIDENCE_THRESHOLD),
                iou_threshold: detection.iou_threshold.unwrap_or(IOU_THRESHOLD),
                max_detections: detection.max_detections.unwrap_or(MAX_DETECTED_OBJECTS),
                inference_interval: Duration::from_millis(
                    detection
                        .inference_interval_ms
                        .unwrap_or(INFERENCE_INTERVAL_MS),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("COURTWATCH_DB_PATH") {
            self.db_path = path;
        }
        if let Some(id) = non_empty_env("COURTWATCH_COMPLEX_ID") {
            self.complex_id = id;
        }
        if let Some(url) = non_empty_env("COURTWATCH_SOURCE") {
            self.source.url = url;
        }
        if let Some(rotation) = non_empty_env("COURTWATCH_ROTATION") {
            self.source.rotation_degrees = rotation
                .parse()
                .map_err(|_| anyhow!("COURTWATCH_ROTATION must be an integer number of degrees"))?;
        }
        if let Some(backend) = non_empty_env("COURTWATCH_BACKEND") {
            self.model.backend = backend;
        }
        if let Some(path) = non_empty_env("COURTWATCH_MODEL_PATH") {
            self.model.model_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("COURTWATCH_LABELS_PATH") {
            self.model.labels_path = PathBuf::from(path);
        }
        if let Some(interval) = non_empty_env("COURTWATCH_INTERVAL_MS") {
            let ms: u64 = interval.parse().map_err(|_| {
                anyhow!("COURTWATCH_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.detection.inference_interval = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.complex_id = self.complex_id.trim().to_string();
        if self.complex_id.is_empty() {
            return Err(anyhow!(
                "complex_id must be set (config file or COURTWATCH_COMPLEX_ID)"
            ));
        }
        self.model.backend = self.model.backend.to_lowercase();
        if !BACKENDS.contains(&self.model.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {})",
                self.model.backend,
                BACKENDS.join(", ")
            ));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input dimensions must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be greater than zero"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("target_fps must be greater than zero"));
        }
        if self.source.rotation_degrees % 90 != 0 {
            return Err(anyhow!(
                "rotation must be a multiple of 90 degrees, got {}",
                self.source.rotation_degrees
            ));
        }
        self.source.rotation_degrees %= 360;
        for (name, value) in [
            ("confidence_threshold", self.detection.confidence_threshold),
            ("iou_threshold", self.detection.iou_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(anyhow!("{} must be in (0, 1], got {}", name, value));
            }
        }
        if self.detection.max_detections == 0 {
            return Err(anyhow!("max_detections must be at least 1"));
        }
        if self.detection.inference_interval.is_zero() {
            return Err(anyhow!("inference interval must be greater than zero"));
        }
        Ok(())
    }

    pub fn postprocess_config(&self) -> PostprocessConfig {
        PostprocessConfig {
            confidence_threshold: self.detection.confidence_threshold,
            iou_threshold: self.detection.iou_threshold,
            max_detections: self.detection.max_detections,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            postprocess: self.postprocess_config(),
            inference_interval: self.detection.inference_interval,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<CourtwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
