//! Skin analysis service configuration

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub models: ModelsConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub rest_port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// OpenVINO device name, e.g. "CPU" or "GPU"
    pub device: String,
    /// Load the face models when the server starts instead of on first request
    pub preload: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub detector: PathBuf,
    pub landmarks: PathBuf,
    pub gender_age: PathBuf,
    pub emotion: PathBuf,
}

/// Which pipeline the service runs when a request does not say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Face detection + region-based scoring, falling back to global metrics
    Full,
    /// Global metrics only; the caller handles face detection elsewhere
    MetricsOnly,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Full => "full",
            AnalysisMode::MetricsOnly => "metrics_only",
        }
    }

    /// Parse the short names accepted on the query string
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Some(AnalysisMode::Full),
            "metrics" | "metrics_only" | "sharp" => Some(AnalysisMode::MetricsOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Longer edge the metric extractor resizes to
    pub metrics_edge: u32,
    /// Longer edge of the downscaled copy used for face detection
    pub detection_max_edge: u32,
    pub min_face_confidence: f32,
    /// Forehead margin as a fraction of the brow span (0.12 - 0.15)
    pub forehead_brow_margin: f64,
    pub mode: AnalysisMode,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                rest_port: 3000,
                max_upload_bytes: 10 * 1024 * 1024,
            },
            inference: InferenceConfig {
                device: "CPU".to_string(),
                preload: false,
            },
            models: ModelsConfig {
                detector: PathBuf::from("models/scrfd_10g_kps.onnx"),
                landmarks: PathBuf::from("models/pfld_68.onnx"),
                gender_age: PathBuf::from("models/genderage.onnx"),
                emotion: PathBuf::from("models/emotion_ferplus.onnx"),
            },
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            metrics_edge: 200,
            detection_max_edge: 512,
            min_face_confidence: 0.3,
            forehead_brow_margin: 0.12,
            mode: AnalysisMode::Full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            rest_port = 8080
            max_upload_bytes = 1048576

            [inference]
            device = "GPU"
            preload = true

            [models]
            detector = "m/det.onnx"
            landmarks = "m/lmk.onnx"
            gender_age = "m/ga.onnx"
            emotion = "m/emo.onnx"

            [analysis]
            metrics_edge = 200
            detection_max_edge = 512
            min_face_confidence = 0.3
            forehead_brow_margin = 0.15
            mode = "metrics_only"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.rest_port, 8080);
        assert_eq!(config.inference.device, "GPU");
        assert!(config.inference.preload);
        assert_eq!(config.models.landmarks, PathBuf::from("m/lmk.onnx"));
        assert_eq!(config.analysis.mode, AnalysisMode::MetricsOnly);
        assert!((config.analysis.forehead_brow_margin - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(AnalysisMode::parse("full"), Some(AnalysisMode::Full));
        assert_eq!(AnalysisMode::parse(" Metrics "), Some(AnalysisMode::MetricsOnly));
        assert_eq!(AnalysisMode::parse("sharp"), Some(AnalysisMode::MetricsOnly));
        assert_eq!(AnalysisMode::parse("other"), None);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.analysis.metrics_edge, 200);
        assert_eq!(config.analysis.detection_max_edge, 512);
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
    }
}
