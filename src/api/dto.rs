//! REST API request/response data transfer objects

use serde::{Deserialize, Serialize};

use crate::service::StatsSnapshot;

/// JSON analyse request: base64 image, optionally as a `data:` URL
#[derive(Debug, Deserialize)]
pub struct AnalyseJsonRequest {
    pub image: Option<String>,
    pub data: Option<String>,
}

impl AnalyseJsonRequest {
    pub fn into_payload(self) -> Option<String> {
        self.image.or(self.data)
    }
}

/// Query parameters of the analyse endpoint
#[derive(Debug, Default, Deserialize)]
pub struct AnalyseQuery {
    /// `full` or `metrics`
    pub mode: Option<String>,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub face_models: String,
    pub default_mode: &'static str,
}

/// Metrics response
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub analyses: StatsSnapshot,
    pub face_models: String,
    pub uptime_seconds: u64,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
        }
    }
}
