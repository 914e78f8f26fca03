//! Axum REST API handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post},
    extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::config::AnalysisMode;
use crate::engine::traits::LandmarkerSource;
use crate::service::{SkinAnalysisResult, SkinAnalysisService};

use super::dto::*;

/// Multipart field names that may carry the image
const IMAGE_FIELDS: [&str; 2] = ["image", "file"];

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: &str, code: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message, code)))
}

/// Body extraction failures keep the size-limit status; everything else is a bad request
fn extract_error(status: StatusCode, message: &str, code: &str) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        api_error(status, message, "IMAGE_TOO_LARGE")
    } else {
        api_error(StatusCode::BAD_REQUEST, message, code)
    }
}

/// Application state shared across handlers
pub struct AppState<L: LandmarkerSource> {
    pub service: Arc<SkinAnalysisService<L>>,
    pub start_time: Instant,
    /// Largest accepted decoded image
    pub max_upload_bytes: usize,
}

/// Create the REST API router
pub fn create_rest_router<L: LandmarkerSource>(state: Arc<AppState<L>>) -> Router {
    // Base64 inflates JSON bodies by a third; the decoded size is checked separately
    let body_limit = state.max_upload_bytes / 3 * 4 + 64 * 1024;

    Router::new()
        .route("/api/v1/analyse", post(analyse_handler::<L>))
        .route("/health", get(health_handler::<L>))
        .route("/api/v1/health", get(health_handler::<L>))
        .route("/metrics", get(metrics_handler::<L>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Analyse a skin photo, sent as multipart or as base64 JSON
async fn analyse_handler<L: LandmarkerSource>(
    State(state): State<Arc<AppState<L>>>,
    Query(query): Query<AnalyseQuery>,
    request: Request,
) -> Result<Json<SkinAnalysisResult>, ApiError> {
    let mode = match query.mode.as_deref() {
        Some(value) => AnalysisMode::parse(value).ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, &format!("Unknown mode: {}", value), "INVALID_MODE")
        })?,
        None => state.service.default_mode(),
    };

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let image_data = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state).await.map_err(|e| {
            extract_error(e.status(), &e.body_text(), "MULTIPART_ERROR")
        })?;
        read_multipart_image(multipart).await?
    } else if content_type.starts_with("application/json") {
        let Json(body) = Json::<AnalyseJsonRequest>::from_request(request, &state).await.map_err(|e| {
            extract_error(e.status(), &e.body_text(), "INVALID_JSON")
        })?;
        let payload = body.into_payload().ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, "Missing image field", "MISSING_IMAGE")
        })?;
        decode_base64_image(&payload)?
    } else {
        return Err(api_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Send multipart/form-data or application/json",
            "UNSUPPORTED_CONTENT_TYPE",
        ));
    };

    if image_data.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Image is empty", "EMPTY_IMAGE"));
    }
    if image_data.len() > state.max_upload_bytes {
        return Err(api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            &format!("Image exceeds {} bytes", state.max_upload_bytes),
            "IMAGE_TOO_LARGE",
        ));
    }

    debug!("Analysing {} bytes in {} mode", image_data.len(), mode.as_str());
    Ok(Json(state.service.run(image_data, mode).await))
}

async fn read_multipart_image(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        extract_error(e.status(), &e.body_text(), "MULTIPART_ERROR")
    })? {
        let name = field.name().unwrap_or("").to_string();

        if IMAGE_FIELDS.contains(&name.as_str()) {
            let bytes = field.bytes().await.map_err(|e| {
                extract_error(e.status(), &e.body_text(), "READ_ERROR")
            })?;
            return Ok(bytes.to_vec());
        }
    }

    Err(api_error(StatusCode::BAD_REQUEST, "Missing image field", "MISSING_IMAGE"))
}

/// Decode base64, accepting an optional `data:image/...;base64,` prefix
fn decode_base64_image(payload: &str) -> Result<Vec<u8>, ApiError> {
    let encoded = match payload.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload,
    };
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    STANDARD.decode(compact.as_bytes()).map_err(|e| {
        warn!("Rejected base64 image: {}", e);
        api_error(StatusCode::BAD_REQUEST, "Image is not valid base64", "INVALID_BASE64")
    })
}

/// Health check
async fn health_handler<L: LandmarkerSource>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        face_models: state.service.landmarker_status(),
        default_mode: state.service.default_mode().as_str(),
    })
}

/// Metrics
async fn metrics_handler<L: LandmarkerSource>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        analyses: state.service.stats(),
        face_models: state.service.landmarker_status(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
