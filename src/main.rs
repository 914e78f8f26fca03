//! Skin Scoring Service
//!
//! Scores skin photos for lines and tone over a REST API, with optional
//! OpenVINO face-landmark region analysis.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use skinscore::api::{create_rest_router, AppState};
use skinscore::config::Config;
use skinscore::engine::ModelPool;
use skinscore::service::SkinAnalysisService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Starting Skin Scoring Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load(Config::default_path()).unwrap_or_else(|e| {
        info!("Using default config ({})", e);
        Config::default()
    });

    info!("Configuration loaded:");
    info!("  REST port: {}", config.server.rest_port);
    info!("  Max upload: {} bytes", config.server.max_upload_bytes);
    info!("  Device: {}", config.inference.device);
    info!("  Default mode: {}", config.analysis.mode.as_str());

    // Models load on first use unless preloading is requested
    let pool = Arc::new(ModelPool::new(&config.inference, &config.models));
    if config.inference.preload {
        pool.models().await;
        if !pool.is_ready() {
            info!("Face models unavailable, serving whole-image analysis only");
        }
    }

    let service = Arc::new(SkinAnalysisService::new(pool.clone(), config.analysis.clone()));

    let app_state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        max_upload_bytes: config.server.max_upload_bytes,
    });
    let rest_router = create_rest_router(app_state);

    let addr = format!("0.0.0.0:{}", config.server.rest_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("REST API listening on http://{}", addr);
    info!("Skin Scoring Service is ready!");

    axum::serve(listener, rest_router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, cleaning up...");
        })
        .await?;

    info!("Goodbye!");
    Ok(())
}
