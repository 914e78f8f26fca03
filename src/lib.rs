//! Skin Scoring Service Library

pub mod analysis;
pub mod api;
pub mod config;
pub mod engine;
pub mod service;
pub mod utils;

pub use config::Config;
pub use service::{SkinAnalysisResult, SkinAnalysisService};
