//! Skin analysis: metrics, face regions, score synthesis and feedback

pub mod catalog;
pub mod feedback;
pub mod metrics;
pub mod regions;
pub mod scoring;
pub mod types;

pub use feedback::{build_feedback, suggest_products, Feedback};
pub use metrics::{compute_metrics, compute_metrics_for_image};
pub use regions::{FaceRegionLocator, RegionResult};
pub use scoring::{synthesize, RegionTextures, ScoreSet, ScoringStrategy};
pub use types::*;
