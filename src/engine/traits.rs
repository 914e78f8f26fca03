//! Face backend abstraction traits
//!
//! The region locator only needs "best face + 68 landmarks" from an image.
//! The OpenVINO model set implements it in production; tests substitute
//! fixed geometry.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;

use crate::analysis::types::{FaceDetails, Point};

/// One detected face in the coordinate space of the image it was found in
#[derive(Debug, Clone)]
pub struct FaceObservation {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    /// 68-point landmarks (iBUG 300-W order)
    pub landmarks: Vec<Point>,
    /// Age/gender/expressions, when the attribute models ran
    pub details: Option<FaceDetails>,
}

/// Finds the single most confident face and its landmarks.
/// Implementations are blocking and are called from `spawn_blocking`.
pub trait FaceLandmarker: Send + Sync {
    /// `Ok(None)` when no face reaches `min_confidence`
    fn detect_best_face(&self, image: &DynamicImage, min_confidence: f32) -> Result<Option<FaceObservation>>;
}

/// Hands out a ready landmarker, loading it on first use.
/// `None` means face analysis is unavailable in this process.
#[async_trait]
pub trait LandmarkerSource: Send + Sync + 'static {
    async fn landmarker(&self) -> Option<Arc<dyn FaceLandmarker>>;

    /// Human-readable backend state for health reporting
    fn status(&self) -> String;
}

/// Source used when face analysis is disabled
pub struct NoLandmarker;

#[async_trait]
impl LandmarkerSource for NoLandmarker {
    async fn landmarker(&self) -> Option<Arc<dyn FaceLandmarker>> {
        None
    }

    fn status(&self) -> String {
        "disabled".to_string()
    }
}
