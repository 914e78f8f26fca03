//! Skin Analysis Service - Core business logic
//!
//! Orchestrates decoding, face region location, metric extraction, score
//! synthesis and feedback. Both entry points always return a result: any
//! failure is logged, counted and replaced with the fixed fallback result.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use image::DynamicImage;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::analysis::regions::{FaceRegionLocator, RegionCrops, RegionResult};
use crate::analysis::scoring::{synthesize, RegionTextures, ScoreSet, ScoringStrategy};
use crate::analysis::types::{FaceDetails, FaceRegions};
use crate::analysis::{build_feedback, compute_metrics, compute_metrics_for_image, suggest_products};
use crate::config::{AnalysisConfig, AnalysisMode};
use crate::engine::preprocess::decode_image;
use crate::engine::traits::LandmarkerSource;
use crate::utils::math::to_score;

use super::types::*;

/// Extra face data attached to region-based results
#[derive(Default)]
struct FaceExtras {
    structure_score: Option<u8>,
    face_regions: Option<FaceRegions>,
    face_details: Option<FaceDetails>,
}

/// Skin analysis service
pub struct SkinAnalysisService<L: LandmarkerSource> {
    landmarks: Arc<L>,
    locator: Arc<FaceRegionLocator>,
    config: AnalysisConfig,
    stats: AnalysisStats,
}

impl<L: LandmarkerSource> SkinAnalysisService<L> {
    pub fn new(landmarks: Arc<L>, config: AnalysisConfig) -> Self {
        Self {
            landmarks,
            locator: Arc::new(FaceRegionLocator::new(&config)),
            config,
            stats: AnalysisStats::default(),
        }
    }

    /// Mode used when a request does not pick one
    pub fn default_mode(&self) -> AnalysisMode {
        self.config.mode
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// State of the face model backend, for health reporting
    pub fn landmarker_status(&self) -> String {
        self.landmarks.status()
    }

    /// Run the pipeline selected by `mode`
    pub async fn run(&self, image_data: Vec<u8>, mode: AnalysisMode) -> SkinAnalysisResult {
        match mode {
            AnalysisMode::Full => self.analyse(image_data).await,
            AnalysisMode::MetricsOnly => self.analyse_metrics_only(image_data).await,
        }
    }

    /// Full pipeline: region-based scoring when a face is found, whole-image otherwise
    pub async fn analyse(&self, image_data: Vec<u8>) -> SkinAnalysisResult {
        let analysis_id = Uuid::new_v4();
        let start = Instant::now();
        let outcome = self.analyse_full(analysis_id, image_data).await;
        self.finish(analysis_id, start, outcome)
    }

    /// Whole-image pipeline for callers that handle face detection themselves
    pub async fn analyse_metrics_only(&self, image_data: Vec<u8>) -> SkinAnalysisResult {
        let analysis_id = Uuid::new_v4();
        let start = Instant::now();
        let outcome = self.analyse_global(image_data).await;
        self.finish(analysis_id, start, outcome)
    }

    fn finish(
        &self,
        analysis_id: Uuid,
        start: Instant,
        outcome: Result<(SkinAnalysisResult, AnalysisOutcome)>,
    ) -> SkinAnalysisResult {
        match outcome {
            Ok((result, kind)) => {
                self.stats.record(kind);
                info!(
                    "Analysis {} ({:?}) overall={} wrinkles={} spots={} in {:?}",
                    analysis_id,
                    kind,
                    result.overall_score,
                    result.wrinkles.score,
                    result.spots.score,
                    start.elapsed()
                );
                result
            }
            Err(e) => {
                self.stats.record(AnalysisOutcome::Fallback);
                error!("Analysis {} failed, serving fallback result: {:#}", analysis_id, e);
                SkinAnalysisResult::fallback()
            }
        }
    }

    async fn analyse_full(&self, analysis_id: Uuid, image_data: Vec<u8>) -> Result<(SkinAnalysisResult, AnalysisOutcome)> {
        let image = Arc::new(tokio::task::spawn_blocking(move || decode_image(&image_data)).await??);

        let regions = match self.landmarks.landmarker().await {
            Some(landmarker) => {
                let locator = self.locator.clone();
                let image = image.clone();
                tokio::task::spawn_blocking(move || locator.locate(landmarker.as_ref(), &image)).await?
            }
            None => {
                debug!("Analysis {}: face models unavailable", analysis_id);
                None
            }
        };

        match regions {
            Some(regions) => self.score_regions(image, regions).await,
            None => {
                let edge = self.config.metrics_edge;
                let metrics = tokio::task::spawn_blocking(move || compute_metrics_for_image(&image, edge)).await?;
                let scores = score(ScoringStrategy::GlobalOnly(metrics));
                Ok((assemble(scores, FaceExtras::default()), AnalysisOutcome::GlobalOnly))
            }
        }
    }

    /// The four metric extractions are independent and run concurrently
    async fn score_regions(&self, image: Arc<DynamicImage>, regions: RegionResult) -> Result<(SkinAnalysisResult, AnalysisOutcome)> {
        let edge = self.config.metrics_edge;
        let RegionResult { crops, face_regions, face_details, structure_score, .. } = regions;
        let RegionCrops { forehead, left_eye, right_eye } = crops;

        let measure = move |crop: DynamicImage| tokio::task::spawn_blocking(move || compute_metrics_for_image(&crop, edge));
        let whole = tokio::task::spawn_blocking(move || compute_metrics_for_image(&image, edge));

        let (forehead, left_eye, right_eye, global) =
            tokio::try_join!(measure(forehead), measure(left_eye), measure(right_eye), whole)?;

        let textures = RegionTextures::from_metrics(&forehead, &left_eye, &right_eye, &global);
        let scores = score(ScoringStrategy::RegionBased(textures));
        let extras = FaceExtras {
            structure_score,
            face_regions: Some(face_regions),
            face_details,
        };

        Ok((assemble(scores, extras), AnalysisOutcome::RegionBased))
    }

    async fn analyse_global(&self, image_data: Vec<u8>) -> Result<(SkinAnalysisResult, AnalysisOutcome)> {
        let edge = self.config.metrics_edge;
        let metrics = tokio::task::spawn_blocking(move || compute_metrics(&image_data, edge)).await??;
        let scores = score(ScoringStrategy::GlobalOnly(metrics));
        Ok((assemble(scores, FaceExtras::default()), AnalysisOutcome::GlobalOnly))
    }
}

fn score(strategy: ScoringStrategy) -> ScoreSet {
    debug!("Scoring with {} strategy: {:?}", strategy.name(), strategy);
    synthesize(&strategy)
}

fn assemble(scores: ScoreSet, extras: FaceExtras) -> SkinAnalysisResult {
    let ScoreSet { wrinkles, spots, overall } = scores;
    let feedback = build_feedback(&wrinkles, &spots, extras.structure_score);
    let product_suggestions = suggest_products(&wrinkles, &spots, extras.structure_score);

    SkinAnalysisResult {
        overall_score: to_score(overall),
        wrinkles,
        spots,
        whats_working: feedback.whats_working,
        needs_attention: feedback.needs_attention,
        recommendations: feedback.recommendations,
        product_suggestions,
        structure_score: extras.structure_score,
        face_regions: extras.face_regions,
        face_details: extras.face_details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::regions::fixtures::{synthetic_landmarks, FixedFace};
    use crate::engine::traits::{FaceLandmarker, NoLandmarker};
    use async_trait::async_trait;
    use image::{ImageBuffer, ImageFormat, Luma, Rgb};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that hands out a fixed face and counts requests
    struct FixedSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LandmarkerSource for FixedSource {
        async fn landmarker(&self) -> Option<Arc<dyn FaceLandmarker>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(FixedFace { landmarks: synthetic_landmarks(1.0), top: 60.0 }))
        }

        fn status(&self) -> String {
            "ready".to_string()
        }
    }

    fn png(image: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn flat_gray(w: u32, h: u32) -> Vec<u8> {
        png(DynamicImage::ImageLuma8(ImageBuffer::from_pixel(w, h, Luma([128u8]))))
    }

    fn textured(w: u32, h: u32) -> Vec<u8> {
        png(DynamicImage::ImageRgb8(ImageBuffer::from_fn(w, h, |x, y| {
            let v = ((x * 37 + y * 91) % 160 + 40) as u8;
            Rgb([v, v.saturating_sub(10), v.saturating_sub(20)])
        })))
    }

    fn plain_service() -> SkinAnalysisService<NoLandmarker> {
        SkinAnalysisService::new(Arc::new(NoLandmarker), AnalysisConfig::default())
    }

    fn face_service() -> SkinAnalysisService<FixedSource> {
        let source = FixedSource { calls: AtomicUsize::new(0) };
        SkinAnalysisService::new(Arc::new(source), AnalysisConfig::default())
    }

    #[tokio::test]
    async fn test_flat_gray_without_face_scores_near_100() {
        let service = plain_service();
        let result = service.analyse(flat_gray(200, 200)).await;

        assert_eq!(result.wrinkles.score, 100);
        assert_eq!(result.spots.score, 100);
        assert_eq!(result.overall_score, 100);
        assert!(result.face_regions.is_none());
        assert!(result.structure_score.is_none());
        assert_eq!(service.stats().global_only, 1);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_give_fallback() {
        let service = plain_service();
        let result = service.analyse(b"definitely not an image".to_vec()).await;

        assert_eq!(result, SkinAnalysisResult::fallback());
        assert_eq!(result.overall_score, 72);
        assert_eq!(service.stats().fallbacks, 1);

        let result = service.analyse_metrics_only(Vec::new()).await;
        assert_eq!(result.overall_score, 72);
        assert_eq!(service.stats().fallbacks, 2);
    }

    #[tokio::test]
    async fn test_analysis_is_idempotent() {
        let service = plain_service();
        let bytes = textured(240, 180);
        let first = service.analyse(bytes.clone()).await;
        let second = service.analyse(bytes).await;
        assert_eq!(first, second);
        assert!(first.wrinkles.score < 100);
    }

    #[tokio::test]
    async fn test_face_found_uses_regions() {
        let service = face_service();
        let result = service.analyse(textured(400, 400)).await;

        let regions = result.face_regions.as_ref().expect("face regions attached");
        assert_eq!((regions.image_width, regions.image_height), (400, 400));
        assert_eq!(regions.regions.forehead.points.len(), 4);
        assert!(result.structure_score.is_some());
        assert_eq!(result.wrinkles.crow_feet, result.wrinkles.fine_lines);
        assert!(result.product_suggestions.len() <= 3);
        assert_eq!(service.stats().region_based, 1);
    }

    #[tokio::test]
    async fn test_metrics_only_skips_face_detection() {
        let service = face_service();
        let result = service.analyse_metrics_only(textured(400, 400)).await;

        assert!(result.face_regions.is_none());
        assert_eq!(service.landmarks.calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.stats().global_only, 1);
    }

    #[tokio::test]
    async fn test_run_dispatches_on_mode() {
        let service = face_service();
        let full = service.run(textured(400, 400), AnalysisMode::Full).await;
        let metrics = service.run(textured(400, 400), AnalysisMode::MetricsOnly).await;

        assert!(full.face_regions.is_some());
        assert!(metrics.face_regions.is_none());
        assert_eq!(service.landmarks.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tiny_image_falls_back_to_global() {
        let service = face_service();
        let result = service.analyse(flat_gray(20, 20)).await;
        assert!(result.face_regions.is_none());
        assert_eq!(result.overall_score, 100);
    }

    #[test]
    fn test_assemble_rounds_overall() {
        let scores = synthesize(&ScoringStrategy::GlobalOnly(crate::analysis::types::ImageMetrics {
            texture_score: 1.0,
            evenness_score: 1.0,
        }));
        // 0.5 * 45 + 0.5 * 50 = 47.5
        let result = assemble(scores, FaceExtras { structure_score: Some(40), ..Default::default() });
        assert_eq!(result.overall_score, 48);
        assert_eq!(result.structure_score, Some(40));
        assert_eq!(result.product_suggestions[0].id, "radiant-eyes");
    }
}
