//! Face region locator
//!
//! Turns the best face's 68 landmarks into a forehead trapezoid, two eye
//! boxes, a jaw structure score and original-resolution crops of those
//! regions. Every failure mode (tiny image, no face, backend error) yields
//! `None` so the caller can fall back to whole-image scoring.

use std::ops::Range;

use anyhow::{bail, Result};
use image::{DynamicImage, GenericImageView};
use tracing::{debug, info, warn};

use super::types::{FaceDetails, FaceRegionSet, FaceRegions, Point, RegionPolygon, RegionRect};
use crate::config::AnalysisConfig;
use crate::engine::landmarks::LANDMARK_COUNT;
use crate::engine::preprocess::{crop_region, downscale_for_detection};
use crate::engine::traits::FaceLandmarker;

/// Smallest image (both edges) worth running detection on
pub const MIN_IMAGE_EDGE: u32 = 32;

/// Every returned rectangle is at least this many pixels on each edge
pub const MIN_REGION_SIZE: u32 = 16;

/// Eye boxes grow by this fraction per side to take in crow's-feet skin
pub const EYE_PADDING_RATIO: f64 = 0.4;

// 68-point landmark layout
const JAW: Range<usize> = 0..17;
const LEFT_BROW: Range<usize> = 17..22;
const RIGHT_BROW: Range<usize> = 22..27;
const LEFT_EYE: Range<usize> = 36..42;
const RIGHT_EYE: Range<usize> = 42..48;

const JAW_CHIN: usize = 8;
const JAW_LEFT: usize = 0;
const JAW_RIGHT: usize = 16;

/// Unclamped box in source pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Crops of the analysed regions, cut from the original-resolution image
pub struct RegionCrops {
    pub forehead: DynamicImage,
    pub left_eye: DynamicImage,
    pub right_eye: DynamicImage,
}

/// Everything the region-based scorer and the result overlay need
pub struct RegionResult {
    pub crops: RegionCrops,
    pub face_regions: FaceRegions,
    pub face_details: Option<FaceDetails>,
    pub structure_score: Option<u8>,
}

pub struct FaceRegionLocator {
    detection_max_edge: u32,
    min_confidence: f32,
    forehead_margin: f64,
}

impl FaceRegionLocator {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            detection_max_edge: config.detection_max_edge,
            min_confidence: config.min_face_confidence,
            forehead_margin: config.forehead_brow_margin.clamp(0.12, 0.15),
        }
    }

    /// Locate regions in a decoded image. Never fails: problems are logged
    /// and reported as `None`.
    pub fn locate(&self, landmarker: &dyn FaceLandmarker, image: &DynamicImage) -> Option<RegionResult> {
        match self.try_locate(landmarker, image) {
            Ok(Some(result)) => {
                info!("Face found, using region-based forehead and eye analysis");
                Some(result)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Face region detection failed, using whole-image analysis: {:#}", e);
                None
            }
        }
    }

    fn try_locate(&self, landmarker: &dyn FaceLandmarker, image: &DynamicImage) -> Result<Option<RegionResult>> {
        let (orig_w, orig_h) = image.dimensions();
        if orig_w < MIN_IMAGE_EDGE || orig_h < MIN_IMAGE_EDGE {
            debug!("Image {}x{} too small for face detection", orig_w, orig_h);
            return Ok(None);
        }

        let detection = downscale_for_detection(image, self.detection_max_edge);
        let Some(face) = landmarker.detect_best_face(&detection.image, self.min_confidence)? else {
            debug!("No face above confidence {}", self.min_confidence);
            return Ok(None);
        };

        if face.landmarks.len() < LANDMARK_COUNT {
            bail!("Expected {} landmarks, got {}", LANDMARK_COUNT, face.landmarks.len());
        }

        let (sx, sy) = (detection.scale_x, detection.scale_y);
        let points: Vec<Point> = face.landmarks.iter().map(|p| p.scaled(sx, sy)).collect();
        let face_top = face.y1 as f64 * sy;
        let (w, h) = (orig_w as f64, orig_h as f64);

        let forehead = forehead_polygon(
            &points[LEFT_BROW],
            &points[RIGHT_BROW],
            face_top,
            self.forehead_margin,
            w,
            h,
        );
        let forehead_rect = clamp_box(polygon_bounds(&forehead.points), orig_w, orig_h);
        let left_eye = clamp_box(box_from_points(&points[LEFT_EYE], EYE_PADDING_RATIO), orig_w, orig_h);
        let right_eye = clamp_box(box_from_points(&points[RIGHT_EYE], EYE_PADDING_RATIO), orig_w, orig_h);
        let structure_score = structure_score_from_jaw(&points[JAW]);

        let crops = RegionCrops {
            forehead: crop_region(image, &forehead_rect),
            left_eye: crop_region(image, &left_eye),
            right_eye: crop_region(image, &right_eye),
        };

        Ok(Some(RegionResult {
            crops,
            face_regions: FaceRegions {
                image_width: orig_w,
                image_height: orig_h,
                regions: FaceRegionSet { forehead, left_eye, right_eye },
            },
            face_details: face.details,
            structure_score,
        }))
    }
}

/// Forehead trapezoid: from the face-box top down to each brow's mean height,
/// as wide as the brow span plus `margin_ratio` of it on each side. It tilts
/// with the head, where an axis-aligned box would take in hair or background.
///
/// Points are ordered top-left, top-right, bottom-right, bottom-left.
pub fn forehead_polygon(
    left_brow: &[Point],
    right_brow: &[Point],
    face_top: f64,
    margin_ratio: f64,
    image_width: f64,
    image_height: f64,
) -> RegionPolygon {
    let left_min_x = left_brow.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let right_max_x = right_brow.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let margin = (right_max_x - left_min_x) * margin_ratio;

    let left_x = (left_min_x - margin).max(0.0);
    let right_x = (right_max_x + margin).min(image_width);
    let top = face_top.max(0.0);

    RegionPolygon {
        points: vec![
            Point::new(left_x, top),
            Point::new(right_x, top),
            Point::new(right_x, mean_y(right_brow).min(image_height)),
            Point::new(left_x, mean_y(left_brow).min(image_height)),
        ],
    }
}

fn mean_y(points: &[Point]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.y).sum::<f64>() / points.len() as f64
}

/// Bounding box of a polygon's vertices
pub fn polygon_bounds(points: &[Point]) -> BoxF {
    let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    BoxF {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

/// Bounding box of `points`, grown by `padding_ratio` of its extent on every side.
/// A zero extent counts as `MIN_REGION_SIZE`.
pub fn box_from_points(points: &[Point], padding_ratio: f64) -> BoxF {
    let min_size = MIN_REGION_SIZE as f64;
    let Some(first) = points.first() else {
        return BoxF { x: 0.0, y: 0.0, width: min_size, height: min_size };
    };

    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    let w = non_zero_or(max_x - min_x, min_size);
    let h = non_zero_or(max_y - min_y, min_size);
    let (pad_w, pad_h) = (w * padding_ratio, h * padding_ratio);

    BoxF {
        x: (min_x - pad_w).max(0.0),
        y: (min_y - pad_h).max(0.0),
        width: w + 2.0 * pad_w,
        height: h + 2.0 * pad_h,
    }
}

fn non_zero_or(v: f64, fallback: f64) -> f64 {
    if v == 0.0 || v.is_nan() {
        fallback
    } else {
        v
    }
}

/// Clamp a box into the image.
///
/// An overflow on one side shrinks the box by the overflow instead of moving
/// the corner, so the opposite edge never grows. Edges are then floored to
/// `MIN_REGION_SIZE`; if that floor pushes the box past the right or bottom
/// border, the box slides back inside.
pub fn clamp_box(b: BoxF, image_width: u32, image_height: u32) -> RegionRect {
    let (left, width) = clamp_axis(b.x, b.width, image_width);
    let (top, height) = clamp_axis(b.y, b.height, image_height);
    RegionRect { left, top, width, height }
}

fn clamp_axis(start: f64, len: f64, limit: u32) -> (u32, u32) {
    let min_size = MIN_REGION_SIZE as f64;
    let limit_f = limit as f64;

    let mut start = if start.is_nan() { 0.0 } else { start };
    let mut len = if len.is_nan() { min_size } else { len.max(min_size) };

    if start < 0.0 {
        len += start;
        start = 0.0;
    }
    if start + len > limit_f {
        len = limit_f - start;
    }
    len = len.max(min_size);

    let len = (len.round() as u32).min(limit);
    let start = (start.round().max(0.0) as u32).min(limit - len);
    (start, len)
}

/// Jawline definition from the 17-point jaw outline: steeper chin-to-corner
/// slopes mean a sharper jaw and a higher score. `None` without 17 points.
pub fn structure_score_from_jaw(jaw: &[Point]) -> Option<u8> {
    if jaw.len() < JAW.len() {
        return None;
    }
    let chin = jaw[JAW_CHIN];
    let left = jaw[JAW_LEFT];
    let right = jaw[JAW_RIGHT];

    let dx_left = non_zero_or((chin.x - left.x).abs(), 1.0);
    let dx_right = non_zero_or((chin.x - right.x).abs(), 1.0);
    let slope_left = (chin.y - left.y) / dx_left;
    let slope_right = (chin.y - right.y) / dx_right;
    let avg_slope = (slope_left.abs() + slope_right.abs()) / 2.0;

    let normalized = ((avg_slope - 0.2) / 0.8).clamp(0.0, 1.0);
    Some((100.0 * normalized).round() as u8)
}

/// Fake landmark geometry shared by the region and service tests
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::engine::traits::FaceObservation;

    /// Landmarks of an upright face roughly centred in a 400x400 frame
    pub(crate) fn synthetic_landmarks(scale: f64) -> Vec<Point> {
        let mut pts = vec![Point::new(0.0, 0.0); LANDMARK_COUNT];
        // jaw: corners at y=200, chin at (200, 320)
        for (i, p) in pts[JAW].iter_mut().enumerate() {
            let t = i as f64 / 16.0;
            let x = 120.0 + 160.0 * t;
            let y = 320.0 - 120.0 * (2.0 * t - 1.0).abs();
            *p = Point::new(x, y);
        }
        for (i, p) in pts[LEFT_BROW].iter_mut().enumerate() {
            *p = Point::new(140.0 + 12.0 * i as f64, 150.0);
        }
        for (i, p) in pts[RIGHT_BROW].iter_mut().enumerate() {
            *p = Point::new(212.0 + 12.0 * i as f64, 150.0);
        }
        for (i, p) in pts[LEFT_EYE].iter_mut().enumerate() {
            *p = Point::new(150.0 + 6.0 * i as f64, 170.0 + (i % 2) as f64 * 8.0);
        }
        for (i, p) in pts[RIGHT_EYE].iter_mut().enumerate() {
            *p = Point::new(220.0 + 6.0 * i as f64, 170.0 + (i % 2) as f64 * 8.0);
        }
        pts.iter().map(|p| p.scaled(scale, scale)).collect()
    }

    pub(crate) struct FixedFace {
        pub landmarks: Vec<Point>,
        pub top: f32,
    }

    impl FaceLandmarker for FixedFace {
        fn detect_best_face(&self, image: &DynamicImage, _min: f32) -> Result<Option<FaceObservation>> {
            // landmarks are defined for a 400x400 frame
            let s = image.width() as f64 / 400.0;
            Ok(Some(FaceObservation {
                x1: 110.0 * s as f32,
                y1: self.top * s as f32,
                x2: 290.0 * s as f32,
                y2: 330.0 * s as f32,
                confidence: 0.9,
                landmarks: self.landmarks.iter().map(|p| p.scaled(s, s)).collect(),
                details: None,
            }))
        }
    }
}
