//! Value types shared by the analysis stages

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::attribute::Gender;

/// Low-level statistics of one image or crop.
/// Both are in [0, 1]; higher means more texture / less even tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMetrics {
    pub texture_score: f64,
    pub evenness_score: f64,
}

/// Pixel-space point in the source image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self { x: self.x * sx, y: self.y * sy }
    }
}

/// Axis-aligned rectangle in source pixels, always inside the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Ordered outline of a tilted region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPolygon {
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceRegionSet {
    pub forehead: RegionPolygon,
    pub left_eye: RegionRect,
    pub right_eye: RegionRect,
}

/// Region geometry in source pixels, for drawing overlays on the photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceRegions {
    pub image_width: u32,
    pub image_height: u32,
    pub regions: FaceRegionSet,
}

/// Estimated age, gender and expression probabilities of the detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceDetails {
    pub age: u32,
    pub gender: Gender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender_probability: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expressions: Option<BTreeMap<String, f32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrinkleAnalysis {
    pub score: u8,
    pub forehead: u8,
    pub crow_feet: u8,
    pub fine_lines: u8,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotAnalysis {
    pub score: u8,
    pub blemishes: u8,
    pub hyperpigmentation: u8,
    pub summary: String,
}

/// Catalog entry offered to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSuggestion {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}
