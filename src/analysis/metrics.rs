//! Image metrics: texture (pixel luminance spread) and evenness (spread of
//! coarse patch means).
//!
//! Pixel variance reacts to fine detail such as lines; the variance of patch
//! means reacts to large tonal blotches and ignores fine texture. The
//! normalisation constants are part of the score contract and must not change
//! or scores stop being comparable across versions.

use anyhow::Result;
use image::{imageops::FilterType, DynamicImage, GrayImage};

use super::types::ImageMetrics;
use crate::engine::preprocess::decode_image;
use crate::utils::math::{clamp01, mean_and_variance};

/// Default longer edge used for metric extraction
pub const ANALYSIS_EDGE: u32 = 200;

/// Blur applied before measuring, to ignore JPEG/WebP blockiness
const ARTIFACT_BLUR_SIGMA: f32 = 0.5;

const TEXTURE_STD_FLOOR: f64 = 10.0;
const TEXTURE_STD_RANGE: f64 = 25.0;
const EVENNESS_STD_RANGE: f64 = 20.0;
const PATCH_GRID: u32 = 8;
const MIN_PATCH_EDGE: u32 = 2;

/// Decode `data` and compute its metrics. Decode errors are returned as-is.
pub fn compute_metrics(data: &[u8], target_edge: u32) -> Result<ImageMetrics> {
    let image = decode_image(data)?;
    Ok(compute_metrics_for_image(&image, target_edge))
}

/// Compute metrics of an already decoded image or crop
pub fn compute_metrics_for_image(image: &DynamicImage, target_edge: u32) -> ImageMetrics {
    let luma = prepare_luma(image, target_edge);
    ImageMetrics {
        texture_score: texture_score(&luma),
        evenness_score: evenness_score(&luma),
    }
}

/// Fit inside `edge x edge`, blur lightly and convert to luminance
fn prepare_luma(image: &DynamicImage, edge: u32) -> GrayImage {
    image
        .resize(edge, edge, FilterType::Triangle)
        .blur(ARTIFACT_BLUR_SIGMA)
        .to_luma8()
}

fn texture_score(luma: &GrayImage) -> f64 {
    let samples: Vec<f64> = luma.as_raw().iter().map(|&v| v as f64).collect();
    let (_, variance) = mean_and_variance(&samples);
    clamp01((variance.sqrt() - TEXTURE_STD_FLOOR) / TEXTURE_STD_RANGE)
}

fn evenness_score(luma: &GrayImage) -> f64 {
    let patch_means = patch_means(luma);
    let (_, variance) = mean_and_variance(&patch_means);
    clamp01(variance.sqrt() / EVENNESS_STD_RANGE)
}

/// Mean luminance of each full patch on a coarse grid, row-major
fn patch_means(luma: &GrayImage) -> Vec<f64> {
    let (w, h) = luma.dimensions();
    let patch = (w.min(h) / PATCH_GRID).max(MIN_PATCH_EDGE);
    let (patches_x, patches_y) = (w / patch, h / patch);

    let mut means = Vec::with_capacity((patches_x * patches_y) as usize);
    for py in 0..patches_y {
        for px in 0..patches_x {
            let mut sum = 0u64;
            let mut count = 0u64;
            for y in (py * patch)..((py + 1) * patch).min(h) {
                for x in (px * patch)..((px + 1) * patch).min(w) {
                    sum += luma.get_pixel(x, y)[0] as u64;
                    count += 1;
                }
            }
            if count > 0 {
                means.push(sum as f64 / count as f64);
            }
        }
    }
    means
}
