//! 68-point facial landmark regressor (PFLD-style)
//!
//! Takes a square face crop and predicts 68 (x, y) pairs normalised to the
//! crop, in iBUG 300-W order.

use anyhow::{bail, Result};
use image::{DynamicImage, GenericImageView};

use super::pool::{read_tensor_f32, SafeCompiledModel};
use super::preprocess::preprocess_for_landmarks;
use crate::analysis::types::Point;

pub const LANDMARK_COUNT: usize = 68;

pub struct LandmarkRegressor {
    model: SafeCompiledModel,
}

impl LandmarkRegressor {
    pub fn new(model: SafeCompiledModel) -> Self {
        Self { model }
    }

    /// Landmarks of `face`, mapped into the coordinates of the image the crop
    /// was cut from (`origin` is the crop's top-left corner there)
    pub fn predict(&self, face: &DynamicImage, origin: (u32, u32)) -> Result<Vec<Point>> {
        let input_tensor = preprocess_for_landmarks(face);
        let request = self.model.infer(&input_tensor)?;

        // Some exports also emit a pose head; take the first 136-wide output
        let mut index = 0;
        while let Ok(tensor) = request.get_output_tensor_by_index(index) {
            let values = read_tensor_f32(&tensor)?;
            if values.len() == LANDMARK_COUNT * 2 {
                return Ok(to_image_points(&values, face.dimensions(), origin));
            }
            index += 1;
        }

        bail!("Landmark model has no {}-value output", LANDMARK_COUNT * 2)
    }
}

/// Map normalised `[x0, y0, x1, y1, ...]` onto a crop of `size` at `origin`
pub fn to_image_points(values: &[f32], size: (u32, u32), origin: (u32, u32)) -> Vec<Point> {
    let (w, h) = (size.0 as f64, size.1 as f64);
    let (ox, oy) = (origin.0 as f64, origin.1 as f64);

    values
        .chunks_exact(2)
        .map(|xy| Point::new(ox + xy[0] as f64 * w, oy + xy[1] as f64 * h))
        .collect()
}
