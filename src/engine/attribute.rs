//! Face Attribute Analyzer
//!
//! Estimates age and gender (InsightFace genderage) and expression
//! probabilities (FER+) from a face crop.

use std::collections::BTreeMap;

use anyhow::Result;
use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::pool::{read_tensor_f32, SafeCompiledModel};
use super::preprocess::{ATTRIBUTE_INPUT_SIZE, EMOTION_INPUT_SIZE};
use crate::analysis::types::FaceDetails;
use crate::utils::math::softmax;

/// Gender classification result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

/// FER+ output order: neutral, happiness, surprise, sadness, anger,
/// disgust, fear, contempt. `None` marks classes that are not reported.
const FERPLUS_KEYS: [Option<&str>; 8] = [
    Some("neutral"),
    Some("happy"),
    Some("surprised"),
    Some("sad"),
    Some("angry"),
    Some("disgusted"),
    Some("fearful"),
    None,
];

const MIN_AGE: u32 = 1;
const MAX_AGE: u32 = 100;

pub struct AttributeAnalyzer {
    gender_age: SafeCompiledModel,
    emotion: Option<SafeCompiledModel>,
}

impl AttributeAnalyzer {
    pub fn new(gender_age: SafeCompiledModel, emotion: Option<SafeCompiledModel>) -> Self {
        Self { gender_age, emotion }
    }

    /// Analyze a face crop. Expressions are left out when the emotion model is missing.
    pub fn analyze(&self, face: &DynamicImage) -> Result<FaceDetails> {
        let (age, gender, gender_probability) = self.analyze_gender_age(face)?;
        debug!("Estimated age {} gender {} ({:.2})", age, gender.as_str(), gender_probability);
        let expressions = match &self.emotion {
            Some(model) => Some(analyze_expressions(model, face)?),
            None => None,
        };

        Ok(FaceDetails {
            age,
            gender,
            gender_probability: Some(gender_probability),
            expressions,
        })
    }

    fn analyze_gender_age(&self, face: &DynamicImage) -> Result<(u32, Gender, f32)> {
        let (target_w, target_h) = ATTRIBUTE_INPUT_SIZE;
        let resized = face.resize_exact(target_w, target_h, FilterType::Triangle);

        let request = self.gender_age.infer(&rgb_tensor(&resized))?;
        let output = read_tensor_f32(&request.get_output_tensor()?)?;
        debug!("GenderAge model raw output: {:?}", output);

        Ok(parse_gender_age(&output))
    }
}

fn analyze_expressions(model: &SafeCompiledModel, face: &DynamicImage) -> Result<BTreeMap<String, f32>> {
    let (target_w, target_h) = EMOTION_INPUT_SIZE;
    let resized = face.resize_exact(target_w, target_h, FilterType::Triangle);

    let request = model.infer(&grayscale_tensor(&resized))?;
    let logits = read_tensor_f32(&request.get_output_tensor()?)?;
    debug!("Emotion model raw output: {:?}", logits);

    Ok(expressions_from_logits(&logits))
}

/// InsightFace genderage output: `[female_logit, male_logit, age / 100]`.
/// Some exports emit `[signed_gender_logit, age]` instead.
pub fn parse_gender_age(output: &[f32]) -> (u32, Gender, f32) {
    let (gender, confidence, age) = match *output {
        [female_logit, male_logit, age_scale] => {
            let probs = softmax(&[female_logit, male_logit]);
            let (gender, conf) = if male_logit > female_logit {
                (Gender::Male, probs[1])
            } else {
                (Gender::Female, probs[0])
            };
            (gender, conf, age_scale * 100.0)
        }
        [gender_val, age_factor] => {
            let sigmoid = 1.0 / (1.0 + (-gender_val).exp());
            let (gender, conf) = if sigmoid > 0.5 {
                (Gender::Female, sigmoid)
            } else {
                (Gender::Male, 1.0 - sigmoid)
            };
            let age = if age_factor > 1.0 && age_factor < 120.0 { age_factor } else { age_factor * 100.0 };
            (gender, conf, age)
        }
        _ => {
            tracing::warn!("Unexpected genderage output length: {}", output.len());
            (Gender::Male, 0.5, 25.0)
        }
    };

    let age = (age.round().max(0.0) as u32).clamp(MIN_AGE, MAX_AGE);
    (age, gender, confidence)
}

/// Softmax over the FER+ logits, reported classes renormalised to sum to 1
pub fn expressions_from_logits(logits: &[f32]) -> BTreeMap<String, f32> {
    let probs = softmax(logits);
    let kept: Vec<(&str, f32)> = FERPLUS_KEYS
        .iter()
        .zip(probs.iter())
        .filter_map(|(key, &p)| key.map(|k| (k, p)))
        .collect();

    let total: f32 = kept.iter().map(|(_, p)| p).sum();
    kept.into_iter()
        .map(|(key, p)| (key.to_string(), if total > 0.0 { p / total } else { 0.0 }))
        .collect()
}

/// NCHW RGB tensor normalised as `(x - 127.5) / 128`
fn rgb_tensor(image: &DynamicImage) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - 127.5) / 128.0;
        }
    }

    tensor
}

/// Single-channel tensor of raw [0, 255] values; FER+ is not normalised
fn grayscale_tensor(image: &DynamicImage) -> Array4<f32> {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 1, height as usize, width as usize));

    for (x, y, pixel) in gray.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32;
    }

    tensor
}
