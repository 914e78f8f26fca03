//! Score synthesis: metrics -> wrinkle and spot scores.
//!
//! Two variants exist. The region-based one measures the forehead and the
//! eye corners separately; the global-only one works from a single
//! whole-image texture value and derives sub-scores by nudging the main
//! score. The global-only variant is lower fidelity and only used when no
//! face regions are available.

use super::types::{ImageMetrics, SpotAnalysis, WrinkleAnalysis};
use crate::utils::math::to_score;

/// How much texture (0..1) can take off a 100 wrinkle score
const TEXTURE_WEIGHT: f64 = 55.0;
/// How much unevenness (0..1) can take off a 100 spot score
const EVENNESS_WEIGHT: f64 = 50.0;

/// Per-region texture measured on face crops, plus whole-image evenness
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionTextures {
    pub forehead: f64,
    pub left_eye: f64,
    pub right_eye: f64,
    pub global_evenness: f64,
}

impl RegionTextures {
    pub fn from_metrics(
        forehead: &ImageMetrics,
        left_eye: &ImageMetrics,
        right_eye: &ImageMetrics,
        global: &ImageMetrics,
    ) -> Self {
        Self {
            forehead: forehead.texture_score,
            left_eye: left_eye.texture_score,
            right_eye: right_eye.texture_score,
            global_evenness: global.evenness_score,
        }
    }
}

/// Which algorithm produces the wrinkle sub-scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoringStrategy {
    /// Face regions were located and measured independently
    RegionBased(RegionTextures),
    /// Only whole-image metrics are available
    GlobalOnly(ImageMetrics),
}

impl ScoringStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ScoringStrategy::RegionBased(_) => "region_based",
            ScoringStrategy::GlobalOnly(_) => "global_only",
        }
    }
}

/// Wrinkle and spot scores plus the unrounded overall blend
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSet {
    pub wrinkles: WrinkleAnalysis,
    pub spots: SpotAnalysis,
    /// Equal blend of wrinkles and spots; rounded when the result is assembled
    pub overall: f64,
}

pub fn synthesize(strategy: &ScoringStrategy) -> ScoreSet {
    let (wrinkles, evenness) = match strategy {
        ScoringStrategy::RegionBased(textures) => (region_wrinkles(textures), textures.global_evenness),
        ScoringStrategy::GlobalOnly(metrics) => (global_wrinkles(metrics.texture_score), metrics.evenness_score),
    };
    let spots = spot_analysis(evenness);
    let overall = wrinkles.score as f64 * 0.5 + spots.score as f64 * 0.5;

    ScoreSet { wrinkles, spots, overall }
}

/// Texture (0 smooth .. 1 textured) to a 0..100 score, higher is better
pub fn texture_to_score(texture: f64) -> u8 {
    to_score(100.0 - texture * TEXTURE_WEIGHT)
}

fn region_wrinkles(textures: &RegionTextures) -> WrinkleAnalysis {
    let crow_feet_texture = (textures.left_eye + textures.right_eye) / 2.0;
    let forehead = texture_to_score(textures.forehead);
    let crow_feet = texture_to_score(crow_feet_texture);
    // The eye-corner crop also stands in for fine lines
    let fine_lines = crow_feet;
    let score = to_score((forehead as f64 + crow_feet as f64 + fine_lines as f64) / 3.0);

    WrinkleAnalysis {
        score,
        forehead,
        crow_feet,
        fine_lines,
        summary: wrinkle_summary(score).to_string(),
    }
}

fn global_wrinkles(texture: f64) -> WrinkleAnalysis {
    let score = texture_to_score(texture);
    let nudge = |weight: f64| to_score(score as f64 + (texture - 0.5) * weight);

    WrinkleAnalysis {
        score,
        forehead: nudge(10.0),
        crow_feet: nudge(6.0),
        fine_lines: nudge(8.0),
        summary: wrinkle_summary(score).to_string(),
    }
}

fn spot_analysis(evenness: f64) -> SpotAnalysis {
    let score = to_score(100.0 - evenness * EVENNESS_WEIGHT);
    let nudge = |weight: f64| to_score(score as f64 + (evenness - 0.5) * weight);

    SpotAnalysis {
        score,
        blemishes: nudge(10.0),
        hyperpigmentation: nudge(6.0),
        summary: spot_summary(score).to_string(),
    }
}

/// Three-tier summary, split at 75 and 50
pub fn wrinkle_summary(score: u8) -> &'static str {
    match score {
        75.. => "Skin appears smooth with minimal visible lines. Keep up your current routine.",
        50..=74 => "Moderate signs of lines. Forehead and eye area could benefit from targeted care and face yoga techniques.",
        _ => "Visible texture and lines. Face yoga, hydration and sun protection can help improve appearance over time.",
    }
}

/// Three-tier summary, split at 75 and 50
pub fn spot_summary(score: u8) -> &'static str {
    match score {
        75.. => "Skin clarity is good with even tone. Gentle exfoliation and SPF will help maintain this.",
        50..=74 => "Some uneven tone. Gentle exfoliation, vitamin C and sun protection will help.",
        _ => "Uneven tone detected. Consider a consistent routine with SPF and targeted serums.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(texture: f64, evenness: f64) -> ScoreSet {
        synthesize(&ScoringStrategy::GlobalOnly(ImageMetrics {
            texture_score: texture,
            evenness_score: evenness,
        }))
    }

    fn regions(forehead: f64, left: f64, right: f64, evenness: f64) -> ScoreSet {
        synthesize(&ScoringStrategy::RegionBased(RegionTextures {
            forehead,
            left_eye: left,
            right_eye: right,
            global_evenness: evenness,
        }))
    }

    fn all_scores(set: &ScoreSet) -> [u8; 7] {
        let (w, s) = (&set.wrinkles, &set.spots);
        [w.score, w.forehead, w.crow_feet, w.fine_lines, s.score, s.blemishes, s.hyperpigmentation]
    }

    #[test]
    fn test_smooth_even_image_scores_high() {
        let set = global(0.0, 0.0);
        assert_eq!(set.wrinkles.score, 100);
        // 100 + (0 - 0.5) * 10 = 95
        assert_eq!(set.wrinkles.forehead, 95);
        assert_eq!(set.wrinkles.crow_feet, 97);
        assert_eq!(set.wrinkles.fine_lines, 96);
        assert_eq!(set.spots.score, 100);
        assert_eq!(set.spots.blemishes, 95);
        assert_eq!(set.spots.hyperpigmentation, 97);
        assert!((set.overall - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_fully_textured_image() {
        let set = global(1.0, 1.0);
        assert_eq!(set.wrinkles.score, 45);
        assert_eq!(set.wrinkles.forehead, 50);
        assert_eq!(set.spots.score, 50);
        assert_eq!(set.spots.blemishes, 55);
        assert!((set.overall - 47.5).abs() < 1e-9);
    }

    #[test]
    fn test_region_based_scores() {
        // forehead 0.2 -> 89, eyes avg 0.6 -> 67
        let set = regions(0.2, 0.5, 0.7, 0.4);
        assert_eq!(set.wrinkles.forehead, 89);
        assert_eq!(set.wrinkles.crow_feet, 67);
        assert_eq!(set.wrinkles.fine_lines, 67);
        // (89 + 67 + 67) / 3 = 74.33
        assert_eq!(set.wrinkles.score, 74);
        assert_eq!(set.spots.score, 80);
        assert_eq!(set.spots.blemishes, 79);
        assert_eq!(set.spots.hyperpigmentation, 79);
        assert!((set.overall - 77.0).abs() < 1e-9);
    }

    #[test]
    fn test_eye_symmetry() {
        let a = regions(0.3, 0.1, 0.9, 0.2);
        let b = regions(0.3, 0.9, 0.1, 0.2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrinkles_decrease_with_texture() {
        let mut previous = global(0.0, 0.3).wrinkles.score;
        for step in 1..=10 {
            let current = global(step as f64 * 0.1, 0.3).wrinkles.score;
            assert!(current < previous, "texture {} did not lower the score", step);
            previous = current;
        }
    }

    #[test]
    fn test_region_wrinkles_decrease_with_forehead_texture() {
        let mut previous = regions(0.0, 0.4, 0.4, 0.3);
        for step in 1..=10 {
            let current = regions(step as f64 * 0.1, 0.4, 0.4, 0.3);
            assert!(current.wrinkles.forehead < previous.wrinkles.forehead);
            assert!(current.wrinkles.score <= previous.wrinkles.score);
            assert_eq!(current.wrinkles.crow_feet, previous.wrinkles.crow_feet);
            previous = current;
        }
        assert!(regions(1.0, 0.4, 0.4, 0.3).wrinkles.score < regions(0.0, 0.4, 0.4, 0.3).wrinkles.score);
    }

    #[test]
    fn test_region_wrinkles_decrease_with_eye_texture() {
        let mut previous = regions(0.3, 0.0, 0.0, 0.3).wrinkles.score;
        for step in 1..=10 {
            let t = step as f64 * 0.1;
            let current = regions(0.3, t, t, 0.3).wrinkles.score;
            assert!(current < previous, "eye texture {} did not lower the score", step);
            previous = current;
        }
    }

    #[test]
    fn test_scores_stay_in_range() {
        for t in [-0.5, 0.0, 0.33, 0.5, 0.99, 1.0, 1.5] {
            for e in [-0.5, 0.0, 0.25, 0.5, 1.0, 2.0] {
                for score in all_scores(&global(t, e)).into_iter().chain(all_scores(&regions(t, e, t, e))) {
                    assert!(score <= 100);
                }
                let overall = global(t, e).overall;
                assert!((0.0..=100.0).contains(&overall));
            }
        }
    }

    #[test]
    fn test_summary_tiers() {
        assert_eq!(wrinkle_summary(75), wrinkle_summary(100));
        assert_ne!(wrinkle_summary(74), wrinkle_summary(75));
        assert_eq!(wrinkle_summary(50), wrinkle_summary(74));
        assert_ne!(wrinkle_summary(49), wrinkle_summary(50));
        assert_eq!(spot_summary(0), spot_summary(49));
        assert!(spot_summary(80).starts_with("Skin clarity is good"));
    }

    #[test]
    fn test_strategy_name() {
        let metrics = ImageMetrics { texture_score: 0.0, evenness_score: 0.0 };
        assert_eq!(ScoringStrategy::GlobalOnly(metrics).name(), "global_only");
    }
}
