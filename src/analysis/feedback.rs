//! Rule-based feedback text and product ranking

use super::catalog::{self, FULL_FACE_ID, ONE_TO_ONE_ID, RADIANT_EYES_ID, SCULPTED_CHIN_ID, WORKSHOP_ID};
use super::types::{ProductSuggestion, SpotAnalysis, WrinkleAnalysis};

/// Below this structure score the jawline rules fire
pub const STRUCTURE_CONCERN: u8 = 65;
/// Below this a dedicated product is ranked in
pub const PRODUCT_CONCERN: u8 = 65;
pub const MAX_SUGGESTIONS: usize = 3;

pub const STRUCTURE_ATTENTION: &str =
    "Jawline and neck can benefit from structure support; face yoga and gua sha fight gravity.";
pub const STRUCTURE_RECOMMENDATION: &str = "Focus on jawline and neck: Sculpted Chin/Neck (Beyond Gravity) \
     and gua sha can support structure and fight sagging.";
pub const EYE_RECOMMENDATION: &str =
    "Consider face yoga for forehead and crow's feet (Full Face Rejuvenation or Radiant Eyes & Cheeks)";
pub const WORKING_FALLBACK: &str = "Your skin has potential to improve with a consistent routine";
pub const ATTENTION_FALLBACK: &str = "Keep maintaining your current routine for best results";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feedback {
    pub whats_working: Vec<String>,
    pub needs_attention: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Every matching rule contributes. Both observation lists are never empty.
pub fn build_feedback(wrinkles: &WrinkleAnalysis, spots: &SpotAnalysis, structure: Option<u8>) -> Feedback {
    let mut feedback = Feedback::default();

    match wrinkles.score {
        70.. => feedback.working("Skin texture is smooth in most areas"),
        50..=69 => feedback.attention("Forehead and eye area could benefit from targeted care"),
        _ => feedback.attention("Visible lines may deepen with expression and sun; face yoga can help"),
    }

    match spots.score {
        70.. => feedback.working("Good skin clarity and even tone"),
        50..=69 => feedback.attention("Some uneven skin tone; gentle exfoliation and SPF can help"),
        _ => feedback.attention("Uneven tone; consider vitamin C serum and consistent sun protection"),
    }

    if structure.is_some_and(|s| s < STRUCTURE_CONCERN) {
        feedback.attention(STRUCTURE_ATTENTION);
        // Recommendations are still empty here, so this leads the list
        feedback.recommend(STRUCTURE_RECOMMENDATION);
    }

    if wrinkles.score < 75 {
        feedback.working("Under-eye area can be supported with gentle massage and hydration");
        feedback.recommend(EYE_RECOMMENDATION);
    }

    feedback.recommend("Use SPF daily and a gentle vitamin C serum for tone");
    feedback.recommend("Weekly gua sha can support circulation and lift");

    if feedback.whats_working.is_empty() {
        feedback.working(WORKING_FALLBACK);
    }
    if feedback.needs_attention.is_empty() {
        feedback.attention(ATTENTION_FALLBACK);
    }

    feedback
}

impl Feedback {
    fn working(&mut self, line: &str) {
        self.whats_working.push(line.to_string());
    }

    fn attention(&mut self, line: &str) {
        self.needs_attention.push(line.to_string());
    }

    fn recommend(&mut self, line: &str) {
        self.recommendations.push(line.to_string());
    }
}

/// Ranked product ids before truncation. Each front insertion goes ahead of
/// the previous one, so the eye product outranks the jaw product.
pub fn rank_products(wrinkles: &WrinkleAnalysis, spots: &SpotAnalysis, structure: Option<u8>) -> Vec<&'static str> {
    let mut ids = vec![WORKSHOP_ID, ONE_TO_ONE_ID];
    if structure.is_some_and(|s| s < STRUCTURE_CONCERN) {
        ids.insert(0, SCULPTED_CHIN_ID);
    }
    if wrinkles.score < PRODUCT_CONCERN {
        ids.insert(0, RADIANT_EYES_ID);
    }
    if spots.score < PRODUCT_CONCERN {
        ids.push(FULL_FACE_ID);
    }
    ids
}

/// At most three suggestions, truncated after ranking
pub fn suggest_products(wrinkles: &WrinkleAnalysis, spots: &SpotAnalysis, structure: Option<u8>) -> Vec<ProductSuggestion> {
    rank_products(wrinkles, spots, structure)
        .into_iter()
        .filter_map(catalog::suggestion)
        .take(MAX_SUGGESTIONS)
        .collect()
}
