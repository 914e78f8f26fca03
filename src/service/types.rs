//! Service layer types

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::analysis::catalog::{self, ONE_TO_ONE_ID, WORKSHOP_ID};
use crate::analysis::types::{FaceDetails, FaceRegions, ProductSuggestion, SpotAnalysis, WrinkleAnalysis};

/// Full analysis outcome. Optional fields are omitted when not computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinAnalysisResult {
    pub overall_score: u8,
    pub wrinkles: WrinkleAnalysis,
    pub spots: SpotAnalysis,
    pub whats_working: Vec<String>,
    pub needs_attention: Vec<String>,
    pub recommendations: Vec<String>,
    pub product_suggestions: Vec<ProductSuggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_regions: Option<FaceRegions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_details: Option<FaceDetails>,
}

pub const FALLBACK_OVERALL_SCORE: u8 = 72;

impl SkinAnalysisResult {
    /// Fixed result served when the pipeline fails
    pub fn fallback() -> Self {
        let lines = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            overall_score: FALLBACK_OVERALL_SCORE,
            wrinkles: WrinkleAnalysis {
                score: 68,
                forehead: 65,
                crow_feet: 70,
                fine_lines: 72,
                summary: "Moderate signs of lines. Forehead and eye area could benefit from targeted care \
                          and face yoga techniques."
                    .to_string(),
            },
            spots: SpotAnalysis {
                score: 76,
                blemishes: 78,
                hyperpigmentation: 74,
                summary: "Skin clarity is good. A few areas of uneven tone; gentle exfoliation and sun \
                          protection will help maintain this."
                    .to_string(),
            },
            whats_working: lines(&[
                "Skin texture is smooth in most areas",
                "Good hydration balance",
                "Under-eye area shows minimal puffiness",
            ]),
            needs_attention: lines(&[
                "Forehead lines may deepen with expression and sun",
                "Some uneven skin tone around cheeks",
            ]),
            recommendations: lines(&[
                "Consider face yoga for forehead and crow's feet (Full Face Rejuvenation or Radiant Eyes & Cheeks)",
                "Use SPF daily and a gentle vitamin C serum for tone",
                "Weekly gua sha to support circulation and lift",
            ]),
            product_suggestions: [WORKSHOP_ID, ONE_TO_ONE_ID]
                .into_iter()
                .filter_map(catalog::suggestion)
                .collect(),
            structure_score: None,
            face_regions: None,
            face_details: None,
        }
    }
}

/// Which path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOutcome {
    RegionBased,
    GlobalOnly,
    Fallback,
}

/// Process-wide analysis counters
#[derive(Debug, Default)]
pub struct AnalysisStats {
    total: AtomicU64,
    region_based: AtomicU64,
    global_only: AtomicU64,
    fallbacks: AtomicU64,
}

impl AnalysisStats {
    pub fn record(&self, outcome: AnalysisOutcome) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            AnalysisOutcome::RegionBased => &self.region_based,
            AnalysisOutcome::GlobalOnly => &self.global_only,
            AnalysisOutcome::Fallback => &self.fallbacks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            region_based: self.region_based.load(Ordering::Relaxed),
            global_only: self.global_only.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub region_based: u64,
    pub global_only: u64,
    pub fallbacks: u64,
}
