//! Static product catalog, keyed by suggestion id

use super::types::ProductSuggestion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub price: Option<&'static str>,
    pub theme: Option<&'static str>,
}

impl CatalogEntry {
    pub fn to_suggestion(&self) -> ProductSuggestion {
        ProductSuggestion {
            id: self.id.to_string(),
            title: self.title.to_string(),
            description: self.description.to_string(),
            price: self.price.map(str::to_string),
            theme: self.theme.map(str::to_string),
        }
    }
}

pub const WORKSHOP_ID: &str = "face-yoga-workshop";
pub const ONE_TO_ONE_ID: &str = "one-to-one";
pub const SCULPTED_CHIN_ID: &str = "sculpted-chin";
pub const RADIANT_EYES_ID: &str = "radiant-eyes";
pub const FULL_FACE_ID: &str = "full-face";

pub static CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: WORKSHOP_ID,
        title: "Weekly Online Group Workshops",
        description: "Full face rejuvenation, strong eyelids, radiant eyes, sculpted chin/neck. \
                      Step-by-step learning, personalised feedback.",
        price: Some("£20 (45 mins)"),
        theme: Some("Full face rejuvenation"),
    },
    CatalogEntry {
        id: ONE_TO_ONE_ID,
        title: "One-to-One Zoom Programme",
        description: "4 x 45 mins over 1 month. Tailored support, custom exercises, progress reviews. \
                      Noticeable lift, tone and radiance.",
        price: None,
        theme: Some("Tailored support"),
    },
    CatalogEntry {
        id: SCULPTED_CHIN_ID,
        title: "Sculpted Chin / Neck – Beyond Gravity",
        description: "Focus on jawline, double chin and neck tone. Neck stretches, platysma toning, \
                      gua sha sculpting and lymph drainage. Fights gravity and supports structure.",
        price: None,
        theme: Some("Jawline & neck"),
    },
    CatalogEntry {
        id: RADIANT_EYES_ID,
        title: "Radiant Eyes & Cheeks – Beyond Glow",
        description: "Mid-face rejuvenation and circulation. Cheek sculpting, lymph drainage, \
                      under-eye release, breathwork.",
        price: None,
        theme: Some("Radiant eyes"),
    },
    CatalogEntry {
        id: FULL_FACE_ID,
        title: "Full Face Rejuvenation – Beyond Renewal",
        description: "Complete shoulders-up workout and relaxation. Face yoga, gua sha, \
                      lymphatic sweep, acupressure.",
        price: None,
        theme: Some("Full face"),
    },
];

pub fn lookup(id: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|entry| entry.id == id)
}

/// Display metadata for a known id. Ids are compile-time constants, so a miss
/// is skipped rather than treated as an error.
pub fn suggestion(id: &str) -> Option<ProductSuggestion> {
    lookup(id).map(CatalogEntry::to_suggestion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_id_resolves() {
        for id in [WORKSHOP_ID, ONE_TO_ONE_ID, SCULPTED_CHIN_ID, RADIANT_EYES_ID, FULL_FACE_ID] {
            assert!(lookup(id).is_some(), "missing catalog entry {}", id);
        }
        assert!(lookup("gift-card").is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let mut ids: Vec<_> = CATALOG.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn test_description_continuation_keeps_single_spaces() {
        let workshop = suggestion(WORKSHOP_ID).unwrap();
        assert!(workshop.description.contains("sculpted chin/neck. Step-by-step"));
        assert_eq!(workshop.price.as_deref(), Some("£20 (45 mins)"));
        assert!(suggestion(ONE_TO_ONE_ID).unwrap().price.is_none());
    }
}
