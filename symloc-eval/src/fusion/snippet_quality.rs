//! Per-snippet quality signal
//!
//! Three binary signals combine additively with configured weights that sum
//! to 1.0:
//! - organ name present
//! - at least one anatomical location present
//! - diagnosis text longer than the informativeness threshold

use symloc_common::config::FusionConfig;
use symloc_common::models::RetrievedSnippet;

/// Per-snippet quality scorer
#[derive(Debug, Clone, Copy)]
pub struct SnippetQualityScorer {
    organ_weight: f64,
    locations_weight: f64,
    diagnosis_weight: f64,
    min_diagnosis_chars: usize,
}

impl Default for SnippetQualityScorer {
    fn default() -> Self {
        Self::from_config(&FusionConfig::default())
    }
}

impl SnippetQualityScorer {
    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            organ_weight: config.organ_weight,
            locations_weight: config.locations_weight,
            diagnosis_weight: config.diagnosis_weight,
            min_diagnosis_chars: config.min_diagnosis_chars,
        }
    }

    /// Quality in [0.0, 1.0]
    pub fn score(&self, snippet: &RetrievedSnippet) -> f64 {
        let mut score = 0.0;

        if !snippet.organ_name.trim().is_empty() {
            score += self.organ_weight;
        }
        if snippet.anatomical_locations.iter().any(|loc| !loc.trim().is_empty()) {
            score += self.locations_weight;
        }
        if snippet.diagnosis_text.trim().chars().count() > self.min_diagnosis_chars {
            score += self.diagnosis_weight;
        }

        score.clamp(0.0, 1.0)
    }
}
