//! Match & score engine
//!
//! Compares one prediction against the normalized ground truth of its
//! symptom. Pure and deterministic; inputs are never mutated.
//!
//! `overall = w1·f1 + w2·credit(class) - w3·overgeneration`, clamped to
//! [0, 1], where credit is 1.0 / 0.5 / 0.0 for exact / partial / incorrect.
//! The weights come from [`ScoringWeights`] and are exposed through
//! [`ScoringEngine::weights`] because they change how results read.

pub mod location_match;
pub mod organ_match;

use symloc_common::config::ScoringWeights;
use symloc_common::models::{ExpectedResult, Prediction, SymptomMetrics};

use crate::error::{EvalError, EvalResult};

pub use location_match::{normalize_term, normalized_set, LocationOverlap};
pub use organ_match::classify_organs;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score a prediction
    ///
    /// `None` means the model returned no payload at all and fails with
    /// [`EvalError::EmptyPrediction`]. A present prediction with no
    /// locations is scored normally.
    pub fn score(&self, expected: &ExpectedResult, predicted: Option<&Prediction>) -> EvalResult<SymptomMetrics> {
        let predicted = predicted
            .ok_or_else(|| EvalError::EmptyPrediction("model returned no prediction payload".to_string()))?;

        let organ_accuracy_class = classify_organs(&expected.organ_names, &predicted.organ_names);

        let expected_locations = expected.flattened_locations();
        let overlap = LocationOverlap::compute(
            &normalized_set(expected_locations.iter()),
            &normalized_set(predicted.anatomical_locations.iter()),
        );

        let precision = overlap.precision();
        let recall = overlap.recall();
        let f1 = overlap.f1();
        let overgeneration_penalty = overlap.overgeneration_penalty();

        let overall_score = (self.weights.f1_weight * f1 + self.weights.organ_weight * organ_accuracy_class.credit()
            - self.weights.overgeneration_weight * overgeneration_penalty)
            .clamp(0.0, 1.0);

        tracing::trace!(
            class = %organ_accuracy_class,
            matched = overlap.matched,
            expected = overlap.expected,
            predicted = overlap.predicted,
            overall_score,
            "Scored prediction"
        );

        Ok(SymptomMetrics {
            organ_accuracy_class,
            precision,
            recall,
            f1,
            overgeneration_penalty,
            overall_score,
        })
    }
}
