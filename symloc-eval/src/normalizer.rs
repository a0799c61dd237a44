//! Ground-truth normalizer
//!
//! Annotated reports repeat the same (organ, locations) pair across many
//! near-duplicate units that differ only in diagnosis wording. Normalization
//! collapses them into one organ-grouped expectation per symptom.
//!
//! Organ names are matched exactly (case-sensitive), since they come from a
//! controlled vocabulary. Multi-organ symptoms keep every organ group.

use std::collections::BTreeSet;

use symloc_common::models::{ExpectedResult, Symptom};

use crate::error::{EvalError, EvalResult};

/// Normalize the annotation units of one symptom
///
/// Pure function of its input. Fails with [`EvalError::MalformedAnnotation`]
/// on the first unit that lacks an organ name or has no locations, and when
/// the symptom has no units at all; the caller decides whether to skip the
/// symptom or abort.
pub fn normalize(symptom: &Symptom) -> EvalResult<ExpectedResult> {
    if symptom.annotation_units.is_empty() {
        return Err(malformed(symptom, 0, "symptom has no annotation units"));
    }

    let mut expected = ExpectedResult::default();

    for (unit_index, unit) in symptom.annotation_units.iter().enumerate() {
        let organ = match unit.organ_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(malformed(symptom, unit_index, "missing organName")),
        };

        let locations: BTreeSet<String> = unit
            .anatomical_locations
            .iter()
            .flatten()
            .filter(|loc| !loc.trim().is_empty())
            .cloned()
            .collect();
        if locations.is_empty() {
            return Err(malformed(symptom, unit_index, "empty anatomicalLocations"));
        }

        expected
            .organ_distribution
            .entry(organ.to_string())
            .or_default()
            .extend(locations);
        expected.organ_names.insert(organ.to_string());

        let diagnoses = expected.diagnoses_by_organ.entry(organ.to_string()).or_default();
        let text = unit.diagnosis_text.trim();
        if !text.is_empty() {
            push_unique(diagnoses, text);
            push_unique(&mut expected.merged_diagnosis_texts, text);
        }
    }

    tracing::trace!(
        symptom_id = %symptom.symptom_id,
        units = symptom.annotation_units.len(),
        organs = expected.organ_names.len(),
        diagnoses = expected.merged_diagnosis_texts.len(),
        "Normalized ground truth"
    );

    Ok(expected)
}

/// Normalize an already normalized result again
///
/// Used to check idempotence: the organ distribution must come back unchanged.
pub fn renormalize(symptom_id: &str, expected: &ExpectedResult) -> EvalResult<ExpectedResult> {
    let symptom = Symptom {
        symptom_id: symptom_id.to_string(),
        index: 0,
        text: String::new(),
        annotation_units: expected.to_annotation_units(),
    };
    normalize(&symptom)
}

fn push_unique(list: &mut Vec<String>, text: &str) {
    if !list.iter().any(|existing| existing == text) {
        list.push(text.to_string());
    }
}

fn malformed(symptom: &Symptom, unit_index: usize, reason: &str) -> EvalError {
    EvalError::MalformedAnnotation {
        symptom_id: symptom.symptom_id.clone(),
        unit_index,
        reason: reason.to_string(),
    }
}
