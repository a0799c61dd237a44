//! Organ accuracy classification

use std::collections::BTreeSet;

use symloc_common::models::OrganAccuracyClass;

use super::location_match::normalized_set;

/// Classify the predicted organ set against the expected organ names
///
/// Both sets go through the same normalization as locations, so casing or
/// spacing differences in model output do not demote an exact match.
pub fn classify_organs(expected: &BTreeSet<String>, predicted: &[String]) -> OrganAccuracyClass {
    let expected = normalized_set(expected.iter());
    let predicted = normalized_set(predicted.iter());

    if expected == predicted {
        OrganAccuracyClass::Exact
    } else if expected.intersection(&predicted).next().is_some() {
        OrganAccuracyClass::Partial
    } else {
        OrganAccuracyClass::Incorrect
    }
}
