//! Ground-truth annotation types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use super::knowledge::OrganDistribution;

/// One raw ground-truth entry attached to a symptom
///
/// Fields that may be missing in the source data stay optional so that
/// absence can be reported as a malformed annotation instead of being
/// defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationUnit {
    /// Free-text diagnosis
    pub diagnosis_text: String,

    /// Organ name from the controlled vocabulary
    pub organ_name: Option<String>,

    /// Anatomical locations within the organ
    pub anatomical_locations: Option<Vec<String>>,
}

impl AnnotationUnit {
    /// Create a fully populated annotation unit
    pub fn new(
        diagnosis_text: impl Into<String>,
        organ_name: impl Into<String>,
        anatomical_locations: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            diagnosis_text: diagnosis_text.into(),
            organ_name: Some(organ_name.into()),
            anatomical_locations: Some(anatomical_locations.into_iter().map(Into::into).collect()),
        }
    }
}

/// Symptom description with its raw annotation units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symptom {
    /// Stable identifier, `<report_id>_symptom_<index>`
    pub symptom_id: String,

    /// Position of the symptom within its report
    pub index: usize,

    /// Symptom description text (the retrieval and prediction query)
    pub text: String,

    /// Raw, possibly redundant ground-truth entries
    pub annotation_units: Vec<AnnotationUnit>,
}

impl Symptom {
    pub fn new(report_id: u32, index: usize, text: impl Into<String>, annotation_units: Vec<AnnotationUnit>) -> Self {
        Self {
            symptom_id: format!("{}_symptom_{}", report_id, index),
            index,
            text: text.into(),
            annotation_units,
        }
    }
}

/// Normalized ground truth for one symptom
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExpectedResult {
    /// organName → deduplicated anatomical locations
    pub organ_distribution: OrganDistribution,

    /// organName → diagnosis texts in first-seen order
    pub diagnoses_by_organ: BTreeMap<String, Vec<String>>,

    /// All diagnosis texts across organs, deduplicated, first-seen order
    pub merged_diagnosis_texts: Vec<String>,

    /// Deduplicated organ names
    pub organ_names: BTreeSet<String>,
}

impl ExpectedResult {
    /// Union of all anatomical locations across organs
    pub fn flattened_locations(&self) -> BTreeSet<String> {
        self.organ_distribution
            .values()
            .flat_map(|locations| locations.iter().cloned())
            .collect()
    }

    /// Re-express this result as annotation units
    ///
    /// Feeding the output back through normalization yields the same
    /// organ distribution.
    pub fn to_annotation_units(&self) -> Vec<AnnotationUnit> {
        let mut units = Vec::new();
        for (organ, locations) in &self.organ_distribution {
            let diagnoses = self
                .diagnoses_by_organ
                .get(organ)
                .filter(|texts| !texts.is_empty());

            match diagnoses {
                Some(texts) => {
                    for text in texts {
                        units.push(AnnotationUnit::new(text.clone(), organ.clone(), locations.iter().cloned()));
                    }
                }
                None => units.push(AnnotationUnit::new(String::new(), organ.clone(), locations.iter().cloned())),
            }
        }
        units
    }
}

/// One diagnostic report loaded from the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_id: u32,

    /// File the report was loaded from, if any
    pub source_path: Option<PathBuf>,

    pub symptoms: Vec<Symptom>,
}
