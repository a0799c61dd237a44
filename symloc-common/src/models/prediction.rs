//! Model prediction types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Evaluation mode of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Symptom text only
    Baseline,
    /// Symptom text plus fused retrieved knowledge
    RagEnhanced,
}

impl EvaluationMode {
    pub const ALL: [EvaluationMode; 2] = [EvaluationMode::Baseline, EvaluationMode::RagEnhanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationMode::Baseline => "baseline",
            EvaluationMode::RagEnhanced => "rag_enhanced",
        }
    }
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Organ and location prediction returned by a model
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Prediction {
    pub organ_names: Vec<String>,

    pub anatomical_locations: Vec<String>,

    /// Free-text rationale, if the model gave one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Prediction {
    pub fn new(
        organ_names: impl IntoIterator<Item = impl Into<String>>,
        anatomical_locations: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            organ_names: organ_names.into_iter().map(Into::into).collect(),
            anatomical_locations: anatomical_locations.into_iter().map(Into::into).collect(),
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}
