//! Retrieved knowledge and fused context types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// organName → set of anatomical locations
pub type OrganDistribution = BTreeMap<String, BTreeSet<String>>;

/// One snippet returned by the retrieval collaborator for a symptom query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedSnippet {
    /// Identifier of the retrieved record
    pub source_id: String,

    /// Organ name (empty when the record carries none)
    #[serde(default)]
    pub organ_name: String,

    #[serde(default)]
    pub anatomical_locations: Vec<String>,

    #[serde(default)]
    pub diagnosis_text: String,
}

/// How the prediction stage is told to use fused knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionLabel {
    /// High quality, consistent: use as primary evidence
    Trust,
    /// Medium quality or resolved conflict: weigh against own knowledge
    Cautious,
    /// Low quality or empty: rely on own knowledge
    Distrust,
}

impl DecisionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionLabel::Trust => "trust",
            DecisionLabel::Cautious => "cautious",
            DecisionLabel::Distrust => "distrust",
        }
    }
}

impl fmt::Display for DecisionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieved snippets resolved into one quality-scored context
///
/// Computed fresh per symptom per run; never treated as ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedKnowledge {
    /// Mean per-snippet quality of the kept snippets (0.0 - 1.0)
    pub quality_score: f64,

    /// False when snippets named more than one organ
    pub consistent: bool,

    /// Locations of the kept organ group
    pub resolved_organ_distribution: OrganDistribution,

    pub decision_label: DecisionLabel,

    /// Snippets that survived conflict resolution, input order
    pub kept_snippets: Vec<RetrievedSnippet>,

    /// Source ids dropped by conflict resolution
    pub discarded_source_ids: Vec<String>,

    /// Organ names that lost conflict resolution, first-seen order
    pub conflicting_organs: Vec<String>,
}

impl FusedKnowledge {
    /// Result for an empty snippet list
    pub fn empty() -> Self {
        Self {
            quality_score: 0.0,
            consistent: true,
            resolved_organ_distribution: OrganDistribution::new(),
            decision_label: DecisionLabel::Distrust,
            kept_snippets: Vec::new(),
            discarded_source_ids: Vec::new(),
            conflicting_organs: Vec::new(),
        }
    }

    /// The organ the kept group agrees on, if any
    pub fn resolved_organ(&self) -> Option<&str> {
        self.resolved_organ_distribution.keys().next().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_label_serializes_lowercase() {
        let json = serde_json::to_string(&DecisionLabel::Cautious).unwrap();
        assert_eq!(json, "\"cautious\"");
        let back: DecisionLabel = serde_json::from_str("\"distrust\"").unwrap();
        assert_eq!(back, DecisionLabel::Distrust);
    }

    #[test]
    fn test_empty_fused_knowledge() {
        let fused = FusedKnowledge::empty();
        assert_eq!(fused.quality_score, 0.0);
        assert_eq!(fused.decision_label, DecisionLabel::Distrust);
        assert!(fused.resolved_organ().is_none());
    }

    #[test]
    fn test_snippet_missing_fields_default() {
        let snippet: RetrievedSnippet = serde_json::from_str(r#"{"source_id":"kb-1"}"#).unwrap();
        assert!(snippet.organ_name.is_empty());
        assert!(snippet.anatomical_locations.is_empty());
    }
}
