//! Scoring and aggregation result types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::knowledge::{DecisionLabel, FusedKnowledge};
use super::prediction::EvaluationMode;

/// Predicted organ set compared against the expected organ set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganAccuracyClass {
    /// Sets are equal
    Exact,
    /// Sets intersect but differ
    Partial,
    /// No overlap
    Incorrect,
}

impl OrganAccuracyClass {
    /// Credit used in the overall score
    pub fn credit(&self) -> f64 {
        match self {
            OrganAccuracyClass::Exact => 1.0,
            OrganAccuracyClass::Partial => 0.5,
            OrganAccuracyClass::Incorrect => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrganAccuracyClass::Exact => "exact",
            OrganAccuracyClass::Partial => "partial",
            OrganAccuracyClass::Incorrect => "incorrect",
        }
    }
}

impl fmt::Display for OrganAccuracyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics for one (symptom, prediction) pair; immutable once computed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymptomMetrics {
    pub organ_accuracy_class: OrganAccuracyClass,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub overgeneration_penalty: f64,
    pub overall_score: f64,
}

/// Failure category recorded for a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedAnnotation,
    EmptyPrediction,
    TransientProvider,
    PermanentProvider,
    Retrieval,
    Dataset,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedAnnotation => "malformed_annotation",
            ErrorKind::EmptyPrediction => "empty_prediction",
            ErrorKind::TransientProvider => "transient_provider",
            ErrorKind::PermanentProvider => "permanent_provider",
            ErrorKind::Retrieval => "retrieval",
            ErrorKind::Dataset => "dataset",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure counts grouped by kind
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailureSummary {
    pub total: usize,
    pub by_kind: BTreeMap<ErrorKind, usize>,
}

impl FailureSummary {
    pub fn record(&mut self, kind: ErrorKind) {
        self.total += 1;
        *self.by_kind.entry(kind).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &FailureSummary) {
        self.total += other.total;
        for (kind, count) in &other.by_kind {
            *self.by_kind.entry(*kind).or_insert(0) += count;
        }
    }

    /// Most frequent kind; ties resolve to the kind declared first
    pub fn dominant_kind(&self) -> Option<ErrorKind> {
        let mut dominant: Option<(ErrorKind, usize)> = None;
        for (kind, count) in &self.by_kind {
            match dominant {
                Some((_, best)) if *count <= best => {}
                _ => dominant = Some((*kind, *count)),
            }
        }
        dominant.map(|(kind, _)| kind)
    }
}

/// Organ accuracy class counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccuracyCounts {
    pub exact: usize,
    pub partial: usize,
    pub incorrect: usize,
}

impl AccuracyCounts {
    pub fn record(&mut self, class: OrganAccuracyClass) {
        match class {
            OrganAccuracyClass::Exact => self.exact += 1,
            OrganAccuracyClass::Partial => self.partial += 1,
            OrganAccuracyClass::Incorrect => self.incorrect += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.exact + self.partial + self.incorrect
    }
}

/// Aggregate of all symptom metrics for one report, provider and mode
///
/// Means cover scored units only; failed units appear in `failures`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub report_id: u32,
    pub provider: String,
    pub mode: EvaluationMode,
    pub scored_units: usize,
    pub failures: FailureSummary,
    pub accuracy_counts: AccuracyCounts,
    pub mean_precision: f64,
    pub mean_recall: f64,
    pub mean_f1: f64,
    pub mean_overgeneration_penalty: f64,
    pub mean_overall_score: f64,
}

/// Baseline versus RAG-enhanced comparison for one report and provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeComparison {
    pub report_id: u32,
    pub provider: String,

    /// Symptoms scored in both modes
    pub compared_symptoms: usize,

    pub precision_delta: f64,
    pub recall_delta: f64,
    pub f1_delta: f64,
    pub overgeneration_delta: f64,
    pub overall_delta: f64,

    pub improved: usize,
    pub degraded: usize,
    pub unchanged: usize,
}

/// Distribution of fusion outcomes over symptoms that had retrieved knowledge
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KnowledgeSummary {
    pub fused_symptoms: usize,
    pub trust: usize,
    pub cautious: usize,
    pub distrust: usize,

    /// Fused results whose snippets named more than one organ
    pub inconsistent: usize,

    pub mean_quality: f64,
}

impl KnowledgeSummary {
    pub fn record(&mut self, fused: &FusedKnowledge) {
        self.fused_symptoms += 1;
        match fused.decision_label {
            DecisionLabel::Trust => self.trust += 1,
            DecisionLabel::Cautious => self.cautious += 1,
            DecisionLabel::Distrust => self.distrust += 1,
        }
        if !fused.consistent {
            self.inconsistent += 1;
        }
        self.mean_quality += (fused.quality_score - self.mean_quality) / self.fused_symptoms as f64;
    }

    /// Combine two summaries; mean quality is weighted by fused symptoms
    pub fn merge(&mut self, other: &KnowledgeSummary) {
        let total = self.fused_symptoms + other.fused_symptoms;
        if total == 0 {
            return;
        }
        self.mean_quality = (self.mean_quality * self.fused_symptoms as f64
            + other.mean_quality * other.fused_symptoms as f64)
            / total as f64;
        self.fused_symptoms = total;
        self.trust += other.trust;
        self.cautious += other.cautious;
        self.distrust += other.distrust;
        self.inconsistent += other.inconsistent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_credit() {
        assert_eq!(OrganAccuracyClass::Exact.credit(), 1.0);
        assert_eq!(OrganAccuracyClass::Partial.credit(), 0.5);
        assert_eq!(OrganAccuracyClass::Incorrect.credit(), 0.0);
    }

    #[test]
    fn test_dominant_kind() {
        let mut summary = FailureSummary::default();
        assert!(summary.dominant_kind().is_none());

        summary.record(ErrorKind::PermanentProvider);
        summary.record(ErrorKind::TransientProvider);
        summary.record(ErrorKind::TransientProvider);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.dominant_kind(), Some(ErrorKind::TransientProvider));
    }

    #[test]
    fn test_dominant_kind_tie_prefers_declaration_order() {
        let mut summary = FailureSummary::default();
        summary.record(ErrorKind::PermanentProvider);
        summary.record(ErrorKind::EmptyPrediction);
        assert_eq!(summary.dominant_kind(), Some(ErrorKind::EmptyPrediction));
    }

    #[test]
    fn test_failure_summary_merge() {
        let mut a = FailureSummary::default();
        a.record(ErrorKind::Retrieval);
        let mut b = FailureSummary::default();
        b.record(ErrorKind::Retrieval);
        b.record(ErrorKind::Dataset);

        a.merge(&b);
        assert_eq!(a.total, 3);
        assert_eq!(a.by_kind[&ErrorKind::Retrieval], 2);
    }

    #[test]
    fn test_error_kind_map_key_serialization() {
        let mut summary = FailureSummary::default();
        summary.record(ErrorKind::EmptyPrediction);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"empty_prediction\":1"));
        let back: FailureSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }

    fn fused(label: DecisionLabel, quality: f64, consistent: bool) -> FusedKnowledge {
        FusedKnowledge {
            quality_score: quality,
            consistent,
            decision_label: label,
            ..FusedKnowledge::empty()
        }
    }

    #[test]
    fn test_knowledge_summary_counts_labels() {
        let mut summary = KnowledgeSummary::default();
        summary.record(&fused(DecisionLabel::Trust, 0.9, true));
        summary.record(&fused(DecisionLabel::Cautious, 0.6, false));
        summary.record(&fused(DecisionLabel::Distrust, 0.3, true));

        assert_eq!(summary.fused_symptoms, 3);
        assert_eq!((summary.trust, summary.cautious, summary.distrust), (1, 1, 1));
        assert_eq!(summary.inconsistent, 1);
        assert!((summary.mean_quality - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_knowledge_summary_merge_weights_quality() {
        let mut a = KnowledgeSummary::default();
        a.record(&fused(DecisionLabel::Trust, 0.9, true));
        let mut b = KnowledgeSummary::default();
        b.record(&fused(DecisionLabel::Distrust, 0.0, true));
        b.record(&fused(DecisionLabel::Distrust, 0.3, false));

        a.merge(&b);
        assert_eq!(a.fused_symptoms, 3);
        assert_eq!(a.distrust, 2);
        assert_eq!(a.inconsistent, 1);
        assert!((a.mean_quality - 0.4).abs() < 1e-12);

        let mut empty = KnowledgeSummary::default();
        empty.merge(&KnowledgeSummary::default());
        assert_eq!(empty, KnowledgeSummary::default());
    }
}
