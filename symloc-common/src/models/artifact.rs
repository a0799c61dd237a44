//! Persisted report artifacts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::annotation::ExpectedResult;
use super::knowledge::FusedKnowledge;
use super::metrics::{FailureSummary, KnowledgeSummary, ModeComparison, ReportMetrics};
use super::prediction::EvaluationMode;
use super::unit::UnitRecord;

/// Everything evaluated for one symptom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomRecord {
    pub symptom_id: String,
    pub text: String,
    pub expected: ExpectedResult,

    /// Present when RAG-enhanced units ran for this symptom
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fused_knowledge: Option<FusedKnowledge>,

    pub units: Vec<UnitRecord>,
}

/// JSON document stored per report and run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub report_id: u32,
    pub generated_at: DateTime<Utc>,
    pub symptoms: Vec<SymptomRecord>,

    /// Symptoms skipped because their ground truth was malformed
    #[serde(default)]
    pub skipped_symptoms: Vec<String>,

    pub metrics: Vec<ReportMetrics>,
    pub comparisons: Vec<ModeComparison>,

    /// Fusion outcomes of the symptoms that ran RAG-enhanced units
    #[serde(default)]
    pub knowledge: KnowledgeSummary,
}

/// Per (provider, mode) rollup across reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderModeSummary {
    pub provider: String,
    pub mode: EvaluationMode,
    pub reports: usize,
    pub scored_units: usize,
    pub failed_units: usize,
    pub mean_precision: f64,
    pub mean_recall: f64,
    pub mean_f1: f64,
    pub mean_overgeneration_penalty: f64,
    pub mean_overall_score: f64,
}

/// Summary of a whole batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub report_ids: Vec<u32>,
    pub cancelled: bool,
    pub failures: FailureSummary,
    pub by_provider_mode: Vec<ProviderModeSummary>,

    /// Per-provider RAG-enhanced vs baseline rollup, provider order
    #[serde(default)]
    pub comparisons: Vec<ProviderComparisonSummary>,

    #[serde(default)]
    pub knowledge: KnowledgeSummary,
}

/// RAG-enhanced vs baseline rollup for one provider across reports
///
/// Deltas are weighted by the symptoms each report compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderComparisonSummary {
    pub provider: String,
    pub reports: usize,
    pub compared_symptoms: usize,
    pub improved: usize,
    pub degraded: usize,
    pub unchanged: usize,
    pub precision_delta: f64,
    pub recall_delta: f64,
    pub f1_delta: f64,
    pub overgeneration_delta: f64,
    pub overall_delta: f64,
}

impl ProviderComparisonSummary {
    fn ratio(&self, count: usize) -> f64 {
        if self.compared_symptoms == 0 {
            0.0
        } else {
            count as f64 / self.compared_symptoms as f64
        }
    }

    pub fn improved_ratio(&self) -> f64 {
        self.ratio(self.improved)
    }

    pub fn degraded_ratio(&self) -> f64 {
        self.ratio(self.degraded)
    }

    pub fn unchanged_ratio(&self) -> f64 {
        self.ratio(self.unchanged)
    }
}
