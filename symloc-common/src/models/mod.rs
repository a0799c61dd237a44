//! Evaluation data model
//!
//! Ownership: a `Symptom` owns its raw `AnnotationUnit`s and, once normalized,
//! its `ExpectedResult`. Evaluation runs own `Prediction`s and metrics; nothing
//! upstream is mutated by scoring.

pub mod annotation;
pub mod artifact;
pub mod knowledge;
pub mod metrics;
pub mod prediction;
pub mod unit;

pub use annotation::{AnnotationUnit, ExpectedResult, Report, Symptom};
pub use artifact::{
    BatchSummary, ProviderComparisonSummary, ProviderModeSummary, ReportArtifact, SymptomRecord,
};
pub use knowledge::{DecisionLabel, FusedKnowledge, OrganDistribution, RetrievedSnippet};
pub use metrics::{
    AccuracyCounts, ErrorKind, FailureSummary, KnowledgeSummary, ModeComparison, OrganAccuracyClass,
    ReportMetrics, SymptomMetrics,
};
pub use prediction::{EvaluationMode, Prediction};
pub use unit::{UnitError, UnitKey, UnitRecord, UnitState, UnitTransition};
