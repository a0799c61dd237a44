//! Prediction provider collaborators
//!
//! A provider turns a symptom (plus optional fused knowledge) into an organ
//! and location prediction. Transport details such as auth and rate limiting
//! stay inside the provider; retry policy belongs to the orchestrator, which
//! only needs to know whether a failure is transient.

pub mod openai_compat;
pub mod prompt;
pub mod response_parser;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use symloc_common::models::{DecisionLabel, FusedKnowledge, OrganDistribution, Prediction};
use thiserror::Error;

pub use openai_compat::OpenAiCompatibleProvider;

/// Provider failure classification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Timeouts, rate limits, server errors; worth retrying
    #[error("{0}")]
    Transient(String),

    /// Auth failures, bad requests, malformed response schema
    #[error("{0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Fused knowledge as presented to a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeContext {
    pub decision_label: DecisionLabel,
    pub quality_score: f64,
    pub consistent: bool,
    pub resolved_organ_distribution: OrganDistribution,

    /// Diagnosis texts of the kept snippets
    pub reference_diagnoses: Vec<String>,

    /// Organs dropped by conflict resolution
    pub conflicting_organs: Vec<String>,
}

impl From<&FusedKnowledge> for KnowledgeContext {
    fn from(fused: &FusedKnowledge) -> Self {
        Self {
            decision_label: fused.decision_label,
            quality_score: fused.quality_score,
            consistent: fused.consistent,
            resolved_organ_distribution: fused.resolved_organ_distribution.clone(),
            reference_diagnoses: fused
                .kept_snippets
                .iter()
                .map(|s| s.diagnosis_text.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            conflicting_organs: fused.conflicting_organs.clone(),
        }
    }
}

/// Input to one prediction call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub symptom_text: String,

    /// Present for RAG-enhanced units only
    pub knowledge: Option<KnowledgeContext>,
}

impl PredictionRequest {
    pub fn baseline(symptom_text: impl Into<String>) -> Self {
        Self {
            symptom_text: symptom_text.into(),
            knowledge: None,
        }
    }

    pub fn with_knowledge(symptom_text: impl Into<String>, knowledge: KnowledgeContext) -> Self {
        Self {
            symptom_text: symptom_text.into(),
            knowledge: Some(knowledge),
        }
    }
}

/// Prediction capability
///
/// `Ok(None)` means the model answered with no payload at all; scoring turns
/// that into an empty-prediction failure.
#[async_trait]
pub trait PredictionProvider: Send + Sync {
    /// Provider name used in unit keys and reports
    fn name(&self) -> &str;

    async fn predict(&self, request: &PredictionRequest) -> Result<Option<Prediction>, ProviderError>;
}
