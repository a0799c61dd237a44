//! symloc-eval library interface
//!
//! Evaluates how well LLM providers localize diagnoses for medical symptom
//! descriptions, with and without retrieved reference knowledge.

pub mod dataset;
pub mod error;
pub mod fusion;
pub mod normalizer;
pub mod orchestrator;
pub mod providers;
pub mod retrieval;
pub mod scoring;
pub mod storage;

pub use crate::error::{EvalError, EvalResult};
pub use crate::fusion::FusionGate;
pub use crate::orchestrator::{BatchOrchestrator, BatchOutcome};
pub use crate::providers::{OpenAiCompatibleProvider, PredictionProvider, PredictionRequest, ProviderError};
pub use crate::retrieval::{JsonlRetriever, RetrievalCache, RetrievalError, Retriever};
pub use crate::scoring::ScoringEngine;
pub use crate::storage::ReportStore;
