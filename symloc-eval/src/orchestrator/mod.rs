//! Batch orchestrator
//!
//! Expands reports into evaluation units (symptom × provider × mode) and runs
//! every unit of the batch through one `buffer_unordered(max_workers)` stream.
//! Results are consumed as they finish; a report is aggregated as soon as its
//! last unit is terminal, so the comparison step always sees complete data.
//!
//! Cancellation abandons units that have not finished. Abandoned units are
//! not recorded as failed, and a report with any abandoned unit is dropped
//! from the outcome.

pub mod aggregate;
pub mod retry;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use symloc_common::config::{BatchConfig, RetrievalConfig, RetryConfig, TomlConfig};
use symloc_common::events::{EvalEvent, EventBus};
use symloc_common::models::{
    BatchSummary, ErrorKind, EvaluationMode, ExpectedResult, FailureSummary, FusedKnowledge, Report,
    ReportArtifact, Symptom, SymptomRecord, UnitKey, UnitRecord, UnitState,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dataset::{DatasetLoader, ReportIdRange};
use crate::error::{EvalError, EvalResult};
use crate::fusion::FusionGate;
use crate::normalizer::normalize;
use crate::providers::{KnowledgeContext, PredictionProvider, PredictionRequest};
use crate::retrieval::{RetrievalCache, Retriever};
use crate::scoring::ScoringEngine;

pub use retry::{backoff_delay, retry_transient, RetryOutcome};

/// Result of a batch that produced at least one scored unit (or was cancelled)
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub summary: BatchSummary,
    /// Fully completed reports, in report id order
    pub reports: Vec<ReportArtifact>,
}

impl BatchOutcome {
    pub fn batch_id(&self) -> Uuid {
        self.summary.batch_id
    }

    pub fn cancelled(&self) -> bool {
        self.summary.cancelled
    }
}

struct PreparedSymptom {
    symptom: Symptom,
    expected: ExpectedResult,
}

/// A report after ground truth normalization
struct ReportPlan {
    report_id: u32,
    prepared: Vec<PreparedSymptom>,
    skipped: Vec<String>,
}

enum UnitOutcome {
    Finished {
        record: UnitRecord,
        fused: Option<FusedKnowledge>,
    },
    Abandoned,
}

/// Unit results collected for one report
struct ReportBucket {
    expected_units: usize,
    received: usize,
    abandoned: usize,
    units: Vec<Vec<UnitRecord>>,
    fused: Vec<Option<FusedKnowledge>>,
}

impl ReportBucket {
    fn new(symptoms: usize, expected_units: usize) -> Self {
        Self {
            expected_units,
            received: 0,
            abandoned: 0,
            units: (0..symptoms).map(|_| Vec::new()).collect(),
            fused: (0..symptoms).map(|_| None).collect(),
        }
    }

    fn record(&mut self, symptom_idx: usize, outcome: UnitOutcome) {
        self.received += 1;
        match outcome {
            UnitOutcome::Finished { record, fused } => {
                if self.fused[symptom_idx].is_none() {
                    self.fused[symptom_idx] = fused;
                }
                self.units[symptom_idx].push(record);
            }
            UnitOutcome::Abandoned => self.abandoned += 1,
        }
    }

    fn is_complete(&self) -> bool {
        self.received == self.expected_units && self.abandoned == 0
    }
}

/// Runs evaluation batches
pub struct BatchOrchestrator {
    providers: Vec<Arc<dyn PredictionProvider>>,
    retriever: Option<Arc<dyn Retriever>>,
    cache: Arc<RetrievalCache>,
    fusion: FusionGate,
    scoring: ScoringEngine,
    retry: RetryConfig,
    retrieval: RetrievalConfig,
    batch: BatchConfig,
    event_bus: EventBus,
}

impl BatchOrchestrator {
    /// Create an orchestrator from configuration
    ///
    /// `retriever` may be `None` when only baseline mode will be run.
    pub fn new(
        config: &TomlConfig,
        providers: Vec<Arc<dyn PredictionProvider>>,
        retriever: Option<Arc<dyn Retriever>>,
    ) -> Self {
        Self {
            providers,
            retriever,
            cache: Arc::new(RetrievalCache::new()),
            fusion: FusionGate::new(config.fusion),
            scoring: ScoringEngine::new(config.scoring),
            retry: config.retry,
            retrieval: config.retrieval,
            batch: config.batch,
            event_bus: EventBus::new(config.batch.event_capacity.max(1)),
        }
    }

    /// Share a retrieval cache across orchestrators or pre-seed it
    pub fn with_cache(mut self, cache: Arc<RetrievalCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn cache(&self) -> &Arc<RetrievalCache> {
        &self.cache
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Load a report id range from disk and evaluate it
    ///
    /// Reports that cannot be read or parsed are logged and counted as
    /// dataset failures; the rest of the range still runs.
    pub async fn run_batch(
        &self,
        loader: &DatasetLoader,
        range: ReportIdRange,
        modes: &[EvaluationMode],
        cancel: CancellationToken,
    ) -> EvalResult<BatchOutcome> {
        let mut dataset_failures = FailureSummary::default();
        let mut reports = Vec::new();

        for (report_id, loaded) in loader.load_range(range).await? {
            match loaded {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::debug!(report_id, error = %e, "Counting unreadable report as dataset failure");
                    dataset_failures.record(ErrorKind::Dataset);
                }
            }
        }

        self.execute(reports, dataset_failures, modes, cancel).await
    }

    /// Evaluate already-loaded reports
    pub async fn run_reports(
        &self,
        reports: Vec<Report>,
        modes: &[EvaluationMode],
        cancel: CancellationToken,
    ) -> EvalResult<BatchOutcome> {
        self.execute(reports, FailureSummary::default(), modes, cancel).await
    }

    async fn execute(
        &self,
        mut reports: Vec<Report>,
        mut extra_failures: FailureSummary,
        modes: &[EvaluationMode],
        cancel: CancellationToken,
    ) -> EvalResult<BatchOutcome> {
        let mut modes = modes.to_vec();
        modes.sort();
        modes.dedup();

        if self.providers.is_empty() {
            return Err(symloc_common::Error::Config("No prediction providers configured".to_string()).into());
        }
        if modes.is_empty() {
            return Err(symloc_common::Error::Config("No evaluation modes selected".to_string()).into());
        }
        if modes.contains(&EvaluationMode::RagEnhanced) && self.retriever.is_none() {
            return Err(symloc_common::Error::Config(
                "RAG-enhanced mode requires a knowledge source".to_string(),
            )
            .into());
        }

        reports.sort_by_key(|r| r.report_id);

        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();

        let plans: Vec<ReportPlan> = reports.into_iter().map(plan_report).collect();
        for plan in &plans {
            for _ in &plan.skipped {
                extra_failures.record(ErrorKind::MalformedAnnotation);
            }
        }

        let units_per_symptom = self.providers.len() * modes.len();
        let mut work = Vec::new();
        for (plan_idx, plan) in plans.iter().enumerate() {
            for symptom_idx in 0..plan.prepared.len() {
                for provider in &self.providers {
                    for &mode in &modes {
                        work.push((plan_idx, symptom_idx, Arc::clone(provider), mode));
                    }
                }
            }
        }

        tracing::info!(
            batch_id = %batch_id,
            reports = plans.len(),
            units = work.len(),
            providers = ?self.provider_names(),
            modes = ?modes,
            "Starting evaluation batch"
        );

        self.event_bus.emit_lossy(EvalEvent::BatchStarted {
            batch_id,
            report_count: plans.len(),
            unit_count: work.len(),
            timestamp: started_at,
        });

        let mut buckets: Vec<ReportBucket> = plans
            .iter()
            .map(|p| ReportBucket::new(p.prepared.len(), p.prepared.len() * units_per_symptom))
            .collect();
        let mut artifacts = Vec::new();

        // Reports whose every symptom was skipped have nothing to wait for
        for (plan, bucket) in plans.iter().zip(buckets.iter_mut()) {
            if bucket.expected_units == 0 && !cancel.is_cancelled() {
                artifacts.push(self.finish_report(batch_id, plan, bucket, &modes));
            }
        }

        let plans_ref = &plans;
        let cancel_ref = &cancel;
        let mut results = stream::iter(work)
            .map(|(plan_idx, symptom_idx, provider, mode)| async move {
                let plan = &plans_ref[plan_idx];
                let outcome = if cancel_ref.is_cancelled() {
                    UnitOutcome::Abandoned
                } else {
                    self.run_unit(batch_id, plan.report_id, &plan.prepared[symptom_idx], provider, mode, cancel_ref)
                        .await
                };
                (plan_idx, symptom_idx, outcome)
            })
            .buffer_unordered(self.batch.max_workers.max(1));

        // Single aggregation point: results arrive one at a time
        while let Some((plan_idx, symptom_idx, outcome)) = results.next().await {
            let bucket = &mut buckets[plan_idx];
            bucket.record(symptom_idx, outcome);
            if bucket.is_complete() {
                artifacts.push(self.finish_report(batch_id, &plans[plan_idx], bucket, &modes));
            }
        }
        drop(results);

        let dropped = buckets.iter().filter(|b| b.abandoned > 0).count();
        if dropped > 0 {
            tracing::info!(batch_id = %batch_id, dropped, "Discarded reports interrupted by cancellation");
        }
        artifacts.sort_by_key(|a| a.report_id);

        let cancelled = cancel.is_cancelled();
        let summary = aggregate::summarize_batch(
            batch_id,
            started_at,
            Utc::now(),
            cancelled,
            &artifacts,
            &extra_failures,
        );

        let unit_failures = aggregate::unit_failures(&artifacts);
        let scored_units: usize = summary.by_provider_mode.iter().map(|s| s.scored_units).sum();
        let failed_units = unit_failures.total;

        self.event_bus.emit_lossy(EvalEvent::BatchCompleted {
            batch_id,
            cancelled,
            scored_units,
            failed_units,
            timestamp: summary.ended_at,
        });

        tracing::info!(
            batch_id = %batch_id,
            completed_reports = artifacts.len(),
            dropped_reports = dropped,
            scored_units,
            failed_units,
            cancelled,
            "Evaluation batch finished"
        );

        if !cancelled && scored_units == 0 && summary.failures.total > 0 {
            // Unit failures decide the dominant kind when any unit ran
            let dominant_source = if failed_units > 0 { &unit_failures } else { &summary.failures };
            let dominant = dominant_source.dominant_kind().unwrap_or(ErrorKind::Dataset);
            tracing::error!(batch_id = %batch_id, dominant = %dominant, failed_units, "Every evaluation unit failed");
            return Err(EvalError::BatchFailed { dominant, failed_units });
        }

        Ok(BatchOutcome {
            summary,
            reports: artifacts,
        })
    }

    /// Aggregate a report whose units are all terminal
    fn finish_report(
        &self,
        batch_id: Uuid,
        plan: &ReportPlan,
        bucket: &mut ReportBucket,
        modes: &[EvaluationMode],
    ) -> ReportArtifact {
        let report_id = plan.report_id;

        let records: Vec<SymptomRecord> = plan
            .prepared
            .iter()
            .zip(bucket.units.iter_mut().zip(bucket.fused.iter_mut()))
            .map(|(p, (units, fused))| {
                let mut units = std::mem::take(units);
                units.sort_by_key(|u| (self.provider_position(&u.key.provider), u.key.mode));
                SymptomRecord {
                    symptom_id: p.symptom.symptom_id.clone(),
                    text: p.symptom.text.clone(),
                    expected: p.expected.clone(),
                    fused_knowledge: fused.take(),
                    units,
                }
            })
            .collect();

        let provider_names = self.provider_names();
        let metrics = aggregate::aggregate_report(report_id, &provider_names, modes, &records);
        let comparisons = if modes.contains(&EvaluationMode::Baseline) && modes.contains(&EvaluationMode::RagEnhanced) {
            provider_names
                .iter()
                .map(|provider| aggregate::compare_modes(report_id, provider, &records))
                .collect()
        } else {
            Vec::new()
        };
        let knowledge = aggregate::knowledge_summary(&records);

        let scored_units: usize = metrics.iter().map(|m| m.scored_units).sum();
        let failed_units: usize = metrics.iter().map(|m| m.failures.total).sum();

        self.event_bus.emit_lossy(EvalEvent::ReportCompleted {
            batch_id,
            report_id,
            scored_units,
            failed_units,
            timestamp: Utc::now(),
        });

        tracing::info!(
            report_id,
            scored_units,
            failed_units,
            skipped = plan.skipped.len(),
            "Report evaluated"
        );

        ReportArtifact {
            report_id,
            generated_at: Utc::now(),
            symptoms: records,
            skipped_symptoms: plan.skipped.clone(),
            metrics,
            comparisons,
            knowledge,
        }
    }

    fn provider_position(&self, name: &str) -> usize {
        self.providers
            .iter()
            .position(|p| p.name() == name)
            .unwrap_or(usize::MAX)
    }

    async fn run_unit(
        &self,
        batch_id: Uuid,
        report_id: u32,
        prepared: &PreparedSymptom,
        provider: Arc<dyn PredictionProvider>,
        mode: EvaluationMode,
        cancel: &CancellationToken,
    ) -> UnitOutcome {
        let key = UnitKey {
            report_id,
            symptom_id: prepared.symptom.symptom_id.clone(),
            provider: provider.name().to_string(),
            mode,
        };

        let work = async {
            let mut record = UnitRecord::new(key);
            record.transition_to(UnitState::InFlight);
            self.event_bus.emit_lossy(EvalEvent::UnitStarted {
                batch_id,
                symptom_id: record.key.symptom_id.clone(),
                provider: record.key.provider.clone(),
                mode,
                timestamp: Utc::now(),
            });

            let mut fused = None;
            let request = match mode {
                EvaluationMode::Baseline => PredictionRequest::baseline(prepared.symptom.text.as_str()),
                EvaluationMode::RagEnhanced => match self.fuse_knowledge(report_id, &prepared.symptom.text).await {
                    Ok(knowledge) => {
                        let request = PredictionRequest::with_knowledge(
                            prepared.symptom.text.as_str(),
                            KnowledgeContext::from(&knowledge),
                        );
                        fused = Some(knowledge);
                        request
                    }
                    Err(e) => {
                        self.fail_unit(batch_id, &mut record, &e);
                        return UnitOutcome::Finished { record, fused };
                    }
                },
            };

            let provider_ref: &dyn PredictionProvider = provider.as_ref();
            let request_ref = &request;
            let operation_name = record.key.to_string();
            let outcome = retry_transient(&operation_name, &self.retry, move || provider_ref.predict(request_ref)).await;
            record.attempts = outcome.attempts;

            let scored = outcome
                .result
                .map_err(EvalError::from)
                .and_then(|prediction| {
                    let metrics = self.scoring.score(&prepared.expected, prediction.as_ref())?;
                    Ok((prediction.unwrap_or_default(), metrics))
                });

            match scored {
                Ok((prediction, metrics)) => {
                    record.mark_scored(prediction, metrics);
                    tracing::debug!(
                        unit = %record.key,
                        attempts = record.attempts,
                        organ_accuracy = %metrics.organ_accuracy_class,
                        overall = metrics.overall_score,
                        "Unit scored"
                    );
                    self.event_bus.emit_lossy(EvalEvent::UnitScored {
                        batch_id,
                        symptom_id: record.key.symptom_id.clone(),
                        provider: record.key.provider.clone(),
                        mode,
                        organ_accuracy_class: metrics.organ_accuracy_class,
                        overall_score: metrics.overall_score,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => self.fail_unit(batch_id, &mut record, &e),
            }

            UnitOutcome::Finished { record, fused }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => UnitOutcome::Abandoned,
            outcome = work => outcome,
        }
    }

    async fn fuse_knowledge(&self, report_id: u32, query: &str) -> EvalResult<FusedKnowledge> {
        let retriever = self
            .retriever
            .as_deref()
            .ok_or_else(|| EvalError::Retrieval("No knowledge source configured".to_string()))?;
        let snippets = self
            .cache
            .get_or_retrieve(report_id, query, self.retrieval.top_k, retriever)
            .await?;
        Ok(self.fusion.fuse(&snippets))
    }

    fn fail_unit(&self, batch_id: Uuid, record: &mut UnitRecord, error: &EvalError) {
        let kind = error.kind().unwrap_or(ErrorKind::PermanentProvider);
        let message = error.to_string();
        record.mark_failed(kind, message.clone());
        tracing::error!(unit = %record.key, kind = %kind, attempts = record.attempts, error = %message, "Unit failed");
        self.event_bus.emit_lossy(EvalEvent::UnitFailed {
            batch_id,
            symptom_id: record.key.symptom_id.clone(),
            provider: record.key.provider.clone(),
            mode: record.key.mode,
            kind,
            message,
            timestamp: Utc::now(),
        });
    }
}

/// Normalize every symptom; malformed ground truth is skipped and logged
fn plan_report(report: Report) -> ReportPlan {
    let report_id = report.report_id;
    let mut prepared = Vec::new();
    let mut skipped = Vec::new();

    for symptom in report.symptoms {
        match normalize(&symptom) {
            Ok(expected) => prepared.push(PreparedSymptom { symptom, expected }),
            Err(e) => {
                tracing::warn!(
                    report_id,
                    symptom_id = %symptom.symptom_id,
                    error = %e,
                    "Skipping symptom with malformed ground truth"
                );
                skipped.push(symptom.symptom_id);
            }
        }
    }

    ReportPlan {
        report_id,
        prepared,
        skipped,
    }
}
