//! Report and batch aggregation
//!
//! Runs once per report after every unit of that report is terminal, and
//! once per batch after all reports. Failed units count toward failure
//! summaries only; means cover scored units.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use symloc_common::models::{
    AccuracyCounts, BatchSummary, EvaluationMode, FailureSummary, KnowledgeSummary, ModeComparison,
    ProviderComparisonSummary, ProviderModeSummary, ReportArtifact, ReportMetrics, SymptomMetrics,
    SymptomRecord, UnitRecord, UnitState,
};
use uuid::Uuid;

/// Overall-score difference treated as no change
const UNCHANGED_EPSILON: f64 = 1e-9;

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn unit_for<'a>(record: &'a SymptomRecord, provider: &str, mode: EvaluationMode) -> Option<&'a UnitRecord> {
    record
        .units
        .iter()
        .find(|u| u.key.provider == provider && u.key.mode == mode)
}

fn scored_metrics(unit: &UnitRecord) -> Option<&SymptomMetrics> {
    match unit.state {
        UnitState::Scored => unit.metrics.as_ref(),
        _ => None,
    }
}

/// Metrics for one (report, provider, mode)
pub fn report_metrics(report_id: u32, provider: &str, mode: EvaluationMode, records: &[SymptomRecord]) -> ReportMetrics {
    let units: Vec<&UnitRecord> = records
        .iter()
        .filter_map(|r| unit_for(r, provider, mode))
        .collect();

    let mut failures = FailureSummary::default();
    let mut accuracy_counts = AccuracyCounts::default();
    let mut scored: Vec<&SymptomMetrics> = Vec::new();

    for unit in &units {
        if let Some(metrics) = scored_metrics(unit) {
            accuracy_counts.record(metrics.organ_accuracy_class);
            scored.push(metrics);
        } else if let Some(error) = &unit.error {
            failures.record(error.kind);
        }
    }

    ReportMetrics {
        report_id,
        provider: provider.to_string(),
        mode,
        scored_units: scored.len(),
        failures,
        accuracy_counts,
        mean_precision: mean(scored.iter().map(|m| m.precision)),
        mean_recall: mean(scored.iter().map(|m| m.recall)),
        mean_f1: mean(scored.iter().map(|m| m.f1)),
        mean_overgeneration_penalty: mean(scored.iter().map(|m| m.overgeneration_penalty)),
        mean_overall_score: mean(scored.iter().map(|m| m.overall_score)),
    }
}

/// Metrics for every provider and mode of a report
pub fn aggregate_report(
    report_id: u32,
    providers: &[String],
    modes: &[EvaluationMode],
    records: &[SymptomRecord],
) -> Vec<ReportMetrics> {
    providers
        .iter()
        .flat_map(|provider| {
            modes
                .iter()
                .map(move |mode| report_metrics(report_id, provider, *mode, records))
        })
        .collect()
}

/// RAG-enhanced minus baseline, over symptoms scored in both modes
pub fn compare_modes(report_id: u32, provider: &str, records: &[SymptomRecord]) -> ModeComparison {
    let pairs: Vec<(&SymptomMetrics, &SymptomMetrics)> = records
        .iter()
        .filter_map(|r| {
            let baseline = unit_for(r, provider, EvaluationMode::Baseline).and_then(scored_metrics)?;
            let rag = unit_for(r, provider, EvaluationMode::RagEnhanced).and_then(scored_metrics)?;
            Some((baseline, rag))
        })
        .collect();

    let delta = |f: fn(&SymptomMetrics) -> f64| mean(pairs.iter().map(|(b, r)| f(r) - f(b)));

    let mut comparison = ModeComparison {
        report_id,
        provider: provider.to_string(),
        compared_symptoms: pairs.len(),
        precision_delta: delta(|m| m.precision),
        recall_delta: delta(|m| m.recall),
        f1_delta: delta(|m| m.f1),
        overgeneration_delta: delta(|m| m.overgeneration_penalty),
        overall_delta: delta(|m| m.overall_score),
        improved: 0,
        degraded: 0,
        unchanged: 0,
    };

    for (baseline, rag) in &pairs {
        let diff = rag.overall_score - baseline.overall_score;
        if diff > UNCHANGED_EPSILON {
            comparison.improved += 1;
        } else if diff < -UNCHANGED_EPSILON {
            comparison.degraded += 1;
        } else {
            comparison.unchanged += 1;
        }
    }

    comparison
}

/// Fusion outcome distribution of a report's symptoms
pub fn knowledge_summary(records: &[SymptomRecord]) -> KnowledgeSummary {
    let mut summary = KnowledgeSummary::default();
    for fused in records.iter().filter_map(|r| r.fused_knowledge.as_ref()) {
        summary.record(fused);
    }
    summary
}

fn provider_comparisons(reports: &[ReportArtifact]) -> Vec<ProviderComparisonSummary> {
    let mut groups: BTreeMap<&str, Vec<&ModeComparison>> = BTreeMap::new();
    for comparison in reports.iter().flat_map(|r| r.comparisons.iter()) {
        groups.entry(comparison.provider.as_str()).or_default().push(comparison);
    }

    groups
        .into_iter()
        .map(|(provider, entries)| {
            let compared_symptoms: usize = entries.iter().map(|c| c.compared_symptoms).sum();
            let weighted = |f: fn(&ModeComparison) -> f64| {
                if compared_symptoms == 0 {
                    0.0
                } else {
                    entries.iter().map(|c| f(c) * c.compared_symptoms as f64).sum::<f64>()
                        / compared_symptoms as f64
                }
            };
            ProviderComparisonSummary {
                provider: provider.to_string(),
                reports: entries.len(),
                compared_symptoms,
                improved: entries.iter().map(|c| c.improved).sum(),
                degraded: entries.iter().map(|c| c.degraded).sum(),
                unchanged: entries.iter().map(|c| c.unchanged).sum(),
                precision_delta: weighted(|c| c.precision_delta),
                recall_delta: weighted(|c| c.recall_delta),
                f1_delta: weighted(|c| c.f1_delta),
                overgeneration_delta: weighted(|c| c.overgeneration_delta),
                overall_delta: weighted(|c| c.overall_delta),
            }
        })
        .collect()
}

/// Unit failures across all metrics of a set of reports
pub fn unit_failures(reports: &[ReportArtifact]) -> FailureSummary {
    let mut failures = FailureSummary::default();
    for metrics in reports.iter().flat_map(|r| r.metrics.iter()) {
        failures.merge(&metrics.failures);
    }
    failures
}

/// Roll report metrics up into a batch summary
///
/// Means are weighted by scored units; `extra_failures` carries failures that
/// never became units (malformed ground truth, unreadable reports).
pub fn summarize_batch(
    batch_id: Uuid,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    cancelled: bool,
    reports: &[ReportArtifact],
    extra_failures: &FailureSummary,
) -> BatchSummary {
    let mut groups: BTreeMap<(String, EvaluationMode), Vec<&ReportMetrics>> = BTreeMap::new();
    for metrics in reports.iter().flat_map(|r| r.metrics.iter()) {
        groups
            .entry((metrics.provider.clone(), metrics.mode))
            .or_default()
            .push(metrics);
    }

    let by_provider_mode = groups
        .into_iter()
        .map(|((provider, mode), entries)| {
            let scored_units: usize = entries.iter().map(|m| m.scored_units).sum();
            let weighted = |f: fn(&ReportMetrics) -> f64| {
                if scored_units == 0 {
                    0.0
                } else {
                    entries.iter().map(|m| f(m) * m.scored_units as f64).sum::<f64>() / scored_units as f64
                }
            };
            ProviderModeSummary {
                reports: entries.len(),
                scored_units,
                failed_units: entries.iter().map(|m| m.failures.total).sum(),
                mean_precision: weighted(|m| m.mean_precision),
                mean_recall: weighted(|m| m.mean_recall),
                mean_f1: weighted(|m| m.mean_f1),
                mean_overgeneration_penalty: weighted(|m| m.mean_overgeneration_penalty),
                mean_overall_score: weighted(|m| m.mean_overall_score),
                provider,
                mode,
            }
        })
        .collect();

    let mut knowledge = KnowledgeSummary::default();
    for report in reports {
        knowledge.merge(&report.knowledge);
    }

    let mut failures = unit_failures(reports);
    failures.merge(extra_failures);

    BatchSummary {
        batch_id,
        started_at,
        ended_at,
        report_ids: reports.iter().map(|r| r.report_id).collect(),
        cancelled,
        failures,
        by_provider_mode,
        comparisons: provider_comparisons(reports),
        knowledge,
    }
}
