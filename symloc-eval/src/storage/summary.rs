//! Plain-text renderings of report artifacts and batch summaries

use std::fmt::{self, Write};
use symloc_common::models::{BatchSummary, FailureSummary, KnowledgeSummary, ReportArtifact};

fn write_failures(out: &mut String, failures: &FailureSummary) -> fmt::Result {
    if failures.total == 0 {
        return writeln!(out, "  failures: none");
    }
    writeln!(out, "  failures: {}", failures.total)?;
    for (kind, count) in &failures.by_kind {
        writeln!(out, "    {kind}: {count}")?;
    }
    Ok(())
}

fn write_knowledge(out: &mut String, knowledge: &KnowledgeSummary) -> fmt::Result {
    if knowledge.fused_symptoms == 0 {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "Retrieved knowledge ({} symptoms)", knowledge.fused_symptoms)?;
    writeln!(
        out,
        "  trust: {}  cautious: {}  distrust: {}",
        knowledge.trust, knowledge.cautious, knowledge.distrust
    )?;
    writeln!(
        out,
        "  conflicting: {}  mean quality: {:.3}",
        knowledge.inconsistent, knowledge.mean_quality
    )
}

fn write_report(out: &mut String, artifact: &ReportArtifact) -> fmt::Result {
    writeln!(out, "Report {}", artifact.report_id)?;
    writeln!(out, "Generated: {}", artifact.generated_at.to_rfc3339())?;
    writeln!(
        out,
        "Symptoms evaluated: {}  skipped: {}",
        artifact.symptoms.len(),
        artifact.skipped_symptoms.len()
    )?;
    for skipped in &artifact.skipped_symptoms {
        writeln!(out, "  skipped {skipped} (malformed ground truth)")?;
    }
    writeln!(out)?;

    for m in &artifact.metrics {
        writeln!(out, "[{} / {}]", m.provider, m.mode)?;
        writeln!(
            out,
            "  scored: {}  exact: {}  partial: {}  incorrect: {}",
            m.scored_units, m.accuracy_counts.exact, m.accuracy_counts.partial, m.accuracy_counts.incorrect
        )?;
        writeln!(
            out,
            "  precision: {:.3}  recall: {:.3}  f1: {:.3}  overgeneration: {:.3}  overall: {:.3}",
            m.mean_precision, m.mean_recall, m.mean_f1, m.mean_overgeneration_penalty, m.mean_overall_score
        )?;
        write_failures(out, &m.failures)?;
    }

    if !artifact.comparisons.is_empty() {
        writeln!(out)?;
        writeln!(out, "RAG-enhanced vs baseline")?;
        for c in &artifact.comparisons {
            writeln!(
                out,
                "  {}: {} symptoms, overall {:+.3}, f1 {:+.3}  (improved {}, degraded {}, unchanged {})",
                c.provider, c.compared_symptoms, c.overall_delta, c.f1_delta, c.improved, c.degraded, c.unchanged
            )?;
        }
    }
    write_knowledge(out, &artifact.knowledge)?;

    writeln!(out)?;
    writeln!(out, "Per symptom")?;
    for symptom in &artifact.symptoms {
        writeln!(out, "  {}", symptom.symptom_id)?;
        if let Some(fused) = &symptom.fused_knowledge {
            writeln!(
                out,
                "    knowledge: {} (quality {:.2}, {})",
                fused.decision_label,
                fused.quality_score,
                if fused.consistent { "consistent" } else { "conflicting" }
            )?;
        }
        for unit in &symptom.units {
            match (&unit.metrics, &unit.error) {
                (Some(metrics), _) => writeln!(
                    out,
                    "    {} / {}: {} overall {:.3}",
                    unit.key.provider, unit.key.mode, metrics.organ_accuracy_class, metrics.overall_score
                )?,
                (None, Some(error)) => writeln!(
                    out,
                    "    {} / {}: failed ({}) after {} attempt(s)",
                    unit.key.provider, unit.key.mode, error.kind, unit.attempts
                )?,
                (None, None) => writeln!(out, "    {} / {}: {:?}", unit.key.provider, unit.key.mode, unit.state)?,
            }
        }
    }

    Ok(())
}

fn write_batch(out: &mut String, summary: &BatchSummary) -> fmt::Result {
    writeln!(out, "Batch {}", summary.batch_id)?;
    writeln!(
        out,
        "Started: {}  Ended: {}  Duration: {}s",
        summary.started_at.to_rfc3339(),
        summary.ended_at.to_rfc3339(),
        (summary.ended_at - summary.started_at).num_seconds()
    )?;
    if summary.cancelled {
        writeln!(out, "Cancelled before completion")?;
    }
    writeln!(out, "Reports completed: {}", summary.report_ids.len())?;
    write_failures(out, &summary.failures)?;
    writeln!(out)?;

    writeln!(
        out,
        "{:<16} {:<14} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}",
        "provider", "mode", "scored", "failed", "prec", "recall", "f1", "overall"
    )?;
    for s in &summary.by_provider_mode {
        writeln!(
            out,
            "{:<16} {:<14} {:>7} {:>7} {:>7.3} {:>7.3} {:>7.3} {:>7.3}",
            s.provider,
            s.mode.as_str(),
            s.scored_units,
            s.failed_units,
            s.mean_precision,
            s.mean_recall,
            s.mean_f1,
            s.mean_overall_score
        )?;
    }

    if !summary.comparisons.is_empty() {
        writeln!(out)?;
        writeln!(out, "RAG-enhanced vs baseline")?;
        for c in &summary.comparisons {
            writeln!(
                out,
                "  {}: {} symptoms over {} report(s), overall {:+.3}, f1 {:+.3}",
                c.provider, c.compared_symptoms, c.reports, c.overall_delta, c.f1_delta
            )?;
            writeln!(
                out,
                "    improved {} ({:.1}%)  degraded {} ({:.1}%)  unchanged {} ({:.1}%)",
                c.improved,
                c.improved_ratio() * 100.0,
                c.degraded,
                c.degraded_ratio() * 100.0,
                c.unchanged,
                c.unchanged_ratio() * 100.0
            )?;
        }
    }
    write_knowledge(out, &summary.knowledge)?;

    Ok(())
}

/// Human-readable report summary
pub fn render_report(artifact: &ReportArtifact) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_report(&mut out, artifact);
    out
}

/// Human-readable batch summary
pub fn render_batch(summary: &BatchSummary) -> String {
    let mut out = String::new();
    let _ = write_batch(&mut out, summary);
    out
}
