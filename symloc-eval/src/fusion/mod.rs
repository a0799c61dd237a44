//! Knowledge fusion gate
//!
//! Resolves the snippets retrieved for one symptom query into a single
//! quality-scored context:
//! 1. Score every snippet (`snippet_quality`)
//! 2. Group snippets by organ (`consistency`)
//! 3. On conflict, keep only the organ group with the most support
//! 4. Average the kept snippets' quality
//! 5. Assign a decision label (`decision`)
//!
//! Conflicts are surfaced on the result, never raised as errors. Keeping only
//! the majority organ trades recall for precision so contradictory context is
//! not passed to the model.

pub mod consistency;
pub mod decision;
pub mod snippet_quality;

use std::collections::BTreeSet;

use symloc_common::config::FusionConfig;
use symloc_common::models::{FusedKnowledge, OrganDistribution, RetrievedSnippet};

pub use consistency::{group_by_organ, ConsistencyReport, OrganGroup};
pub use decision::decide;
pub use snippet_quality::SnippetQualityScorer;

/// Knowledge fusion gate
#[derive(Debug, Clone)]
pub struct FusionGate {
    config: FusionConfig,
    scorer: SnippetQualityScorer,
}

impl Default for FusionGate {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

impl FusionGate {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            scorer: SnippetQualityScorer::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse snippets into one context; pure and synchronous
    pub fn fuse(&self, snippets: &[RetrievedSnippet]) -> FusedKnowledge {
        if snippets.is_empty() {
            return FusedKnowledge::empty();
        }

        let report = group_by_organ(snippets);
        let consistent = report.is_consistent();

        // Without any organ group there is nothing to resolve; keep everything.
        let kept_indices: Vec<usize> = match report.dominant() {
            Some(group) => group.snippet_indices.clone(),
            None => (0..snippets.len()).collect(),
        };

        let kept_snippets: Vec<RetrievedSnippet> =
            kept_indices.iter().map(|&i| snippets[i].clone()).collect();
        let discarded_source_ids: Vec<String> = (0..snippets.len())
            .filter(|i| !kept_indices.contains(i))
            .map(|i| snippets[i].source_id.clone())
            .collect();

        let quality_score = if kept_snippets.is_empty() {
            0.0
        } else {
            kept_snippets.iter().map(|s| self.scorer.score(s)).sum::<f64>() / kept_snippets.len() as f64
        };

        let mut resolved_organ_distribution = OrganDistribution::new();
        if let Some(group) = report.dominant() {
            let locations: BTreeSet<String> = kept_snippets
                .iter()
                .flat_map(|s| s.anatomical_locations.iter())
                .map(|loc| loc.trim())
                .filter(|loc| !loc.is_empty())
                .map(str::to_string)
                .collect();
            resolved_organ_distribution.insert(group.organ_name.clone(), locations);
        }

        let decision_label = decide(quality_score, consistent, report.has_clear_majority(), &self.config);
        let conflicting_organs = report.losing_organs();

        if consistent {
            tracing::debug!(
                snippets = snippets.len(),
                quality_score,
                label = %decision_label,
                "Fused consistent knowledge"
            );
        } else {
            tracing::debug!(
                snippets = snippets.len(),
                kept = kept_snippets.len(),
                resolved_organ = ?report.dominant().map(|g| g.organ_name.as_str()),
                conflicting = ?conflicting_organs,
                quality_score,
                label = %decision_label,
                "Resolved organ conflict in retrieved knowledge"
            );
        }

        FusedKnowledge {
            quality_score,
            consistent,
            resolved_organ_distribution,
            decision_label,
            kept_snippets,
            discarded_source_ids,
            conflicting_organs,
        }
    }
}
