//! Anatomical location overlap
//!
//! Both sides are normalized identically before intersection: trimmed,
//! lowercased, internal whitespace collapsed to single spaces. Empty strings
//! after normalization are dropped.

use std::collections::BTreeSet;

/// Canonical comparison form of a location or organ term
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalize and deduplicate a collection of terms
pub fn normalized_set<'a>(terms: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    terms
        .into_iter()
        .map(|t| normalize_term(t))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Overlap between expected (E) and predicted (P) location sets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationOverlap {
    pub expected: usize,
    pub predicted: usize,
    pub matched: usize,
}

impl LocationOverlap {
    pub fn compute(expected: &BTreeSet<String>, predicted: &BTreeSet<String>) -> Self {
        Self {
            expected: expected.len(),
            predicted: predicted.len(),
            matched: expected.intersection(predicted).count(),
        }
    }

    /// |E ∩ P| / |P|; 1.0 when both are empty, 0.0 when only P is empty
    pub fn precision(&self) -> f64 {
        if self.predicted == 0 {
            return if self.expected == 0 { 1.0 } else { 0.0 };
        }
        self.matched as f64 / self.predicted as f64
    }

    /// |E ∩ P| / |E|; 1.0 when E is empty
    pub fn recall(&self) -> f64 {
        if self.expected == 0 {
            return 1.0;
        }
        self.matched as f64 / self.expected as f64
    }

    /// Harmonic mean; 0.0 when precision and recall are both 0
    pub fn f1(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / (precision + recall)
    }

    /// max(0, |P| - |E|) / max(1, |P|)
    pub fn overgeneration_penalty(&self) -> f64 {
        let excess = self.predicted.saturating_sub(self.expected);
        excess as f64 / self.predicted.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        let owned: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        normalized_set(owned.iter())
    }

    #[test]
    fn test_normalize_term() {
        assert_eq!(normalize_term("  Left\t  Lung "), "left lung");
        assert_eq!(normalize_term("PLEURAL CAVITY"), "pleural cavity");
        assert_eq!(normalize_term("   "), "");
    }

    #[test]
    fn test_normalized_set_deduplicates() {
        let s = set(&["Left Lung", "left  lung", " ", "Right Lung"]);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_overgeneration_scenario() {
        let overlap = LocationOverlap::compute(
            &set(&["Pleural Cavity", "Left Lung"]),
            &set(&["Pleural Cavity", "Left Lung", "Right Lung"]),
        );
        assert!((overlap.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(overlap.recall(), 1.0);
        assert!((overlap.overgeneration_penalty() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_edge_cases() {
        let both_empty = LocationOverlap::compute(&set(&[]), &set(&[]));
        assert_eq!(both_empty.precision(), 1.0);
        assert_eq!(both_empty.recall(), 1.0);
        assert_eq!(both_empty.overgeneration_penalty(), 0.0);

        let no_prediction = LocationOverlap::compute(&set(&["Apex"]), &set(&[]));
        assert_eq!(no_prediction.precision(), 0.0);
        assert_eq!(no_prediction.recall(), 0.0);
        assert_eq!(no_prediction.f1(), 0.0);

        let nothing_expected = LocationOverlap::compute(&set(&[]), &set(&["Apex", "Base"]));
        assert_eq!(nothing_expected.recall(), 1.0);
        assert_eq!(nothing_expected.precision(), 0.0);
        assert_eq!(nothing_expected.overgeneration_penalty(), 1.0);
    }

    #[test]
    fn test_metrics_are_bounded() {
        let pool = ["A", "B", "C", "D"];
        for e_mask in 0u32..16 {
            for p_mask in 0u32..16 {
                let e: Vec<&str> = (0..4usize).filter(|&i| e_mask & (1u32 << i) != 0).map(|i| pool[i]).collect();
                let p: Vec<&str> = (0..4usize).filter(|&i| p_mask & (1u32 << i) != 0).map(|i| pool[i]).collect();
                let o = LocationOverlap::compute(&set(&e), &set(&p));

                for value in [o.precision(), o.recall(), o.f1(), o.overgeneration_penalty()] {
                    assert!((0.0..=1.0).contains(&value), "{:?} -> {}", o, value);
                }
                let both_positive = o.precision() > 0.0 && o.recall() > 0.0;
                assert_eq!(o.f1() == 0.0, !both_positive, "{:?}", o);

                if p_mask == e_mask {
                    assert_eq!(o.recall(), 1.0);
                    assert_eq!(o.overgeneration_penalty(), 0.0);
                }
            }
        }
    }
}
