//! Decision label policy

use symloc_common::config::FusionConfig;
use symloc_common::models::DecisionLabel;

/// Map quality and consistency onto a presentation label
///
/// - `trust`: quality above the trust threshold and consistent
/// - `cautious`: quality in (cautious, trust], or inconsistent but one organ
///   group holds a clear majority
/// - `distrust`: everything else
pub fn decide(
    quality_score: f64,
    consistent: bool,
    clear_majority: bool,
    config: &FusionConfig,
) -> DecisionLabel {
    if consistent && quality_score > config.trust_threshold {
        return DecisionLabel::Trust;
    }

    let medium_quality = quality_score > config.cautious_threshold && quality_score <= config.trust_threshold;
    if medium_quality || (!consistent && clear_majority) {
        return DecisionLabel::Cautious;
    }

    DecisionLabel::Distrust
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_bands_when_consistent() {
        let config = FusionConfig::default();
        assert_eq!(decide(0.61, true, true, &config), DecisionLabel::Trust);
        assert_eq!(decide(0.6, true, true, &config), DecisionLabel::Cautious);
        assert_eq!(decide(0.31, true, true, &config), DecisionLabel::Cautious);
        assert_eq!(decide(0.3, true, true, &config), DecisionLabel::Distrust);
        assert_eq!(decide(0.0, true, false, &config), DecisionLabel::Distrust);
    }

    #[test]
    fn test_inconsistent_never_trusted() {
        let config = FusionConfig::default();
        assert_eq!(decide(1.0, false, true, &config), DecisionLabel::Cautious);
        assert_eq!(decide(1.0, false, false, &config), DecisionLabel::Distrust);
        assert_eq!(decide(0.5, false, false, &config), DecisionLabel::Cautious);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let config = FusionConfig {
            trust_threshold: 0.9,
            cautious_threshold: 0.5,
            ..FusionConfig::default()
        };
        assert_eq!(decide(0.8, true, true, &config), DecisionLabel::Cautious);
        assert_eq!(decide(0.45, true, true, &config), DecisionLabel::Distrust);
    }
}
