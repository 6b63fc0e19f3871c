use std::collections::BTreeMap;

use metacoach_core::pattern::{EstimateProvenance, Pattern, PatternEstimate};

/// Ensemble weights. The in-process posterior carries more weight than the
/// external SVM because it has seen the whole session, not just one turn.
pub const PRIMARY_WEIGHT: f64 = 0.6;
pub const SECONDARY_WEIGHT: f64 = 0.4;

/// Below this confidence, an estimate is considered tentative.
const LOW_CONFIDENCE: f64 = 0.3;
/// A tentative estimate only sets `needs_more_data` while the session is
/// this young. Later in the session, low confidence is real ambiguity,
/// not sparsity.
const EARLY_SESSION_TURNS: u64 = 5;

/// Combines the two classifiers' estimates into one. When the SVM was
/// unavailable this turn, the Bayesian estimate passes through unchanged
/// apart from the `bayesian-only` provenance tag.
pub fn fuse(primary: &PatternEstimate, secondary: &PatternEstimate, turn: u64) -> PatternEstimate {
    let mut fused = if secondary.provenance == EstimateProvenance::Svm {
        let mut distribution: BTreeMap<Pattern, f64> = BTreeMap::new();
        for pattern in Pattern::ALL {
            let p = primary.distribution.get(&pattern).copied().unwrap_or(0.0);
            let s = secondary.distribution.get(&pattern).copied().unwrap_or(0.0);
            distribution.insert(pattern, PRIMARY_WEIGHT * p + SECONDARY_WEIGHT * s);
        }
        let mut evidence = primary.evidence.clone();
        evidence.extend(secondary.evidence.iter().cloned());
        PatternEstimate::from_distribution(distribution, EstimateProvenance::Ensemble)
            .with_evidence(evidence)
    } else {
        let mut passthrough = primary.clone();
        passthrough.provenance = EstimateProvenance::BayesianOnly;
        passthrough
            .evidence
            .extend(secondary.evidence.iter().cloned());
        passthrough
    };
    fused.needs_more_data = primary.needs_more_data
        || (fused.confidence < LOW_CONFIDENCE && turn <= EARLY_SESSION_TURNS);
    fused
}
