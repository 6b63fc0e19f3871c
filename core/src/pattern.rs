use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Tolerance for "this distribution sums to 1.0" checks.
pub const DISTRIBUTION_TOLERANCE: f64 = 1e-6;

/// A discrete category describing the user's current AI-collaboration style.
/// The letter codes are the wire format shared with the SVM scoring service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum Pattern {
    /// A — decomposes tasks up front and verifies outcomes
    #[serde(rename = "A")]
    StrategicDecomposition,
    /// B — converges through repeated refinement rounds
    #[serde(rename = "B")]
    IterativeRefinement,
    /// C — moderate scores across every subprocess
    #[serde(rename = "C")]
    ModerateBalanced,
    /// D — strong on verification and risk assessment
    #[serde(rename = "D")]
    CriticalEvaluation,
    /// E — reflects on strategy while keeping planning and evaluation high
    #[serde(rename = "E")]
    PedagogicalReflection,
    /// F — accepts output without verification. The high-risk pattern:
    /// the only one the escalation state machine acts on.
    #[serde(rename = "F")]
    PassiveOverReliance,
}

impl Pattern {
    pub const ALL: [Pattern; 6] = [
        Pattern::StrategicDecomposition,
        Pattern::IterativeRefinement,
        Pattern::ModerateBalanced,
        Pattern::CriticalEvaluation,
        Pattern::PedagogicalReflection,
        Pattern::PassiveOverReliance,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Pattern::StrategicDecomposition => "A",
            Pattern::IterativeRefinement => "B",
            Pattern::ModerateBalanced => "C",
            Pattern::CriticalEvaluation => "D",
            Pattern::PedagogicalReflection => "E",
            Pattern::PassiveOverReliance => "F",
        }
    }

    pub fn from_code(code: &str) -> Option<Pattern> {
        match code {
            "A" => Some(Pattern::StrategicDecomposition),
            "B" => Some(Pattern::IterativeRefinement),
            "C" => Some(Pattern::ModerateBalanced),
            "D" => Some(Pattern::CriticalEvaluation),
            "E" => Some(Pattern::PedagogicalReflection),
            "F" => Some(Pattern::PassiveOverReliance),
            _ => None,
        }
    }

    pub fn is_high_risk(&self) -> bool {
        matches!(self, Pattern::PassiveOverReliance)
    }
}

/// Which classifier produced an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EstimateProvenance {
    /// Incremental in-process posterior
    Bayesian,
    /// External SVM scoring service
    Svm,
    /// Weighted fusion of both classifiers
    Ensemble,
    /// Fusion fell back to the posterior because the SVM was unreachable
    BayesianOnly,
    /// Placeholder estimate standing in for an unreachable SVM
    SvmUnavailable,
}

/// One classifier's view of the user's current pattern. Produced by the
/// Bayesian estimator, the SVM adapter, and the fusion step alike; only
/// `provenance` distinguishes them.
///
/// Invariant: `distribution` contains every `Pattern` and sums to
/// 1.0 within [`DISTRIBUTION_TOLERANCE`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatternEstimate {
    /// Most probable pattern
    pub pattern: Pattern,
    /// Probability of the top pattern
    pub probability: f64,
    /// Margin between the top and runner-up probabilities
    pub confidence: f64,
    /// Full probability distribution over all six patterns
    pub distribution: BTreeMap<Pattern, f64>,
    /// Human-readable notes on which signals drove the estimate
    pub evidence: Vec<String>,
    /// True when the session has too little history for a confident call.
    /// Distinct from SVM unavailability, which is an availability fault.
    pub needs_more_data: bool,
    pub provenance: EstimateProvenance,
}

impl PatternEstimate {
    /// Builds an estimate from a distribution, normalizing it and deriving
    /// the top pattern and the top-minus-runner-up confidence margin.
    pub fn from_distribution(
        mut distribution: BTreeMap<Pattern, f64>,
        provenance: EstimateProvenance,
    ) -> PatternEstimate {
        for pattern in Pattern::ALL {
            distribution.entry(pattern).or_insert(0.0);
        }
        normalize(&mut distribution);
        let (top, second) = top_two(&distribution);
        PatternEstimate {
            pattern: top.0,
            probability: top.1,
            confidence: top.1 - second.1,
            distribution,
            evidence: Vec::new(),
            needs_more_data: false,
            provenance,
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> PatternEstimate {
        self.evidence = evidence;
        self
    }
}

/// Uniform distribution over all six patterns.
pub fn uniform_distribution() -> BTreeMap<Pattern, f64> {
    let p = 1.0 / Pattern::ALL.len() as f64;
    Pattern::ALL.iter().map(|pattern| (*pattern, p)).collect()
}

/// Scales the distribution so it sums to 1.0. A degenerate (all-zero or
/// non-finite) distribution is replaced by the uniform one rather than
/// producing NaNs downstream.
pub fn normalize(distribution: &mut BTreeMap<Pattern, f64>) {
    let sum: f64 = distribution.values().sum();
    if !sum.is_finite() || sum <= 0.0 {
        *distribution = uniform_distribution();
        return;
    }
    for value in distribution.values_mut() {
        *value /= sum;
    }
}

/// Top and runner-up entries of a distribution. Ties are broken by label
/// order so identical inputs always produce identical outputs.
pub fn top_two(distribution: &BTreeMap<Pattern, f64>) -> ((Pattern, f64), (Pattern, f64)) {
    let mut entries: Vec<(Pattern, f64)> = distribution.iter().map(|(p, v)| (*p, *v)).collect();
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let top = entries[0];
    let second = entries.get(1).copied().unwrap_or((top.0, 0.0));
    (top, second)
}

#[cfg(test)]
mod tests {
    use super::{
        normalize, top_two, uniform_distribution, EstimateProvenance, Pattern, PatternEstimate,
        DISTRIBUTION_TOLERANCE,
    };
    use std::collections::BTreeMap;

    #[test]
    fn uniform_distribution_covers_every_pattern_and_sums_to_one() {
        let dist = uniform_distribution();
        assert_eq!(dist.len(), Pattern::ALL.len());
        let sum: f64 = dist.values().sum();
        assert!((sum - 1.0).abs() < DISTRIBUTION_TOLERANCE);
    }

    #[test]
    fn normalize_replaces_degenerate_distribution_with_uniform() {
        let mut dist: BTreeMap<Pattern, f64> =
            Pattern::ALL.iter().map(|p| (*p, 0.0)).collect();
        normalize(&mut dist);
        let sum: f64 = dist.values().sum();
        assert!((sum - 1.0).abs() < DISTRIBUTION_TOLERANCE);
    }

    #[test]
    fn from_distribution_fills_missing_labels_and_derives_confidence() {
        let mut dist = BTreeMap::new();
        dist.insert(Pattern::StrategicDecomposition, 0.8);
        dist.insert(Pattern::IterativeRefinement, 0.2);
        let estimate = PatternEstimate::from_distribution(dist, EstimateProvenance::Bayesian);
        assert_eq!(estimate.pattern, Pattern::StrategicDecomposition);
        assert_eq!(estimate.distribution.len(), 6);
        assert!((estimate.confidence - 0.6).abs() < DISTRIBUTION_TOLERANCE);
        let sum: f64 = estimate.distribution.values().sum();
        assert!((sum - 1.0).abs() < DISTRIBUTION_TOLERANCE);
    }

    #[test]
    fn top_two_breaks_ties_deterministically() {
        let mut dist = uniform_distribution();
        dist.insert(Pattern::CriticalEvaluation, 0.3);
        dist.insert(Pattern::PassiveOverReliance, 0.3);
        let (top, _) = top_two(&dist);
        // Label order decides between equal probabilities
        assert_eq!(top.0, Pattern::CriticalEvaluation);
    }

    #[test]
    fn pattern_codes_round_trip() {
        for pattern in Pattern::ALL {
            assert_eq!(Pattern::from_code(pattern.code()), Some(pattern));
        }
        assert_eq!(Pattern::from_code("Z"), None);
    }
}
