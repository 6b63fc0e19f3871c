use std::collections::BTreeMap;

use metacoach_core::baseline::UserBaseline;
use metacoach_core::pattern::{
    normalize, uniform_distribution, EstimateProvenance, Pattern, PatternEstimate,
};
use metacoach_core::signals::{SignalDimension, SignalVector, Subprocess, SIGNAL_MAX};

/// Minimum per-label likelihood. Keeps a single turn from zeroing out a
/// label permanently; the posterior can always recover.
const LIKELIHOOD_FLOOR: f64 = 0.05;

/// Below this, the renormalization denominator is treated as degenerate
/// and the prior is returned unchanged.
const DEGENERATE_SUM: f64 = 1e-12;

/// Probability mass placed on the user's established primary pattern when
/// seeding a session posterior from their baseline.
const PRIOR_PRIMARY_MASS: f64 = 0.4;

/// Per-session posterior over the six patterns, updated multiplicatively
/// each turn. Pure in-process computation; never fails.
#[derive(Debug, Clone)]
pub struct PosteriorState {
    weights: BTreeMap<Pattern, f64>,
}

impl PosteriorState {
    /// Seeds the posterior from a historical prior, or uniform when the
    /// user has no usable baseline yet.
    pub fn from_prior(prior: Option<&UserBaseline>) -> PosteriorState {
        PosteriorState {
            weights: prior
                .and_then(prior_distribution)
                .unwrap_or_else(uniform_distribution),
        }
    }

    /// Applies one turn's signal vector: multiply each label's weight by
    /// its likelihood and renormalize. A degenerate denominator falls back
    /// to the prior unchanged with `needs_more_data` set.
    pub fn update(&mut self, signals: &SignalVector) -> PatternEstimate {
        let mut updated = self.weights.clone();
        for (pattern, weight) in updated.iter_mut() {
            *weight *= likelihood(*pattern, signals);
        }
        let sum: f64 = updated.values().sum();
        if sum < DEGENERATE_SUM {
            let mut estimate = PatternEstimate::from_distribution(
                self.weights.clone(),
                EstimateProvenance::Bayesian,
            );
            estimate.needs_more_data = true;
            estimate.evidence = vec!["degenerate update; posterior held at prior".to_string()];
            return estimate;
        }
        normalize(&mut updated);
        self.weights = updated;
        PatternEstimate::from_distribution(self.weights.clone(), EstimateProvenance::Bayesian)
            .with_evidence(turn_evidence(signals))
    }
}

fn prior_distribution(baseline: &UserBaseline) -> Option<BTreeMap<Pattern, f64>> {
    let primary = baseline.primary_pattern?;
    let rest = (1.0 - PRIOR_PRIMARY_MASS) / (Pattern::ALL.len() - 1) as f64;
    Some(
        Pattern::ALL
            .iter()
            .map(|pattern| {
                let mass = if *pattern == primary {
                    PRIOR_PRIMARY_MASS
                } else {
                    rest
                };
                (*pattern, mass)
            })
            .collect(),
    )
}

/// Likelihood of one turn's signals under each pattern, derived from the
/// pattern signatures: A pairs strong planning with verification, B leans
/// on monitoring, C sits mid-scale everywhere, D is evaluation-heavy, E
/// adds reflection on top of solid planning and evaluation, and F is low
/// overall engagement with quality evaluation absent.
fn likelihood(pattern: Pattern, signals: &SignalVector) -> f64 {
    let planning = signals.subprocess_avg(Subprocess::Planning) / SIGNAL_MAX;
    let monitoring = signals.subprocess_avg(Subprocess::Monitoring) / SIGNAL_MAX;
    let evaluation = signals.subprocess_avg(Subprocess::Evaluation) / SIGNAL_MAX;
    let reflection = signals.subprocess_avg(Subprocess::Reflection) / SIGNAL_MAX;
    let total_frac = signals.total() / (12.0 * SIGNAL_MAX);
    let quality_eval = signals.get(SignalDimension::QualityEvaluation) / SIGNAL_MAX;

    let affinity = match pattern {
        Pattern::StrategicDecomposition => 0.6 * planning + 0.4 * evaluation,
        Pattern::IterativeRefinement => monitoring,
        Pattern::ModerateBalanced => 1.0 - (total_frac - 0.5).abs() * 2.0,
        Pattern::CriticalEvaluation => evaluation,
        Pattern::PedagogicalReflection => {
            0.5 * reflection + 0.25 * planning + 0.25 * evaluation
        }
        Pattern::PassiveOverReliance => (1.0 - total_frac) * (1.0 - quality_eval),
    };
    LIKELIHOOD_FLOOR + (1.0 - LIKELIHOOD_FLOOR) * affinity.clamp(0.0, 1.0)
}

fn turn_evidence(signals: &SignalVector) -> Vec<String> {
    let mut strongest = Subprocess::Planning;
    let mut best = f64::MIN;
    for subprocess in Subprocess::ALL {
        let avg = signals.subprocess_avg(subprocess);
        if avg > best {
            best = avg;
            strongest = subprocess;
        }
    }
    vec![format!(
        "strongest subprocess this turn: {} (avg {:.1})",
        strongest.label(),
        best
    )]
}

#[cfg(test)]
mod tests {
    use super::{likelihood, PosteriorState};
    use chrono::Utc;
    use metacoach_core::baseline::{BaselineStatus, UserBaseline};
    use metacoach_core::pattern::{Pattern, DISTRIBUTION_TOLERANCE};
    use metacoach_core::signals::{SignalDimension, SignalVector};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn vector(values: [f64; 12]) -> SignalVector {
        let raw: BTreeMap<String, f64> = SignalDimension::ALL
            .iter()
            .enumerate()
            .map(|(i, d)| (d.key().to_string(), values[i]))
            .collect();
        SignalVector::from_map(&raw).expect("test vector should validate")
    }

    fn passive_signals() -> SignalVector {
        // Low engagement everywhere, quality evaluation absent
        vector([0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.0, 0.5, 0.5, 0.5, 0.5])
    }

    fn strategic_signals() -> SignalVector {
        vector([3.0, 3.0, 2.5, 2.5, 1.5, 1.5, 1.5, 2.5, 2.5, 2.0, 1.5, 1.5])
    }

    #[test]
    fn uniform_prior_converges_on_passive_pattern_for_passive_signals() {
        let mut posterior = PosteriorState::from_prior(None);
        let signals = passive_signals();
        let mut estimate = posterior.update(&signals);
        for _ in 0..4 {
            estimate = posterior.update(&signals);
        }
        assert_eq!(estimate.pattern, Pattern::PassiveOverReliance);
        assert!(!estimate.needs_more_data);
        let sum: f64 = estimate.distribution.values().sum();
        assert!((sum - 1.0).abs() < DISTRIBUTION_TOLERANCE);
    }

    #[test]
    fn strategic_signals_outweigh_passive_ones() {
        assert!(
            likelihood(Pattern::StrategicDecomposition, &strategic_signals())
                > likelihood(Pattern::PassiveOverReliance, &strategic_signals())
        );
        assert!(
            likelihood(Pattern::PassiveOverReliance, &passive_signals())
                > likelihood(Pattern::StrategicDecomposition, &passive_signals())
        );
    }

    #[test]
    fn baseline_prior_weights_primary_pattern() {
        let baseline = UserBaseline {
            user_id: Uuid::now_v7(),
            primary_pattern: Some(Pattern::CriticalEvaluation),
            confidence: 0.8,
            stability_score: 0.9,
            sessions_observed: 6,
            status: BaselineStatus::Established,
            contextual_triggers: BTreeMap::new(),
            updated_at: Utc::now(),
        };
        let posterior = PosteriorState::from_prior(Some(&baseline));
        assert!(
            posterior.weights[&Pattern::CriticalEvaluation]
                > posterior.weights[&Pattern::ModerateBalanced]
        );
        let sum: f64 = posterior.weights.values().sum();
        assert!((sum - 1.0).abs() < DISTRIBUTION_TOLERANCE);
    }

    #[test]
    fn repeated_identical_updates_are_deterministic() {
        let signals = strategic_signals();
        let mut a = PosteriorState::from_prior(None);
        let mut b = PosteriorState::from_prior(None);
        for _ in 0..3 {
            a.update(&signals);
            b.update(&signals);
        }
        assert_eq!(a.update(&signals).distribution, b.update(&signals).distribution);
    }
}
