use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};

use metacoach_core::decision::{StabilityMetrics, TrendDirection};
use metacoach_core::pattern::Pattern;

/// Bounded FIFO of recent estimates; oldest entries drop off.
pub const WINDOW_CAP: usize = 10;
/// More distinct labels than this in the window counts as oscillation.
const MAX_DISTINCT_STABLE: usize = 2;
/// Confidence regression: second-half mean more than this below the
/// first-half mean marks the window unstable.
const REGRESSION_DELTA: f64 = 0.15;
/// Least-squares slopes flatter than this count as stable.
const FLAT_SLOPE: f64 = 0.01;
/// Confidence multiplier applied downstream while the window is unstable.
/// Label instability reduces trust in the current estimate even when its
/// raw probability gap looks large.
pub const INSTABILITY_DISCOUNT: f64 = 0.8;

#[derive(Debug, Clone)]
struct WindowEntry {
    pattern: Pattern,
    confidence: f64,
    #[allow(dead_code)]
    at: DateTime<Utc>,
}

/// Per-session bounded history of fused estimates, from which trend and
/// volatility are derived.
#[derive(Debug, Clone, Default)]
pub struct StabilityWindow {
    entries: VecDeque<WindowEntry>,
}

impl StabilityWindow {
    pub fn new() -> StabilityWindow {
        StabilityWindow {
            entries: VecDeque::with_capacity(WINDOW_CAP),
        }
    }

    /// Appends this turn's fused result and returns metrics for the
    /// updated window.
    pub fn observe(
        &mut self,
        pattern: Pattern,
        confidence: f64,
        at: DateTime<Utc>,
    ) -> StabilityMetrics {
        if self.entries.len() == WINDOW_CAP {
            self.entries.pop_front();
        }
        self.entries.push_back(WindowEntry {
            pattern,
            confidence,
            at,
        });

        let oscillating = self.distinct_labels() > MAX_DISTINCT_STABLE;
        let regressed = self.confidence_regressed();
        let trend = if oscillating {
            TrendDirection::Oscillating
        } else {
            self.slope_trend()
        };
        StabilityMetrics {
            is_stable: !oscillating && !regressed,
            trend,
            volatility: self.volatility(),
            window_size: self.entries.len(),
        }
    }

    fn distinct_labels(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.pattern)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Mean confidence of the window's second half measured against its
    /// first half. Needs at least 4 entries to say anything.
    fn confidence_regressed(&self) -> bool {
        let n = self.entries.len();
        if n < 4 {
            return false;
        }
        let mid = n / 2;
        let first: f64 = self
            .entries
            .iter()
            .take(mid)
            .map(|e| e.confidence)
            .sum::<f64>()
            / mid as f64;
        let second: f64 = self
            .entries
            .iter()
            .skip(mid)
            .map(|e| e.confidence)
            .sum::<f64>()
            / (n - mid) as f64;
        first - second > REGRESSION_DELTA
    }

    /// Least-squares slope of confidence over turn index.
    fn slope_trend(&self) -> TrendDirection {
        let n = self.entries.len();
        if n < 2 {
            return TrendDirection::Stable;
        }
        let mean_x = (n - 1) as f64 / 2.0;
        let mean_y: f64 = self.entries.iter().map(|e| e.confidence).sum::<f64>() / n as f64;
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (i, entry) in self.entries.iter().enumerate() {
            let dx = i as f64 - mean_x;
            numerator += dx * (entry.confidence - mean_y);
            denominator += dx * dx;
        }
        let slope = numerator / denominator;
        if slope >= FLAT_SLOPE {
            TrendDirection::Improving
        } else if slope <= -FLAT_SLOPE {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        }
    }

    fn volatility(&self) -> f64 {
        let n = self.entries.len();
        if n < 2 {
            return 0.0;
        }
        let mean: f64 = self.entries.iter().map(|e| e.confidence).sum::<f64>() / n as f64;
        let variance: f64 = self
            .entries
            .iter()
            .map(|e| (e.confidence - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        variance.sqrt()
    }
}

/// Applies the instability discount to a fused confidence.
pub fn discounted(confidence: f64, metrics: &StabilityMetrics) -> f64 {
    if metrics.is_stable {
        confidence
    } else {
        confidence * INSTABILITY_DISCOUNT
    }
}

#[cfg(test)]
mod tests {
    use super::{discounted, StabilityWindow, INSTABILITY_DISCOUNT, WINDOW_CAP};
    use chrono::{Duration, Utc};
    use metacoach_core::decision::TrendDirection;
    use metacoach_core::pattern::Pattern;

    fn fill(window: &mut StabilityWindow, turns: &[(Pattern, f64)]) -> Vec<bool> {
        let mut start = Utc::now();
        let mut stable = Vec::new();
        for (pattern, confidence) in turns {
            start += Duration::seconds(30);
            stable.push(window.observe(*pattern, *confidence, start).is_stable);
        }
        stable
    }

    #[test]
    fn window_is_capped_at_ten_entries() {
        let mut window = StabilityWindow::new();
        let turns: Vec<(Pattern, f64)> = (0..15)
            .map(|_| (Pattern::ModerateBalanced, 0.5))
            .collect();
        fill(&mut window, &turns);
        assert_eq!(window.entries.len(), WINDOW_CAP);
    }

    #[test]
    fn more_than_two_distinct_labels_is_oscillation() {
        let mut window = StabilityWindow::new();
        let stable = fill(
            &mut window,
            &[
                (Pattern::StrategicDecomposition, 0.5),
                (Pattern::IterativeRefinement, 0.5),
                (Pattern::CriticalEvaluation, 0.5),
            ],
        );
        assert!(stable[1], "two labels is still stable");
        assert!(!stable[2], "three labels is oscillation");
        let metrics = window.observe(Pattern::CriticalEvaluation, 0.5, Utc::now());
        assert_eq!(metrics.trend, TrendDirection::Oscillating);
    }

    #[test]
    fn confidence_regression_marks_window_unstable() {
        let mut window = StabilityWindow::new();
        let stable = fill(
            &mut window,
            &[
                (Pattern::CriticalEvaluation, 0.8),
                (Pattern::CriticalEvaluation, 0.8),
                (Pattern::CriticalEvaluation, 0.4),
                (Pattern::CriticalEvaluation, 0.4),
            ],
        );
        assert!(!stable[3]);
    }

    #[test]
    fn rising_confidence_trends_improving() {
        let mut window = StabilityWindow::new();
        fill(
            &mut window,
            &[
                (Pattern::CriticalEvaluation, 0.3),
                (Pattern::CriticalEvaluation, 0.4),
                (Pattern::CriticalEvaluation, 0.5),
            ],
        );
        let metrics = window.observe(Pattern::CriticalEvaluation, 0.6, Utc::now());
        assert_eq!(metrics.trend, TrendDirection::Improving);
        assert!(metrics.is_stable);
    }

    #[test]
    fn falling_confidence_trends_declining() {
        let mut window = StabilityWindow::new();
        fill(
            &mut window,
            &[
                (Pattern::CriticalEvaluation, 0.6),
                (Pattern::CriticalEvaluation, 0.55),
            ],
        );
        let metrics = window.observe(Pattern::CriticalEvaluation, 0.5, Utc::now());
        assert_eq!(metrics.trend, TrendDirection::Declining);
    }

    #[test]
    fn discount_applies_only_while_unstable() {
        let mut window = StabilityWindow::new();
        let metrics = window.observe(Pattern::CriticalEvaluation, 0.9, Utc::now());
        assert!(metrics.is_stable);
        assert_eq!(discounted(0.9, &metrics), 0.9);

        let mut unstable = StabilityWindow::new();
        fill(
            &mut unstable,
            &[
                (Pattern::StrategicDecomposition, 0.9),
                (Pattern::IterativeRefinement, 0.9),
                (Pattern::CriticalEvaluation, 0.9),
            ],
        );
        let metrics = unstable.observe(Pattern::CriticalEvaluation, 0.9, Utc::now());
        assert!(!metrics.is_stable);
        assert_eq!(discounted(0.9, &metrics), 0.9 * INSTABILITY_DISCOUNT);
    }
}
