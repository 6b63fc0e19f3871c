use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lower bound of every signal dimension.
pub const SIGNAL_MIN: f64 = 0.0;
/// Upper bound of every signal dimension.
pub const SIGNAL_MAX: f64 = 3.0;
/// Values at or above this are reported as "strong" evidence.
pub const EXTREME_HIGH: f64 = 2.5;
/// Values at or below this are reported as "absent" evidence.
pub const EXTREME_LOW: f64 = 0.5;

/// The four metacognitive subprocesses the twelve dimensions group into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Subprocess {
    Planning,
    Monitoring,
    Evaluation,
    Reflection,
}

impl Subprocess {
    pub const ALL: [Subprocess; 4] = [
        Subprocess::Planning,
        Subprocess::Monitoring,
        Subprocess::Evaluation,
        Subprocess::Reflection,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Subprocess::Planning => "planning",
            Subprocess::Monitoring => "monitoring",
            Subprocess::Evaluation => "evaluation",
            Subprocess::Reflection => "reflection",
        }
    }
}

/// One of the twelve behavioral dimensions, in wire order. The short keys
/// (`p1`..`r2`) are shared with the SVM scoring service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDimension {
    TaskUnderstanding,
    GoalSetting,
    StrategyPlanning,
    RoleDefinition,
    ProcessTracking,
    QualityChecking,
    TrustCalibration,
    QualityEvaluation,
    RiskAssessment,
    CapabilityJudgment,
    StrategyAdjustment,
    ToolSwitching,
}

impl SignalDimension {
    pub const ALL: [SignalDimension; 12] = [
        SignalDimension::TaskUnderstanding,
        SignalDimension::GoalSetting,
        SignalDimension::StrategyPlanning,
        SignalDimension::RoleDefinition,
        SignalDimension::ProcessTracking,
        SignalDimension::QualityChecking,
        SignalDimension::TrustCalibration,
        SignalDimension::QualityEvaluation,
        SignalDimension::RiskAssessment,
        SignalDimension::CapabilityJudgment,
        SignalDimension::StrategyAdjustment,
        SignalDimension::ToolSwitching,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            SignalDimension::TaskUnderstanding => "p1",
            SignalDimension::GoalSetting => "p2",
            SignalDimension::StrategyPlanning => "p3",
            SignalDimension::RoleDefinition => "p4",
            SignalDimension::ProcessTracking => "m1",
            SignalDimension::QualityChecking => "m2",
            SignalDimension::TrustCalibration => "m3",
            SignalDimension::QualityEvaluation => "e1",
            SignalDimension::RiskAssessment => "e2",
            SignalDimension::CapabilityJudgment => "e3",
            SignalDimension::StrategyAdjustment => "r1",
            SignalDimension::ToolSwitching => "r2",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignalDimension::TaskUnderstanding => "task understanding",
            SignalDimension::GoalSetting => "goal setting",
            SignalDimension::StrategyPlanning => "strategy planning",
            SignalDimension::RoleDefinition => "role definition",
            SignalDimension::ProcessTracking => "process tracking",
            SignalDimension::QualityChecking => "quality checking",
            SignalDimension::TrustCalibration => "trust calibration",
            SignalDimension::QualityEvaluation => "quality evaluation",
            SignalDimension::RiskAssessment => "risk assessment",
            SignalDimension::CapabilityJudgment => "capability judgment",
            SignalDimension::StrategyAdjustment => "strategy adjustment",
            SignalDimension::ToolSwitching => "tool switching",
        }
    }

    pub fn subprocess(&self) -> Subprocess {
        match self {
            SignalDimension::TaskUnderstanding
            | SignalDimension::GoalSetting
            | SignalDimension::StrategyPlanning
            | SignalDimension::RoleDefinition => Subprocess::Planning,
            SignalDimension::ProcessTracking
            | SignalDimension::QualityChecking
            | SignalDimension::TrustCalibration => Subprocess::Monitoring,
            SignalDimension::QualityEvaluation
            | SignalDimension::RiskAssessment
            | SignalDimension::CapabilityJudgment => Subprocess::Evaluation,
            SignalDimension::StrategyAdjustment | SignalDimension::ToolSwitching => {
                Subprocess::Reflection
            }
        }
    }
}

/// A malformed or out-of-range signal vector. Fatal to the turn (nothing
/// is processed, no session state mutated) but never to the session.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid signal vector: {message}")]
pub struct SignalValidationError {
    /// Wire key of the offending dimension, when one is identifiable
    pub field: Option<String>,
    pub message: String,
    /// The value that was received, for the structured error response
    pub received: Option<serde_json::Value>,
}

/// A validated, immutable per-turn feature vector: all twelve dimensions
/// present, every value finite and within [SIGNAL_MIN, SIGNAL_MAX].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalVector {
    values: [f64; 12],
}

impl SignalVector {
    /// Validates a raw wire map into a vector. Unknown keys, missing keys,
    /// non-finite values, and out-of-range values all reject the turn.
    pub fn from_map(raw: &BTreeMap<String, f64>) -> Result<SignalVector, SignalValidationError> {
        for key in raw.keys() {
            if !SignalDimension::ALL.iter().any(|d| d.key() == key) {
                return Err(SignalValidationError {
                    field: Some(key.clone()),
                    message: format!("unknown signal dimension '{key}'"),
                    received: None,
                });
            }
        }
        let mut values = [0.0; 12];
        for (i, dimension) in SignalDimension::ALL.iter().enumerate() {
            let key = dimension.key();
            let value = *raw.get(key).ok_or_else(|| SignalValidationError {
                field: Some(key.to_string()),
                message: format!("missing signal dimension '{key}'"),
                received: None,
            })?;
            if !value.is_finite() {
                return Err(SignalValidationError {
                    field: Some(key.to_string()),
                    message: format!("signal '{key}' is not a finite number"),
                    received: None,
                });
            }
            if !(SIGNAL_MIN..=SIGNAL_MAX).contains(&value) {
                return Err(SignalValidationError {
                    field: Some(key.to_string()),
                    message: format!(
                        "signal '{key}' out of range: expected {SIGNAL_MIN}..={SIGNAL_MAX}"
                    ),
                    received: serde_json::Number::from_f64(value).map(serde_json::Value::Number),
                });
            }
            values[i] = value;
        }
        Ok(SignalVector { values })
    }

    pub fn get(&self, dimension: SignalDimension) -> f64 {
        SignalDimension::ALL
            .iter()
            .zip(self.values)
            .find(|(d, _)| **d == dimension)
            .map(|(_, value)| value)
            .unwrap_or(SIGNAL_MIN)
    }

    /// Mean of the dimensions belonging to one subprocess.
    pub fn subprocess_avg(&self, subprocess: Subprocess) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (i, dimension) in SignalDimension::ALL.iter().enumerate() {
            if dimension.subprocess() == subprocess {
                sum += self.values[i];
                count += 1;
            }
        }
        sum / count as f64
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Dimensions at the top or bottom of the scale this turn, used as
    /// evidence strings on estimates.
    pub fn extremes(&self) -> Vec<(SignalDimension, f64)> {
        SignalDimension::ALL
            .iter()
            .enumerate()
            .filter(|(i, _)| self.values[*i] >= EXTREME_HIGH || self.values[*i] <= EXTREME_LOW)
            .map(|(i, d)| (*d, self.values[i]))
            .collect()
    }

    /// Wire map keyed by the SVM service's expected schema (`p1`..`r2`).
    pub fn to_wire_map(&self) -> BTreeMap<&'static str, f64> {
        SignalDimension::ALL
            .iter()
            .enumerate()
            .map(|(i, d)| (d.key(), self.values[i]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{SignalDimension, SignalVector, Subprocess};
    use std::collections::BTreeMap;

    pub fn raw_map(values: [f64; 12]) -> BTreeMap<String, f64> {
        SignalDimension::ALL
            .iter()
            .enumerate()
            .map(|(i, d)| (d.key().to_string(), values[i]))
            .collect()
    }

    #[test]
    fn from_map_accepts_a_full_in_range_vector() {
        let vector = SignalVector::from_map(&raw_map([1.5; 12])).expect("vector should validate");
        assert_eq!(vector.total(), 18.0);
        assert_eq!(vector.subprocess_avg(Subprocess::Planning), 1.5);
    }

    #[test]
    fn from_map_rejects_missing_dimension() {
        let mut raw = raw_map([1.0; 12]);
        raw.remove("m2");
        let err = SignalVector::from_map(&raw).expect_err("missing key must reject");
        assert_eq!(err.field.as_deref(), Some("m2"));
    }

    #[test]
    fn from_map_rejects_unknown_dimension() {
        let mut raw = raw_map([1.0; 12]);
        raw.insert("x9".to_string(), 1.0);
        let err = SignalVector::from_map(&raw).expect_err("unknown key must reject");
        assert_eq!(err.field.as_deref(), Some("x9"));
    }

    #[test]
    fn from_map_rejects_out_of_range_and_non_finite_values() {
        let mut raw = raw_map([1.0; 12]);
        raw.insert("e1".to_string(), 3.5);
        assert!(SignalVector::from_map(&raw).is_err());
        raw.insert("e1".to_string(), f64::NAN);
        assert!(SignalVector::from_map(&raw).is_err());
    }

    #[test]
    fn extremes_report_top_and_bottom_of_scale() {
        let mut values = [1.5; 12];
        values[0] = 3.0; // p1 strong
        values[7] = 0.0; // e1 absent
        let vector = SignalVector::from_map(&raw_map(values)).expect("valid");
        let extremes = vector.extremes();
        assert_eq!(extremes.len(), 2);
        assert_eq!(extremes[0].0, SignalDimension::TaskUnderstanding);
        assert_eq!(extremes[1].0, SignalDimension::QualityEvaluation);
    }
}
