use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use metacoach_core::pattern::{
    uniform_distribution, EstimateProvenance, Pattern, PatternEstimate,
};
use metacoach_core::signals::{SignalVector, EXTREME_LOW};

const DEFAULT_SVM_URL: &str = "http://localhost:5002";
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Connection settings for the external SVM scoring service.
#[derive(Debug, Clone)]
pub struct SvmConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl SvmConfig {
    pub fn from_env() -> SvmConfig {
        let base_url = std::env::var("METACOACH_SVM_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_SVM_URL.to_string());
        let timeout_secs = std::env::var("METACOACH_SVM_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        SvmConfig {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Wire response of the SVM service's `/predict` endpoint. The service
/// also reports `probability` and `confidence` scalars; both are derived
/// from `probabilities`, so only the distribution is read here.
#[derive(Debug, Deserialize)]
struct SvmPredictResponse {
    pattern: String,
    probabilities: BTreeMap<String, f64>,
}

/// Adapter around the external SVM classifier. One attempt per turn with a
/// bounded timeout; a failed call degrades this turn to Bayesian-only and
/// the next turn simply tries again. No retry queue.
#[derive(Debug, Clone)]
pub struct SvmClassifier {
    client: reqwest::Client,
    predict_url: String,
}

impl SvmClassifier {
    pub fn new(config: &SvmConfig) -> SvmClassifier {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("reqwest client should build");
        SvmClassifier {
            client,
            predict_url: format!("{}/predict", config.base_url),
        }
    }

    /// Classifies one turn's signals. Infallible by design: every failure
    /// mode collapses to an "unavailable" placeholder estimate so the turn
    /// can continue on the Bayesian path alone.
    pub async fn classify(&self, signals: &SignalVector) -> PatternEstimate {
        let body = json!({ "signals": signals.to_wire_map() });
        let response = match self.client.post(&self.predict_url).json(&body).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() => return unavailable_estimate("request timed out"),
            Err(_) => return unavailable_estimate("request failed"),
        };
        if !response.status().is_success() {
            return unavailable_estimate(&format!("status {}", response.status()));
        }
        let parsed = match response.json::<SvmPredictResponse>().await {
            Ok(parsed) => parsed,
            Err(_) => return unavailable_estimate("malformed response body"),
        };
        match convert_response(&parsed, signals) {
            Some(estimate) => estimate,
            None => unavailable_estimate("response distribution unusable"),
        }
    }
}

/// Converts a service response into a PatternEstimate. Returns None when
/// the body is structurally valid JSON but semantically unusable (unknown
/// top label, or no known labels in the distribution).
fn convert_response(
    response: &SvmPredictResponse,
    signals: &SignalVector,
) -> Option<PatternEstimate> {
    Pattern::from_code(&response.pattern)?;
    let mut distribution: BTreeMap<Pattern, f64> = BTreeMap::new();
    for (code, probability) in &response.probabilities {
        if let Some(pattern) = Pattern::from_code(code) {
            if probability.is_finite() && *probability >= 0.0 {
                distribution.insert(pattern, *probability);
            }
        }
    }
    if distribution.is_empty() {
        return None;
    }
    Some(
        PatternEstimate::from_distribution(distribution, EstimateProvenance::Svm)
            .with_evidence(extreme_signal_evidence(signals)),
    )
}

/// Placeholder for an unreachable or misbehaving SVM service: uniform
/// distribution, zero confidence, and an evidence note naming the failure.
/// `needs_more_data` stays false; this is an availability fault, not a
/// data-sparsity fault.
fn unavailable_estimate(reason: &str) -> PatternEstimate {
    let mut estimate =
        PatternEstimate::from_distribution(uniform_distribution(), EstimateProvenance::SvmUnavailable);
    estimate.evidence = vec![format!("secondary classifier unavailable: {reason}")];
    estimate
}

/// Evidence strings for dimensions at the top or bottom of the scale.
fn extreme_signal_evidence(signals: &SignalVector) -> Vec<String> {
    signals
        .extremes()
        .into_iter()
        .map(|(dimension, value)| {
            let direction = if value <= EXTREME_LOW { "absent" } else { "strong" };
            format!(
                "{direction} {} ({}={value:.1})",
                dimension.label(),
                dimension.key()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{convert_response, unavailable_estimate, SvmPredictResponse};
    use metacoach_core::pattern::{EstimateProvenance, Pattern, DISTRIBUTION_TOLERANCE};
    use metacoach_core::signals::{SignalDimension, SignalVector};
    use std::collections::BTreeMap;

    fn vector(values: [f64; 12]) -> SignalVector {
        let raw: BTreeMap<String, f64> = SignalDimension::ALL
            .iter()
            .enumerate()
            .map(|(i, d)| (d.key().to_string(), values[i]))
            .collect();
        SignalVector::from_map(&raw).expect("test vector should validate")
    }

    fn response(pattern: &str, probabilities: &[(&str, f64)]) -> SvmPredictResponse {
        SvmPredictResponse {
            pattern: pattern.to_string(),
            probabilities: probabilities
                .iter()
                .map(|(code, p)| (code.to_string(), *p))
                .collect(),
        }
    }

    #[test]
    fn convert_response_builds_full_distribution() {
        let signals = vector([1.5; 12]);
        let parsed = response("F", &[("F", 0.7), ("C", 0.2), ("A", 0.1)]);
        let estimate = convert_response(&parsed, &signals).expect("should convert");
        assert_eq!(estimate.pattern, Pattern::PassiveOverReliance);
        assert_eq!(estimate.provenance, EstimateProvenance::Svm);
        assert_eq!(estimate.distribution.len(), 6);
        let sum: f64 = estimate.distribution.values().sum();
        assert!((sum - 1.0).abs() < DISTRIBUTION_TOLERANCE);
    }

    #[test]
    fn convert_response_rejects_unknown_top_label() {
        let signals = vector([1.5; 12]);
        let parsed = response("Z", &[("A", 1.0)]);
        assert!(convert_response(&parsed, &signals).is_none());
    }

    #[test]
    fn convert_response_rejects_distribution_without_known_labels() {
        let signals = vector([1.5; 12]);
        let parsed = response("A", &[("X", 0.5), ("Y", 0.5)]);
        assert!(convert_response(&parsed, &signals).is_none());
    }

    #[test]
    fn convert_response_attaches_extreme_signal_evidence() {
        let mut values = [1.5; 12];
        values[7] = 0.0; // e1 absent
        values[0] = 3.0; // p1 strong
        let signals = vector(values);
        let parsed = response("F", &[("F", 0.9), ("C", 0.1)]);
        let estimate = convert_response(&parsed, &signals).expect("should convert");
        assert!(estimate.evidence.iter().any(|e| e.contains("p1=3.0")));
        assert!(estimate.evidence.iter().any(|e| e.contains("absent quality evaluation")));
    }

    #[test]
    fn unavailable_estimate_is_uniform_with_zero_confidence() {
        let estimate = unavailable_estimate("request timed out");
        assert_eq!(estimate.provenance, EstimateProvenance::SvmUnavailable);
        assert!(estimate.confidence.abs() < DISTRIBUTION_TOLERANCE);
        assert!(!estimate.needs_more_data);
        assert!(estimate.evidence[0].contains("request timed out"));
    }
}
