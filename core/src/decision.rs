use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Escalation tiers for the high-risk pattern. `Monitoring` means no
/// active escalation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum EscalationTier {
    Monitoring,
    Soft,
    Medium,
    Hard,
}

impl EscalationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationTier::Monitoring => "monitoring",
            EscalationTier::Soft => "soft",
            EscalationTier::Medium => "medium",
            EscalationTier::Hard => "hard",
        }
    }
}

/// Direction of the confidence trend across the recent-history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    Oscillating,
}

/// Stability of the recent classification history for one session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StabilityMetrics {
    /// False when labels oscillate or confidence has regressed
    pub is_stable: bool,
    pub trend: TrendDirection,
    /// Standard deviation of confidence across the window
    pub volatility: f64,
    /// Number of turns currently in the window (≤ 10)
    pub window_size: usize,
}

/// Point-in-time view of a session's intervention tolerance.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FatigueSnapshot {
    /// 0 (fresh) to 10 (saturated)
    pub score: f64,
    /// Dismissals within the recency window
    pub recent_dismiss_count: u32,
    /// Interventions surfaced per density window, normalized 0–10
    pub intervention_density: f64,
    pub session_elapsed_secs: i64,
    /// Active suppression window for non-critical interventions, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// One intervention the engine decided to surface this turn. The
/// presentation layer owns rendering and reports dismiss/accept events back.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InterventionDecision {
    pub tool_id: String,
    /// Present only for the high-risk pattern's escalation tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<EscalationTier>,
    /// Final priority after modifiers and the safety override, 0–100
    pub priority: u8,
    pub dismissible: bool,
    pub requires_acknowledgment: bool,
    pub requires_signature: bool,
    /// Which modifiers contributed to the final priority
    pub applied_modifiers: Vec<String>,
}

/// Feedback from the presentation layer about a surfaced intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InterventionAction {
    Dismissed,
    Accepted,
    Acknowledged,
    OverrideSigned,
}
