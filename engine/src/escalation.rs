use chrono::{DateTime, Utc};

use metacoach_core::decision::EscalationTier;

/// Entry thresholds per tier. Convention, applied consistently everywhere:
/// entry is inclusive (confidence >= threshold enters the tier), and a
/// downward exit requires confidence strictly below the current tier's
/// entry threshold minus the hysteresis margin. At most one tier is
/// crossed per observation in either direction.
pub const SOFT_ENTRY: f64 = 0.60;
pub const MEDIUM_ENTRY: f64 = 0.75;
pub const HARD_ENTRY: f64 = 0.85;
pub const HYSTERESIS_MARGIN: f64 = 0.10;

/// What kind of audit entry was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    TierChange,
    OverrideSigned,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::TierChange => "tier_change",
            AuditKind::OverrideSigned => "override_signed",
        }
    }
}

/// One append-only audit record. The history is never mutated in place.
#[derive(Debug, Clone)]
pub struct EscalationAudit {
    pub kind: AuditKind,
    pub from: EscalationTier,
    pub to: EscalationTier,
    pub confidence: f64,
    pub at: DateTime<Utc>,
}

/// Progressive escalation automaton for the high-risk pattern. One machine
/// per session; turns for other patterns feed confidence 0.0, which walks
/// the tier back down one step at a time.
#[derive(Debug, Clone)]
pub struct EscalationMachine {
    tier: EscalationTier,
    /// Confidence that produced the current tier
    entered_confidence: f64,
    history: Vec<EscalationAudit>,
    /// Last (turn, confidence) observation, for within-turn idempotence
    last_observation: Option<(u64, f64)>,
}

impl Default for EscalationMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationMachine {
    pub fn new() -> EscalationMachine {
        EscalationMachine {
            tier: EscalationTier::Monitoring,
            entered_confidence: 0.0,
            history: Vec::new(),
            last_observation: None,
        }
    }

    pub fn tier(&self) -> EscalationTier {
        self.tier
    }

    pub fn history(&self) -> &[EscalationAudit] {
        &self.history
    }

    /// Feeds one turn's (discounted) high-risk confidence. Re-applying an
    /// identical observation within the same turn is a no-op.
    pub fn observe(&mut self, turn: u64, confidence: f64, at: DateTime<Utc>) -> EscalationTier {
        if self.last_observation == Some((turn, confidence)) {
            return self.tier;
        }
        self.last_observation = Some((turn, confidence));

        let next = next_tier(self.tier, confidence);
        if next != self.tier {
            tracing::info!(
                from = self.tier.as_str(),
                to = next.as_str(),
                confidence,
                "escalation tier changed"
            );
            self.history.push(EscalationAudit {
                kind: AuditKind::TierChange,
                from: self.tier,
                to: next,
                confidence,
                at,
            });
            self.tier = next;
            self.entered_confidence = confidence;
        }
        self.tier
    }

    /// Records a signed override of a Hard-tier intervention. Always
    /// logged; the tier itself is unchanged. Returns the appended entry
    /// so the caller can persist it immediately.
    pub fn record_override(&mut self, at: DateTime<Utc>) -> EscalationAudit {
        tracing::warn!(
            tier = self.tier.as_str(),
            "hard intervention bypassed with signed override"
        );
        let entry = EscalationAudit {
            kind: AuditKind::OverrideSigned,
            from: self.tier,
            to: self.tier,
            confidence: self.entered_confidence,
            at,
        };
        self.history.push(entry.clone());
        entry
    }
}

fn next_tier(current: EscalationTier, confidence: f64) -> EscalationTier {
    match current {
        EscalationTier::Monitoring => {
            if confidence >= SOFT_ENTRY {
                EscalationTier::Soft
            } else {
                EscalationTier::Monitoring
            }
        }
        EscalationTier::Soft => {
            if confidence >= MEDIUM_ENTRY {
                EscalationTier::Medium
            } else if confidence < SOFT_ENTRY - HYSTERESIS_MARGIN {
                EscalationTier::Monitoring
            } else {
                EscalationTier::Soft
            }
        }
        EscalationTier::Medium => {
            if confidence >= HARD_ENTRY {
                EscalationTier::Hard
            } else if confidence < MEDIUM_ENTRY - HYSTERESIS_MARGIN {
                EscalationTier::Soft
            } else {
                EscalationTier::Medium
            }
        }
        EscalationTier::Hard => {
            if confidence < HARD_ENTRY - HYSTERESIS_MARGIN {
                EscalationTier::Medium
            } else {
                EscalationTier::Hard
            }
        }
    }
}

/// Interaction requirements per tier: (dismissible, requires
/// acknowledgment, requires signed override). Soft is freely dismissible;
/// Medium blocks until acknowledged and offers alternatives; Hard can only
/// be bypassed with a signed override.
pub fn tier_requirements(tier: EscalationTier) -> (bool, bool, bool) {
    match tier {
        EscalationTier::Monitoring => (true, false, false),
        EscalationTier::Soft => (true, false, false),
        EscalationTier::Medium => (false, true, false),
        EscalationTier::Hard => (false, false, true),
    }
}
