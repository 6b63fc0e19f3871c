//! Real-time usage-pattern decision engine.
//!
//! Per turn: validate the signal vector, update the in-process Bayesian
//! posterior, ask the external SVM service for a second opinion (bounded
//! timeout, degrade gracefully), fuse the two, track stability, consult
//! the fatigue monitor, score intervention candidates, and advance the
//! escalation state machine for the high-risk pattern. Session state is
//! memory-only; baseline memory is folded in at session end and persisted
//! by the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use metacoach_core::baseline::UserBaseline;
use metacoach_core::decision::{
    EscalationTier, FatigueSnapshot, InterventionAction, InterventionDecision, StabilityMetrics,
};
use metacoach_core::pattern::{EstimateProvenance, PatternEstimate};
use metacoach_core::signals::SignalVector;

pub mod baseline;
pub mod error;
pub mod escalation;
pub mod estimator;
pub mod fatigue;
pub mod fusion;
pub mod priority;
pub mod session;
pub mod stability;
pub mod svm;

pub use error::EngineError;
pub use session::TurnContext;
pub use svm::SvmConfig;

use baseline::SessionSummary;
use escalation::EscalationAudit;
use session::{SessionRegistry, SessionState};
use svm::SvmClassifier;

/// Everything the engine decided for one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// 1-based turn number within the session
    pub turn: u64,
    pub estimate: PatternEstimate,
    pub stability: StabilityMetrics,
    pub fatigue: FatigueSnapshot,
    pub escalation_tier: EscalationTier,
    pub interventions: Vec<InterventionDecision>,
}

/// Result of an intervention event. `audit` is present only for signed
/// overrides, which the caller must persist durably right away.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub fatigue: FatigueSnapshot,
    pub audit: Option<EscalationAudit>,
}

/// Result of ending a session. `summary` is None for a session that never
/// completed a turn; `audit` is the session's full escalation history for
/// durable persistence.
#[derive(Debug, Clone)]
pub struct SessionEnd {
    pub summary: Option<SessionSummary>,
    pub audit: Vec<EscalationAudit>,
}

/// The decision engine. One instance per process; all per-session state
/// lives behind the registry's per-session locks.
#[derive(Debug)]
pub struct Engine {
    registry: SessionRegistry,
    svm: SvmClassifier,
}

impl Engine {
    pub fn new(svm_config: &SvmConfig) -> Engine {
        Engine {
            registry: SessionRegistry::new(),
            svm: SvmClassifier::new(svm_config),
        }
    }

    pub fn from_env() -> Engine {
        Engine::new(&SvmConfig::from_env())
    }

    /// Processes one turn. Validation happens before any session state is
    /// touched: a rejected vector mutates nothing. The SVM call runs while
    /// holding only this session's lock, so a slow external call cannot
    /// starve other sessions.
    pub async fn classify_turn(
        &self,
        session_id: Uuid,
        raw_signals: &BTreeMap<String, f64>,
        context: TurnContext,
        baseline: Option<&UserBaseline>,
    ) -> Result<TurnOutcome, EngineError> {
        let signals = SignalVector::from_map(raw_signals)?;
        let handle = self
            .registry
            .get_or_create(session_id, context.user_id, baseline, Utc::now())
            .await;
        let mut state = handle.lock().await;

        let secondary = self.svm.classify(&signals).await;
        if secondary.provenance == EstimateProvenance::SvmUnavailable {
            tracing::warn!(
                session_id = %session_id,
                "secondary classifier unavailable; continuing bayesian-only"
            );
        }
        Ok(apply_turn(&mut state, &signals, &context, &secondary, Utc::now()))
    }

    /// Consumes a dismiss/accept/acknowledge/override event reported by
    /// the presentation layer.
    pub async fn record_intervention_event(
        &self,
        session_id: Uuid,
        tool_id: &str,
        action: InterventionAction,
        signature: Option<&str>,
    ) -> Result<EventOutcome, EngineError> {
        if priority::tool_spec(tool_id).is_none() {
            return Err(EngineError::UnknownTool {
                tool_id: tool_id.to_string(),
            });
        }
        let handle = self
            .registry
            .get(session_id)
            .await
            .ok_or(EngineError::SessionNotFound { session_id })?;
        let mut state = handle.lock().await;
        let now = Utc::now();
        let mut audit = None;
        match action {
            InterventionAction::Dismissed => state.fatigue.record_dismiss(tool_id, now),
            InterventionAction::Accepted => state.fatigue.record_accept(tool_id, now),
            InterventionAction::Acknowledged => {
                tracing::info!(session_id = %session_id, tool_id, "intervention acknowledged");
            }
            InterventionAction::OverrideSigned => {
                if signature.map(str::trim).filter(|s| !s.is_empty()).is_none() {
                    return Err(EngineError::MissingSignature);
                }
                audit = Some(state.escalation.record_override(now));
            }
        }
        Ok(EventOutcome {
            fatigue: state.fatigue.snapshot(now),
            audit,
        })
    }

    /// Ends a session and detaches its state. Returns None when the
    /// session is unknown (already ended, or never started). A turn in
    /// flight finishes against the detached state and is discarded;
    /// waiting here is bounded by the SVM timeout.
    pub async fn end_session(&self, session_id: Uuid) -> Option<SessionEnd> {
        let handle = self.registry.remove(session_id).await?;
        let state = handle.lock().await;
        let now = Utc::now();
        let contextual_trigger = if state.fatigue.score(now) > fatigue::HIGH_FATIGUE_THRESHOLD {
            Some("elevated_fatigue".to_string())
        } else if state.novel_task_seen {
            Some("novel_task".to_string())
        } else {
            None
        };
        let summary = state.dominant_pattern().map(|pattern| SessionSummary {
            user_id: state.user_id,
            session_id,
            dominant_pattern: pattern,
            contextual_trigger,
            ended_at: now,
        });
        Some(SessionEnd {
            summary,
            audit: state.escalation.history().to_vec(),
        })
    }
}

/// The deterministic part of the pipeline: everything after the external
/// classifier call. Split out so replay behavior can be tested without a
/// network.
fn apply_turn(
    state: &mut SessionState,
    signals: &SignalVector,
    context: &TurnContext,
    secondary: &PatternEstimate,
    now: DateTime<Utc>,
) -> TurnOutcome {
    state.turn += 1;
    let turn = state.turn;
    if context.novel_task {
        state.novel_task_seen = true;
    }
    state
        .fatigue
        .set_turn_context(context.time_pressure, context.cognitive_load);

    let primary = state.posterior.update(signals);
    let mut fused = fusion::fuse(&primary, secondary, turn);

    let metrics = state.stability.observe(fused.pattern, fused.confidence, now);
    let discounted = stability::discounted(fused.confidence, &metrics);
    if discounted < fused.confidence {
        fused
            .evidence
            .push("confidence discounted for window instability".to_string());
        fused.confidence = discounted;
    }

    *state.label_tally.entry(fused.pattern).or_insert(0) += 1;

    // Only high-risk turns escalate; any other label walks the tier back
    // down one step at a time
    let escalation_confidence = if fused.pattern.is_high_risk() {
        fused.confidence
    } else {
        0.0
    };
    let tier = state.escalation.observe(turn, escalation_confidence, now);

    state.fatigue.refresh_global_cooldown(now);

    let mut interventions = Vec::new();
    for candidate in priority::score_candidates(fused.pattern, signals) {
        if !candidate.safety_critical && candidate.final_priority < priority::SURFACE_FLOOR {
            continue;
        }
        if let Some(until) = state
            .fatigue
            .suppression(candidate.tool_id, candidate.safety_critical, now)
        {
            tracing::debug!(
                tool_id = candidate.tool_id,
                until = %until,
                "candidate suppressed by fatigue"
            );
            continue;
        }
        // The circuit breaker only surfaces once escalation is active
        if candidate.safety_critical && tier == EscalationTier::Monitoring {
            continue;
        }
        let (tier_field, dismissible, requires_acknowledgment, requires_signature) =
            if candidate.safety_critical {
                let (dismissible, ack, signature) = escalation::tier_requirements(tier);
                (Some(tier), dismissible, ack, signature)
            } else {
                (None, candidate.dismissible, false, false)
            };
        interventions.push(InterventionDecision {
            tool_id: candidate.tool_id.to_string(),
            tier: tier_field,
            priority: candidate.final_priority,
            dismissible,
            requires_acknowledgment,
            requires_signature,
            applied_modifiers: candidate.applied_modifiers,
        });
        state.fatigue.record_surfaced(now);
    }
    interventions.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.tool_id.cmp(&b.tool_id)));

    TurnOutcome {
        turn,
        fatigue: state.fatigue.snapshot(now),
        estimate: fused,
        stability: metrics,
        escalation_tier: tier,
        interventions,
    }
}
