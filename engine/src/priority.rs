use metacoach_core::pattern::Pattern;
use metacoach_core::signals::{SignalVector, Subprocess, SIGNAL_MAX};

/// Safety-critical tools are pinned here as the final, unconditional step.
/// Applied after the additive formula so accumulated negative modifiers
/// can never suppress them.
pub const SAFETY_PIN_PRIORITY: u8 = 90;

/// Priority gained per missing skill point in the tool's subprocess.
const SKILL_POINT_WEIGHT: f64 = 8.0;
/// Cap on the skill adjustment (3 full points).
const SKILL_ADJUSTMENT_CAP: f64 = 24.0;

/// Candidates below this final priority are not surfaced.
pub const SURFACE_FLOOR: u8 = 50;

/// A coaching tool the engine can surface.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub id: &'static str,
    pub base_priority: i32,
    /// Which metacognitive subprocess the tool addresses
    pub subprocess: Subprocess,
    pub safety_critical: bool,
    pub dismissible: bool,
}

/// The static intervention catalogue. Read-only after startup; shared
/// across all sessions.
pub const CATALOGUE: &[ToolSpec] = &[
    ToolSpec {
        id: "task-planner",
        base_priority: 50,
        subprocess: Subprocess::Planning,
        safety_critical: false,
        dismissible: true,
    },
    ToolSpec {
        id: "progress-tracker",
        base_priority: 45,
        subprocess: Subprocess::Monitoring,
        safety_critical: false,
        dismissible: true,
    },
    ToolSpec {
        id: "verification-checklist",
        base_priority: 55,
        subprocess: Subprocess::Evaluation,
        safety_critical: false,
        dismissible: true,
    },
    ToolSpec {
        id: "reflection-prompt",
        base_priority: 40,
        subprocess: Subprocess::Reflection,
        safety_critical: false,
        dismissible: true,
    },
    ToolSpec {
        id: "trust-calibration-card",
        base_priority: 50,
        subprocess: Subprocess::Monitoring,
        safety_critical: false,
        dismissible: true,
    },
    ToolSpec {
        id: "overreliance-circuit-breaker",
        base_priority: 70,
        subprocess: Subprocess::Evaluation,
        safety_critical: true,
        dismissible: false,
    },
];

pub fn tool_spec(tool_id: &str) -> Option<&'static ToolSpec> {
    CATALOGUE.iter().find(|spec| spec.id == tool_id)
}

/// Signed modifier from the static (pattern, tool) table. A tool mapped to
/// a skill the pattern already exhibits gets a negative modifier; a tool
/// addressing that pattern's characteristic gap gets a positive one.
fn pattern_modifier(pattern: Pattern, tool_id: &str) -> i32 {
    match (pattern, tool_id) {
        (Pattern::StrategicDecomposition, "task-planner") => -15,
        (Pattern::StrategicDecomposition, "verification-checklist") => -10,
        (Pattern::StrategicDecomposition, "reflection-prompt") => 5,

        (Pattern::IterativeRefinement, "progress-tracker") => -10,
        (Pattern::IterativeRefinement, "task-planner") => 5,
        (Pattern::IterativeRefinement, "verification-checklist") => 5,

        (Pattern::CriticalEvaluation, "verification-checklist") => -15,
        (Pattern::CriticalEvaluation, "trust-calibration-card") => -5,
        (Pattern::CriticalEvaluation, "task-planner") => 5,

        (Pattern::PedagogicalReflection, "reflection-prompt") => -15,
        (Pattern::PedagogicalReflection, "task-planner") => -5,

        (Pattern::PassiveOverReliance, "verification-checklist") => 15,
        (Pattern::PassiveOverReliance, "trust-calibration-card") => 15,
        (Pattern::PassiveOverReliance, "task-planner") => 10,

        _ => 0,
    }
}

/// One scored candidate for this turn. Ephemeral; recomputed every turn.
#[derive(Debug, Clone)]
pub struct InterventionCandidate {
    pub tool_id: &'static str,
    pub base_priority: i32,
    pub applied_modifiers: Vec<String>,
    pub final_priority: u8,
    pub safety_critical: bool,
    pub dismissible: bool,
}

/// Scores the full candidate set for a turn. The circuit breaker is only a
/// candidate for the high-risk pattern; everything else is considered
/// every turn and thinned by the surface floor and fatigue suppression.
pub fn score_candidates(pattern: Pattern, signals: &SignalVector) -> Vec<InterventionCandidate> {
    CATALOGUE
        .iter()
        .filter(|spec| !spec.safety_critical || pattern.is_high_risk())
        .map(|spec| score_candidate(spec, pattern, signals))
        .collect()
}

fn score_candidate(
    spec: &'static ToolSpec,
    pattern: Pattern,
    signals: &SignalVector,
) -> InterventionCandidate {
    let mut modifiers = Vec::new();

    let pattern_mod = pattern_modifier(pattern, spec.id);
    if pattern_mod != 0 {
        modifiers.push(format!("pattern {}: {pattern_mod:+}", pattern.code()));
    }

    // Higher existing skill in the tool's subprocess lowers its priority
    let skill = signals.subprocess_avg(spec.subprocess);
    let adjustment = (((SIGNAL_MAX - skill) * SKILL_POINT_WEIGHT).min(SKILL_ADJUSTMENT_CAP))
        .round() as i32;
    if adjustment != 0 {
        modifiers.push(format!(
            "{} skill {skill:.1}: {adjustment:+}",
            spec.subprocess.label()
        ));
    }

    let mut final_priority = (spec.base_priority + pattern_mod + adjustment).clamp(0, 100) as u8;

    if spec.safety_critical {
        final_priority = SAFETY_PIN_PRIORITY;
        modifiers.push("safety-critical: priority pinned".to_string());
    }

    InterventionCandidate {
        tool_id: spec.id,
        base_priority: spec.base_priority,
        applied_modifiers: modifiers,
        final_priority,
        safety_critical: spec.safety_critical,
        dismissible: spec.dismissible,
    }
}

#[cfg(test)]
mod tests {
    use super::{score_candidates, tool_spec, SAFETY_PIN_PRIORITY};
    use metacoach_core::pattern::Pattern;
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

    fn candidate<'a>(
        candidates: &'a [super::InterventionCandidate],
        tool_id: &str,
    ) -> &'a super::InterventionCandidate {
        candidates
            .iter()
            .find(|c| c.tool_id == tool_id)
            .expect("candidate should exist")
    }

    #[test]
    fn exhibited_skill_lowers_priority_for_its_tool() {
        // Strong planning: the planner is less useful to this user
        let strong_planning = vector([3.0, 3.0, 3.0, 3.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let weak_planning = vector([0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let strong = score_candidates(Pattern::ModerateBalanced, &strong_planning);
        let weak = score_candidates(Pattern::ModerateBalanced, &weak_planning);
        assert!(
            candidate(&strong, "task-planner").final_priority
                < candidate(&weak, "task-planner").final_priority
        );
    }

    #[test]
    fn skill_adjustment_is_capped() {
        let zero_skill = vector([0.0; 12]);
        let candidates = score_candidates(Pattern::ModerateBalanced, &zero_skill);
        // base 40 + cap 24, no pattern modifier for C
        assert_eq!(candidate(&candidates, "reflection-prompt").final_priority, 64);
    }

    #[test]
    fn final_priority_is_clamped_to_valid_range() {
        let max_skill = vector([3.0; 12]);
        let candidates = score_candidates(Pattern::PedagogicalReflection, &max_skill);
        // base 40 - 15 pattern modifier + 0 adjustment
        assert_eq!(candidate(&candidates, "reflection-prompt").final_priority, 25);
        for c in &candidates {
            assert!(c.final_priority <= 100);
        }
    }

    #[test]
    fn circuit_breaker_is_only_a_candidate_for_the_high_risk_pattern() {
        let signals = vector([1.0; 12]);
        let balanced = score_candidates(Pattern::ModerateBalanced, &signals);
        assert!(balanced
            .iter()
            .all(|c| c.tool_id != "overreliance-circuit-breaker"));
        let passive = score_candidates(Pattern::PassiveOverReliance, &signals);
        assert!(passive
            .iter()
            .any(|c| c.tool_id == "overreliance-circuit-breaker"));
    }

    #[test]
    fn safety_critical_priority_is_pinned_regardless_of_modifiers() {
        // Maximum skill everywhere would push an additive score down;
        // the pin must still win
        let signals = vector([3.0; 12]);
        let candidates = score_candidates(Pattern::PassiveOverReliance, &signals);
        let breaker = candidate(&candidates, "overreliance-circuit-breaker");
        assert_eq!(breaker.final_priority, SAFETY_PIN_PRIORITY);
        assert!(!breaker.dismissible);
        assert!(breaker
            .applied_modifiers
            .iter()
            .any(|m| m.contains("pinned")));
    }

    #[test]
    fn passive_pattern_boosts_verification_tools() {
        let signals = vector([1.0; 12]);
        let passive = score_candidates(Pattern::PassiveOverReliance, &signals);
        let balanced = score_candidates(Pattern::ModerateBalanced, &signals);
        assert!(
            candidate(&passive, "verification-checklist").final_priority
                > candidate(&balanced, "verification-checklist").final_priority
        );
    }

    #[test]
    fn catalogue_lookup_finds_known_tools() {
        assert!(tool_spec("task-planner").is_some());
        assert!(tool_spec("nonexistent-tool").is_none());
    }
}
