use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use metacoach_core::decision::FatigueSnapshot;

/// Term weights. The weighted blend is divided by the weight sum so the
/// score stays on the same 0-10 scale as its inputs, then clamped.
const DISMISS_WEIGHT: f64 = 3.0;
const TIME_PRESSURE_WEIGHT: f64 = 2.0;
const DENSITY_WEIGHT: f64 = 1.5;
const COGNITIVE_LOAD_WEIGHT: f64 = 1.0;
const WEIGHT_SUM: f64 =
    DISMISS_WEIGHT + TIME_PRESSURE_WEIGHT + DENSITY_WEIGHT + COGNITIVE_LOAD_WEIGHT;

/// Each recent dismissal contributes this much to the dismissal term.
/// Deliberately uncapped; the final clamp bounds the score.
const DISMISS_CONTRIBUTION: f64 = 2.5;
/// Dismissals older than this no longer count toward the score.
const DISMISS_RECENCY_MINS: i64 = 15;

/// Consecutive dismissals of the same tool id that trigger its cooldown.
pub const SAME_TOOL_DISMISS_LIMIT: u32 = 3;
pub const SAME_TOOL_COOLDOWN_MINS: i64 = 30;

/// Score thresholds for session-wide suppression of non-critical
/// interventions.
pub const HIGH_FATIGUE_THRESHOLD: f64 = 7.0;
pub const HIGH_FATIGUE_COOLDOWN_MINS: i64 = 60;
pub const MODERATE_FATIGUE_THRESHOLD: f64 = 5.0;
pub const MODERATE_FATIGUE_COOLDOWN_MINS: i64 = 30;

/// Intervention-density window and the count that saturates its term.
const DENSITY_WINDOW_MINS: i64 = 10;
const DENSITY_FULL_SCALE: f64 = 6.0;

/// Per-session cognitive-fatigue model. Consumes dismiss/accept events
/// reported by the presentation layer and governs suppression windows.
/// Safety-critical interventions are exempt from every suppression path;
/// the exemption is enforced per candidate in [`FatigueMonitor::suppression`].
#[derive(Debug, Clone)]
pub struct FatigueMonitor {
    started_at: DateTime<Utc>,
    /// Latest turn context, both on a 0-10 scale
    time_pressure: f64,
    cognitive_load: f64,
    dismissals: Vec<DateTime<Utc>>,
    /// Consecutive dismiss streak per tool id, reset by an accept
    dismiss_streaks: HashMap<String, u32>,
    /// Per-tool cooldowns from repeated dismissal of that specific tool
    tool_cooldowns: HashMap<String, DateTime<Utc>>,
    /// Session-wide cooldown for non-critical interventions
    global_cooldown_until: Option<DateTime<Utc>>,
    /// Timestamps of surfaced interventions, for the density term
    surfaced: VecDeque<DateTime<Utc>>,
}

impl FatigueMonitor {
    pub fn new(started_at: DateTime<Utc>) -> FatigueMonitor {
        FatigueMonitor {
            started_at,
            time_pressure: 0.0,
            cognitive_load: 0.0,
            dismissals: Vec::new(),
            dismiss_streaks: HashMap::new(),
            tool_cooldowns: HashMap::new(),
            global_cooldown_until: None,
            surfaced: VecDeque::new(),
        }
    }

    pub fn set_turn_context(&mut self, time_pressure: f64, cognitive_load: f64) {
        self.time_pressure = time_pressure.clamp(0.0, 10.0);
        self.cognitive_load = cognitive_load.clamp(0.0, 10.0);
    }

    pub fn record_surfaced(&mut self, at: DateTime<Utc>) {
        self.surfaced.push_back(at);
        let horizon = at - Duration::minutes(DENSITY_WINDOW_MINS);
        while self.surfaced.front().is_some_and(|t| *t < horizon) {
            self.surfaced.pop_front();
        }
    }

    /// Records a dismissal. The third consecutive dismissal of the same
    /// tool id starts that tool's 30-minute cooldown immediately,
    /// independent of the numeric score. Dismissals of other tools neither
    /// reset nor extend an existing cooldown.
    pub fn record_dismiss(&mut self, tool_id: &str, at: DateTime<Utc>) {
        self.dismissals.push(at);
        let streak = self
            .dismiss_streaks
            .entry(tool_id.to_string())
            .and_modify(|n| *n += 1)
            .or_insert(1);
        if *streak >= SAME_TOOL_DISMISS_LIMIT {
            self.tool_cooldowns
                .insert(tool_id.to_string(), at + Duration::minutes(SAME_TOOL_COOLDOWN_MINS));
            self.dismiss_streaks.remove(tool_id);
            tracing::info!(tool_id, "tool suppressed after repeated dismissals");
        }
        self.refresh_global_cooldown(at);
    }

    /// An accepted intervention breaks that tool's dismiss streak.
    pub fn record_accept(&mut self, tool_id: &str, _at: DateTime<Utc>) {
        self.dismiss_streaks.remove(tool_id);
    }

    fn recent_dismiss_count(&self, at: DateTime<Utc>) -> u32 {
        let horizon = at - Duration::minutes(DISMISS_RECENCY_MINS);
        self.dismissals.iter().filter(|t| **t >= horizon).count() as u32
    }

    fn density(&self, at: DateTime<Utc>) -> f64 {
        let horizon = at - Duration::minutes(DENSITY_WINDOW_MINS);
        let count = self.surfaced.iter().filter(|t| **t >= horizon).count() as f64;
        ((count / DENSITY_FULL_SCALE) * 10.0).min(10.0)
    }

    /// Weighted fatigue score, clamped to [0, 10]. Strictly increasing in
    /// the recent dismiss count until the clamp saturates.
    pub fn score(&self, at: DateTime<Utc>) -> f64 {
        let dismiss_term = self.recent_dismiss_count(at) as f64 * DISMISS_CONTRIBUTION;
        let raw = (DISMISS_WEIGHT * dismiss_term
            + TIME_PRESSURE_WEIGHT * self.time_pressure
            + DENSITY_WEIGHT * self.density(at)
            + COGNITIVE_LOAD_WEIGHT * self.cognitive_load)
            / WEIGHT_SUM;
        raw.clamp(0.0, 10.0)
    }

    /// Re-evaluates the session-wide suppression window against the
    /// current score. Called once per turn and after each dismiss event.
    /// An existing window is never shortened.
    pub fn refresh_global_cooldown(&mut self, at: DateTime<Utc>) {
        let score = self.score(at);
        let minutes = if score > HIGH_FATIGUE_THRESHOLD {
            Some(HIGH_FATIGUE_COOLDOWN_MINS)
        } else if score > MODERATE_FATIGUE_THRESHOLD {
            Some(MODERATE_FATIGUE_COOLDOWN_MINS)
        } else {
            None
        };
        if let Some(minutes) = minutes {
            let target = at + Duration::minutes(minutes);
            self.global_cooldown_until = Some(
                self.global_cooldown_until
                    .map_or(target, |existing| existing.max(target)),
            );
        }
    }

    /// Whether a candidate is currently suppressed, and until when.
    /// Checked per candidate: safety-critical tools bypass both the
    /// per-tool and the session-wide window unconditionally.
    pub fn suppression(
        &self,
        tool_id: &str,
        safety_critical: bool,
        at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if safety_critical {
            return None;
        }
        let tool = self
            .tool_cooldowns
            .get(tool_id)
            .copied()
            .filter(|until| *until > at);
        let global = self.global_cooldown_until.filter(|until| *until > at);
        match (tool, global) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn snapshot(&self, at: DateTime<Utc>) -> FatigueSnapshot {
        FatigueSnapshot {
            score: self.score(at),
            recent_dismiss_count: self.recent_dismiss_count(at),
            intervention_density: self.density(at),
            session_elapsed_secs: (at - self.started_at).num_seconds(),
            cooldown_until: self.global_cooldown_until.filter(|until| *until > at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FatigueMonitor, HIGH_FATIGUE_COOLDOWN_MINS, SAME_TOOL_COOLDOWN_MINS,
        SAME_TOOL_DISMISS_LIMIT,
    };
    use chrono::{Duration, TimeZone, Utc};

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn score_strictly_increases_with_dismiss_count() {
        let t0 = start();
        let mut monitor = FatigueMonitor::new(t0);
        monitor.set_turn_context(4.0, 2.0);
        let mut previous = monitor.score(t0);
        for i in 0..3 {
            monitor.record_dismiss("task-planner", t0 + Duration::seconds(i));
            let next = monitor.score(t0 + Duration::seconds(i));
            assert!(next > previous, "score must rise with each dismissal");
            previous = next;
        }
    }

    #[test]
    fn score_is_clamped_at_ten() {
        let t0 = start();
        let mut monitor = FatigueMonitor::new(t0);
        monitor.set_turn_context(10.0, 10.0);
        for i in 0..20 {
            monitor.record_dismiss("task-planner", t0 + Duration::seconds(i));
        }
        assert_eq!(monitor.score(t0 + Duration::seconds(30)), 10.0);
    }

    #[test]
    fn third_consecutive_dismissal_suppresses_that_tool_for_thirty_minutes() {
        let t0 = start();
        let mut monitor = FatigueMonitor::new(t0);
        for i in 0..SAME_TOOL_DISMISS_LIMIT as i64 {
            monitor.record_dismiss("reflection-prompt", t0 + Duration::seconds(i));
        }
        let set_at = t0 + Duration::seconds(SAME_TOOL_DISMISS_LIMIT as i64 - 1);
        let until = monitor
            .suppression("reflection-prompt", false, set_at)
            .expect("tool should be suppressed");
        assert_eq!(until, set_at + Duration::minutes(SAME_TOOL_COOLDOWN_MINS));
        // Expired exactly at the boundary
        assert!(monitor.suppression("reflection-prompt", false, until).is_none());
    }

    #[test]
    fn distinct_tool_dismissal_does_not_extend_an_existing_cooldown() {
        let t0 = start();
        let mut monitor = FatigueMonitor::new(t0);
        for i in 0..3 {
            monitor.record_dismiss("reflection-prompt", t0 + Duration::seconds(i));
        }
        let until_before = monitor
            .suppression("reflection-prompt", false, t0 + Duration::seconds(3))
            .expect("suppressed");
        monitor.record_dismiss("task-planner", t0 + Duration::minutes(5));
        // The global window may move, but the per-tool cooldown must not
        assert_eq!(
            monitor.tool_cooldowns.get("reflection-prompt").copied(),
            Some(until_before)
        );
    }

    #[test]
    fn accept_breaks_the_dismiss_streak() {
        let t0 = start();
        let mut monitor = FatigueMonitor::new(t0);
        monitor.record_dismiss("task-planner", t0);
        monitor.record_dismiss("task-planner", t0 + Duration::seconds(1));
        monitor.record_accept("task-planner", t0 + Duration::seconds(2));
        monitor.record_dismiss("task-planner", t0 + Duration::seconds(3));
        assert!(
            monitor
                .suppression("task-planner", false, t0 + Duration::seconds(4))
                .is_none(),
            "streak was broken; no cooldown yet"
        );
    }

    #[test]
    fn high_fatigue_imposes_sixty_minute_global_window() {
        let t0 = start();
        let mut monitor = FatigueMonitor::new(t0);
        monitor.set_turn_context(10.0, 10.0);
        for i in 0..6 {
            monitor.record_dismiss("task-planner", t0 + Duration::seconds(i));
        }
        let at = t0 + Duration::seconds(6);
        assert!(monitor.score(at) > 7.0);
        let until = monitor
            .suppression("verification-checklist", false, at)
            .expect("non-critical tools suppressed at high fatigue");
        assert!(until >= at + Duration::minutes(HIGH_FATIGUE_COOLDOWN_MINS) - Duration::seconds(10));
    }

    #[test]
    fn safety_critical_tools_bypass_every_suppression_path() {
        let t0 = start();
        let mut monitor = FatigueMonitor::new(t0);
        monitor.set_turn_context(10.0, 10.0);
        // Saturate fatigue and put the same id on per-tool cooldown
        for i in 0..9 {
            monitor.record_dismiss("overreliance-circuit-breaker", t0 + Duration::seconds(i));
        }
        let at = t0 + Duration::seconds(10);
        assert_eq!(monitor.score(at), 10.0);
        assert!(
            monitor
                .suppression("overreliance-circuit-breaker", true, at)
                .is_none(),
            "safety-critical candidates are never suppressed"
        );
        // The same id without the safety flag would be suppressed
        assert!(monitor
            .suppression("overreliance-circuit-breaker", false, at)
            .is_some());
    }

    #[test]
    fn old_dismissals_age_out_of_the_score() {
        let t0 = start();
        let mut monitor = FatigueMonitor::new(t0);
        monitor.record_dismiss("task-planner", t0);
        let later = t0 + Duration::minutes(20);
        assert_eq!(monitor.snapshot(later).recent_dismiss_count, 0);
    }
}
