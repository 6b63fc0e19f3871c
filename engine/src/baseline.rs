use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use metacoach_core::baseline::{BaselineStatus, DriftKind, UserBaseline};
use metacoach_core::pattern::Pattern;

/// Session count thresholds for the baseline lifecycle.
pub const FORMING_MIN_SESSIONS: i64 = 3;
pub const ESTABLISHED_MIN_SESSIONS: i64 = 5;
/// Modal frequency required for `established`.
pub const ESTABLISHED_MODE_FREQUENCY: f64 = 0.7;
/// Deviating sessions with no contextual trigger needed before the
/// baseline evolves instead of the deviation being ignored.
pub const DRIFT_CONSECUTIVE_SESSIONS: usize = 5;
/// How far back the session history window reaches.
pub const HISTORY_WINDOW_DAYS: i64 = 30;
/// Hard cap on rows read from the history window.
pub const HISTORY_CAP: i64 = 60;

/// One completed session in a user's history window, oldest first.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub pattern: Pattern,
    /// Context active when the session deviated, e.g. "elevated_fatigue"
    pub contextual_trigger: Option<String>,
    pub ended_at: DateTime<Utc>,
}

/// What a finished session contributes to baseline memory.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub dominant_pattern: Pattern,
    pub contextual_trigger: Option<String>,
    pub ended_at: DateTime<Utc>,
}

/// Result of folding a session into the baseline.
#[derive(Debug, Clone)]
pub struct BaselineUpdate {
    pub baseline: UserBaseline,
    pub drift: DriftKind,
}

/// Recomputes a user's baseline from their session history window. The
/// history must already include the just-finished session as its last
/// entry. Pure; the caller owns persistence and per-user serialization.
pub fn fold_session(user_id: Uuid, history: &[SessionRecord], now: DateTime<Utc>) -> BaselineUpdate {
    let sessions_observed = history.len() as i64;

    // Triggered sessions count toward sessions_observed but not toward the
    // mode: a temporary shift must not drag the baseline.
    let untriggered: Vec<&SessionRecord> = history
        .iter()
        .filter(|record| record.contextual_trigger.is_none())
        .collect();
    let modal = mode(untriggered.iter().map(|record| record.pattern))
        .or_else(|| mode(history.iter().map(|record| record.pattern)));

    let mut primary_pattern = modal;
    let mut drift = DriftKind::None;
    let mut contextual_triggers = BTreeMap::new();

    let current = history.last();
    if let (Some(current), Some(modal)) = (current, modal) {
        if current.pattern != modal {
            if let Some(trigger) = &current.contextual_trigger {
                drift = DriftKind::Temporary;
                contextual_triggers.insert(trigger.clone(), current.pattern);
            } else if durable_streak(&untriggered, modal) {
                drift = DriftKind::Durable;
                primary_pattern = Some(current.pattern);
            }
        }
    }

    // Carry forward every trigger ever observed in the window
    for record in history {
        if let Some(trigger) = &record.contextual_trigger {
            contextual_triggers
                .entry(trigger.clone())
                .or_insert(record.pattern);
        }
    }

    let confidence = primary_pattern
        .map(|p| frequency(history, p))
        .unwrap_or(0.0);
    let stability_score = 1.0 - normalized_entropy(history);

    let status = if sessions_observed >= ESTABLISHED_MIN_SESSIONS
        && confidence >= ESTABLISHED_MODE_FREQUENCY
    {
        BaselineStatus::Established
    } else if sessions_observed >= FORMING_MIN_SESSIONS {
        BaselineStatus::Forming
    } else {
        BaselineStatus::Exploring
    };

    BaselineUpdate {
        baseline: UserBaseline {
            user_id,
            primary_pattern,
            confidence,
            stability_score,
            sessions_observed,
            status,
            contextual_triggers,
            updated_at: now,
        },
        drift,
    }
}

/// True when the last DRIFT_CONSECUTIVE_SESSIONS untriggered sessions all
/// share a label different from the modal pattern.
fn durable_streak(untriggered: &[&SessionRecord], modal: Pattern) -> bool {
    if untriggered.len() < DRIFT_CONSECUTIVE_SESSIONS {
        return false;
    }
    let tail = &untriggered[untriggered.len() - DRIFT_CONSECUTIVE_SESSIONS..];
    let first = tail[0].pattern;
    first != modal && tail.iter().all(|record| record.pattern == first)
}

fn mode(patterns: impl Iterator<Item = Pattern>) -> Option<Pattern> {
    let mut counts: BTreeMap<Pattern, usize> = BTreeMap::new();
    for pattern in patterns {
        *counts.entry(pattern).or_insert(0) += 1;
    }
    // BTreeMap order breaks ties deterministically by label
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(pattern, _)| pattern)
}

fn frequency(history: &[SessionRecord], pattern: Pattern) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    history
        .iter()
        .filter(|record| record.pattern == pattern)
        .count() as f64
        / history.len() as f64
}

/// Entropy of the window's label distribution, normalized to [0, 1] by the
/// maximum entropy over six labels.
fn normalized_entropy(history: &[SessionRecord]) -> f64 {
    if history.is_empty() {
        return 1.0;
    }
    let mut counts: BTreeMap<Pattern, usize> = BTreeMap::new();
    for record in history {
        *counts.entry(record.pattern).or_insert(0) += 1;
    }
    let n = history.len() as f64;
    let entropy: f64 = counts
        .values()
        .map(|count| {
            let p = *count as f64 / n;
            -p * p.ln()
        })
        .sum();
    entropy / (Pattern::ALL.len() as f64).ln()
}
