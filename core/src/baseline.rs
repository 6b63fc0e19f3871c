use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::pattern::Pattern;

/// Lifecycle of a user's cross-session baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BaselineStatus {
    /// Fewer than 3 sessions observed
    Exploring,
    /// Enough sessions to start trusting the mode
    Forming,
    /// ≥ 5 sessions with a dominant pattern at ≥ 70% frequency
    Established,
}

impl BaselineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineStatus::Exploring => "exploring",
            BaselineStatus::Forming => "forming",
            BaselineStatus::Established => "established",
        }
    }

    pub fn from_str(value: &str) -> Option<BaselineStatus> {
        match value {
            "exploring" => Some(BaselineStatus::Exploring),
            "forming" => Some(BaselineStatus::Forming),
            "established" => Some(BaselineStatus::Established),
            _ => None,
        }
    }
}

/// How a deviating session was classified against the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DriftKind {
    /// Session agreed with the baseline, or no baseline yet
    None,
    /// Deviation explained by an active contextual trigger
    Temporary,
    /// Deviation persisted with no trigger; the baseline evolved
    Durable,
}

/// A user's durable cross-session record: dominant pattern, how stable it
/// is, and which contexts are known to shift it temporarily. Owned by the
/// user (deleted only on explicit request); mutated only on session
/// boundaries, never mid-turn.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserBaseline {
    pub user_id: Uuid,
    /// Mode of the session history window; absent until a session completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_pattern: Option<Pattern>,
    /// Frequency of the dominant pattern within the window
    pub confidence: f64,
    /// 1 − normalized entropy of the window's label distribution
    pub stability_score: f64,
    pub sessions_observed: i64,
    pub status: BaselineStatus,
    /// Contexts observed to cause temporary shifts, e.g.
    /// "elevated_fatigue" → the pattern the user shifted to
    pub contextual_triggers: BTreeMap<String, Pattern>,
    pub updated_at: DateTime<Utc>,
}

impl UserBaseline {
    /// Default record for a user with no completed sessions.
    pub fn exploring(user_id: Uuid, now: DateTime<Utc>) -> UserBaseline {
        UserBaseline {
            user_id,
            primary_pattern: None,
            confidence: 0.0,
            stability_score: 0.0,
            sessions_observed: 0,
            status: BaselineStatus::Exploring,
            contextual_triggers: BTreeMap::new(),
            updated_at: now,
        }
    }
}
