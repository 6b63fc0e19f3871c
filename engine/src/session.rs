use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use metacoach_core::baseline::UserBaseline;
use metacoach_core::pattern::Pattern;

use crate::escalation::EscalationMachine;
use crate::estimator::PosteriorState;
use crate::fatigue::FatigueMonitor;
use crate::stability::StabilityWindow;

/// Per-turn context reported alongside the signal vector.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext {
    pub user_id: Uuid,
    /// 0-10, reported by the caller
    pub time_pressure: f64,
    /// 0-10, reported by the caller
    pub cognitive_load: f64,
    /// The session is working on a task type new to this user
    pub novel_task: bool,
}

/// All mutable state for one session. Owned exclusively by that session's
/// processing path; the registry's per-session mutex guarantees no two
/// turns of the same session run concurrently and that turns are applied
/// in arrival order.
#[derive(Debug)]
pub struct SessionState {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub turn: u64,
    pub posterior: PosteriorState,
    pub stability: StabilityWindow,
    pub fatigue: FatigueMonitor,
    pub escalation: EscalationMachine,
    /// Fused label counts, for the session's dominant pattern at end
    pub label_tally: BTreeMap<Pattern, u32>,
    pub novel_task_seen: bool,
}

impl SessionState {
    pub fn new(
        session_id: Uuid,
        user_id: Uuid,
        baseline: Option<&UserBaseline>,
        now: DateTime<Utc>,
    ) -> SessionState {
        SessionState {
            session_id,
            user_id,
            started_at: now,
            turn: 0,
            posterior: PosteriorState::from_prior(baseline),
            stability: StabilityWindow::new(),
            fatigue: FatigueMonitor::new(now),
            escalation: EscalationMachine::new(),
            label_tally: BTreeMap::new(),
            novel_task_seen: false,
        }
    }

    /// Most frequent fused label of the session. None before the first
    /// turn completes.
    pub fn dominant_pattern(&self) -> Option<Pattern> {
        self.label_tally
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(pattern, _)| *pattern)
    }
}

/// Map of live sessions. No state is shared across sessions; one slow
/// external call only ever holds its own session's lock.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionState>>>>,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        SessionRegistry {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Fetches a session's state handle, creating it on first use. The
    /// baseline is only consulted at creation, to seed the posterior prior.
    pub async fn get_or_create(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        baseline: Option<&UserBaseline>,
        now: DateTime<Utc>,
    ) -> Arc<Mutex<SessionState>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(&session_id) {
                return handle.clone();
            }
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(SessionState::new(session_id, user_id, baseline, now)))
            })
            .clone()
    }

    pub async fn get(&self, session_id: Uuid) -> Option<Arc<Mutex<SessionState>>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Detaches a session. A turn already in flight keeps its own handle,
    /// finishes against the detached state, and its result is discarded
    /// with it.
    pub async fn remove(&self, session_id: Uuid) -> Option<Arc<Mutex<SessionState>>> {
        self.sessions.write().await.remove(&session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionRegistry;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn get_or_create_returns_the_same_state_for_a_session() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::now_v7();
        let user_id = Uuid::now_v7();
        let a = registry
            .get_or_create(session_id, user_id, None, Utc::now())
            .await;
        let b = registry
            .get_or_create(session_id, user_id, None, Utc::now())
            .await;
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn remove_detaches_the_session() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::now_v7();
        let handle = registry
            .get_or_create(session_id, Uuid::now_v7(), None, Utc::now())
            .await;
        let removed = registry.remove(session_id).await.expect("session existed");
        assert!(std::sync::Arc::ptr_eq(&handle, &removed));
        assert!(registry.get(session_id).await.is_none());
        // The held handle still resolves; its state is simply detached
        assert_eq!(handle.lock().await.turn, 0);
    }
}
