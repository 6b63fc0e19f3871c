use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use metacoach_core::baseline::{DriftKind, UserBaseline};
use metacoach_core::pattern::Pattern;
use metacoach_engine::baseline::fold_session;
use metacoach_engine::escalation::AuditKind;

use crate::error::AppError;
use crate::state::AppState;
use crate::store;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/sessions/{session_id}/end", post(end_session))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EndSessionResponse {
    pub session_id: Uuid,
    /// False when the session was unknown or already ended; the call is
    /// then a no-op
    pub finalized: bool,
    /// Absent when the session ended before any turn completed
    pub dominant_pattern: Option<Pattern>,
    pub contextual_trigger: Option<String>,
    pub drift: DriftKind,
    /// The user's baseline after folding this session in; absent when the
    /// session contributed nothing
    pub baseline: Option<UserBaseline>,
}

/// End a session and fold it into the user's baseline
///
/// Detaches the session's in-memory state, records the session summary,
/// recomputes the user's baseline over their history window, and persists
/// the session's escalation audit trail. All in one transaction; ending a
/// session twice (or ending an unknown session) is a no-op reported as
/// `finalized: false` rather than an error, so clients can retry blindly.
#[utoipa::path(
    post,
    path = "/v1/sessions/{session_id}/end",
    params(("session_id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session ended (or was already ended)", body = EndSessionResponse)
    ),
    tag = "sessions"
)]
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let Some(ended) = state.engine.end_session(session_id).await else {
        return Ok((
            StatusCode::OK,
            Json(EndSessionResponse {
                session_id,
                finalized: false,
                dominant_pattern: None,
                contextual_trigger: None,
                drift: DriftKind::None,
                baseline: None,
            }),
        ));
    };

    let Some(summary) = ended.summary else {
        // No completed turns: nothing to fold, nothing durable to write
        return Ok((
            StatusCode::OK,
            Json(EndSessionResponse {
                session_id,
                finalized: true,
                dominant_pattern: None,
                contextual_trigger: None,
                drift: DriftKind::None,
                baseline: None,
            }),
        ));
    };

    let mut tx = state.db.begin().await?;

    let inserted = store::insert_session(&mut tx, &summary).await?;
    let history = store::fetch_history(&mut tx, summary.user_id, Utc::now()).await?;
    let update = fold_session(summary.user_id, &history, Utc::now());
    store::upsert_baseline(&mut tx, &update.baseline).await?;

    if inserted {
        // Overrides were already persisted when they happened
        let tier_changes: Vec<_> = ended
            .audit
            .iter()
            .filter(|entry| entry.kind == AuditKind::TierChange)
            .cloned()
            .collect();
        store::append_audits(&mut tx, session_id, &tier_changes).await?;
    }

    tx.commit().await?;

    tracing::info!(
        session_id = %session_id,
        user_id = %summary.user_id,
        pattern = summary.dominant_pattern.code(),
        drift = ?update.drift,
        "session folded into baseline"
    );

    Ok((
        StatusCode::OK,
        Json(EndSessionResponse {
            session_id,
            finalized: true,
            dominant_pattern: Some(summary.dominant_pattern),
            contextual_trigger: summary.contextual_trigger,
            drift: update.drift,
            baseline: Some(update.baseline),
        }),
    ))
}
