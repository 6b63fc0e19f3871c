use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use metacoach_core::decision::{FatigueSnapshot, InterventionAction};
use metacoach_core::error::ApiError;

use crate::error::AppError;
use crate::state::AppState;
use crate::store;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/v1/sessions/{session_id}/interventions/{tool_id}/events",
        post(record_event),
    )
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InterventionEventRequest {
    pub action: InterventionAction,
    /// Required for action 'override_signed': the user's explicit
    /// justification for bypassing a hard intervention
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InterventionEventResponse {
    pub session_id: Uuid,
    pub tool_id: String,
    /// Fatigue state after the event was applied
    pub fatigue: FatigueSnapshot,
}

/// Record a user's response to a surfaced intervention
///
/// Dismissals feed the fatigue model and can start suppression windows;
/// an accept breaks the tool's dismiss streak; a signed override of a
/// hard intervention is persisted to the audit log before returning.
#[utoipa::path(
    post,
    path = "/v1/sessions/{session_id}/interventions/{tool_id}/events",
    request_body = InterventionEventRequest,
    params(
        ("session_id" = Uuid, Path, description = "Session identifier"),
        ("tool_id" = String, Path, description = "Catalogue tool id")
    ),
    responses(
        (status = 200, description = "Event recorded", body = InterventionEventResponse),
        (status = 400, description = "Unknown tool or missing signature", body = ApiError),
        (status = 404, description = "Session not found", body = ApiError)
    ),
    tag = "interventions"
)]
pub async fn record_event(
    State(state): State<AppState>,
    Path((session_id, tool_id)): Path<(Uuid, String)>,
    Json(req): Json<InterventionEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .engine
        .record_intervention_event(session_id, &tool_id, req.action, req.signature.as_deref())
        .await?;

    // Overrides must be durable before the caller proceeds
    if let Some(audit) = &outcome.audit {
        store::append_audit(&state.db, session_id, audit).await?;
    }

    Ok((
        StatusCode::OK,
        Json(InterventionEventResponse {
            session_id,
            tool_id,
            fatigue: outcome.fatigue,
        }),
    ))
}
