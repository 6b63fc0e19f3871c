use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use metacoach_core::decision::{
    EscalationTier, FatigueSnapshot, InterventionDecision, StabilityMetrics,
};
use metacoach_core::error::ApiError;
use metacoach_core::pattern::PatternEstimate;
use metacoach_engine::TurnContext;

use crate::error::AppError;
use crate::state::AppState;
use crate::store;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/sessions/{session_id}/turns", post(classify_turn))
}

/// Per-turn context is optional; omitted fields mean "not reported".
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TurnContextRequest {
    /// 0-10, self-reported or inferred upstream
    #[serde(default)]
    pub time_pressure: f64,
    /// 0-10
    #[serde(default)]
    pub cognitive_load: f64,
    /// The user is working on a task type new to them
    #[serde(default)]
    pub novel_task: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TurnRequest {
    pub user_id: Uuid,
    /// The 12-dimension signal map: keys p1-p4, m1-m3, e1-e3, r1-r2,
    /// each a score in [0.0, 3.0]
    pub signals: BTreeMap<String, f64>,
    #[serde(default)]
    pub context: TurnContextRequest,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TurnResponse {
    pub session_id: Uuid,
    /// 1-based turn number within the session
    pub turn: u64,
    pub estimate: PatternEstimate,
    pub stability: StabilityMetrics,
    pub fatigue: FatigueSnapshot,
    pub escalation_tier: EscalationTier,
    /// Interventions to surface this turn, highest priority first
    pub interventions: Vec<InterventionDecision>,
}

/// Classify one conversation turn
///
/// Feeds a scored signal vector into the session's classifier pipeline and
/// returns the fused pattern estimate plus the intervention decisions for
/// this turn. The first turn for a session id creates the session and
/// seeds its prior from the user's stored baseline.
#[utoipa::path(
    post,
    path = "/v1/sessions/{session_id}/turns",
    request_body = TurnRequest,
    params(("session_id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Turn classified", body = TurnResponse),
        (status = 400, description = "Invalid signal vector", body = ApiError)
    ),
    tag = "turns"
)]
pub async fn classify_turn(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<TurnRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Only consulted when this turn creates the session
    let baseline = store::load_baseline(&state.db, req.user_id).await?;

    let context = TurnContext {
        user_id: req.user_id,
        time_pressure: req.context.time_pressure,
        cognitive_load: req.context.cognitive_load,
        novel_task: req.context.novel_task,
    };

    let outcome = state
        .engine
        .classify_turn(session_id, &req.signals, context, baseline.as_ref())
        .await?;

    Ok((
        StatusCode::OK,
        Json(TurnResponse {
            session_id,
            turn: outcome.turn,
            estimate: outcome.estimate,
            stability: outcome.stability,
            fatigue: outcome.fatigue,
            escalation_tier: outcome.escalation_tier,
            interventions: outcome.interventions,
        }),
    ))
}
