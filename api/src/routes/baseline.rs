use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Utc;
use utoipa::ToSchema;
use uuid::Uuid;

use metacoach_core::baseline::UserBaseline;

use crate::error::AppError;
use crate::state::AppState;
use crate::store;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/users/{user_id}/baseline", get(get_baseline))
        .route("/v1/users/{user_id}/baseline", delete(delete_baseline))
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct BaselineDeletedResponse {
    pub user_id: Uuid,
    pub deleted: bool,
}

/// Get a user's cross-session baseline
///
/// Users with no completed sessions get a fresh `exploring` baseline
/// rather than an error; callers never need to special-case new users.
#[utoipa::path(
    get,
    path = "/v1/users/{user_id}/baseline",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Current baseline", body = UserBaseline)
    ),
    tag = "baseline"
)]
pub async fn get_baseline(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let baseline = store::load_baseline(&state.db, user_id)
        .await?
        .unwrap_or_else(|| UserBaseline::exploring(user_id, Utc::now()));
    Ok((StatusCode::OK, Json(baseline)))
}

/// Delete a user's baseline and session history
///
/// The baseline belongs to the user; this is the explicit erasure path.
/// Escalation audit rows are a safety record and are retained.
#[utoipa::path(
    delete,
    path = "/v1/users/{user_id}/baseline",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Baseline deleted", body = BaselineDeletedResponse)
    ),
    tag = "baseline"
)]
pub async fn delete_baseline(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = store::delete_baseline(&state.db, user_id).await?;
    tracing::info!(user_id = %user_id, deleted, "baseline erasure requested");
    Ok((
        StatusCode::OK,
        Json(BaselineDeletedResponse { user_id, deleted }),
    ))
}
