//! Postgres persistence for baseline memory and escalation audits.
//!
//! Session state never touches the database; only session summaries, the
//! folded per-user baseline, and append-only audit rows are durable.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use metacoach_core::baseline::{BaselineStatus, UserBaseline};
use metacoach_core::pattern::Pattern;
use metacoach_engine::baseline::{
    SessionRecord, SessionSummary, HISTORY_CAP, HISTORY_WINDOW_DAYS,
};
use metacoach_engine::escalation::EscalationAudit;

use crate::error::AppError;

/// Loads a user's baseline. None when the user has no completed sessions.
pub async fn load_baseline(pool: &PgPool, user_id: Uuid) -> Result<Option<UserBaseline>, AppError> {
    let row = sqlx::query(
        r#"
        SELECT user_id, primary_pattern, confidence, stability_score,
               sessions_observed, status, contextual_triggers, updated_at
        FROM user_baselines
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let primary_pattern: Option<String> = row.try_get("primary_pattern")?;
    let status: String = row.try_get("status")?;
    let triggers: serde_json::Value = row.try_get("contextual_triggers")?;

    Ok(Some(UserBaseline {
        user_id: row.try_get("user_id")?,
        primary_pattern: primary_pattern.as_deref().and_then(Pattern::from_code),
        confidence: row.try_get("confidence")?,
        stability_score: row.try_get("stability_score")?,
        sessions_observed: row.try_get("sessions_observed")?,
        status: BaselineStatus::from_str(&status).ok_or_else(|| {
            AppError::Internal(format!("unknown baseline status '{status}' in storage"))
        })?,
        contextual_triggers: serde_json::from_value(triggers)
            .map_err(|e| AppError::Internal(format!("corrupt contextual_triggers: {e}")))?,
        updated_at: row.try_get("updated_at")?,
    }))
}

/// The user's session history window, oldest first. Bounded by both the
/// rolling window and a hard row cap, so a pathological user cannot make
/// the fold unbounded.
pub async fn fetch_history(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<SessionRecord>, AppError> {
    let horizon = now - Duration::days(HISTORY_WINDOW_DAYS);
    let rows = sqlx::query(
        r#"
        SELECT dominant_pattern, contextual_trigger, ended_at
        FROM baseline_sessions
        WHERE user_id = $1 AND ended_at >= $2
        ORDER BY ended_at DESC
        LIMIT $3
        "#,
    )
    .bind(user_id)
    .bind(horizon)
    .bind(HISTORY_CAP)
    .fetch_all(&mut **tx)
    .await?;

    let mut history = Vec::with_capacity(rows.len());
    for row in rows.into_iter().rev() {
        let code: String = row.try_get("dominant_pattern")?;
        let pattern = Pattern::from_code(&code).ok_or_else(|| {
            AppError::Internal(format!("unknown pattern code '{code}' in storage"))
        })?;
        history.push(SessionRecord {
            pattern,
            contextual_trigger: row.try_get("contextual_trigger")?,
            ended_at: row.try_get("ended_at")?,
        });
    }
    Ok(history)
}

/// Records a finished session. Keyed by session id, so replaying the same
/// end-of-session is a no-op; returns whether a row was actually written.
pub async fn insert_session(
    tx: &mut Transaction<'_, Postgres>,
    summary: &SessionSummary,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO baseline_sessions
            (session_id, user_id, dominant_pattern, contextual_trigger, ended_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (session_id) DO NOTHING
        "#,
    )
    .bind(summary.session_id)
    .bind(summary.user_id)
    .bind(summary.dominant_pattern.code())
    .bind(&summary.contextual_trigger)
    .bind(summary.ended_at)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Writes the folded baseline. The row-level upsert serializes concurrent
/// session ends for the same user at the database.
pub async fn upsert_baseline(
    tx: &mut Transaction<'_, Postgres>,
    baseline: &UserBaseline,
) -> Result<(), AppError> {
    let triggers = serde_json::to_value(&baseline.contextual_triggers)
        .map_err(|e| AppError::Internal(format!("serialize contextual_triggers: {e}")))?;
    sqlx::query(
        r#"
        INSERT INTO user_baselines
            (user_id, primary_pattern, confidence, stability_score,
             sessions_observed, status, contextual_triggers, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (user_id) DO UPDATE SET
            primary_pattern = EXCLUDED.primary_pattern,
            confidence = EXCLUDED.confidence,
            stability_score = EXCLUDED.stability_score,
            sessions_observed = EXCLUDED.sessions_observed,
            status = EXCLUDED.status,
            contextual_triggers = EXCLUDED.contextual_triggers,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(baseline.user_id)
    .bind(baseline.primary_pattern.map(|p| p.code()))
    .bind(baseline.confidence)
    .bind(baseline.stability_score)
    .bind(baseline.sessions_observed)
    .bind(baseline.status.as_str())
    .bind(triggers)
    .bind(baseline.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Appends one audit row. The table is append-only; nothing updates or
/// deletes these rows.
pub async fn append_audit(
    pool: &PgPool,
    session_id: Uuid,
    entry: &EscalationAudit,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO escalation_audit
            (id, session_id, kind, from_tier, to_tier, confidence, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(session_id)
    .bind(entry.kind.as_str())
    .bind(entry.from.as_str())
    .bind(entry.to.as_str())
    .bind(entry.confidence)
    .bind(entry.at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Appends audit rows inside the session-end transaction.
pub async fn append_audits(
    tx: &mut Transaction<'_, Postgres>,
    session_id: Uuid,
    entries: &[EscalationAudit],
) -> Result<(), AppError> {
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO escalation_audit
                (id, session_id, kind, from_tier, to_tier, confidence, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(session_id)
        .bind(entry.kind.as_str())
        .bind(entry.from.as_str())
        .bind(entry.to.as_str())
        .bind(entry.confidence)
        .bind(entry.at)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Deletes a user's baseline and their session history. Explicit user
/// request only; audit rows are not user-scoped and are kept.
pub async fn delete_baseline(pool: &PgPool, user_id: Uuid) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM baseline_sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM user_baselines WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}
