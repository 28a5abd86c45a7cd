//! Database query functions for the `plan_generation_attempts` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{GenerationAttemptRecord, PlanKind};

/// Parameters for inserting an attempt log row.
#[derive(Debug, Clone)]
pub struct NewGenerationAttempt {
    pub user_id: Uuid,
    pub kind: PlanKind,
    pub success: bool,
    pub attempt: i32,
    pub error_stage: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: i64,
    pub used_fallback: bool,
}

/// Insert an attempt log row.
pub async fn insert_attempt(
    pool: &PgPool,
    new: &NewGenerationAttempt,
) -> Result<GenerationAttemptRecord> {
    let record = sqlx::query_as::<_, GenerationAttemptRecord>(
        "INSERT INTO plan_generation_attempts \
         (user_id, kind, success, attempt, error_stage, error, elapsed_ms, used_fallback) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(new.kind)
    .bind(new.success)
    .bind(new.attempt)
    .bind(&new.error_stage)
    .bind(&new.error)
    .bind(new.elapsed_ms)
    .bind(new.used_fallback)
    .fetch_one(pool)
    .await
    .with_context(|| {
        format!(
            "failed to log {} generation attempt {} for user {}",
            new.kind, new.attempt, new.user_id
        )
    })?;

    Ok(record)
}

/// The most recent attempts for a user, newest first.
pub async fn list_recent_attempts(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<GenerationAttemptRecord>> {
    let records = sqlx::query_as::<_, GenerationAttemptRecord>(
        "SELECT * FROM plan_generation_attempts \
         WHERE user_id = $1 \
         ORDER BY recorded_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list generation attempts")?;

    Ok(records)
}
