//! Database query functions for the `generation_jobs` table.
//!
//! One row per `(user_id, kind)`; each write replaces the previous state.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{GenerationStatus, JobStateRecord, PlanKind};

/// Record the latest state of a generation job.
pub async fn upsert_job_state(
    pool: &PgPool,
    user_id: Uuid,
    kind: PlanKind,
    status: GenerationStatus,
    attempt: i32,
    last_error: Option<&str>,
) -> Result<JobStateRecord> {
    let record = sqlx::query_as::<_, JobStateRecord>(
        "INSERT INTO generation_jobs (user_id, kind, status, attempt, last_error) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (user_id, kind) DO UPDATE SET \
         status = EXCLUDED.status, attempt = EXCLUDED.attempt, \
         last_error = EXCLUDED.last_error, updated_at = now() \
         RETURNING *",
    )
    .bind(user_id)
    .bind(kind)
    .bind(status)
    .bind(attempt)
    .bind(last_error)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to record {kind} job state for user {user_id}"))?;

    Ok(record)
}

/// Fetch the recorded job state for a user and plan kind.
pub async fn get_job_state(
    pool: &PgPool,
    user_id: Uuid,
    kind: PlanKind,
) -> Result<Option<JobStateRecord>> {
    let record = sqlx::query_as::<_, JobStateRecord>(
        "SELECT * FROM generation_jobs WHERE user_id = $1 AND kind = $2",
    )
    .bind(user_id)
    .bind(kind)
    .fetch_optional(pool)
    .await
    .context("failed to fetch job state")?;

    Ok(record)
}

/// List all recorded job states for a user.
pub async fn list_job_states(pool: &PgPool, user_id: Uuid) -> Result<Vec<JobStateRecord>> {
    let records = sqlx::query_as::<_, JobStateRecord>(
        "SELECT * FROM generation_jobs WHERE user_id = $1 ORDER BY kind",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list job states")?;

    Ok(records)
}
