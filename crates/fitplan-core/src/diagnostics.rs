//! Fire-and-forget logging of generation attempts.

use std::time::Duration;

use fitplan_db::models::PlanKind;
use fitplan_db::queries::attempts::{self, NewGenerationAttempt};
use sqlx::PgPool;
use uuid::Uuid;

/// One generation attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    pub user_id: Uuid,
    pub kind: PlanKind,
    pub success: bool,
    /// 1-based attempt number within the session.
    pub attempt: u32,
    pub error_stage: Option<String>,
    pub error: Option<String>,
    pub elapsed: Duration,
    pub used_fallback: bool,
}

/// Sink for attempt records. Must not block or fail the caller.
pub trait Diagnostics: Send + Sync {
    fn log_plan_generation_attempt(&self, attempt: GenerationAttempt);
}

/// Emits attempts as structured tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn log_plan_generation_attempt(&self, attempt: GenerationAttempt) {
        let elapsed_ms = attempt.elapsed.as_millis();
        if attempt.success {
            tracing::info!(
                user_id = %attempt.user_id,
                kind = %attempt.kind,
                attempt = attempt.attempt,
                elapsed_ms,
                "plan generation succeeded"
            );
        } else {
            tracing::warn!(
                user_id = %attempt.user_id,
                kind = %attempt.kind,
                attempt = attempt.attempt,
                stage = attempt.error_stage.as_deref().unwrap_or("unknown"),
                error = attempt.error.as_deref().unwrap_or(""),
                used_fallback = attempt.used_fallback,
                elapsed_ms,
                "plan generation failed"
            );
        }
    }
}

/// Writes attempts to `plan_generation_attempts` on a spawned task.
#[derive(Debug, Clone)]
pub struct PgDiagnostics {
    pool: PgPool,
}

impl PgDiagnostics {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Diagnostics for PgDiagnostics {
    fn log_plan_generation_attempt(&self, attempt: GenerationAttempt) {
        TracingDiagnostics.log_plan_generation_attempt(attempt.clone());

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime; generation attempt not persisted");
            return;
        };
        let pool = self.pool.clone();
        handle.spawn(async move {
            let record = NewGenerationAttempt {
                user_id: attempt.user_id,
                kind: attempt.kind,
                success: attempt.success,
                attempt: i32::try_from(attempt.attempt).unwrap_or(i32::MAX),
                error_stage: attempt.error_stage,
                error: attempt.error,
                elapsed_ms: i64::try_from(attempt.elapsed.as_millis()).unwrap_or(i64::MAX),
                used_fallback: attempt.used_fallback,
            };
            if let Err(e) = attempts::insert_attempt(&pool, &record).await {
                tracing::warn!(error = %e, "failed to record generation attempt");
            }
        });
    }
}
