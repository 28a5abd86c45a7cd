//! Database query functions for the `base_plans` and `daily_plans` tables.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{BasePlan, DailyPlan, PlanSource};

/// Parameters for inserting a base plan. The ID is assigned by the caller so
/// the plan can be referenced before the insert is acknowledged.
#[derive(Debug, Clone)]
pub struct NewBasePlan<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: PlanSource,
    pub payload: &'a Value,
}

/// Parameters for inserting a daily plan.
#[derive(Debug, Clone)]
pub struct NewDailyPlan<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub base_plan_id: Uuid,
    pub plan_date: NaiveDate,
    pub source: PlanSource,
    pub payload: &'a Value,
}

/// Insert a base plan and return the stored row.
pub async fn insert_base_plan(pool: &PgPool, new: &NewBasePlan<'_>) -> Result<BasePlan> {
    let plan = sqlx::query_as::<_, BasePlan>(
        "INSERT INTO base_plans (id, user_id, source, payload) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(new.id)
    .bind(new.user_id)
    .bind(new.source)
    .bind(new.payload)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert base plan for user {}", new.user_id))?;

    Ok(plan)
}

/// The most recently created base plan for a user.
pub async fn get_current_base_plan(pool: &PgPool, user_id: Uuid) -> Result<Option<BasePlan>> {
    let plan = sqlx::query_as::<_, BasePlan>(
        "SELECT * FROM base_plans WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch current base plan")?;

    Ok(plan)
}

/// Insert a daily plan and return the stored row.
///
/// Fails if `base_plan_id` does not reference an existing base plan.
pub async fn insert_daily_plan(pool: &PgPool, new: &NewDailyPlan<'_>) -> Result<DailyPlan> {
    let plan = sqlx::query_as::<_, DailyPlan>(
        "INSERT INTO daily_plans (id, user_id, base_plan_id, plan_date, source, payload) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(new.id)
    .bind(new.user_id)
    .bind(new.base_plan_id)
    .bind(new.plan_date)
    .bind(new.source)
    .bind(new.payload)
    .fetch_one(pool)
    .await
    .with_context(|| {
        format!(
            "failed to insert daily plan for user {} on {}",
            new.user_id, new.plan_date
        )
    })?;

    Ok(plan)
}

/// The latest daily plan for a user on the given date.
pub async fn get_daily_plan_for_date(
    pool: &PgPool,
    user_id: Uuid,
    date: NaiveDate,
) -> Result<Option<DailyPlan>> {
    let plan = sqlx::query_as::<_, DailyPlan>(
        "SELECT * FROM daily_plans \
         WHERE user_id = $1 AND plan_date = $2 \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(date)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to fetch daily plan for {date}"))?;

    Ok(plan)
}
