//! [`PlanStore`] over the fitplan PostgreSQL schema.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use fitplan_db::models::{
    BasePlan, CheckIn, DailyPlan, GenerationStatus, JobStateRecord, PlanKind, UserProfile,
};
use fitplan_db::queries::{checkins, jobs, plans, profiles};
use sqlx::PgPool;
use uuid::Uuid;

use super::{BasePlanDraft, DailyPlanDraft, PlanStore};

#[derive(Debug, Clone)]
pub struct PgPlanStore {
    pool: PgPool,
}

impl PgPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PlanStore for PgPlanStore {
    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        profiles::get_profile(&self.pool, user_id).await
    }

    async fn get_recent_checkins(&self, user_id: Uuid, limit: usize) -> Result<Vec<CheckIn>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        checkins::list_recent_checkins(&self.pool, user_id, limit).await
    }

    async fn get_current_base_plan(&self, user_id: Uuid) -> Result<Option<BasePlan>> {
        plans::get_current_base_plan(&self.pool, user_id).await
    }

    async fn get_today_plan(&self, user_id: Uuid, today: NaiveDate) -> Result<Option<DailyPlan>> {
        plans::get_daily_plan_for_date(&self.pool, user_id, today).await
    }

    async fn add_base_plan(&self, draft: BasePlanDraft) -> Result<BasePlan> {
        let new = plans::NewBasePlan {
            id: draft.id,
            user_id: draft.user_id,
            source: draft.source,
            payload: &draft.payload,
        };
        plans::insert_base_plan(&self.pool, &new).await
    }

    async fn add_daily_plan(&self, draft: DailyPlanDraft) -> Result<DailyPlan> {
        let new = plans::NewDailyPlan {
            id: draft.id,
            user_id: draft.user_id,
            base_plan_id: draft.base_plan_id,
            plan_date: draft.plan_date,
            source: draft.source,
            payload: &draft.payload,
        };
        plans::insert_daily_plan(&self.pool, &new).await
    }

    async fn record_job_state(
        &self,
        user_id: Uuid,
        kind: PlanKind,
        status: GenerationStatus,
        attempt: u32,
        last_error: Option<&str>,
    ) -> Result<()> {
        let attempt = i32::try_from(attempt).unwrap_or(i32::MAX);
        jobs::upsert_job_state(&self.pool, user_id, kind, status, attempt, last_error).await?;
        Ok(())
    }

    async fn get_job_state(
        &self,
        user_id: Uuid,
        kind: PlanKind,
    ) -> Result<Option<JobStateRecord>> {
        jobs::get_job_state(&self.pool, user_id, kind).await
    }
}
