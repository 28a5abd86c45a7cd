//! Persistence seam for the orchestrator.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use fitplan_db::models::{
    BasePlan, CheckIn, DailyPlan, GenerationStatus, JobStateRecord, PlanKind, PlanSource,
    UserProfile,
};
use serde_json::Value;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgPlanStore;

/// A base plan about to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct BasePlanDraft {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: PlanSource,
    pub payload: Value,
}

/// A daily plan about to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyPlanDraft {
    pub id: Uuid,
    pub user_id: Uuid,
    pub base_plan_id: Uuid,
    pub plan_date: NaiveDate,
    pub source: PlanSource,
    pub payload: Value,
}

/// Reads the orchestrator's inputs and stores its outputs.
///
/// `add_*` return only once the row is durable; the orchestrator navigates
/// after that acknowledgment.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

    /// Most recent check-ins, newest first.
    async fn get_recent_checkins(&self, user_id: Uuid, limit: usize) -> Result<Vec<CheckIn>>;

    async fn get_current_base_plan(&self, user_id: Uuid) -> Result<Option<BasePlan>>;

    async fn get_today_plan(&self, user_id: Uuid, today: NaiveDate) -> Result<Option<DailyPlan>>;

    async fn add_base_plan(&self, draft: BasePlanDraft) -> Result<BasePlan>;

    async fn add_daily_plan(&self, draft: DailyPlanDraft) -> Result<DailyPlan>;

    async fn record_job_state(
        &self,
        user_id: Uuid,
        kind: PlanKind,
        status: GenerationStatus,
        attempt: u32,
        last_error: Option<&str>,
    ) -> Result<()>;

    async fn get_job_state(&self, user_id: Uuid, kind: PlanKind)
    -> Result<Option<JobStateRecord>>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PlanStore) {}
};
