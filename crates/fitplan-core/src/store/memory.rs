//! In-process [`PlanStore`], used by tests and offline previews.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use fitplan_db::models::{
    BasePlan, CheckIn, DailyPlan, GenerationStatus, JobStateRecord, PlanKind, UserProfile,
};
use uuid::Uuid;

use super::{BasePlanDraft, DailyPlanDraft, PlanStore};

#[derive(Debug, Default)]
struct State {
    profiles: HashMap<Uuid, UserProfile>,
    checkins: Vec<CheckIn>,
    base_plans: Vec<BasePlan>,
    daily_plans: Vec<DailyPlan>,
    jobs: HashMap<(Uuid, PlanKind), JobStateRecord>,
    fail_writes: bool,
    fail_reads: bool,
}

/// Vector-backed store. Newest rows win on reads, like the SQL store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put_profile(&self, profile: UserProfile) {
        self.lock().profiles.insert(profile.user_id, profile);
    }

    pub fn put_checkin(&self, checkin: CheckIn) {
        self.lock().checkins.push(checkin);
    }

    pub fn put_base_plan(&self, plan: BasePlan) {
        self.lock().base_plans.push(plan);
    }

    pub fn put_daily_plan(&self, plan: DailyPlan) {
        self.lock().daily_plans.push(plan);
    }

    /// Make every plan write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make every profile, check-in and plan read fail until reset.
    /// Job-state reads and writes are unaffected.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Lock the state for a read, failing if reads are switched off.
    fn read(&self, what: &str) -> Result<MutexGuard<'_, State>> {
        let state = self.lock();
        if state.fail_reads {
            bail!("failed to read {what}: connection reset");
        }
        Ok(state)
    }

    pub fn base_plans(&self, user_id: Uuid) -> Vec<BasePlan> {
        let state = self.lock();
        state
            .base_plans
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn daily_plans(&self, user_id: Uuid) -> Vec<DailyPlan> {
        let state = self.lock();
        state
            .daily_plans
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.read("profile")?.profiles.get(&user_id).cloned())
    }

    async fn get_recent_checkins(&self, user_id: Uuid, limit: usize) -> Result<Vec<CheckIn>> {
        let state = self.read("check-ins")?;
        let mut checkins: Vec<CheckIn> = state
            .checkins
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort keeps later insertions ahead on ties once reversed.
        checkins.sort_by_key(|c| (c.checkin_date, c.created_at));
        checkins.reverse();
        checkins.truncate(limit);
        Ok(checkins)
    }

    async fn get_current_base_plan(&self, user_id: Uuid) -> Result<Option<BasePlan>> {
        Ok(self
            .read("base plan")?
            .base_plans
            .iter()
            .rev()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn get_today_plan(&self, user_id: Uuid, today: NaiveDate) -> Result<Option<DailyPlan>> {
        Ok(self
            .read("daily plan")?
            .daily_plans
            .iter()
            .rev()
            .find(|p| p.user_id == user_id && p.plan_date == today)
            .cloned())
    }

    async fn add_base_plan(&self, draft: BasePlanDraft) -> Result<BasePlan> {
        let mut state = self.lock();
        if state.fail_writes {
            bail!("failed to insert base plan for user {}", draft.user_id);
        }
        let plan = BasePlan {
            id: draft.id,
            user_id: draft.user_id,
            source: draft.source,
            payload: draft.payload,
            created_at: Utc::now(),
        };
        state.base_plans.push(plan.clone());
        Ok(plan)
    }

    async fn add_daily_plan(&self, draft: DailyPlanDraft) -> Result<DailyPlan> {
        let mut state = self.lock();
        if state.fail_writes {
            bail!("failed to insert daily plan for user {}", draft.user_id);
        }
        let plan = DailyPlan {
            id: draft.id,
            user_id: draft.user_id,
            base_plan_id: draft.base_plan_id,
            plan_date: draft.plan_date,
            source: draft.source,
            payload: draft.payload,
            created_at: Utc::now(),
        };
        state.daily_plans.push(plan.clone());
        Ok(plan)
    }

    async fn record_job_state(
        &self,
        user_id: Uuid,
        kind: PlanKind,
        status: GenerationStatus,
        attempt: u32,
        last_error: Option<&str>,
    ) -> Result<()> {
        let record = JobStateRecord {
            user_id,
            kind,
            status,
            attempt: i32::try_from(attempt).unwrap_or(i32::MAX),
            last_error: last_error.map(str::to_string),
            updated_at: Utc::now(),
        };
        self.lock().jobs.insert((user_id, kind), record);
        Ok(())
    }

    async fn get_job_state(
        &self,
        user_id: Uuid,
        kind: PlanKind,
    ) -> Result<Option<JobStateRecord>> {
        Ok(self.lock().jobs.get(&(user_id, kind)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fitplan_db::models::PlanSource;
    use serde_json::json;

    fn checkin(user_id: Uuid, date: NaiveDate, energy: i32) -> CheckIn {
        CheckIn {
            id: Uuid::new_v4(),
            user_id,
            checkin_date: date,
            energy,
            stress: 5,
            mood: 5,
            sleep_hours: None,
            soreness: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn recent_checkins_newest_first() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let today = Utc::now().date_naive();
        store.put_checkin(checkin(user, today - Duration::days(2), 3));
        store.put_checkin(checkin(user, today, 7));
        store.put_checkin(checkin(Uuid::new_v4(), today, 9));

        let recent = store.get_recent_checkins(user, 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].energy, 7);
        assert_eq!(store.get_recent_checkins(user, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn latest_base_plan_is_current() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        for n in 0..2 {
            store
                .add_base_plan(BasePlanDraft {
                    id: Uuid::new_v4(),
                    user_id: user,
                    source: PlanSource::Generated,
                    payload: json!({"days": {"monday": n}}),
                })
                .await
                .unwrap();
        }
        let current = store.get_current_base_plan(user).await.unwrap().unwrap();
        assert_eq!(current.payload["days"]["monday"], 1);
        assert_eq!(store.base_plans(user).len(), 2);
    }

    #[tokio::test]
    async fn failing_writes_store_nothing() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.set_fail_writes(true);
        let err = store
            .add_base_plan(BasePlanDraft {
                id: Uuid::new_v4(),
                user_id: user,
                source: PlanSource::Fallback,
                payload: json!({"days": {"monday": {}}}),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to insert base plan"));
        assert!(store.base_plans(user).is_empty());
    }

    #[tokio::test]
    async fn failing_reads_spare_job_state() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.set_fail_reads(true);

        let err = store.get_current_base_plan(user).await.unwrap_err();
        assert!(err.to_string().contains("failed to read base plan"));
        assert!(store.get_user_profile(user).await.is_err());
        store
            .record_job_state(user, PlanKind::Base, GenerationStatus::Error, 1, None)
            .await
            .unwrap();
        assert!(store.get_job_state(user, PlanKind::Base).await.unwrap().is_some());

        store.set_fail_reads(false);
        assert!(store.get_current_base_plan(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn job_state_upserts() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store
            .record_job_state(user, PlanKind::Daily, GenerationStatus::Pending, 1, None)
            .await
            .unwrap();
        store
            .record_job_state(user, PlanKind::Daily, GenerationStatus::Error, 1, Some("boom"))
            .await
            .unwrap();
        let state = store
            .get_job_state(user, PlanKind::Daily)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.status, GenerationStatus::Error);
        assert_eq!(state.last_error.as_deref(), Some("boom"));
        assert!(store.get_job_state(user, PlanKind::Base).await.unwrap().is_none());
    }
}
