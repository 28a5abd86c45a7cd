use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use fitplan_db::models::{GenerationStatus, PlanKind, PlanSource};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{GenerationOrchestrator, GenerationOutcome, RetryOutcome};
use crate::diagnostics::GenerationAttempt;
use crate::error::{GenerationError, RemoteGenerationError};
use crate::generator::GenerationRequest;
use crate::job::GenerationJob;
use crate::navigation::{Route, navigate_with_fallback};
use crate::plan::PlanPayload;
use crate::plan::fallback::create_emergency_fallback_plan;
use crate::presenter::{Alert, AlertActionKind, Presenter};
use crate::registry::{Admission, JobKey, JobResolution, JobTicket, JobWaiter};
use crate::store::{BasePlanDraft, DailyPlanDraft};

/// One consumer of the orchestrator, bound to a user and plan kind.
///
/// Clones share the same session. Generation runs on a spawned task, so a
/// job keeps going (and its plan is stored) even if the caller stops
/// awaiting it; [`GenerationSession::unmount`] only silences UI effects.
#[derive(Clone)]
pub struct GenerationSession {
    state: Arc<SessionState>,
}

struct SessionState {
    orchestrator: Arc<GenerationOrchestrator>,
    presenter: Arc<dyn Presenter>,
    user_id: Uuid,
    kind: PlanKind,
    force_regen: AtomicBool,
    generating: AtomicBool,
    job: Mutex<GenerationJob>,
    lifetime: CancellationToken,
}

enum Preflight {
    Existing(Route),
    Generate(GenerationRequest),
}

/// Holds the session-local generating flag for the life of one run.
struct GeneratingGuard(Arc<SessionState>);

impl GeneratingGuard {
    fn acquire(state: &Arc<SessionState>) -> Option<Self> {
        state
            .generating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(state)))
    }
}

impl Drop for GeneratingGuard {
    fn drop(&mut self) {
        self.0.generating.store(false, Ordering::Release);
    }
}

impl GenerationSession {
    pub(super) fn new(
        orchestrator: Arc<GenerationOrchestrator>,
        user_id: Uuid,
        kind: PlanKind,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            state: Arc::new(SessionState {
                orchestrator,
                presenter,
                user_id,
                kind,
                force_regen: AtomicBool::new(false),
                generating: AtomicBool::new(false),
                job: Mutex::new(GenerationJob::new()),
                lifetime: CancellationToken::new(),
            }),
        }
    }

    /// Regenerate even if a plan already exists.
    pub fn with_force_regen(self, force: bool) -> Self {
        self.state.force_regen.store(force, Ordering::Release);
        self
    }

    pub fn user_id(&self) -> Uuid {
        self.state.user_id
    }

    pub fn kind(&self) -> PlanKind {
        self.state.kind
    }

    /// Snapshot of the current job.
    pub fn job(&self) -> GenerationJob {
        self.state.lock_job().clone()
    }

    pub fn is_generating(&self) -> bool {
        self.state.generating.load(Ordering::Acquire)
    }

    pub fn is_mounted(&self) -> bool {
        self.state.is_mounted()
    }

    /// Stop all presenter and navigation effects from this session.
    pub fn unmount(&self) {
        tracing::debug!(
            user_id = %self.state.user_id,
            kind = %self.state.kind,
            "generation session unmounted"
        );
        self.state.lifetime.cancel();
    }

    /// Drive generation to a plan, a fallback, or one failure alert.
    pub async fn generate_plan(&self) -> GenerationOutcome {
        let Some(guard) = GeneratingGuard::acquire(&self.state) else {
            tracing::debug!(
                user_id = %self.state.user_id,
                kind = %self.state.kind,
                "generation already running in this session"
            );
            return GenerationOutcome::AlreadyRunning;
        };

        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            let outcome = state.run().await;
            drop(guard);
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "plan generation task failed");
                GenerationOutcome::Failed(GenerationError::Abandoned)
            }
        }
    }

    /// User asked to try again after a failure.
    ///
    /// Only a session whose last run failed can retry. The status check,
    /// the backoff check and the retry bookkeeping happen under one job
    /// lock, so concurrent calls accept at most one retry.
    pub async fn handle_retry(&self) -> RetryOutcome {
        if self.is_generating() {
            return RetryOutcome::Busy;
        }

        let state = &self.state;
        let now = Instant::now();
        let policy = state.orchestrator.config.retry_policy();
        let checked = {
            let mut job = state.lock_job();
            if job.status != GenerationStatus::Error {
                None
            } else {
                Some(policy.check(job.last_retry_time, now).map(|()| {
                    job.begin_retry(now);
                    job.clone()
                }))
            }
        };

        let job = match checked {
            None => {
                tracing::debug!(
                    user_id = %state.user_id,
                    kind = %state.kind,
                    "retry ignored; last run did not fail"
                );
                return RetryOutcome::NotFailed;
            }
            Some(Err(rejected)) => {
                tracing::info!(
                    user_id = %state.user_id,
                    kind = %state.kind,
                    remaining_secs = rejected.remaining_secs(),
                    "retry rejected; too soon after the last one"
                );
                if state.is_mounted() {
                    state.presenter.alert(Alert::retry_too_soon(&rejected));
                }
                return RetryOutcome::Rejected(rejected);
            }
            Some(Ok(job)) => job,
        };

        state.notify(&job);
        state.force_regen.store(true, Ordering::Release);
        tracing::info!(
            user_id = %state.user_id,
            kind = %state.kind,
            retry_count = job.retry_count,
            "retrying plan generation"
        );

        RetryOutcome::Accepted(self.generate_plan().await)
    }

    /// Carry out an alert action the user picked.
    ///
    /// Returns the retry outcome for "Try Again", `None` otherwise.
    pub async fn handle_alert_action(&self, action: &AlertActionKind) -> Option<RetryOutcome> {
        match action {
            AlertActionKind::TryAgain => Some(self.handle_retry().await),
            AlertActionKind::GoHome | AlertActionKind::GoBack => {
                let route = self.state.orchestrator.config.on_failure_route.clone();
                self.state.navigate(&route).await;
                None
            }
            AlertActionKind::Redirect(route) => {
                self.state.navigate(route).await;
                None
            }
            AlertActionKind::Dismiss => None,
        }
    }
}

impl SessionState {
    fn is_mounted(&self) -> bool {
        !self.lifetime.is_cancelled()
    }

    fn lock_job(&self) -> MutexGuard<'_, GenerationJob> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_job(&self, f: impl FnOnce(&mut GenerationJob)) -> GenerationJob {
        let mut job = self.lock_job();
        f(&mut job);
        job.clone()
    }

    fn notify(&self, job: &GenerationJob) {
        if self.is_mounted() {
            self.presenter.job_updated(job);
        }
    }

    async fn navigate(&self, route: &Route) {
        navigate_with_fallback(self.orchestrator.navigator.as_ref(), route).await;
    }

    fn route_for(&self, plan_id: Uuid) -> Route {
        match self.kind {
            PlanKind::Base => Route::BasePlan { plan_id },
            PlanKind::Daily => Route::DailyPlan { plan_id },
        }
    }

    async fn run(&self) -> GenerationOutcome {
        let started = Instant::now();
        let today = Utc::now().date_naive();
        let request = match self.preflight(today).await {
            Ok(Preflight::Generate(request)) => request,
            Ok(Preflight::Existing(route)) => {
                tracing::info!(
                    user_id = %self.user_id,
                    kind = %self.kind,
                    route = %route,
                    "plan already exists; skipping generation"
                );
                if self.is_mounted() {
                    self.navigate(&route).await;
                }
                return GenerationOutcome::Existing { route };
            }
            Err(error) if error.is_precondition() => {
                tracing::info!(
                    user_id = %self.user_id,
                    kind = %self.kind,
                    error = %error,
                    "plan generation precondition not met"
                );
                if self.is_mounted() {
                    self.presenter.alert(Alert::precondition(&error));
                }
                return GenerationOutcome::PreconditionFailed(error);
            }
            Err(error) => {
                tracing::error!(
                    user_id = %self.user_id,
                    kind = %self.kind,
                    error = %error,
                    "failed to load generation inputs"
                );
                let attempt = self.lock_job().attempt();
                self.log_attempt(attempt, Some(&error), started.elapsed(), false);
                let message = error.to_string();
                self.record_job_state(GenerationStatus::Error, attempt, Some(&message))
                    .await;
                return self.finish_failed(error);
            }
        };

        let key = JobKey::new(self.user_id, self.kind);
        match self.orchestrator.registry.try_begin(key) {
            Admission::Leader(ticket) => self.lead(ticket, request).await,
            Admission::Follower(waiter) => self.follow(waiter).await,
        }
    }

    async fn preflight(&self, today: NaiveDate) -> Result<Preflight, GenerationError> {
        let store = &self.orchestrator.store;
        let user_id = self.user_id;
        let read = |e: anyhow::Error| GenerationError::persistence(&e);

        if !self.force_regen.load(Ordering::Acquire) {
            let existing = match self.kind {
                PlanKind::Base => store
                    .get_current_base_plan(user_id)
                    .await
                    .map_err(read)?
                    .map(|p| Route::BasePlan { plan_id: p.id }),
                PlanKind::Daily => store
                    .get_today_plan(user_id, today)
                    .await
                    .map_err(read)?
                    .map(|p| Route::DailyPlan { plan_id: p.id }),
            };
            if let Some(route) = existing {
                return Ok(Preflight::Existing(route));
            }
        }

        let profile = store
            .get_user_profile(user_id)
            .await
            .map_err(read)?
            .ok_or(GenerationError::MissingUser { user_id })?;
        let latest = store
            .get_recent_checkins(user_id, 1)
            .await
            .map_err(read)?
            .into_iter()
            .next();

        let (checkin, base_plan) = match self.kind {
            PlanKind::Base => (latest, None),
            PlanKind::Daily => {
                let checkin = latest
                    .filter(|c| c.checkin_date == today)
                    .ok_or(GenerationError::MissingCheckin { date: today })?;
                let base = store
                    .get_current_base_plan(user_id)
                    .await
                    .map_err(read)?
                    .ok_or(GenerationError::MissingBasePlan { user_id })?;
                (Some(checkin), Some(base))
            }
        };

        Ok(Preflight::Generate(GenerationRequest {
            kind: self.kind,
            profile,
            checkin,
            base_plan,
            plan_date: today,
        }))
    }

    async fn lead(&self, ticket: JobTicket, request: GenerationRequest) -> GenerationOutcome {
        let started = Instant::now();
        let job = self.update_job(|job| {
            job.status = GenerationStatus::Pending;
            job.elapsed_seconds = 0;
        });
        let attempt = job.attempt();
        self.notify(&job);
        self.record_job_state(GenerationStatus::Pending, attempt, None)
            .await;

        tracing::info!(
            user_id = %self.user_id,
            kind = %self.kind,
            attempt,
            generator = self.orchestrator.generator.name(),
            "starting plan generation"
        );

        let generated = match self.call_generator(&request).await {
            Ok(payload) => {
                self.persist(&request, Uuid::new_v4(), payload, PlanSource::Generated)
                    .await
            }
            Err(e) => Err(GenerationError::Remote(e)),
        };

        let error = match generated {
            Ok(plan_id) => {
                ticket.resolve(JobResolution::Ready {
                    plan_id,
                    source: PlanSource::Generated,
                });
                self.log_attempt(attempt, None, started.elapsed(), false);
                self.record_job_state(GenerationStatus::Ready, attempt, None)
                    .await;
                return self.finish_ready(plan_id, None).await;
            }
            Err(error) => error,
        };

        if self.orchestrator.config.allow_fallback {
            let fallback = create_emergency_fallback_plan(
                self.kind,
                &request.profile,
                request.checkin.as_ref(),
                request.plan_date,
            );
            match self
                .persist(&request, fallback.id, fallback.payload, PlanSource::Fallback)
                .await
            {
                Ok(plan_id) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        kind = %self.kind,
                        plan_id = %plan_id,
                        error = %error,
                        "generation failed; stored fallback plan"
                    );
                    ticket.resolve(JobResolution::Ready {
                        plan_id,
                        source: PlanSource::Fallback,
                    });
                    self.log_attempt(attempt, Some(&error), started.elapsed(), true);
                    let message = error.to_string();
                    self.record_job_state(GenerationStatus::Ready, attempt, Some(&message))
                        .await;
                    return self.finish_ready(plan_id, Some(error)).await;
                }
                Err(fallback_error) => {
                    tracing::error!(error = %fallback_error, "failed to store fallback plan");
                }
            }
        }

        ticket.resolve(JobResolution::Failed(error.clone()));
        self.log_attempt(attempt, Some(&error), started.elapsed(), false);
        let message = error.to_string();
        self.record_job_state(GenerationStatus::Error, attempt, Some(&message))
            .await;
        self.finish_failed(error)
    }

    async fn follow(&self, waiter: JobWaiter) -> GenerationOutcome {
        tracing::info!(
            user_id = %self.user_id,
            kind = %self.kind,
            "joining in-flight plan generation"
        );
        let job = self.update_job(|job| {
            job.status = GenerationStatus::Pending;
            job.elapsed_seconds = 0;
        });
        self.notify(&job);

        let resolution = waiter.wait().await;

        if !self.is_mounted() {
            let plan_id = match &resolution {
                JobResolution::Ready { plan_id, .. } => Some(*plan_id),
                JobResolution::Failed(_) => None,
            };
            return GenerationOutcome::Detached { plan_id };
        }
        match &resolution {
            JobResolution::Ready { plan_id, .. } => self.show_ready(*plan_id).await,
            JobResolution::Failed(error) => self.show_failure(error),
        }
        GenerationOutcome::Joined(resolution)
    }

    /// Run the remote call alongside the elapsed ticker and slow timer.
    async fn call_generator(
        &self,
        request: &GenerationRequest,
    ) -> Result<PlanPayload, RemoteGenerationError> {
        let config = &self.orchestrator.config;
        let call = self.orchestrator.generator.generate(request);
        tokio::pin!(call);

        let slow = tokio::time::sleep(config.slow_response_after);
        tokio::pin!(slow);
        let mut slow_shown = false;

        let period = config.tick_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                result = &mut call => return result,
                _ = ticker.tick() => {
                    if self.is_mounted() {
                        let job = self.update_job(|job| job.elapsed_seconds += 1);
                        self.presenter.job_updated(&job);
                    }
                }
                _ = &mut slow, if !slow_shown => {
                    slow_shown = true;
                    tracing::info!(
                        user_id = %self.user_id,
                        kind = %self.kind,
                        "plan generation is taking longer than usual"
                    );
                    if self.is_mounted() {
                        self.presenter.slow_response(&config.slow_response_message);
                    }
                }
            }
        }
    }

    /// Store a plan and wait for the store to acknowledge it.
    async fn persist(
        &self,
        request: &GenerationRequest,
        id: Uuid,
        payload: PlanPayload,
        source: PlanSource,
    ) -> Result<Uuid, GenerationError> {
        let store = &self.orchestrator.store;
        let stored = match self.kind {
            PlanKind::Base => store
                .add_base_plan(BasePlanDraft {
                    id,
                    user_id: self.user_id,
                    source,
                    payload: payload.into_value(),
                })
                .await
                .map(|plan| plan.id),
            PlanKind::Daily => {
                let base_plan_id = request
                    .base_plan
                    .as_ref()
                    .map(|b| b.id)
                    .ok_or(GenerationError::MissingBasePlan {
                        user_id: self.user_id,
                    })?;
                store
                    .add_daily_plan(DailyPlanDraft {
                        id,
                        user_id: self.user_id,
                        base_plan_id,
                        plan_date: request.plan_date,
                        source,
                        payload: payload.into_value(),
                    })
                    .await
                    .map(|plan| plan.id)
            }
        };
        stored.map_err(|e| GenerationError::persistence(&e))
    }

    async fn finish_ready(
        &self,
        plan_id: Uuid,
        fallback_for: Option<GenerationError>,
    ) -> GenerationOutcome {
        if !self.is_mounted() {
            tracing::info!(
                user_id = %self.user_id,
                kind = %self.kind,
                plan_id = %plan_id,
                "plan stored after session unmounted"
            );
            return GenerationOutcome::Detached {
                plan_id: Some(plan_id),
            };
        }
        self.show_ready(plan_id).await;
        match fallback_for {
            None => GenerationOutcome::Ready { plan_id },
            Some(error) => GenerationOutcome::FellBack { plan_id, error },
        }
    }

    fn finish_failed(&self, error: GenerationError) -> GenerationOutcome {
        if !self.is_mounted() {
            return GenerationOutcome::Detached { plan_id: None };
        }
        self.show_failure(&error);
        GenerationOutcome::Failed(error)
    }

    async fn show_ready(&self, plan_id: Uuid) {
        let job = self.update_job(|job| job.status = GenerationStatus::Ready);
        self.notify(&job);
        self.navigate(&self.route_for(plan_id)).await;
    }

    fn show_failure(&self, error: &GenerationError) {
        let job = self.update_job(|job| job.status = GenerationStatus::Error);
        self.notify(&job);
        self.presenter.alert(Alert::generation_failed(
            error,
            &self.orchestrator.config.on_failure_route,
        ));
    }

    fn log_attempt(
        &self,
        attempt: u32,
        error: Option<&GenerationError>,
        elapsed: Duration,
        used_fallback: bool,
    ) {
        self.orchestrator
            .diagnostics
            .log_plan_generation_attempt(GenerationAttempt {
                user_id: self.user_id,
                kind: self.kind,
                success: error.is_none(),
                attempt,
                error_stage: error.map(GenerationError::stage_label),
                error: error.map(ToString::to_string),
                elapsed,
                used_fallback,
            });
    }

    /// Best-effort write of the persisted job state.
    async fn record_job_state(
        &self,
        status: GenerationStatus,
        attempt: u32,
        last_error: Option<&str>,
    ) {
        if let Err(e) = self
            .orchestrator
            .store
            .record_job_state(self.user_id, self.kind, status, attempt, last_error)
            .await
        {
            tracing::warn!(
                user_id = %self.user_id,
                kind = %self.kind,
                error = %e,
                "failed to record generation job state"
            );
        }
    }
}
