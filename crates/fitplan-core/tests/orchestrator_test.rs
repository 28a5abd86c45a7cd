//! Integration tests for the generation orchestrator.
//!
//! Every collaborator is an in-process fake: `MemoryStore` for persistence
//! and recording fakes for the generator, navigator, presenter and
//! diagnostics. The generator can be gated on a semaphore so tests can
//! observe a job while it is in flight.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use fitplan_db::models::{
    BasePlan, CheckIn, DailyPlan, ExperienceLevel, FitnessGoal, GenerationStatus, PlanKind,
    PlanSource, Sex, UserProfile,
};

use fitplan_core::diagnostics::{Diagnostics, GenerationAttempt};
use fitplan_core::error::{GenerationError, GenerationStage, RemoteGenerationError};
use fitplan_core::generator::{GenerationRequest, PlanGenerator};
use fitplan_core::job::GenerationJob;
use fitplan_core::navigation::{Navigator, Route};
use fitplan_core::plan::PlanPayload;
use fitplan_core::presenter::{Alert, AlertActionKind, AlertKind, Presenter};
use fitplan_core::registry::JobResolution;
use fitplan_core::store::{MemoryStore, PlanStore};
use fitplan_core::{
    GenerationOrchestrator, GenerationOutcome, GenerationSession, OrchestratorConfig,
    RetryOutcome,
};

// ===========================================================================
// Test harness
// ===========================================================================

fn sample_plan() -> PlanPayload {
    PlanPayload::from_value(json!({
        "days": {"monday": {"focus": "Upper body", "workout": []}},
        "nutrition": {"calories": 2200},
    }))
    .unwrap()
}

fn status_error() -> RemoteGenerationError {
    RemoteGenerationError::new(GenerationStage::Status, "HTTP 503 Service Unavailable")
}

/// Generator that replays scripted results and counts calls.
#[derive(Default)]
struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<PlanPayload, RemoteGenerationError>>>,
    calls: AtomicUsize,
    started: Notify,
    gate: Option<Semaphore>,
}

impl ScriptedGenerator {
    fn replying(responses: Vec<Result<PlanPayload, RemoteGenerationError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Each call waits for a permit from [`ScriptedGenerator::release`].
    fn gated(responses: Vec<Result<PlanPayload, RemoteGenerationError>>) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::replying(responses)
        }
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<PlanPayload, RemoteGenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(sample_plan()))
    }
}

#[derive(Default)]
struct RecordingNavigator {
    calls: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn push(&self, route: &Route) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("push {route}"));
        Ok(())
    }

    async fn replace(&self, route: &Route) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("replace {route}"));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPresenter {
    jobs: Mutex<Vec<GenerationJob>>,
    slow: Mutex<Vec<String>>,
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingPresenter {
    fn jobs(&self) -> Vec<GenerationJob> {
        self.jobs.lock().unwrap().clone()
    }

    fn slow(&self) -> Vec<String> {
        self.slow.lock().unwrap().clone()
    }

    fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Presenter for RecordingPresenter {
    fn job_updated(&self, job: &GenerationJob) {
        self.jobs.lock().unwrap().push(job.clone());
    }

    fn slow_response(&self, message: &str) {
        self.slow.lock().unwrap().push(message.to_string());
    }

    fn alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

#[derive(Default)]
struct RecordingDiagnostics {
    attempts: Mutex<Vec<GenerationAttempt>>,
}

impl RecordingDiagnostics {
    fn attempts(&self) -> Vec<GenerationAttempt> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn log_plan_generation_attempt(&self, attempt: GenerationAttempt) {
        self.attempts.lock().unwrap().push(attempt);
    }
}

/// One user, a memory store and recording collaborators.
struct TestHarness {
    user_id: Uuid,
    store: Arc<MemoryStore>,
    generator: Arc<ScriptedGenerator>,
    navigator: Arc<RecordingNavigator>,
    diagnostics: Arc<RecordingDiagnostics>,
    orchestrator: Arc<GenerationOrchestrator>,
}

impl TestHarness {
    fn new(generator: ScriptedGenerator) -> Self {
        Self::with_config(generator, OrchestratorConfig::default())
    }

    fn with_config(generator: ScriptedGenerator, config: OrchestratorConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(generator);
        let navigator = Arc::new(RecordingNavigator::default());
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            store.clone(),
            generator.clone(),
            navigator.clone(),
            diagnostics.clone(),
            config,
        ));
        Self {
            user_id: Uuid::new_v4(),
            store,
            generator,
            navigator,
            diagnostics,
            orchestrator,
        }
    }

    /// A harness whose user has finished onboarding.
    fn onboarded(generator: ScriptedGenerator) -> Self {
        let harness = Self::new(generator);
        harness.add_profile();
        harness
    }

    fn session(&self, kind: PlanKind) -> (GenerationSession, Arc<RecordingPresenter>) {
        let presenter = Arc::new(RecordingPresenter::default());
        let session = self
            .orchestrator
            .session(self.user_id, kind, presenter.clone());
        (session, presenter)
    }

    fn add_profile(&self) {
        self.store.put_profile(UserProfile {
            user_id: self.user_id,
            display_name: "Jordan".into(),
            age: 29,
            sex: Sex::Male,
            height_cm: 180.0,
            weight_kg: 78.0,
            goal: FitnessGoal::BuildMuscle,
            experience: ExperienceLevel::Intermediate,
            equipment: vec!["dumbbells".into()],
            training_days_per_week: 4,
            updated_at: Utc::now(),
        });
    }

    fn add_today_checkin(&self, energy: i32) {
        self.store.put_checkin(CheckIn {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            checkin_date: Utc::now().date_naive(),
            energy,
            stress: 4,
            mood: 7,
            sleep_hours: Some(7.5),
            soreness: None,
            notes: None,
            created_at: Utc::now(),
        });
    }

    fn add_base_plan(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.store.put_base_plan(BasePlan {
            id,
            user_id: self.user_id,
            source: PlanSource::Generated,
            payload: sample_plan().into_value(),
            created_at: Utc::now(),
        });
        id
    }
}

/// Yield until `check` holds, failing after a generous real-time bound.
async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached");
}

fn alert_labels(alert: &Alert) -> Vec<String> {
    alert.actions.iter().map(|a| a.label.clone()).collect()
}

// ===========================================================================
// Preconditions
// ===========================================================================

#[tokio::test]
async fn existing_base_plan_skips_generation() {
    let harness = TestHarness::onboarded(ScriptedGenerator::default());
    let plan_id = harness.add_base_plan();
    let (session, presenter) = harness.session(PlanKind::Base);

    let outcome = session.generate_plan().await;

    assert_eq!(
        outcome,
        GenerationOutcome::Existing {
            route: Route::BasePlan { plan_id }
        }
    );
    assert_eq!(harness.generator.calls(), 0);
    assert_eq!(harness.navigator.calls(), [format!("push base-plan/{plan_id}")]);
    assert!(presenter.alerts().is_empty());
}

#[tokio::test]
async fn existing_daily_plan_skips_generation_unless_forced() {
    let harness = TestHarness::onboarded(ScriptedGenerator::default());
    let base_id = harness.add_base_plan();
    harness.add_today_checkin(7);
    let daily_id = Uuid::new_v4();
    harness.store.put_daily_plan(DailyPlan {
        id: daily_id,
        user_id: harness.user_id,
        base_plan_id: base_id,
        plan_date: Utc::now().date_naive(),
        source: PlanSource::Generated,
        payload: sample_plan().into_value(),
        created_at: Utc::now(),
    });

    let (session, _) = harness.session(PlanKind::Daily);
    assert_eq!(
        session.generate_plan().await,
        GenerationOutcome::Existing {
            route: Route::DailyPlan { plan_id: daily_id }
        }
    );
    assert_eq!(harness.generator.calls(), 0);

    let (forced, _) = harness.session(PlanKind::Daily);
    let outcome = forced.with_force_regen(true).generate_plan().await;
    assert!(matches!(outcome, GenerationOutcome::Ready { .. }));
    assert_eq!(harness.generator.calls(), 1);
    assert_eq!(harness.store.daily_plans(harness.user_id).len(), 2);
}

#[tokio::test]
async fn missing_profile_redirects_to_onboarding() {
    let harness = TestHarness::new(ScriptedGenerator::default());
    let (session, presenter) = harness.session(PlanKind::Base);

    let outcome = session.generate_plan().await;

    assert_eq!(
        outcome,
        GenerationOutcome::PreconditionFailed(GenerationError::MissingUser {
            user_id: harness.user_id
        })
    );
    assert_eq!(harness.generator.calls(), 0);
    let alerts = presenter.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::MissingPrecondition);
    assert_eq!(alerts[0].actions.len(), 1);
    assert_eq!(
        alerts[0].actions[0].kind,
        AlertActionKind::Redirect(Route::Onboarding)
    );

    session
        .handle_alert_action(&alerts[0].actions[0].kind)
        .await;
    assert_eq!(harness.navigator.calls(), ["push onboarding"]);
}

#[tokio::test]
async fn daily_plan_requires_todays_checkin() {
    let harness = TestHarness::onboarded(ScriptedGenerator::default());
    harness.add_base_plan();
    let (session, presenter) = harness.session(PlanKind::Daily);

    let outcome = session.generate_plan().await;

    assert!(matches!(
        outcome,
        GenerationOutcome::PreconditionFailed(GenerationError::MissingCheckin { .. })
    ));
    assert_eq!(harness.generator.calls(), 0);
    assert_eq!(
        presenter.alerts()[0].actions[0].kind,
        AlertActionKind::Redirect(Route::CheckIn)
    );
}

#[tokio::test]
async fn daily_plan_requires_base_plan() {
    let harness = TestHarness::onboarded(ScriptedGenerator::default());
    harness.add_today_checkin(6);
    let (session, _) = harness.session(PlanKind::Daily);

    let outcome = session.generate_plan().await;

    assert_eq!(
        outcome,
        GenerationOutcome::PreconditionFailed(GenerationError::MissingBasePlan {
            user_id: harness.user_id
        })
    );
    assert_eq!(harness.generator.calls(), 0);
}

// ===========================================================================
// Success
// ===========================================================================

#[tokio::test]
async fn base_generation_persists_then_navigates() {
    let harness = TestHarness::onboarded(ScriptedGenerator::default());
    let (session, presenter) = harness.session(PlanKind::Base);

    let outcome = session.generate_plan().await;

    let GenerationOutcome::Ready { plan_id } = outcome else {
        panic!("expected a generated plan");
    };
    let stored = harness.store.base_plans(harness.user_id);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, plan_id);
    assert_eq!(stored[0].source, PlanSource::Generated);
    assert_eq!(harness.navigator.calls(), [format!("push base-plan/{plan_id}")]);

    assert_eq!(session.job().status, GenerationStatus::Ready);
    assert_eq!(
        presenter.jobs().last().map(|j| j.status),
        Some(GenerationStatus::Ready)
    );
    assert!(presenter.alerts().is_empty());

    let attempts = harness.diagnostics.attempts();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].success);
    assert_eq!(attempts[0].attempt, 1);

    let job_state = harness
        .store
        .get_job_state(harness.user_id, PlanKind::Base)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job_state.status, GenerationStatus::Ready);
    assert!(harness.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn daily_generation_references_current_base_plan() {
    let harness = TestHarness::onboarded(ScriptedGenerator::default());
    let base_id = harness.add_base_plan();
    harness.add_today_checkin(8);
    let (session, _) = harness.session(PlanKind::Daily);

    let outcome = session.generate_plan().await;

    let plan_id = outcome.plan_id().expect("plan id");
    let daily = harness.store.daily_plans(harness.user_id);
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].id, plan_id);
    assert_eq!(daily[0].base_plan_id, base_id);
    assert_eq!(daily[0].plan_date, Utc::now().date_naive());
    assert_eq!(harness.navigator.calls(), [format!("push daily-plan/{plan_id}")]);
}

// ===========================================================================
// Single flight
// ===========================================================================

#[tokio::test]
async fn rapid_double_invocation_calls_generator_once() {
    let harness = TestHarness::onboarded(ScriptedGenerator::gated(vec![]));
    let (session, _) = harness.session(PlanKind::Base);

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.generate_plan().await }
    });
    harness.generator.started.notified().await;

    assert_eq!(session.generate_plan().await, GenerationOutcome::AlreadyRunning);

    harness.generator.release();
    let outcome = first.await.unwrap();
    assert!(matches!(outcome, GenerationOutcome::Ready { .. }));
    assert_eq!(harness.generator.calls(), 1);
    assert_eq!(harness.store.base_plans(harness.user_id).len(), 1);
}

#[tokio::test]
async fn second_session_joins_in_flight_job() {
    let harness = TestHarness::onboarded(ScriptedGenerator::gated(vec![]));
    let (leader, _) = harness.session(PlanKind::Base);
    let (follower, follower_presenter) = harness.session(PlanKind::Base);

    let leader_task = tokio::spawn(async move { leader.generate_plan().await });
    harness.generator.started.notified().await;

    let follower_task = tokio::spawn({
        let follower = follower.clone();
        async move { follower.generate_plan().await }
    });
    // The follower reports pending once it has joined.
    eventually(|| !follower_presenter.jobs().is_empty()).await;

    harness.generator.release();
    let leader_outcome = leader_task.await.unwrap();
    let follower_outcome = follower_task.await.unwrap();

    let GenerationOutcome::Ready { plan_id } = leader_outcome else {
        panic!("expected the leader to generate a plan");
    };
    assert_eq!(
        follower_outcome,
        GenerationOutcome::Joined(JobResolution::Ready {
            plan_id,
            source: PlanSource::Generated
        })
    );
    assert_eq!(harness.generator.calls(), 1);
    assert_eq!(harness.store.base_plans(harness.user_id).len(), 1);
    assert_eq!(follower.job().status, GenerationStatus::Ready);
    assert_eq!(harness.navigator.calls().len(), 2);
}

#[tokio::test]
async fn follower_shares_leader_failure() {
    let harness = TestHarness::onboarded(ScriptedGenerator::gated(vec![Err(status_error())]));
    let (leader, leader_presenter) = harness.session(PlanKind::Base);
    let (follower, follower_presenter) = harness.session(PlanKind::Base);

    let leader_task = tokio::spawn(async move { leader.generate_plan().await });
    harness.generator.started.notified().await;
    let follower_task = tokio::spawn(async move { follower.generate_plan().await });
    eventually(|| !follower_presenter.jobs().is_empty()).await;

    harness.generator.release();
    let error = GenerationError::Remote(status_error());
    assert_eq!(
        leader_task.await.unwrap(),
        GenerationOutcome::Failed(error.clone())
    );
    assert_eq!(
        follower_task.await.unwrap(),
        GenerationOutcome::Joined(JobResolution::Failed(error))
    );
    assert_eq!(leader_presenter.alerts().len(), 1);
    assert_eq!(follower_presenter.alerts().len(), 1);
    assert_eq!(harness.generator.calls(), 1);
}

// ===========================================================================
// Failure and retry
// ===========================================================================

#[tokio::test]
async fn failure_shows_one_alert_and_try_again_reenters() {
    let harness = TestHarness::onboarded(ScriptedGenerator::replying(vec![Err(status_error())]));
    let (session, presenter) = harness.session(PlanKind::Base);

    let outcome = session.generate_plan().await;

    assert_eq!(
        outcome,
        GenerationOutcome::Failed(GenerationError::Remote(status_error()))
    );
    assert_eq!(session.job().status, GenerationStatus::Error);
    let alerts = presenter.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alert_labels(&alerts[0]), ["Go Home", "Try Again"]);
    assert!(harness.navigator.calls().is_empty());

    let attempts = harness.diagnostics.attempts();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].success);
    assert_eq!(attempts[0].error_stage.as_deref(), Some("status"));
    let job_state = harness
        .store
        .get_job_state(harness.user_id, PlanKind::Base)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job_state.status, GenerationStatus::Error);
    assert_eq!(job_state.attempt, 1);

    let updates_before = presenter.jobs().len();
    let try_again = alerts[0].action("Try Again").unwrap().kind.clone();
    let retry = session.handle_alert_action(&try_again).await;

    let Some(RetryOutcome::Accepted(GenerationOutcome::Ready { .. })) = retry else {
        panic!("expected an accepted retry that reached a plan");
    };
    let first_retry_update = &presenter.jobs()[updates_before];
    assert_eq!(first_retry_update.status, GenerationStatus::Pending);
    assert_eq!(first_retry_update.retry_count, 1);
    assert_eq!(session.job().retry_count, 1);
    assert_eq!(harness.generator.calls(), 2);
    assert_eq!(presenter.alerts().len(), 1);
    assert_eq!(harness.diagnostics.attempts()[1].attempt, 2);
}

#[tokio::test(start_paused = true)]
async fn retry_inside_min_interval_is_rejected() {
    let failures = (0..5).map(|_| Err(status_error())).collect();
    let harness = TestHarness::onboarded(ScriptedGenerator::replying(failures));
    let (session, presenter) = harness.session(PlanKind::Base);

    assert!(matches!(
        session.generate_plan().await,
        GenerationOutcome::Failed(_)
    ));
    assert!(matches!(
        session.handle_retry().await,
        RetryOutcome::Accepted(GenerationOutcome::Failed(_))
    ));
    assert_eq!(harness.generator.calls(), 2);

    tokio::time::advance(Duration::from_millis(10_400)).await;
    let RetryOutcome::Rejected(rejected) = session.handle_retry().await else {
        panic!("expected rejection");
    };
    assert_eq!(rejected.remaining_secs(), 20);
    assert_eq!(harness.generator.calls(), 2);
    assert_eq!(session.job().retry_count, 1);
    let last_alert = presenter.alerts().pop().unwrap();
    assert_eq!(last_alert.kind, AlertKind::RetryTooSoon);
    assert_eq!(last_alert.message, "Please wait 20 seconds before trying again.");

    tokio::time::advance(Duration::from_secs(20)).await;
    assert!(matches!(
        session.handle_retry().await,
        RetryOutcome::Accepted(_)
    ));
    assert_eq!(harness.generator.calls(), 3);
}

#[tokio::test]
async fn go_home_uses_configured_failure_route() {
    let config = OrchestratorConfig {
        on_failure_route: Route::Named("dashboard".into()),
        ..OrchestratorConfig::default()
    };
    let harness =
        TestHarness::with_config(ScriptedGenerator::replying(vec![Err(status_error())]), config);
    harness.add_profile();
    let (session, presenter) = harness.session(PlanKind::Base);

    session.generate_plan().await;
    let alert = presenter.alerts().pop().unwrap();
    assert_eq!(alert_labels(&alert), ["Go Back", "Try Again"]);

    let outcome = session.handle_alert_action(&alert.actions[0].kind).await;
    assert!(outcome.is_none());
    assert_eq!(harness.navigator.calls(), ["push dashboard"]);
}

#[tokio::test]
async fn persistence_failure_is_reported_like_generation_failure() {
    let harness = TestHarness::onboarded(ScriptedGenerator::default());
    harness.store.set_fail_writes(true);
    let (session, presenter) = harness.session(PlanKind::Base);

    let outcome = session.generate_plan().await;

    assert!(matches!(
        outcome,
        GenerationOutcome::Failed(GenerationError::Persistence(_))
    ));
    assert_eq!(presenter.alerts().len(), 1);
    assert_eq!(
        harness.diagnostics.attempts()[0].error_stage.as_deref(),
        Some("persistence")
    );
    assert!(harness.navigator.calls().is_empty());
}

#[tokio::test]
async fn store_read_failure_is_logged_and_retryable() {
    let harness = TestHarness::onboarded(ScriptedGenerator::default());
    harness.store.set_fail_reads(true);
    let (session, presenter) = harness.session(PlanKind::Base);

    let outcome = session.generate_plan().await;

    assert!(matches!(
        outcome,
        GenerationOutcome::Failed(GenerationError::Persistence(_))
    ));
    assert_eq!(harness.generator.calls(), 0);
    let alerts = presenter.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alert_labels(&alerts[0]), ["Go Home", "Try Again"]);

    let attempts = harness.diagnostics.attempts();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].success);
    assert!(!attempts[0].used_fallback);
    assert_eq!(attempts[0].attempt, 1);
    assert_eq!(attempts[0].error_stage.as_deref(), Some("persistence"));
    let job_state = harness
        .store
        .get_job_state(harness.user_id, PlanKind::Base)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job_state.status, GenerationStatus::Error);
    assert_eq!(job_state.attempt, 1);
    assert!(job_state.last_error.unwrap().contains("failed to read"));

    harness.store.set_fail_reads(false);
    assert!(matches!(
        session.handle_retry().await,
        RetryOutcome::Accepted(GenerationOutcome::Ready { .. })
    ));
    assert_eq!(harness.generator.calls(), 1);
}

#[tokio::test]
async fn retry_without_a_failure_does_nothing() {
    let harness = TestHarness::onboarded(ScriptedGenerator::default());
    let (session, presenter) = harness.session(PlanKind::Base);

    assert_eq!(session.handle_retry().await, RetryOutcome::NotFailed);
    assert_eq!(harness.generator.calls(), 0);

    assert!(matches!(
        session.generate_plan().await,
        GenerationOutcome::Ready { .. }
    ));
    assert_eq!(session.handle_retry().await, RetryOutcome::NotFailed);
    assert_eq!(harness.generator.calls(), 1);
    assert_eq!(session.job().retry_count, 0);
    assert_eq!(session.job().status, GenerationStatus::Ready);
    assert!(presenter.alerts().is_empty());
    assert_eq!(harness.store.base_plans(harness.user_id).len(), 1);
}

#[tokio::test]
async fn concurrent_retries_accept_once() {
    let harness = TestHarness::onboarded(ScriptedGenerator::replying(vec![Err(status_error())]));
    let (session, _presenter) = harness.session(PlanKind::Base);
    assert!(matches!(
        session.generate_plan().await,
        GenerationOutcome::Failed(_)
    ));

    let (first, second) = tokio::join!(session.handle_retry(), session.handle_retry());

    let accepted = [&first, &second]
        .iter()
        .filter(|outcome| matches!(outcome, RetryOutcome::Accepted(_)))
        .count();
    assert_eq!(accepted, 1);
    assert!([&first, &second]
        .iter()
        .all(|outcome| matches!(
            outcome,
            RetryOutcome::Accepted(_) | RetryOutcome::Busy | RetryOutcome::NotFailed
        )));
    assert_eq!(harness.generator.calls(), 2);
    assert_eq!(session.job().retry_count, 1);
}

// ===========================================================================
// Fallback
// ===========================================================================

fn fallback_config() -> OrchestratorConfig {
    OrchestratorConfig {
        allow_fallback: true,
        ..OrchestratorConfig::default()
    }
}

#[tokio::test]
async fn failure_with_fallback_stores_local_plan() {
    let generator = ScriptedGenerator::replying(vec![Err(status_error()), Err(status_error())]);
    let harness = TestHarness::with_config(generator, fallback_config());
    harness.add_profile();

    let (session, presenter) = harness.session(PlanKind::Base);
    let outcome = session.generate_plan().await;

    let GenerationOutcome::FellBack { plan_id, error } = outcome else {
        panic!("expected a fallback plan");
    };
    assert_eq!(error, GenerationError::Remote(status_error()));
    assert!(presenter.alerts().is_empty());
    assert_eq!(harness.navigator.calls(), [format!("push base-plan/{plan_id}")]);
    let attempts = harness.diagnostics.attempts();
    assert!(attempts[0].used_fallback);
    assert!(!attempts[0].success);

    // A forced second run yields the same payload under a new id.
    let (again, _) = harness.session(PlanKind::Base);
    let second = again.with_force_regen(true).generate_plan().await;
    assert_eq!(second.source(), Some(PlanSource::Fallback));

    let stored = harness.store.base_plans(harness.user_id);
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|p| p.source == PlanSource::Fallback));
    assert_ne!(stored[0].id, stored[1].id);
    assert_eq!(
        serde_json::to_string(&stored[0].payload).unwrap(),
        serde_json::to_string(&stored[1].payload).unwrap()
    );
}

#[tokio::test]
async fn fallback_that_cannot_be_stored_fails_normally() {
    let generator = ScriptedGenerator::replying(vec![Err(status_error())]);
    let harness = TestHarness::with_config(generator, fallback_config());
    harness.add_profile();
    harness.store.set_fail_writes(true);

    let (session, presenter) = harness.session(PlanKind::Base);
    let outcome = session.generate_plan().await;

    assert_eq!(
        outcome,
        GenerationOutcome::Failed(GenerationError::Remote(status_error()))
    );
    assert_eq!(presenter.alerts().len(), 1);
}

// ===========================================================================
// Unmount and timers
// ===========================================================================

#[tokio::test]
async fn resolution_after_unmount_persists_silently() {
    let harness = TestHarness::onboarded(ScriptedGenerator::gated(vec![]));
    let (session, presenter) = harness.session(PlanKind::Base);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.generate_plan().await }
    });
    harness.generator.started.notified().await;
    session.unmount();
    let updates_at_unmount = presenter.jobs().len();

    harness.generator.release();
    let outcome = task.await.unwrap();

    let GenerationOutcome::Detached {
        plan_id: Some(plan_id),
    } = outcome
    else {
        panic!("expected a detached outcome with a stored plan");
    };
    let stored = harness.store.base_plans(harness.user_id);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, plan_id);
    assert!(harness.navigator.calls().is_empty());
    assert_eq!(presenter.jobs().len(), updates_at_unmount);
    assert!(presenter.alerts().is_empty());
    assert!(harness.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn failure_after_unmount_shows_nothing() {
    let harness = TestHarness::onboarded(ScriptedGenerator::gated(vec![Err(status_error())]));
    let (session, presenter) = harness.session(PlanKind::Base);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.generate_plan().await }
    });
    harness.generator.started.notified().await;
    session.unmount();
    harness.generator.release();

    assert_eq!(
        task.await.unwrap(),
        GenerationOutcome::Detached { plan_id: None }
    );
    assert!(presenter.alerts().is_empty());
    let job_state = harness
        .store
        .get_job_state(harness.user_id, PlanKind::Base)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job_state.status, GenerationStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn slow_generation_ticks_and_reassures_once() {
    let harness = TestHarness::onboarded(ScriptedGenerator::gated(vec![]));
    let (session, presenter) = harness.session(PlanKind::Base);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.generate_plan().await }
    });
    harness.generator.started.notified().await;

    tokio::time::sleep(Duration::from_secs(50)).await;
    assert_eq!(presenter.slow().len(), 1);
    assert!(session.job().elapsed_seconds >= 45);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(presenter.slow().len(), 1);

    harness.generator.release();
    assert!(matches!(
        task.await.unwrap(),
        GenerationOutcome::Ready { .. }
    ));
}
