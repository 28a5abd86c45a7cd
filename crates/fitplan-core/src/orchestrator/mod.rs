//! Plan-generation orchestrator.
//!
//! One [`GenerationOrchestrator`] per process holds the collaborators and the
//! [`JobRegistry`]. Each screen (or CLI invocation) opens a
//! [`GenerationSession`] that drives a single `(user, kind)` generation to a
//! plan, a fallback plan, or one failure alert.

mod session;

use std::sync::Arc;
use std::time::Duration;

use fitplan_db::models::{PlanKind, PlanSource};
use uuid::Uuid;

use crate::diagnostics::Diagnostics;
use crate::error::GenerationError;
use crate::generator::PlanGenerator;
use crate::navigation::{Navigator, Route};
use crate::presenter::Presenter;
use crate::registry::{JobRegistry, JobResolution};
use crate::retry::{RetryPolicy, RetryRejected};
use crate::store::PlanStore;

pub use session::GenerationSession;

pub const DEFAULT_SLOW_RESPONSE_AFTER: Duration = Duration::from_secs(45);
pub const DEFAULT_SLOW_RESPONSE_MESSAGE: &str =
    "This is taking longer than usual. Hang tight, your plan is still being built.";

/// Knobs that distinguish the product's generation flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Build a local plan instead of failing when generation fails.
    pub allow_fallback: bool,
    /// Minimum spacing between user-triggered retries.
    pub min_retry_interval: Duration,
    /// Where "Go Home"/"Go Back" leads after a failure.
    pub on_failure_route: Route,
    /// When the reassurance message appears.
    pub slow_response_after: Duration,
    pub slow_response_message: String,
    /// Elapsed-time ticker period.
    pub tick_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            allow_fallback: false,
            min_retry_interval: RetryPolicy::DEFAULT_MIN_INTERVAL,
            on_failure_route: Route::Home,
            slow_response_after: DEFAULT_SLOW_RESPONSE_AFTER,
            slow_response_message: DEFAULT_SLOW_RESPONSE_MESSAGE.to_string(),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl OrchestratorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.min_retry_interval)
    }
}

/// How a call to [`GenerationSession::generate_plan`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// A plan already existed; the user was sent to it.
    Existing { route: Route },
    /// A required input is missing; the user was offered a redirect.
    PreconditionFailed(GenerationError),
    /// This session is already generating.
    AlreadyRunning,
    /// A new plan was generated and stored.
    Ready { plan_id: Uuid },
    /// Generation failed and a fallback plan was stored instead.
    FellBack {
        plan_id: Uuid,
        error: GenerationError,
    },
    /// Another session ran the job; this one reflected its result.
    Joined(JobResolution),
    /// Generation failed; the failure alert was shown.
    Failed(GenerationError),
    /// The session unmounted before the job finished. Any plan was still
    /// stored; nothing was shown.
    Detached { plan_id: Option<Uuid> },
}

impl GenerationOutcome {
    /// Id of the plan the user ends up on, if any.
    pub fn plan_id(&self) -> Option<Uuid> {
        match self {
            Self::Ready { plan_id } | Self::FellBack { plan_id, .. } => Some(*plan_id),
            Self::Existing {
                route: Route::BasePlan { plan_id } | Route::DailyPlan { plan_id },
            } => Some(*plan_id),
            Self::Joined(JobResolution::Ready { plan_id, .. }) => Some(*plan_id),
            Self::Detached { plan_id } => *plan_id,
            _ => None,
        }
    }

    pub fn source(&self) -> Option<PlanSource> {
        match self {
            Self::Ready { .. } => Some(PlanSource::Generated),
            Self::FellBack { .. } => Some(PlanSource::Fallback),
            Self::Joined(JobResolution::Ready { source, .. }) => Some(*source),
            _ => None,
        }
    }
}

/// How a retry request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Too soon; a wait alert was shown.
    Rejected(RetryRejected),
    /// A generation is still running in this session.
    Busy,
    /// The last run did not fail; there is nothing to retry.
    NotFailed,
    Accepted(GenerationOutcome),
}

/// Shared collaborators and configuration for generation sessions.
pub struct GenerationOrchestrator {
    store: Arc<dyn PlanStore>,
    generator: Arc<dyn PlanGenerator>,
    navigator: Arc<dyn Navigator>,
    diagnostics: Arc<dyn Diagnostics>,
    registry: JobRegistry,
    config: OrchestratorConfig,
}

impl GenerationOrchestrator {
    pub fn new(
        store: Arc<dyn PlanStore>,
        generator: Arc<dyn PlanGenerator>,
        navigator: Arc<dyn Navigator>,
        diagnostics: Arc<dyn Diagnostics>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            generator,
            navigator,
            diagnostics,
            registry: JobRegistry::new(),
            config,
        }
    }

    /// Share an existing registry, e.g. between orchestrators built with
    /// different configs.
    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn PlanStore> {
        &self.store
    }

    /// Open a session for one user and plan kind.
    pub fn session(
        self: &Arc<Self>,
        user_id: Uuid,
        kind: PlanKind,
        presenter: Arc<dyn Presenter>,
    ) -> GenerationSession {
        GenerationSession::new(Arc::clone(self), user_id, kind, presenter)
    }
}
