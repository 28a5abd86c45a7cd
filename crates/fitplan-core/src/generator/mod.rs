//! The `PlanGenerator` trait: the adapter interface for remote plan
//! generation services.

pub mod openai;

use async_trait::async_trait;
use chrono::NaiveDate;
use fitplan_db::models::{BasePlan, CheckIn, PlanKind, UserProfile};

use crate::error::RemoteGenerationError;
use crate::plan::PlanPayload;

pub use openai::{OpenAiConfig, OpenAiGenerator};

/// Everything a generator needs to write a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub kind: PlanKind,
    pub profile: UserProfile,
    /// Latest check-in. Always today's for daily plans.
    pub checkin: Option<CheckIn>,
    /// The plan a daily plan adapts. `None` for base plans.
    pub base_plan: Option<BasePlan>,
    pub plan_date: NaiveDate,
}

/// A remote service that turns a [`GenerationRequest`] into a plan.
///
/// Implementations must return a validated [`PlanPayload`] or an error
/// tagged with the stage that failed.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// Human-readable name for logs (e.g. "openai").
    fn name(&self) -> &str;

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<PlanPayload, RemoteGenerationError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PlanGenerator) {}
};
