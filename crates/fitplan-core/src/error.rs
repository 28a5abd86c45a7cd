//! Error taxonomy for plan generation.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::navigation::Route;

/// Where in the remote round-trip a generation attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    /// The request never got a response (connect, timeout, TLS).
    Request,
    /// The service answered with a non-success status.
    Status,
    /// The response body could not be read or had no content.
    Response,
    /// The content was not valid JSON.
    Parse,
    /// The JSON did not have the shape of a plan.
    Validation,
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Request => "request",
            Self::Status => "status",
            Self::Response => "response",
            Self::Parse => "parse",
            Self::Validation => "validation",
        };
        f.write_str(s)
    }
}

/// Failure reported by a [`crate::generator::PlanGenerator`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("plan generation failed at {stage} stage: {details}")]
pub struct RemoteGenerationError {
    pub stage: GenerationStage,
    pub details: String,
}

impl RemoteGenerationError {
    pub fn new(stage: GenerationStage, details: impl Into<String>) -> Self {
        Self {
            stage,
            details: details.into(),
        }
    }
}

/// Everything that can stop a session from landing on a plan.
///
/// Cloneable so a single failure can be handed to every session that
/// joined the same in-flight job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("no profile found for user {user_id}; finish onboarding first")]
    MissingUser { user_id: Uuid },

    #[error("no check-in recorded for {date}; check in before generating today's plan")]
    MissingCheckin { date: NaiveDate },

    #[error("no base plan found for user {user_id}; generate a base plan first")]
    MissingBasePlan { user_id: Uuid },

    #[error(transparent)]
    Remote(#[from] RemoteGenerationError),

    #[error("failed to save plan: {0}")]
    Persistence(String),

    #[error("the in-flight generation ended without a result")]
    Abandoned,
}

impl GenerationError {
    /// Wrap a store failure, keeping the whole context chain.
    pub fn persistence(err: &anyhow::Error) -> Self {
        Self::Persistence(format!("{err:#}"))
    }

    /// `true` for missing inputs the user has to supply elsewhere.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingUser { .. } | Self::MissingCheckin { .. } | Self::MissingBasePlan { .. }
        )
    }

    /// Route that resolves a failed precondition.
    pub fn redirect_route(&self) -> Option<Route> {
        match self {
            Self::MissingUser { .. } | Self::MissingBasePlan { .. } => Some(Route::Onboarding),
            Self::MissingCheckin { .. } => Some(Route::CheckIn),
            _ => None,
        }
    }

    /// Short label recorded in diagnostics.
    pub fn stage_label(&self) -> String {
        match self {
            Self::MissingUser { .. } | Self::MissingCheckin { .. } | Self::MissingBasePlan { .. } => {
                "precondition".to_string()
            }
            Self::Remote(remote) => remote.stage.to_string(),
            Self::Persistence(_) => "persistence".to_string(),
            Self::Abandoned => "abandoned".to_string(),
        }
    }
}
