//! Plan-generation orchestration for the fitplan coaching backend.
//!
//! The [`orchestrator`] drives one remote generation call per user and plan
//! kind to completion or to a user-facing failure, persists the result
//! through a [`store::PlanStore`], and lands the user on the next route via a
//! [`navigation::Navigator`]. Everything the orchestrator talks to is a trait
//! so hosts (the CLI, tests) can plug in their own implementations.

pub mod diagnostics;
pub mod error;
pub mod generator;
pub mod job;
pub mod navigation;
pub mod orchestrator;
pub mod plan;
pub mod presenter;
pub mod registry;
pub mod retry;
pub mod store;

pub use error::{GenerationError, GenerationStage, RemoteGenerationError};
pub use job::GenerationJob;
pub use orchestrator::{
    GenerationOrchestrator, GenerationOutcome, GenerationSession, OrchestratorConfig,
    RetryOutcome,
};
