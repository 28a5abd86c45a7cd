//! What the orchestrator shows the user.

use crate::error::GenerationError;
use crate::job::GenerationJob;
use crate::navigation::Route;
use crate::retry::RetryRejected;

/// Why an alert was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    MissingPrecondition,
    GenerationFailed,
    RetryTooSoon,
}

/// What choosing an alert action does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertActionKind {
    TryAgain,
    /// Leave to the configured failure route.
    GoHome,
    /// Same as [`AlertActionKind::GoHome`]; labelled for non-home routes.
    GoBack,
    Redirect(Route),
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertAction {
    pub label: String,
    pub kind: AlertActionKind,
}

impl AlertAction {
    pub fn new(label: impl Into<String>, kind: AlertActionKind) -> Self {
        Self {
            label: label.into(),
            kind,
        }
    }
}

/// A blocking message with a fixed set of actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub actions: Vec<AlertAction>,
}

impl Alert {
    /// Alert for a missing profile, check-in or base plan.
    pub fn precondition(error: &GenerationError) -> Self {
        let route = error.redirect_route().unwrap_or(Route::Home);
        let (title, label) = match route {
            Route::CheckIn => ("Check in first", "Go to Check-In"),
            Route::Onboarding => ("Finish setting up", "Continue Setup"),
            _ => ("Cannot generate plan", "OK"),
        };
        Self {
            kind: AlertKind::MissingPrecondition,
            title: title.to_string(),
            message: error.to_string(),
            actions: vec![AlertAction::new(label, AlertActionKind::Redirect(route))],
        }
    }

    /// Alert for a failed generation, offering to leave or retry.
    pub fn generation_failed(error: &GenerationError, on_failure_route: &Route) -> Self {
        let leave = match on_failure_route {
            Route::Home => AlertAction::new("Go Home", AlertActionKind::GoHome),
            _ => AlertAction::new("Go Back", AlertActionKind::GoBack),
        };
        Self {
            kind: AlertKind::GenerationFailed,
            title: "Plan generation failed".to_string(),
            message: format!("We couldn't create your plan. {error}"),
            actions: vec![leave, AlertAction::new("Try Again", AlertActionKind::TryAgain)],
        }
    }

    pub fn retry_too_soon(rejected: &RetryRejected) -> Self {
        Self {
            kind: AlertKind::RetryTooSoon,
            title: "Please wait".to_string(),
            message: rejected.message(),
            actions: vec![AlertAction::new("OK", AlertActionKind::Dismiss)],
        }
    }

    /// Find the action with the given label.
    pub fn action(&self, label: &str) -> Option<&AlertAction> {
        self.actions.iter().find(|a| a.label == label)
    }
}

/// Receives UI effects from a mounted session.
pub trait Presenter: Send + Sync {
    fn job_updated(&self, job: &GenerationJob);
    fn slow_response(&self, message: &str);
    fn alert(&self, alert: Alert);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GenerationStage, RemoteGenerationError};

    #[test]
    fn failure_alert_offers_leave_and_retry() {
        let err: GenerationError =
            RemoteGenerationError::new(GenerationStage::Request, "timed out").into();
        let alert = Alert::generation_failed(&err, &Route::Home);
        let labels: Vec<_> = alert.actions.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, ["Go Home", "Try Again"]);
        assert_eq!(
            alert.action("Try Again").map(|a| &a.kind),
            Some(&AlertActionKind::TryAgain)
        );

        let alert = Alert::generation_failed(&err, &Route::Named("dashboard".into()));
        assert_eq!(alert.actions[0].kind, AlertActionKind::GoBack);
    }

    #[test]
    fn precondition_alert_has_single_redirect() {
        let err = GenerationError::MissingCheckin {
            date: chrono::NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
        };
        let alert = Alert::precondition(&err);
        assert_eq!(alert.kind, AlertKind::MissingPrecondition);
        assert_eq!(alert.actions.len(), 1);
        assert_eq!(
            alert.actions[0].kind,
            AlertActionKind::Redirect(Route::CheckIn)
        );
    }
}
