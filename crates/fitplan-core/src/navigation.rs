//! Destinations and the navigation seam.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use uuid::Uuid;

/// A place the host can show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Onboarding,
    CheckIn,
    BasePlan { plan_id: Uuid },
    DailyPlan { plan_id: Uuid },
    /// Host-defined route not known to the orchestrator.
    Named(String),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => f.write_str("home"),
            Self::Onboarding => f.write_str("onboarding"),
            Self::CheckIn => f.write_str("check-in"),
            Self::BasePlan { plan_id } => write!(f, "base-plan/{plan_id}"),
            Self::DailyPlan { plan_id } => write!(f, "daily-plan/{plan_id}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteParseError {
    #[error("route must not be empty")]
    Empty,
    #[error("invalid plan id in route {route:?}")]
    InvalidPlanId { route: String },
}

impl FromStr for Route {
    type Err = RouteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let plan_id = |id: &str| {
            Uuid::parse_str(id).map_err(|_| RouteParseError::InvalidPlanId {
                route: s.to_string(),
            })
        };
        match s {
            "" => Err(RouteParseError::Empty),
            "home" => Ok(Self::Home),
            "onboarding" => Ok(Self::Onboarding),
            "check-in" | "checkin" => Ok(Self::CheckIn),
            other => {
                if let Some(id) = other.strip_prefix("base-plan/") {
                    Ok(Self::BasePlan {
                        plan_id: plan_id(id)?,
                    })
                } else if let Some(id) = other.strip_prefix("daily-plan/") {
                    Ok(Self::DailyPlan {
                        plan_id: plan_id(id)?,
                    })
                } else {
                    Ok(Self::Named(other.to_string()))
                }
            }
        }
    }
}

/// Host navigation stack.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn push(&self, route: &Route) -> anyhow::Result<()>;
    async fn replace(&self, route: &Route) -> anyhow::Result<()>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Navigator) {}
};

/// Which attempt of [`navigate_with_fallback`] landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationStep {
    Push,
    Replace,
    ReplaceHome,
}

/// Push `route`, then try replacing with it, then replace with home.
///
/// Each layer runs only if the one before it failed: a successful push is
/// never followed by a replace. Some hosts issue push and replace back to
/// back for every navigation; that double call is not reproduced here.
///
/// Failures are logged and never surfaced. Returns `None` if every step
/// failed.
pub async fn navigate_with_fallback(nav: &dyn Navigator, route: &Route) -> Option<NavigationStep> {
    match nav.push(route).await {
        Ok(()) => return Some(NavigationStep::Push),
        Err(e) => tracing::warn!(route = %route, error = %e, "push navigation failed"),
    }
    match nav.replace(route).await {
        Ok(()) => return Some(NavigationStep::Replace),
        Err(e) => tracing::warn!(route = %route, error = %e, "replace navigation failed"),
    }
    match nav.replace(&Route::Home).await {
        Ok(()) => Some(NavigationStep::ReplaceHome),
        Err(e) => {
            tracing::error!(route = %route, error = %e, "navigation to home failed");
            None
        }
    }
}
