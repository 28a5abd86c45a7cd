use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Error returned when a string does not name a variant of one of the
/// text-backed enums in this module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    /// Human-readable name of the enum ("plan kind", "goal", ...).
    pub what: &'static str,
    /// The rejected input.
    pub value: String,
}

impl EnumParseError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_owned(),
        }
    }
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.what, self.value)
    }
}

impl std::error::Error for EnumParseError {}

// ---------------------------------------------------------------------------

/// Which plan a generation job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// Weekly structure that daily plans adapt from.
    Base,
    /// Day-specific adjustment of the base plan.
    Daily,
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Base => "base",
            Self::Daily => "daily",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanKind {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Self::Base),
            "daily" => Ok(Self::Daily),
            other => Err(EnumParseError::new("plan kind", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending,
    Ready,
    Error,
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for GenerationStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(EnumParseError::new("generation status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Where a stored plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Produced by the remote generation service.
    Generated,
    /// Synthesized locally by the emergency fallback builder.
    Fallback,
}

impl fmt::Display for PlanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Generated => "generated",
            Self::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanSource {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generated" => Ok(Self::Generated),
            "fallback" => Ok(Self::Fallback),
            other => Err(EnumParseError::new("plan source", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Primary training goal chosen during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FitnessGoal {
    LoseFat,
    BuildMuscle,
    Maintain,
    ImproveEndurance,
}

impl fmt::Display for FitnessGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LoseFat => "lose_fat",
            Self::BuildMuscle => "build_muscle",
            Self::Maintain => "maintain",
            Self::ImproveEndurance => "improve_endurance",
        };
        f.write_str(s)
    }
}

impl FromStr for FitnessGoal {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lose_fat" => Ok(Self::LoseFat),
            "build_muscle" => Ok(Self::BuildMuscle),
            "maintain" => Ok(Self::Maintain),
            "improve_endurance" => Ok(Self::ImproveEndurance),
            other => Err(EnumParseError::new("goal", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Self-reported training experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

impl FromStr for ExperienceLevel {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(EnumParseError::new("experience level", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Sex used for energy expenditure estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Female,
    Male,
    Unspecified,
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Female => "female",
            Self::Male => "male",
            Self::Unspecified => "unspecified",
        };
        f.write_str(s)
    }
}

impl FromStr for Sex {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "female" => Ok(Self::Female),
            "male" => Ok(Self::Male),
            "unspecified" => Ok(Self::Unspecified),
            other => Err(EnumParseError::new("sex", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Onboarding profile for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub age: i32,
    pub sex: Sex,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub goal: FitnessGoal,
    pub experience: ExperienceLevel,
    pub equipment: Vec<String>,
    pub training_days_per_week: i32,
    pub updated_at: DateTime<Utc>,
}

/// A daily check-in (energy, stress, mood on a 1-10 scale).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CheckIn {
    pub id: Uuid,
    pub user_id: Uuid,
    pub checkin_date: NaiveDate,
    pub energy: i32,
    pub stress: i32,
    pub mood: i32,
    pub sleep_hours: Option<f64>,
    pub soreness: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted weekly base plan. The payload is opaque JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BasePlan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: PlanSource,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A persisted daily plan derived from a base plan and a check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DailyPlan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub base_plan_id: Uuid,
    pub plan_date: NaiveDate,
    pub source: PlanSource,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Last known state of the generation job for a `(user, kind)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JobStateRecord {
    pub user_id: Uuid,
    pub kind: PlanKind,
    pub status: GenerationStatus,
    pub attempt: i32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One logged plan generation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GenerationAttemptRecord {
    pub id: i64,
    pub user_id: Uuid,
    pub kind: PlanKind,
    pub success: bool,
    pub attempt: i32,
    pub error_stage: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: i64,
    pub used_fallback: bool,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
