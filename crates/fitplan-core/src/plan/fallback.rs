//! Rule-based plan used when remote generation fails and fallback is on.
//!
//! The payload depends only on its inputs: two calls with the same profile,
//! check-in and date produce identical JSON. Identity (`id`, `created_at`)
//! lives outside the payload.

use chrono::{DateTime, NaiveDate, Utc};
use fitplan_db::models::{CheckIn, FitnessGoal, PlanKind, Sex, UserProfile};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::PlanPayload;
use super::prompt::{WEEKDAYS, weekday_key};

/// Energy at or below this counts as a low-energy day.
pub const LOW_ENERGY_THRESHOLD: i32 = 4;

/// Equipment that unlocks the loaded strength template.
pub const EQUIPMENT_KEYWORDS: [&str; 5] = [
    "gym",
    "dumbbells",
    "barbell",
    "kettlebells",
    "resistance_bands",
];

/// Weekday indices in the order training days are assigned.
const TRAINING_ORDER: [usize; 7] = [0, 2, 4, 1, 3, 5, 6];

const MIN_CALORIES: f64 = 1200.0;

/// A locally synthesized plan.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPlan {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub payload: PlanPayload,
}

/// Daily energy and macro targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NutritionTargets {
    pub calories: i64,
    pub protein_g: i64,
    pub carbs_g: i64,
    pub fat_g: i64,
}

/// Build a fallback plan with a fresh id and timestamp.
pub fn create_emergency_fallback_plan(
    kind: PlanKind,
    profile: &UserProfile,
    checkin: Option<&CheckIn>,
    plan_date: NaiveDate,
) -> FallbackPlan {
    FallbackPlan {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        payload: fallback_payload(kind, profile, checkin, plan_date),
    }
}

/// The deterministic part of [`create_emergency_fallback_plan`].
pub fn fallback_payload(
    kind: PlanKind,
    profile: &UserProfile,
    checkin: Option<&CheckIn>,
    plan_date: NaiveDate,
) -> PlanPayload {
    let low_energy = is_low_energy(checkin);
    let equipment = has_equipment(profile);
    let session = if low_energy {
        recovery_session()
    } else {
        strength_session(equipment)
    };

    let mut days = serde_json::Map::new();
    match kind {
        PlanKind::Base => {
            let training = training_days(profile.training_days_per_week);
            for (index, day) in WEEKDAYS.iter().enumerate() {
                let entry = if training.contains(&index) {
                    session.clone()
                } else {
                    rest_day()
                };
                days.insert((*day).to_string(), entry);
            }
        }
        PlanKind::Daily => {
            days.insert(weekday_key(plan_date).to_string(), session);
        }
    }

    let mut payload = json!({
        "kind": kind.to_string(),
        "source": "fallback",
        "days": Value::Object(days),
        "nutrition": nutrition_targets(profile),
        "recovery": recovery_guidance(checkin),
        "notes": "Your personalized plan could not be generated, so this is a \
                  standard plan built from your profile. You can regenerate it later.",
    });
    if kind == PlanKind::Daily {
        if let Some(object) = payload.as_object_mut() {
            object.insert("date".to_string(), json!(plan_date.to_string()));
        }
    }

    // Always has a non-empty `days` object.
    PlanPayload(payload)
}

pub fn is_low_energy(checkin: Option<&CheckIn>) -> bool {
    checkin.is_some_and(|c| c.energy <= LOW_ENERGY_THRESHOLD)
}

/// `true` if any listed equipment matches a known keyword.
///
/// Matching ignores case and treats spaces and dashes as underscores.
pub fn has_equipment(profile: &UserProfile) -> bool {
    profile.equipment.iter().any(|item| {
        let normalized = item.trim().to_lowercase().replace([' ', '-'], "_");
        EQUIPMENT_KEYWORDS.contains(&normalized.as_str())
    })
}

/// Mifflin-St Jeor estimate scaled by training frequency and goal.
pub fn nutrition_targets(profile: &UserProfile) -> NutritionTargets {
    let sex_offset = match profile.sex {
        Sex::Male => 5.0,
        Sex::Female => -161.0,
        Sex::Unspecified => -78.0,
    };
    let bmr = 10.0 * profile.weight_kg + 6.25 * profile.height_cm - 5.0 * f64::from(profile.age)
        + sex_offset;
    let days = f64::from(profile.training_days_per_week.clamp(0, 7));
    let maintenance = bmr * (1.2 + 0.075 * days);

    let (adjustment, protein_per_kg) = match profile.goal {
        FitnessGoal::LoseFat => (-500.0, 2.0),
        FitnessGoal::BuildMuscle => (300.0, 1.8),
        FitnessGoal::Maintain => (0.0, 1.6),
        FitnessGoal::ImproveEndurance => (150.0, 1.4),
    };
    let calories = (maintenance + adjustment).max(MIN_CALORIES).round();
    let protein = protein_per_kg * profile.weight_kg;
    let fat = calories * 0.25 / 9.0;
    let carbs = ((calories - protein * 4.0 - fat * 9.0) / 4.0).max(0.0);

    NutritionTargets {
        calories: calories as i64,
        protein_g: protein.round() as i64,
        carbs_g: carbs.round() as i64,
        fat_g: fat.round() as i64,
    }
}

fn training_days(per_week: i32) -> Vec<usize> {
    let count = usize::try_from(per_week.clamp(1, 7)).unwrap_or(3);
    TRAINING_ORDER[..count].to_vec()
}

fn exercise(name: &str, sets: u32, reps: &str, rest_seconds: u32) -> Value {
    json!({ "name": name, "sets": sets, "reps": reps, "rest_seconds": rest_seconds })
}

fn strength_session(equipment: bool) -> Value {
    let workout = if equipment {
        vec![
            exercise("Goblet squat", 3, "10", 90),
            exercise("Dumbbell row", 3, "10 per side", 90),
            exercise("Dumbbell bench press", 3, "10", 90),
            exercise("Romanian deadlift", 3, "10", 90),
            exercise("Plank", 3, "30s", 60),
        ]
    } else {
        vec![
            exercise("Bodyweight squat", 3, "15", 60),
            exercise("Push-up", 3, "10", 60),
            exercise("Reverse lunge", 3, "10 per leg", 60),
            exercise("Glute bridge", 3, "15", 60),
            exercise("Plank", 3, "30s", 60),
        ]
    };
    json!({
        "focus": "Full body strength",
        "workout": workout,
        "notes": "Leave two reps in reserve on every set.",
    })
}

fn recovery_session() -> Value {
    json!({
        "focus": "Active recovery",
        "workout": [
            exercise("Mobility flow", 1, "15 min", 0),
            exercise("Easy walk", 1, "20-30 min", 0),
            exercise("Deep breathing", 1, "5 min", 0),
        ],
        "notes": "Energy is low today. Keep everything easy and conversational.",
    })
}

fn rest_day() -> Value {
    json!({
        "focus": "Rest",
        "workout": [],
        "notes": "Rest day. A short walk and light stretching are optional.",
    })
}

fn recovery_guidance(checkin: Option<&CheckIn>) -> Value {
    let strained = is_low_energy(checkin) || checkin.is_some_and(|c| c.stress >= 7);
    let mut tips = vec![
        "Drink water regularly through the day.",
        "Stretch for five minutes after each session.",
    ];
    if strained {
        tips.push("Prioritize an early night and skip late caffeine.");
    }
    json!({
        "sleep_hours": if strained { 9 } else { 8 },
        "tips": tips,
    })
}
