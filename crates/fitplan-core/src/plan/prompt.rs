//! Prompt construction for remote plan generation. Pure string building.

use std::fmt::Write as _;

use chrono::{Datelike, NaiveDate};
use fitplan_db::models::{CheckIn, PlanKind, UserProfile};

use crate::generator::GenerationRequest;

/// Weekday keys every plan uses in its `days` object.
pub const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Lowercase weekday key for `date`.
pub fn weekday_key(date: NaiveDate) -> &'static str {
    WEEKDAYS[date.weekday().num_days_from_monday() as usize]
}

/// System prompt describing the role and the required JSON shape.
pub fn build_system_prompt(kind: PlanKind) -> String {
    let mut prompt = String::with_capacity(2048);

    prompt.push_str(
        "You are an experienced strength and conditioning coach and sports \
         nutritionist. You write safe, practical plans for the person described \
         by the user message.\n\n",
    );

    match kind {
        PlanKind::Base => {
            prompt.push_str(
                "Write a one-week base training plan. Include every weekday; \
                 rest days get a recovery entry instead of a workout.\n\n",
            );
        }
        PlanKind::Daily => {
            prompt.push_str(
                "Adapt the provided base plan to today's check-in. Lower the \
                 volume and intensity when energy is low or stress is high. \
                 Return a plan for today only, keyed by today's weekday.\n\n",
            );
        }
    }

    prompt.push_str("## Output format\n\n");
    prompt.push_str(
        "Respond with a single JSON object and nothing else. Required keys:\n\
         - `days`: object keyed by lowercase weekday (`monday` .. `sunday`); \
         each value has `focus` (string), `workout` (array of exercises with \
         `name`, `sets`, `reps`, `rest_seconds`) and `notes` (string).\n\
         - `nutrition`: object with `calories`, `protein_g`, `carbs_g`, `fat_g`.\n\
         - `recovery`: object with `sleep_hours` and `tips` (array of strings).\n",
    );

    prompt
}

/// User prompt carrying the profile, the latest check-in and, for daily
/// plans, the base plan being adapted.
pub fn build_user_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::with_capacity(2048);

    push_profile(&mut prompt, &request.profile);

    if let Some(checkin) = &request.checkin {
        push_checkin(&mut prompt, checkin);
    }

    if let Some(base) = &request.base_plan {
        prompt.push_str("\n## Base plan\n\n```json\n");
        prompt.push_str(&base.payload.to_string());
        prompt.push_str("\n```\n");
    }

    if request.kind == PlanKind::Daily {
        let _ = writeln!(
            prompt,
            "\nToday is {} ({}).",
            request.plan_date,
            weekday_key(request.plan_date)
        );
    }

    prompt
}

fn push_profile(prompt: &mut String, profile: &UserProfile) {
    prompt.push_str("## Profile\n\n");
    let _ = writeln!(prompt, "- Age: {}", profile.age);
    let _ = writeln!(prompt, "- Sex: {}", profile.sex);
    let _ = writeln!(prompt, "- Height: {:.0} cm", profile.height_cm);
    let _ = writeln!(prompt, "- Weight: {:.1} kg", profile.weight_kg);
    let _ = writeln!(prompt, "- Goal: {}", profile.goal);
    let _ = writeln!(prompt, "- Experience: {}", profile.experience);
    let _ = writeln!(
        prompt,
        "- Training days per week: {}",
        profile.training_days_per_week
    );
    if profile.equipment.is_empty() {
        prompt.push_str("- Equipment: none (bodyweight only)\n");
    } else {
        let _ = writeln!(prompt, "- Equipment: {}", profile.equipment.join(", "));
    }
}

fn push_checkin(prompt: &mut String, checkin: &CheckIn) {
    let _ = writeln!(prompt, "\n## Check-in ({})\n", checkin.checkin_date);
    let _ = writeln!(prompt, "- Energy: {}/10", checkin.energy);
    let _ = writeln!(prompt, "- Stress: {}/10", checkin.stress);
    let _ = writeln!(prompt, "- Mood: {}/10", checkin.mood);
    if let Some(sleep) = checkin.sleep_hours {
        let _ = writeln!(prompt, "- Sleep: {sleep:.1} h");
    }
    if let Some(soreness) = checkin.soreness {
        let _ = writeln!(prompt, "- Soreness: {soreness}/10");
    }
    if let Some(notes) = checkin.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        let _ = writeln!(prompt, "- Notes: {notes}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fitplan_db::models::{BasePlan, ExperienceLevel, FitnessGoal, PlanSource, Sex};
    use serde_json::json;
    use uuid::Uuid;

    fn profile() -> UserProfile {
        UserProfile {
            user_id: Uuid::nil(),
            display_name: "Sam".into(),
            age: 34,
            sex: Sex::Female,
            height_cm: 168.0,
            weight_kg: 64.5,
            goal: FitnessGoal::BuildMuscle,
            experience: ExperienceLevel::Intermediate,
            equipment: vec!["dumbbells".into()],
            training_days_per_week: 4,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn system_prompt_describes_days_shape() {
        let base = build_system_prompt(PlanKind::Base);
        assert!(base.contains("one-week base training plan"));
        assert!(base.contains("`days`"));
        let daily = build_system_prompt(PlanKind::Daily);
        assert!(daily.contains("today's check-in"));
    }

    #[test]
    fn user_prompt_includes_inputs() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 4).unwrap();
        let request = GenerationRequest {
            kind: PlanKind::Daily,
            profile: profile(),
            checkin: Some(CheckIn {
                id: Uuid::nil(),
                user_id: Uuid::nil(),
                checkin_date: date,
                energy: 3,
                stress: 8,
                mood: 5,
                sleep_hours: Some(6.5),
                soreness: None,
                notes: Some("  ".into()),
                created_at: Utc::now(),
            }),
            base_plan: Some(BasePlan {
                id: Uuid::nil(),
                user_id: Uuid::nil(),
                source: PlanSource::Generated,
                payload: json!({"days": {"monday": {}}}),
                created_at: Utc::now(),
            }),
            plan_date: date,
        };

        let prompt = build_user_prompt(&request);
        assert!(prompt.contains("- Equipment: dumbbells"));
        assert!(prompt.contains("- Energy: 3/10"));
        assert!(prompt.contains("- Sleep: 6.5 h"));
        assert!(!prompt.contains("Notes"));
        assert!(prompt.contains(r#"{"days":{"monday":{}}}"#));
        assert!(prompt.contains("Today is 2025-06-04 (wednesday)."));
    }

    #[test]
    fn bodyweight_profile_is_called_out() {
        let mut p = profile();
        p.equipment.clear();
        let request = GenerationRequest {
            kind: PlanKind::Base,
            profile: p,
            checkin: None,
            base_plan: None,
            plan_date: NaiveDate::from_ymd_opt(2025, 6, 4).unwrap(),
        };
        let prompt = build_user_prompt(&request);
        assert!(prompt.contains("bodyweight only"));
        assert!(!prompt.contains("Today is"));
    }
}
