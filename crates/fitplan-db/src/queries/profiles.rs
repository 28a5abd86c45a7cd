//! Database query functions for the `user_profiles` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ExperienceLevel, FitnessGoal, Sex, UserProfile};

/// Parameters for creating or replacing a user profile.
#[derive(Debug, Clone)]
pub struct ProfileInput<'a> {
    pub user_id: Uuid,
    pub display_name: &'a str,
    pub age: i32,
    pub sex: Sex,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub goal: FitnessGoal,
    pub experience: ExperienceLevel,
    pub equipment: &'a [String],
    pub training_days_per_week: i32,
}

/// Insert a profile, or replace every field of an existing one.
pub async fn upsert_profile(pool: &PgPool, input: &ProfileInput<'_>) -> Result<UserProfile> {
    let profile = sqlx::query_as::<_, UserProfile>(
        "INSERT INTO user_profiles (user_id, display_name, age, sex, height_cm, weight_kg, \
         goal, experience, equipment, training_days_per_week) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (user_id) DO UPDATE SET \
         display_name = EXCLUDED.display_name, age = EXCLUDED.age, sex = EXCLUDED.sex, \
         height_cm = EXCLUDED.height_cm, weight_kg = EXCLUDED.weight_kg, goal = EXCLUDED.goal, \
         experience = EXCLUDED.experience, equipment = EXCLUDED.equipment, \
         training_days_per_week = EXCLUDED.training_days_per_week, updated_at = now() \
         RETURNING *",
    )
    .bind(input.user_id)
    .bind(input.display_name)
    .bind(input.age)
    .bind(input.sex)
    .bind(input.height_cm)
    .bind(input.weight_kg)
    .bind(input.goal)
    .bind(input.experience)
    .bind(input.equipment)
    .bind(input.training_days_per_week)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to upsert profile for user {}", input.user_id))?;

    Ok(profile)
}

/// Fetch a profile by user ID.
pub async fn get_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<UserProfile>> {
    let profile = sqlx::query_as::<_, UserProfile>("SELECT * FROM user_profiles WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user profile")?;

    Ok(profile)
}
