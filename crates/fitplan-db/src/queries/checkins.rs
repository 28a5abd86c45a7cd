//! Database query functions for the `checkins` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::CheckIn;

/// Parameters for inserting a new check-in row.
#[derive(Debug, Clone)]
pub struct NewCheckIn<'a> {
    pub user_id: Uuid,
    pub checkin_date: NaiveDate,
    pub energy: i32,
    pub stress: i32,
    pub mood: i32,
    pub sleep_hours: Option<f64>,
    pub soreness: Option<i32>,
    pub notes: Option<&'a str>,
}

/// Insert a check-in. Returns the row with server-generated defaults
/// (id, created_at).
pub async fn insert_checkin(pool: &PgPool, new: &NewCheckIn<'_>) -> Result<CheckIn> {
    let checkin = sqlx::query_as::<_, CheckIn>(
        "INSERT INTO checkins (user_id, checkin_date, energy, stress, mood, sleep_hours, soreness, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(new.checkin_date)
    .bind(new.energy)
    .bind(new.stress)
    .bind(new.mood)
    .bind(new.sleep_hours)
    .bind(new.soreness)
    .bind(new.notes)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert check-in for user {}", new.user_id))?;

    Ok(checkin)
}

/// The `limit` most recent check-ins for a user, newest first.
pub async fn list_recent_checkins(pool: &PgPool, user_id: Uuid, limit: i64) -> Result<Vec<CheckIn>> {
    let checkins = sqlx::query_as::<_, CheckIn>(
        "SELECT * FROM checkins \
         WHERE user_id = $1 \
         ORDER BY checkin_date DESC, created_at DESC \
         LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list check-ins for user {user_id}"))?;

    Ok(checkins)
}
