//! CLI handlers for `fitplan checkin` subcommands.

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use fitplan_db::models::CheckIn;
use fitplan_db::queries::checkins::{self as checkin_db, NewCheckIn};

use crate::CheckinCommands;

/// Dispatch a `CheckinCommands` variant to the appropriate handler.
pub async fn run_checkin_command(
    command: CheckinCommands,
    pool: &PgPool,
    user_id: Uuid,
) -> Result<()> {
    match command {
        CheckinCommands::Add {
            energy,
            stress,
            mood,
            sleep,
            soreness,
            notes,
            date,
        } => {
            let checkin_date = date.unwrap_or_else(|| Utc::now().date_naive());
            let new = NewCheckIn {
                user_id,
                checkin_date,
                energy,
                stress,
                mood,
                sleep_hours: sleep,
                soreness,
                notes: notes.as_deref(),
            };
            let checkin = checkin_db::insert_checkin(pool, &new).await?;
            println!("Check-in recorded for {}.", checkin.checkin_date);
            println!("  {}", summarize(&checkin));
            Ok(())
        }
        CheckinCommands::List { limit } => {
            let checkins = checkin_db::list_recent_checkins(pool, user_id, limit).await?;
            if checkins.is_empty() {
                println!("No check-ins found. Use `fitplan checkin add` to record one.");
                return Ok(());
            }
            for checkin in &checkins {
                println!("{}  {}", checkin.checkin_date, summarize(checkin));
            }
            Ok(())
        }
    }
}

fn summarize(checkin: &CheckIn) -> String {
    let mut line = format!(
        "energy={} stress={} mood={}",
        checkin.energy, checkin.stress, checkin.mood
    );
    if let Some(sleep) = checkin.sleep_hours {
        line.push_str(&format!(" sleep={sleep:.1}h"));
    }
    if let Some(soreness) = checkin.soreness {
        line.push_str(&format!(" soreness={soreness}"));
    }
    if let Some(ref notes) = checkin.notes {
        line.push_str(&format!(" notes={notes:?}"));
    }
    line
}
