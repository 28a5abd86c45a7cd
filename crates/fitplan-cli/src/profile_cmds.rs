//! CLI handlers for `fitplan profile` subcommands.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use fitplan_db::models::UserProfile;
use fitplan_db::queries::profiles::{self as profile_db, ProfileInput};

use crate::ProfileCommands;

/// Dispatch a `ProfileCommands` variant to the appropriate handler.
pub async fn run_profile_command(
    command: ProfileCommands,
    pool: &PgPool,
    user_id: Uuid,
) -> Result<()> {
    match command {
        ProfileCommands::Set {
            name,
            age,
            sex,
            height_cm,
            weight_kg,
            goal,
            experience,
            equipment,
            days,
        } => {
            let equipment = normalize_equipment(&equipment);
            let input = ProfileInput {
                user_id,
                display_name: &name,
                age,
                sex,
                height_cm,
                weight_kg,
                goal,
                experience,
                equipment: &equipment,
                training_days_per_week: days,
            };
            let profile = profile_db::upsert_profile(pool, &input).await?;
            println!("Profile saved.");
            println!();
            print_profile(&profile);
            Ok(())
        }
        ProfileCommands::Show => {
            let profile = profile_db::get_profile(pool, user_id)
                .await?
                .with_context(|| {
                    format!("no profile for user {user_id}; run `fitplan profile set` first")
                })?;
            print_profile(&profile);
            Ok(())
        }
    }
}

/// Trim, lowercase and dedupe equipment names, dropping empties.
fn normalize_equipment(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in raw {
        let item = item.trim().to_lowercase();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn print_profile(profile: &UserProfile) {
    println!("Profile: {} ({})", profile.display_name, profile.user_id);
    println!("  Age:          {}", profile.age);
    println!("  Sex:          {}", profile.sex);
    println!("  Height:       {:.1} cm", profile.height_cm);
    println!("  Weight:       {:.1} kg", profile.weight_kg);
    println!("  Goal:         {}", profile.goal);
    println!("  Experience:   {}", profile.experience);
    println!("  Training:     {} days/week", profile.training_days_per_week);
    if profile.equipment.is_empty() {
        println!("  Equipment:    (none)");
    } else {
        println!("  Equipment:    {}", profile.equipment.join(", "));
    }
    println!(
        "  Updated:      {}",
        profile.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equipment_is_trimmed_lowercased_and_deduped() {
        let raw = vec![
            " Dumbbells".to_string(),
            "dumbbells".to_string(),
            "".to_string(),
            "Pull-Up Bar ".to_string(),
        ];
        assert_eq!(
            normalize_equipment(&raw),
            vec!["dumbbells".to_string(), "pull-up bar".to_string()]
        );
    }
}
