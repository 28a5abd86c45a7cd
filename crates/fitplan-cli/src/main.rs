mod checkin_cmds;
mod config;
mod plan_cmds;
mod profile_cmds;
#[cfg(test)]
mod test_util;

use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use sqlx::PgPool;
use uuid::Uuid;

use fitplan_db::config::DbConfig;
use fitplan_db::models::{ExperienceLevel, FitnessGoal, PlanKind, Sex};
use fitplan_db::pool;

use config::FitplanConfig;

#[derive(Parser)]
#[command(name = "fitplan", about = "AI workout and nutrition plan generator")]
struct Cli {
    /// Database URL (overrides FITPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// User id to act as (overrides FITPLAN_USER_ID and the config file)
    #[arg(long, global = true)]
    user: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a fitplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = DbConfig::DEFAULT_URL)]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the fitplan database (requires config file or env vars)
    DbInit,
    /// Profile management
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Daily check-ins
    Checkin {
        #[command(subcommand)]
        command: CheckinCommands,
    },
    /// Plan generation and inspection
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Print a shell completion script
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Create or replace the profile
    Set {
        /// Display name
        #[arg(long)]
        name: String,
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..=120))]
        age: i32,
        /// female, male or unspecified
        #[arg(long, default_value = "unspecified")]
        sex: Sex,
        #[arg(long)]
        height_cm: f64,
        #[arg(long)]
        weight_kg: f64,
        /// lose_fat, build_muscle, maintain or improve_endurance
        #[arg(long)]
        goal: FitnessGoal,
        /// beginner, intermediate or advanced
        #[arg(long, default_value = "beginner")]
        experience: ExperienceLevel,
        /// Available equipment (comma-separated)
        #[arg(long, value_delimiter = ',')]
        equipment: Vec<String>,
        /// Training days per week
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(i32).range(1..=7))]
        days: i32,
    },
    /// Show the profile
    Show,
}

#[derive(Subcommand)]
pub enum CheckinCommands {
    /// Record a check-in (1-10 scales)
    Add {
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..=10))]
        energy: i32,
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..=10))]
        stress: i32,
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..=10))]
        mood: i32,
        /// Hours slept last night
        #[arg(long)]
        sleep: Option<f64>,
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..=10))]
        soreness: Option<i32>,
        #[arg(long)]
        notes: Option<String>,
        /// Date of the check-in (YYYY-MM-DD, defaults to today UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List recent check-ins, newest first
    List {
        #[arg(long, default_value_t = 7)]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Generate a base or daily plan
    Generate {
        /// base or daily
        kind: PlanKind,
        /// Regenerate even if a plan already exists
        #[arg(long)]
        force: bool,
        /// Save a standard plan if generation fails
        #[arg(long)]
        fallback: bool,
    },
    /// Show the current base plan or today's daily plan
    Show {
        /// base or daily
        kind: PlanKind,
        /// Print the raw plan document
        #[arg(long)]
        json: bool,
    },
    /// Show generation job state and recent attempts
    Status {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Preview the standard plan used when generation fails (no writes)
    Fallback {
        /// base or daily
        kind: PlanKind,
        /// Plan date (YYYY-MM-DD, defaults to today UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

/// Execute the `fitplan init` command: write config file with a fresh user id.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let user_id = Uuid::new_v4();
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        user: config::UserSection { id: user_id },
        llm: config::LlmSection::default(),
        generation: config::GenerationSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  user.id = {user_id}");
    println!();
    println!("Next: run `fitplan db-init` to create and migrate the database,");
    println!(
        "then set {} and run `fitplan profile set`.",
        config::ENV_LLM_API_KEY
    );

    Ok(())
}

/// Execute the `fitplan db-init` command: create database and run migrations.
async fn cmd_db_init(resolved: &FitplanConfig) -> anyhow::Result<()> {
    println!("Initializing fitplan database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("fitplan db-init complete.");
    Ok(())
}

async fn connect(resolved: &FitplanConfig) -> anyhow::Result<PgPool> {
    tracing::debug!(
        database = resolved.db_config.database_name().unwrap_or("?"),
        "connecting to database"
    );
    pool::create_pool(&resolved.db_config).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "fitplan", &mut std::io::stdout());
        }
        Commands::DbInit => {
            let resolved = FitplanConfig::resolve(cli.database_url.as_deref(), cli.user)?;
            cmd_db_init(&resolved).await?;
        }
        Commands::Profile { command } => {
            let resolved = FitplanConfig::resolve(cli.database_url.as_deref(), cli.user)?;
            let user_id = resolved.require_user()?;
            let db_pool = connect(&resolved).await?;
            let result = profile_cmds::run_profile_command(command, &db_pool, user_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Checkin { command } => {
            let resolved = FitplanConfig::resolve(cli.database_url.as_deref(), cli.user)?;
            let user_id = resolved.require_user()?;
            let db_pool = connect(&resolved).await?;
            let result = checkin_cmds::run_checkin_command(command, &db_pool, user_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Plan { command } => {
            let resolved = FitplanConfig::resolve(cli.database_url.as_deref(), cli.user)?;
            let user_id = resolved.require_user()?;
            let db_pool = connect(&resolved).await?;
            let result =
                plan_cmds::run_plan_command(command, &db_pool, &resolved, user_id).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
