//! Shared test utilities for fitplan integration tests.
//!
//! Provides a PostgreSQL instance shared across tests. Each test gets its
//! own database within the instance.
//!
//! Two modes:
//! - **`FITPLAN_TEST_PG_URL`** set: use that server directly (CI service
//!   container, local instance).
//! - **No env var**: start a container via testcontainers, shared per test
//!   binary through a `OnceCell`. Requires a reachable Docker daemon.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use fitplan_db::models::{ExperienceLevel, FitnessGoal, Sex, UserProfile};
use fitplan_db::pool;
use fitplan_db::queries::profiles::{self, ProfileInput};

/// Shared server state: base URL and optional container handle (kept alive).
struct SharedPg {
    base_url: String,
    /// `None` when using an external URL.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    if let Ok(url) = std::env::var("FITPLAN_TEST_PG_URL") {
        return SharedPg {
            base_url: url.trim_end_matches('/').to_string(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("failed to start PostgreSQL container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    SharedPg {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Base URL (server root, no database name) of the shared PostgreSQL.
pub async fn pg_url() -> &'static str {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    &shared.base_url
}

/// Create a temporary database with migrations applied.
///
/// Returns `(pool, db_name)`. Call [`drop_test_db`] with `db_name` when the
/// test is done.
pub async fn create_test_db() -> (PgPool, String) {
    let base_url = pg_url().await;

    let maint_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&format!("{base_url}/postgres"))
        .await
        .expect("failed to connect to maintenance database");

    let db_name = format!("fitplan_test_{}", Uuid::new_v4().simple());
    maint_pool
        .execute(format!("CREATE DATABASE {db_name}").as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));
    maint_pool.close().await;

    let temp_pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&format!("{base_url}/{db_name}"))
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e}"));

    pool::run_migrations(&temp_pool)
        .await
        .expect("migrations should succeed");

    (temp_pool, db_name)
}

/// Drop a temporary database, terminating its connections first.
pub async fn drop_test_db(db_name: &str) {
    let base_url = pg_url().await;

    let maint_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&format!("{base_url}/postgres"))
        .await
        .expect("failed to connect to maintenance database for cleanup");

    let terminate = format!(
        "SELECT pg_terminate_backend(pid) \
         FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint_pool.execute(terminate.as_str()).await;
    let _ = maint_pool
        .execute(format!("DROP DATABASE IF EXISTS {db_name}").as_str())
        .await;
    maint_pool.close().await;
}

/// Insert a profile for a fresh user: 30-year-old woman, 165 cm, 60 kg,
/// maintaining, beginner, three training days, with the given equipment.
///
/// Values match the reference case for fallback nutrition targets.
pub async fn seed_profile(pool: &PgPool, equipment: &[&str]) -> UserProfile {
    let equipment: Vec<String> = equipment.iter().map(|e| e.to_string()).collect();
    profiles::upsert_profile(
        pool,
        &ProfileInput {
            user_id: Uuid::new_v4(),
            display_name: "Test User",
            age: 30,
            sex: Sex::Female,
            height_cm: 165.0,
            weight_kg: 60.0,
            goal: FitnessGoal::Maintain,
            experience: ExperienceLevel::Beginner,
            equipment: &equipment,
            training_days_per_week: 3,
        },
    )
    .await
    .expect("failed to seed profile")
}
