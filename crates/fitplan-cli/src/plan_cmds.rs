//! CLI handlers for `fitplan plan` subcommands.
//!
//! Implements:
//! - `fitplan plan generate <kind>` -- run the generation orchestrator
//! - `fitplan plan show <kind>`     -- print the current base or today's daily plan
//! - `fitplan plan status`          -- job state and recent attempts
//! - `fitplan plan fallback <kind>` -- preview the offline plan, no writes

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use fitplan_core::diagnostics::PgDiagnostics;
use fitplan_core::generator::OpenAiGenerator;
use fitplan_core::navigation::{Navigator, Route};
use fitplan_core::plan::fallback::fallback_payload;
use fitplan_core::presenter::{Alert, AlertAction, AlertKind, Presenter};
use fitplan_core::registry::JobResolution;
use fitplan_core::store::PgPlanStore;
use fitplan_core::{GenerationJob, GenerationOrchestrator, GenerationOutcome, RetryOutcome};
use fitplan_db::models::{GenerationStatus, PlanKind};
use fitplan_db::queries::{
    attempts as attempt_db, checkins as checkin_db, jobs as job_db, plans as plan_db,
    profiles as profile_db,
};

use crate::PlanCommands;
use crate::config::FitplanConfig;

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Dispatch a `PlanCommands` variant to the appropriate handler.
pub async fn run_plan_command(
    command: PlanCommands,
    pool: &PgPool,
    config: &FitplanConfig,
    user_id: Uuid,
) -> Result<()> {
    match command {
        PlanCommands::Generate {
            kind,
            force,
            fallback,
        } => cmd_generate(pool, config, user_id, kind, force, fallback).await,
        PlanCommands::Show { kind, json } => cmd_show(pool, user_id, kind, json).await,
        PlanCommands::Status { limit } => cmd_status(pool, user_id, limit).await,
        PlanCommands::Fallback { kind, date } => cmd_fallback(pool, user_id, kind, date).await,
    }
}

// -----------------------------------------------------------------------
// Terminal presenter / navigator
// -----------------------------------------------------------------------

/// Renders job progress on stderr and keeps the latest alert for the
/// prompt loop.
struct TerminalPresenter {
    kind: PlanKind,
    pending_alert: Mutex<Option<Alert>>,
}

impl TerminalPresenter {
    fn new(kind: PlanKind) -> Self {
        Self {
            kind,
            pending_alert: Mutex::new(None),
        }
    }

    fn take_alert(&self) -> Option<Alert> {
        self.pending_alert
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

impl Presenter for TerminalPresenter {
    fn job_updated(&self, job: &GenerationJob) {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "\r{}", render_progress(self.kind, job));
        if job.status != GenerationStatus::Pending {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    }

    fn slow_response(&self, message: &str) {
        eprintln!();
        eprintln!("{message}");
    }

    fn alert(&self, alert: Alert) {
        eprintln!();
        eprintln!("{}", alert.title);
        eprintln!("  {}", alert.message);
        *self
            .pending_alert
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(alert);
    }
}

fn render_progress(kind: PlanKind, job: &GenerationJob) -> String {
    match job.status {
        GenerationStatus::Pending => format!(
            "Generating {kind} plan... {}s (attempt {})",
            job.elapsed_seconds,
            job.attempt()
        ),
        GenerationStatus::Ready => format!("Generating {kind} plan... done"),
        GenerationStatus::Error => format!("Generating {kind} plan... failed"),
    }
}

/// Prints where the app would go and what to run to get there.
#[derive(Default)]
struct TerminalNavigator {
    current: Mutex<Option<Route>>,
}

impl TerminalNavigator {
    fn go(&self, route: &Route) {
        println!("-> {route}");
        if let Some(hint) = route_hint(route) {
            println!("   {hint}");
        }
        *self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(route.clone());
    }
}

#[async_trait]
impl Navigator for TerminalNavigator {
    async fn push(&self, route: &Route) -> Result<()> {
        self.go(route);
        Ok(())
    }

    async fn replace(&self, route: &Route) -> Result<()> {
        self.go(route);
        Ok(())
    }
}

fn route_hint(route: &Route) -> Option<&'static str> {
    match route {
        Route::Onboarding => Some("Set up your profile with `fitplan profile set`."),
        Route::CheckIn => Some("Record today's check-in with `fitplan checkin add`."),
        Route::BasePlan { .. } => Some("View it with `fitplan plan show base`."),
        Route::DailyPlan { .. } => Some("View it with `fitplan plan show daily`."),
        Route::Home | Route::Named(_) => None,
    }
}

/// Ask the user to pick one of the alert's actions.
///
/// Returns `None` on EOF or when stdin is not interactive.
fn prompt_action(alert: &Alert) -> Result<Option<AlertAction>> {
    if alert.actions.is_empty() || !io::stdin().is_terminal() {
        return Ok(None);
    }
    for (i, action) in alert.actions.iter().enumerate() {
        eprintln!("  [{}] {}", i + 1, action.label);
    }
    let stdin = io::stdin();
    loop {
        eprint!("Choose an option: ");
        io::stderr().flush().context("failed to flush stderr")?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("failed to read stdin")? == 0 {
            return Ok(None);
        }
        if let Some(action) = pick_action(alert, &line) {
            return Ok(Some(action.clone()));
        }
        eprintln!("Enter a number between 1 and {}.", alert.actions.len());
    }
}

/// Match a typed choice against an alert's actions by number or label.
fn pick_action<'a>(alert: &'a Alert, input: &str) -> Option<&'a AlertAction> {
    let input = input.trim();
    if let Ok(n) = input.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| alert.actions.get(i));
    }
    alert
        .actions
        .iter()
        .find(|a| a.label.eq_ignore_ascii_case(input))
}

// -----------------------------------------------------------------------
// fitplan plan generate <kind>
// -----------------------------------------------------------------------

async fn cmd_generate(
    pool: &PgPool,
    config: &FitplanConfig,
    user_id: Uuid,
    kind: PlanKind,
    force: bool,
    fallback: bool,
) -> Result<()> {
    let mut orchestrator_config = config.orchestrator.clone();
    if fallback {
        orchestrator_config.allow_fallback = true;
    }

    let generator = OpenAiGenerator::new(config.llm.clone())?;
    let presenter = Arc::new(TerminalPresenter::new(kind));
    let orchestrator = Arc::new(GenerationOrchestrator::new(
        Arc::new(PgPlanStore::new(pool.clone())),
        Arc::new(generator),
        Arc::new(TerminalNavigator::default()),
        Arc::new(PgDiagnostics::new(pool.clone())),
        orchestrator_config,
    ));
    let session = orchestrator
        .session(user_id, kind, presenter.clone())
        .with_force_regen(force);

    let run = session.generate_plan();
    tokio::pin!(run);
    let mut outcome = tokio::select! {
        outcome = &mut run => outcome,
        _ = tokio::signal::ctrl_c() => {
            session.unmount();
            eprintln!();
            eprintln!("Interrupted; letting the running job finish so its plan is kept...");
            run.await
        }
    };

    let mut last_failure: Option<Alert> = None;
    while let Some(alert) = presenter.take_alert() {
        if alert.kind == AlertKind::GenerationFailed {
            last_failure = Some(alert.clone());
        }
        let Some(action) = prompt_action(&alert)? else {
            break;
        };
        match session.handle_alert_action(&action.kind).await {
            Some(RetryOutcome::Accepted(next)) => outcome = next,
            // The wait alert is already queued by the session.
            Some(RetryOutcome::Rejected(_)) => {}
            // Wait acknowledged; offer the failure choices again.
            _ if alert.kind == AlertKind::RetryTooSoon => {
                if let Some(failure) = last_failure.clone() {
                    presenter.alert(failure);
                }
            }
            _ => {}
        }
    }

    println!("{}", describe_outcome(kind, &outcome));
    match outcome {
        GenerationOutcome::Failed(error)
        | GenerationOutcome::Joined(JobResolution::Failed(error)) => {
            bail!("{kind} plan generation failed: {error}")
        }
        GenerationOutcome::PreconditionFailed(error) => bail!("{error}"),
        _ => Ok(()),
    }
}

/// One-line summary of how a generation run ended.
fn describe_outcome(kind: PlanKind, outcome: &GenerationOutcome) -> String {
    match outcome {
        GenerationOutcome::Existing { route } => {
            format!("A {kind} plan already exists ({route}). Use --force to regenerate.")
        }
        GenerationOutcome::PreconditionFailed(error) => {
            format!("Cannot generate a {kind} plan: {error}")
        }
        GenerationOutcome::AlreadyRunning => {
            format!("A {kind} plan is already being generated.")
        }
        GenerationOutcome::Ready { plan_id } => format!("New {kind} plan {plan_id} is ready."),
        GenerationOutcome::FellBack { plan_id, error } => format!(
            "Generation failed ({error}); saved standard {kind} plan {plan_id} instead."
        ),
        GenerationOutcome::Joined(JobResolution::Ready { plan_id, source }) => {
            format!("Joined a running job; {kind} plan {plan_id} ({source}) is ready.")
        }
        GenerationOutcome::Joined(JobResolution::Failed(error))
        | GenerationOutcome::Failed(error) => {
            format!("Generating the {kind} plan failed: {error}")
        }
        GenerationOutcome::Detached {
            plan_id: Some(plan_id),
        } => format!("Detached; {kind} plan {plan_id} was saved in the background."),
        GenerationOutcome::Detached { plan_id: None } => {
            format!("Detached; no {kind} plan was saved.")
        }
    }
}

// -----------------------------------------------------------------------
// fitplan plan show <kind>
// -----------------------------------------------------------------------

async fn cmd_show(pool: &PgPool, user_id: Uuid, kind: PlanKind, json: bool) -> Result<()> {
    let (id, source, created_at, payload) = match kind {
        PlanKind::Base => {
            let plan = plan_db::get_current_base_plan(pool, user_id)
                .await?
                .context("no base plan yet; run `fitplan plan generate base`")?;
            (plan.id, plan.source, plan.created_at, plan.payload)
        }
        PlanKind::Daily => {
            let today = Utc::now().date_naive();
            let plan = plan_db::get_daily_plan_for_date(pool, user_id, today)
                .await?
                .with_context(|| {
                    format!("no daily plan for {today}; run `fitplan plan generate daily`")
                })?;
            (plan.id, plan.source, plan.created_at, plan.payload)
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to render plan")?
        );
        return Ok(());
    }

    println!("Plan: {kind} ({id})");
    println!("  Source:   {source}");
    println!("  Created:  {}", created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    print_payload_summary(&payload);
    Ok(())
}

fn print_payload_summary(payload: &Value) {
    if let Some(days) = payload.get("days").and_then(Value::as_object) {
        println!();
        println!("Days:");
        for (day, entry) in days {
            println!("  {day:<10} {}", day_focus(entry));
        }
    }
    if let Some(nutrition) = payload.get("nutrition") {
        println!();
        println!("Nutrition: {nutrition}");
    }
    if let Some(notes) = payload.get("notes").and_then(Value::as_str) {
        println!();
        println!("{notes}");
    }
}

/// Short description of one day's entry: its focus, or its type, or `-`.
fn day_focus(entry: &Value) -> &str {
    entry
        .get("focus")
        .or_else(|| entry.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("-")
}

// -----------------------------------------------------------------------
// fitplan plan status
// -----------------------------------------------------------------------

async fn cmd_status(pool: &PgPool, user_id: Uuid, limit: i64) -> Result<()> {
    let jobs = job_db::list_job_states(pool, user_id).await?;
    if jobs.is_empty() {
        println!("No generation jobs recorded.");
    } else {
        println!("Jobs:");
        for job in &jobs {
            println!(
                "  {:<6} {:<8} attempt {} ({})",
                job.kind.to_string(),
                job.status.to_string(),
                job.attempt,
                job.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(ref err) = job.last_error {
                println!("         last error: {err}");
            }
        }
    }

    let attempts = attempt_db::list_recent_attempts(pool, user_id, limit).await?;
    if !attempts.is_empty() {
        println!();
        println!("Recent attempts:");
        for a in &attempts {
            let result = if a.success { "ok" } else { "failed" };
            let fallback = if a.used_fallback { " (fallback)" } else { "" };
            println!(
                "  {} {:<6} #{} {}{} in {}ms",
                a.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                a.kind.to_string(),
                a.attempt,
                result,
                fallback,
                a.elapsed_ms
            );
            if let Some(ref err) = a.error {
                let stage = a.error_stage.as_deref().unwrap_or("unknown");
                println!("      [{stage}] {err}");
            }
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------
// fitplan plan fallback <kind>
// -----------------------------------------------------------------------

async fn cmd_fallback(
    pool: &PgPool,
    user_id: Uuid,
    kind: PlanKind,
    date: Option<NaiveDate>,
) -> Result<()> {
    let plan_date = date.unwrap_or_else(|| Utc::now().date_naive());
    let profile = profile_db::get_profile(pool, user_id)
        .await?
        .with_context(|| format!("no profile for user {user_id}; run `fitplan profile set`"))?;
    let latest = checkin_db::list_recent_checkins(pool, user_id, 1).await?;
    let checkin = latest.first().filter(|c| c.checkin_date == plan_date);

    let payload = fallback_payload(kind, &profile, checkin, plan_date);
    println!(
        "{}",
        serde_json::to_string_pretty(payload.as_value()).context("failed to render plan")?
    );
    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
