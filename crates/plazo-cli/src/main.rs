mod display;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use plazo_core::{CaseRecord, Config};
use plazo_deadlines::{
    CaseLifecycleController, DeadlineCalculator, DeadlineScheduler, SweepRunner, TokioDelayQueue,
};
use plazo_store::{CaseStore, DuckCaseStore};
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "plazo", version, about = "Statutory response deadlines for petitions")]
struct Cli {
    /// JSON configuration file; built-in defaults when omitted.
    #[arg(long, global = true, env = "PLAZO_CONFIG")]
    config: Option<PathBuf>,

    /// DuckDB case database.
    #[arg(long, global = true, env = "PLAZO_DB", default_value = "plazo.duckdb")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the observed holidays of a year.
    Holidays {
        /// Defaults to the current year.
        year: Option<i32>,
    },
    /// Is the date a business day?
    IsBusinessDay { date: NaiveDate },
    /// Business days after `from` up to and including `to`.
    Between { from: NaiveDate, to: NaiveDate },
    /// Move `days` business days from `from` (negative goes back).
    Add {
        from: NaiveDate,
        #[arg(allow_negative_numbers = true)]
        days: i32,
    },
    /// Check whether a notification came within the legal window.
    Notification {
        event: NaiveDate,
        notified: NaiveDate,
        /// Overrides the configured window.
        #[arg(long)]
        window: Option<u32>,
    },
    /// Warning and response deadline for a submission date.
    Deadlines { submission: NaiveDate },
    /// File a new case and record its deadline.
    Submit {
        case_id: String,
        /// Submission instant (RFC 3339); defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Record the authority's answer for a case.
    Respond {
        case_id: String,
        #[arg(long)]
        details: Option<String>,
    },
    /// Show a case and its audit trail.
    Show { case_id: String },
    /// Escalate every overdue open case once.
    Sweep,
    /// Schedule triggers for open cases and sweep on every tick until Ctrl-C.
    Worker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    let clock = config.clock()?;
    let calculator = DeadlineCalculator::new(clock.clone(), &config.policy);

    match cli.command {
        Command::Holidays { year } => {
            let year = year.unwrap_or_else(|| Utc::now().year());
            let entries = clock.calendar().holidays_for_year(year)?;
            print!("{}", display::holiday_table(year, &entries));
        }
        Command::IsBusinessDay { date } => {
            let business = clock.is_business_day(date)?;
            println!("{date} {}", display::yes_no(business));
        }
        Command::Between { from, to } => {
            println!("{}", clock.business_days_between(from, to)?);
        }
        Command::Add { from, days } => {
            println!("{}", clock.add_business_days(from, days)?);
        }
        Command::Notification {
            event,
            notified,
            window,
        } => {
            let window = window.unwrap_or(config.policy.notification_window_days);
            let check = clock.notification_check(event, notified, window)?;
            print!("{}", display::notification_card(event, notified, &check));
        }
        Command::Deadlines { submission } => {
            let dates = calculator.compute(submission)?;
            print!("{}", display::deadline_card(submission, &dates));
        }
        Command::Submit { case_id, at } => {
            let (store, _) = open_store(&cli.db, &config, &calculator)?;
            let at = at.unwrap_or_else(Utc::now);
            let submission = at.date_naive();
            let dates = calculator.compute(submission)?;
            store
                .insert_case(&CaseRecord::submitted(&case_id, at, Some(dates.deadline_date)))
                .await?;
            info!(case_id = %case_id, deadline = %dates.deadline_date, "case filed");
            print!("{}", display::deadline_card(submission, &dates));
        }
        Command::Respond { case_id, details } => {
            let (_, controller) = open_store(&cli.db, &config, &calculator)?;
            let outcome = controller
                .on_response_received(&case_id, Utc::now(), details)
                .await?;
            println!("{}", display::outcome_line(&case_id, &outcome));
        }
        Command::Show { case_id } => {
            let (store, _) = open_store(&cli.db, &config, &calculator)?;
            let case = store.get_case(&case_id).await?;
            let events = store.events(&case_id).await?;
            print!("{}", display::case_card(&case, &events));
        }
        Command::Sweep => {
            let (_, controller) = open_store(&cli.db, &config, &calculator)?;
            let report = controller.sweep(Utc::now()).await?;
            print!("{}", display::sweep_summary(&report));
        }
        Command::Worker => {
            let (_, controller) = open_store(&cli.db, &config, &calculator)?;
            run_worker(controller, calculator, &config).await?;
        }
    }
    Ok(())
}

fn open_store(
    db: &Path,
    config: &Config,
    calculator: &DeadlineCalculator,
) -> anyhow::Result<(Arc<DuckCaseStore>, Arc<CaseLifecycleController>)> {
    let store = Arc::new(
        DuckCaseStore::open_persistent(db)
            .with_context(|| format!("opening case database {}", db.display()))?,
    );
    let controller = Arc::new(CaseLifecycleController::new(
        store.clone(),
        calculator.clone(),
        config.policy.warning_lead_days,
        config.runtime.store_timeout(),
    ));
    Ok((store, controller))
}

async fn run_worker(
    controller: Arc<CaseLifecycleController>,
    calculator: DeadlineCalculator,
    config: &Config,
) -> anyhow::Result<()> {
    let queue = Arc::new(TokioDelayQueue::new(
        controller.clone(),
        config.runtime.max_attempts,
        config.runtime.retry_backoff(),
    ));
    let scheduler = DeadlineScheduler::new(calculator, queue.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner =
        SweepRunner::new(controller, config.runtime.sweep_interval()).with_scheduler(scheduler);
    let sweeps = tokio::spawn(async move { runner.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!(pending = queue.pending().len(), "shutting down");
    shutdown_tx.send(true)?;
    let completed = sweeps.await?;
    queue.shutdown();
    println!("{completed} sweeps completed");
    Ok(())
}
