// src/main.rs
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use academy_core::{
    conflicts, current_period, period_by_number, period_history, summarize, AbsenceStanding,
    AttendanceEvent, CancellationWorkflow, ClassRecord, EngineConfig, FixedClock, InMemoryStore,
    LeaveBalance, PeriodLength, SystemClock, Teacher,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Operator tool for the academy period and attendance engine",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current period, or a numbered one
    Period {
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Period length in days; falls back to the configured default
        #[arg(long)]
        length: Option<u32>,
        #[arg(long)]
        number: Option<u32>,
    },
    /// List every period from the first through the current one
    History {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        length: Option<u32>,
    },
    /// Summarize a CSV of `date,status` attendance rows
    Summarize {
        csv: PathBuf,
    },
    /// Check whether two schedules collide
    Conflicts { a: String, b: String },
    /// Dry-run an approval against a throwaway in-memory class and teacher
    SimulateApproval {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        length: u32,
        #[arg(long, default_value_t = 0)]
        annual_leave: u32,
        #[arg(long, default_value_t = 0)]
        monthly_leave: u32,
        /// Cancelled dates, e.g. --date 2024-01-10 --date 2024-01-12
        #[arg(long = "date", required = true)]
        dates: Vec<NaiveDate>,
    },
}

fn read_events(path: &PathBuf) -> Result<Vec<AttendanceEvent>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    reader
        .deserialize()
        .collect::<Result<Vec<AttendanceEvent>, csv::Error>>()
        .with_context(|| format!("failed to parse attendance rows in {}", path.display()))
}

async fn simulate_approval(
    start: NaiveDate,
    length: PeriodLength,
    leave: LeaveBalance,
    dates: Vec<NaiveDate>,
) -> Result<()> {
    const CLASS_ID: u64 = 1;
    const TEACHER_ID: u64 = 1;
    const ADMIN_ID: u64 = 1;

    let store = Arc::new(InMemoryStore::new());
    store
        .put_class(ClassRecord {
            id: CLASS_ID,
            start_date: Some(start),
            period_length: Some(length),
            schedule_text: None,
        })
        .await;
    store.put_teacher(Teacher { id: TEACHER_ID, leave }).await;

    // Submission checks dates against "today"; pin it to the earliest date.
    let earliest = dates
        .iter()
        .min()
        .copied()
        .ok_or_else(|| anyhow!("at least one --date is required"))?;
    let workflow = CancellationWorkflow::with_clock(store, Arc::new(FixedClock::on(earliest)));

    let request = workflow
        .submit(CLASS_ID, TEACHER_ID, "simulated", dates)
        .await?;
    let outcome = workflow.approve(request.id, ADMIN_ID).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn load_config() -> Result<EngineConfig> {
    let config = EngineConfig::from_env().context("failed to read ACADEMY_* configuration")?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid engine configuration: {:#}", e);
            return Err(e);
        }
    };
    info!("Engine configuration loaded: {:?}", config);
    let bounds = config.period_bounds();

    match Cli::parse().command {
        Command::Period {
            start,
            length,
            number,
        } => {
            let length = bounds.resolve(length)?;
            let period = match (start, number) {
                (Some(start), Some(number)) => period_by_number(start, length, number)
                    .ok_or_else(|| anyhow!("period {} is out of range", number))?,
                (None, Some(_)) => return Err(anyhow!("--number requires --start")),
                (start, None) => current_period(start, length, &SystemClock),
            };
            println!("{}", period.label());
        }
        Command::History { start, length } => {
            let length = bounds.resolve(length)?;
            let current = current_period(Some(start), length, &SystemClock);
            for period in period_history(start, length, current.period_number) {
                println!("{}", period.label());
            }
        }
        Command::Summarize { csv } => {
            let events = read_events(&csv)?;
            let summary = summarize(&events);
            let standing = AbsenceStanding::evaluate(&summary, &config.absence_policy());
            println!("{}", serde_json::to_string_pretty(&summary)?);
            println!("{}", serde_json::to_string_pretty(&standing)?);
        }
        Command::Conflicts { a, b } => {
            println!("{}", conflicts(&a, &b));
        }
        Command::SimulateApproval {
            start,
            length,
            annual_leave,
            monthly_leave,
            dates,
        } => {
            let length = bounds.resolve(Some(length))?;
            simulate_approval(
                start,
                length,
                LeaveBalance::new(annual_leave, monthly_leave),
                dates,
            )
            .await?;
        }
    }

    Ok(())
}
