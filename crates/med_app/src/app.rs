use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Subcommand};
use tracing::{debug, info};

use med_core::{resolve_all, Medication, MedicationId, Resolution};
use med_domain::pacing::PacingPolicy;
use med_domain::store::JsonFileStore;
use med_domain::synchronizer::{RebuildReport, RebuildTicket};
use med_domain::MedicationService;

use crate::console::ConsoleNotifier;

const DEFAULT_STORE_FILE: &str = "medications.json";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store_path: PathBuf,
    pub pacing: PacingPolicy,
    pub resync_on_start: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("MED_STORE_PATH") {
            if !path.trim().is_empty() {
                config.store_path = PathBuf::from(path.trim());
            }
        }
        if let Some(spacing) = read_secs("MED_PACING_SECS") {
            config.pacing = config.pacing.with_spacing(spacing);
        }
        if let Some(timeout) = read_secs("MED_SUBMIT_TIMEOUT_SECS") {
            if !timeout.is_zero() {
                config.pacing = config.pacing.with_submission_timeout(timeout);
            }
        }
        if let Ok(attempts) = std::env::var("MED_SUBMIT_ATTEMPTS") {
            if let Ok(value) = attempts.trim().parse::<u32>() {
                config.pacing = config.pacing.with_max_attempts(value);
            }
        }
        if let Ok(flag) = std::env::var("MED_RESYNC_ON_START") {
            if let Some(value) = parse_flag(&flag) {
                config.resync_on_start = value;
            }
        }
        debug!(?config, "configuration loaded");
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
            pacing: PacingPolicy::default(),
            resync_on_start: false,
        }
    }
}

fn read_secs(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;
    parse_secs(&raw)
}

fn parse_secs(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Schedule fields shared by `add` and `update`.
#[derive(Args, Clone, Debug)]
pub struct MedicationArgs {
    /// Medication name and dosage
    #[arg(short, long)]
    pub name: String,

    /// Reminder time (HH:MM, 24h); repeat for several times
    #[arg(short, long = "time", required = true)]
    pub times: Vec<String>,

    /// Remind every day
    #[arg(long, conflicts_with_all = ["days", "dates"])]
    pub everyday: bool,

    /// Weekdays, e.g. "Monday, Friday"
    #[arg(long, conflicts_with = "dates")]
    pub days: Option<String>,

    /// Specific date (YYYY-MM-DD); repeat for several dates
    #[arg(long = "date")]
    pub dates: Vec<String>,

    /// Script renewal reminder date (YYYY-MM-DD)
    #[arg(long)]
    pub script_date: Option<String>,

    /// Script renewal reminder time (HH:MM)
    #[arg(long)]
    pub script_time: Option<String>,
}

impl MedicationArgs {
    pub fn into_medication(self) -> Medication {
        let mut medication = Medication::new(self.name.trim())
            .with_times(self.times)
            .on_dates(self.dates);
        if self.everyday {
            medication = medication.everyday();
        } else if let Some(days) = self.days {
            medication = medication.with_frequency(days);
        }
        medication.script_date = self.script_date;
        medication.script_time = self.script_time;
        medication
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// List stored medications
    List,
    /// Add a medication and rebuild reminders
    Add(MedicationArgs),
    /// Replace a medication and rebuild reminders
    Update {
        id: MedicationId,
        #[command(flatten)]
        medication: MedicationArgs,
    },
    /// Delete a medication and rebuild reminders
    Delete { id: MedicationId },
    /// Show the reminders the current list resolves to, without scheduling
    Plan {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cancel and reschedule every reminder
    Rebuild,
}

pub async fn run(config: AppConfig, command: Command) -> Result<()> {
    info!(store = %config.store_path.display(), "opening medication store");
    let service = MedicationService::builder()
        .with_repository(Box::new(JsonFileStore::new(&config.store_path)))
        .with_notification_service(Arc::new(ConsoleNotifier::new()))
        .with_pacing(config.pacing)
        .resync_on_start(config.resync_on_start)
        .build()
        .context("starting medication service")?;

    let outcome = execute(&service, command).await;
    service.shutdown().await;
    outcome
}

async fn execute(service: &MedicationService, command: Command) -> Result<()> {
    match command {
        Command::List => {
            let medications = service.medications();
            if medications.is_empty() {
                println!("No medications stored.");
            }
            for medication in &medications {
                println!("{}", describe(medication));
            }
        }
        Command::Add(args) => {
            let mutation = service.add(args.into_medication())?;
            println!("Added {}", mutation.id);
            report_when_done(mutation.rebuild).await;
        }
        Command::Update { id, medication } => {
            let mutation = service.update(id, medication.into_medication())?;
            println!("Updated {}", mutation.id);
            report_when_done(mutation.rebuild).await;
        }
        Command::Delete { id } => {
            let mutation = service.delete(id)?;
            println!("Deleted {}", mutation.id);
            report_when_done(mutation.rebuild).await;
        }
        Command::Plan { json } => {
            let resolution = resolve_all(&service.medications(), &Local::now());
            if json {
                println!("{}", serde_json::to_string_pretty(&resolution.triggers)?);
            } else {
                print_plan(&resolution);
            }
        }
        Command::Rebuild => report_when_done(service.resync()).await,
    }
    Ok(())
}

async fn report_when_done(ticket: RebuildTicket) {
    match ticket.wait().await {
        Some(report) => print_report(&report),
        None => eprintln!("Reminder rebuild did not finish."),
    }
}

fn describe(medication: &Medication) -> String {
    let schedule = if medication.has_specific_dates() {
        format!("dates: {}", medication.specific_dates.join(", "))
    } else {
        format!("frequency: {}", medication.frequency_text().unwrap_or("-"))
    };
    let mut line = format!(
        "{}  {}  times: {}  {}",
        medication.id,
        medication.name,
        medication.times.join(", "),
        schedule
    );
    if let (Some(date), Some(time)) = (&medication.script_date, &medication.script_time) {
        line.push_str(&format!("  script: {date} {time}"));
    }
    line
}

fn print_plan(resolution: &Resolution) {
    if resolution.triggers.is_empty() {
        println!("Nothing to schedule.");
    }
    for trigger in &resolution.triggers {
        println!("{:<40} {}", trigger.schedule.to_string(), trigger.payload.body);
    }
    for diagnostic in &resolution.diagnostics {
        println!("skipped: {diagnostic}");
    }
}

fn print_report(report: &RebuildReport) {
    println!(
        "Scheduled {} of {} reminders (rebuild #{}).",
        report.submitted, report.planned, report.generation
    );
    for failure in &report.failures {
        println!(
            "  failed after {} attempt(s): {} ({})",
            failure.attempts, failure.trigger.schedule, failure.error
        );
    }
    for diagnostic in report.input_problems() {
        println!("  skipped: {diagnostic}");
    }
    if let Some(err) = &report.cancel_error {
        println!("  could not cancel earlier reminders: {err}");
    }
}
