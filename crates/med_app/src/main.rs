use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use med_app::app::{run, AppConfig, Command};

#[derive(Parser, Debug)]
#[command(name = "medrem", version, about = "Medication reminder scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Medication store (overrides MED_STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Seconds between reminder submissions (overrides MED_PACING_SECS)
    #[arg(long, global = true)]
    pacing_secs: Option<u64>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = AppConfig::from_env().unwrap_or_default();
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    if let Some(secs) = cli.pacing_secs {
        config.pacing = config.pacing.with_spacing(Duration::from_secs(secs));
    }

    if let Err(err) = run(config, cli.command).await {
        eprintln!("medrem: {err:#}");
        std::process::exit(1);
    }
}
