//! # OAI harvester CLI (`oaih`)
//!
//! The `oaih` binary runs harvesting cycles over the providers declared in a
//! TOML configuration file, tracking per-endpoint history in an XML overview
//! between runs.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `oaih cycle` | Run a full cycle over every configured provider |
//! | `oaih endpoint <URI>` | Harvest one endpoint |
//! | `oaih status` | Print the endpoint overview |
//!
//! ## Examples
//!
//! ```bash
//! # Run a cycle with the overview's configured mode
//! oaih cycle --config ./harvest.toml
//!
//! # Refresh everything from scratch
//! oaih cycle --mode refresh
//!
//! # Retry yesterday's failures
//! oaih cycle --mode retry
//!
//! # Harvest one endpoint, selectively from a date
//! oaih endpoint https://repo.example.org/oai --config ./harvest.toml
//!
//! # Show attempt/harvest history
//! oaih status
//! ```
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | every endpoint succeeded or was intentionally skipped |
//! | 1 | one or more endpoints failed |
//! | 2 | configuration error |
//! | 3 | persistence error |

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::error;

use oai_harvest::action::ActionContext;
use oai_harvest::config;
use oai_harvest::cycle::Cycle;
use oai_harvest::error::HarvestError;
use oai_harvest::logging;
use oai_harvest::oai::OaiClient;
use oai_harvest::overview::HarvestMode;
use oai_harvest::transform::CommandEngine;
use oai_harvest::worker::{self, CycleSummary};

/// OAI harvester — batch retrieval, transformation and storage of OAI-PMH
/// metadata records.
#[derive(Parser)]
#[command(
    name = "oaih",
    about = "OAI harvester — batch retrieval, transformation and storage of OAI-PMH metadata records",
    version
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(long, global = true, default_value = "./harvest.toml")]
    config: PathBuf,

    /// Log at debug level.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full harvesting cycle over every configured provider.
    ///
    /// Endpoints are dispensed one by one; up to the overview's worker limit
    /// are harvested concurrently. Each attempt is recorded in the overview,
    /// successful or not.
    Cycle {
        /// Override the overview's harvest mode: normal, retry, or refresh.
        #[arg(long)]
        mode: Option<String>,

        /// Harvest selectively from this date (YYYY-MM-DD), overriding the
        /// per-endpoint request dates.
        #[arg(long)]
        from: Option<String>,
    },

    /// Harvest a single endpoint.
    ///
    /// The endpoint is looked up in the overview (and created if this is its
    /// first appearance); eligibility rules of the current mode still apply.
    Endpoint {
        /// Endpoint base URL. Must match a configured provider.
        uri: String,

        /// Overview group to file a newly created endpoint under.
        #[arg(long)]
        group: Option<String>,
    },

    /// Print the endpoint overview: flags and attempt/harvest history.
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    match execute(cli).await {
        Ok(summary) if summary.persistence_failure => 3,
        Ok(summary) if summary.failed > 0 => 1,
        Ok(_) => 0,
        Err(e) => {
            error!("{e}");
            match e {
                HarvestError::Config(_) => 2,
                HarvestError::Persistence(_) => 3,
                _ => 1,
            }
        }
    }
}

async fn execute(cli: Cli) -> Result<CycleSummary, HarvestError> {
    let config = config::load_config(&cli.config)?;
    let mut cycle = Cycle::load(config.overview.clone())?;

    if let Commands::Status = cli.command {
        print_status(&cycle);
        return Ok(CycleSummary::default());
    }

    let providers = config.providers()?;
    let sequences = config.sequences()?;
    if sequences.is_empty() {
        return Err(HarvestError::Config(
            "no action sequences configured".to_string(),
        ));
    }
    let ctx = ActionContext {
        engine: Arc::new(CommandEngine::new(config.xslt.processor.clone())),
    };
    let client = Arc::new(OaiClient::new()?);

    match cli.command {
        Commands::Cycle { mode, from } => {
            if let Some(mode) = mode {
                cycle.set_mode(parse_mode(&mode)?);
            }
            if let Some(from) = from {
                cycle.set_from(Some(parse_from(&from)?));
            }
            let cycle = Arc::new(Mutex::new(cycle));
            worker::run_cycle(&providers, &sequences, cycle, client, ctx).await
        }
        Commands::Endpoint { uri, group } => {
            let cycle = Arc::new(Mutex::new(cycle));
            worker::run_endpoint(
                &providers,
                &sequences,
                cycle,
                client,
                ctx,
                &uri,
                group.as_deref(),
            )
            .await
        }
        Commands::Status => unreachable!(),
    }
}

fn parse_mode(mode: &str) -> Result<HarvestMode, HarvestError> {
    match mode {
        "normal" => Ok(HarvestMode::Normal),
        "retry" => Ok(HarvestMode::Retry),
        "refresh" => Ok(HarvestMode::Refresh),
        other => Err(HarvestError::Config(format!(
            "unknown mode '{other}': expected normal, retry, or refresh"
        ))),
    }
}

fn parse_from(from: &str) -> Result<chrono::DateTime<chrono::Utc>, HarvestError> {
    let date = NaiveDate::parse_from_str(from, "%Y-%m-%d")
        .map_err(|e| HarvestError::Config(format!("invalid --from date '{from}': {e}")))?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc())
}

fn print_status(cycle: &Cycle) {
    let props = cycle.properties();
    println!(
        "mode: {:?}  scenario: {:?}  workers: {}",
        props.mode, props.scenario, props.workers
    );
    println!("{} endpoint(s)", cycle.endpoints().len());
    for ep in cycle.endpoints() {
        println!("{}", ep.uri);
        println!(
            "  group: {}  blocked: {}  retry: {}  incremental: {}",
            ep.group.as_deref().unwrap_or("-"),
            ep.blocked,
            ep.retry,
            ep.allow_incremental
        );
        println!(
            "  attempted: {}  harvested: {}",
            ep.attempted
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
            ep.harvested
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
        );
    }
}
