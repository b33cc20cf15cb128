//! CrossVote - cross-environment vote aggregation
//!
//! Combines cat vs dog tallies from a local store and peer deployments,
//! tolerating failure of any subset of them.
//!
//! Exit codes:
//!   0 - Success (at least one source healthy, or server shut down cleanly)
//!   1 - Runtime error (configuration, bind failure, etc.)
//!   2 - Every configured source was unhealthy

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod report;
mod server;
mod sources;

use analysis::Aggregator;
use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::VoteOption;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("CrossVote v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("crossvote failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .crossvote.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to add sqlite or remote sources.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Build the aggregator and either serve or run one aggregation.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let aggregator = Aggregator::from_config(&config).context("Invalid source configuration")?;

    if args.serve {
        server::serve(&config, aggregator).await?;
        return Ok(0);
    }

    if let Some(vote) = args.vote {
        let option = VoteOption::from(vote);
        let stored_in = aggregator
            .record_vote(option)
            .await
            .with_context(|| format!("Failed to record vote for {}", option))?;
        if !args.quiet {
            eprintln!("🗳️  Recorded vote for {} in '{}'", option, stored_in);
        }
    }

    let spinner = (!args.quiet).then(|| query_spinner(aggregator.sources().count()));
    let summary = aggregator.aggregate().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&summary)?,
        OutputFormat::Text => report::generate_text_report(&summary),
    };

    match args.output {
        Some(ref path) => {
            report::write_report(&output, path)
                .with_context(|| format!("Failed to write summary to {}", path.display()))?;
            info!("Summary saved to {}", path.display());
        }
        None => println!("{}", output),
    }

    if summary.all_unhealthy() {
        eprintln!("\n⛔ No source answered; totals are empty (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

fn query_spinner(sources: usize) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Querying {} vote sources...", sources));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Load configuration from file or use defaults.
///
/// A config file that exists but cannot be read or parsed is fatal.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Ok(Config::load(config_path)?);
    }

    // Try default location
    match Config::load_default()? {
        Some(config) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}
