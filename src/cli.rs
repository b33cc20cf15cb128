//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::VoteOption;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// CrossVote - combined cat vs dog results across deployments
///
/// Queries every configured vote source (local store and peer
/// deployments) concurrently and reports the combined tally along with
/// the health of each source.
///
/// Examples:
///   crossvote
///   crossvote --config hybrid.toml --format json
///   crossvote --vote cat
///   crossvote --serve --bind 0.0.0.0:5001
///   crossvote --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .crossvote.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "CROSSVOTE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run the HTTP server instead of a one-shot aggregation
    #[arg(long)]
    pub serve: bool,

    /// Address for the HTTP server (overrides server.bind)
    #[arg(long, value_name = "ADDR", env = "CROSSVOTE_BIND")]
    pub bind: Option<String>,

    /// Id of this deployment (overrides general.instance)
    #[arg(long, value_name = "ID", env = "CROSSVOTE_INSTANCE")]
    pub instance: Option<String>,

    /// Per-source timeout in seconds for every source
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Record one vote through the writable source before aggregating
    #[arg(long, value_name = "OPTION")]
    pub vote: Option<VoteArg>,

    /// Output format (text, json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the summary to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .crossvote.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the one-shot summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain-text table (default)
    #[default]
    Text,
    /// The `/analytics` JSON document
    Json,
}

/// Vote choice accepted by --vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VoteArg {
    Cat,
    Dog,
}

impl From<VoteArg> for VoteOption {
    fn from(arg: VoteArg) -> Self {
        match arg {
            VoteArg::Cat => VoteOption::Cat,
            VoteArg::Dog => VoteOption::Dog,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref bind) = self.bind {
            if bind.parse::<SocketAddr>().is_err() {
                return Err(format!("Invalid bind address: {}", bind));
            }
        }

        if let Some(ref instance) = self.instance {
            if instance.trim().is_empty() {
                return Err("Instance id must not be empty".to_string());
            }
        }

        if self.serve && (self.vote.is_some() || self.output.is_some()) {
            return Err("--vote and --output cannot be combined with --serve".to_string());
        }

        if let Some(ref config_path) = self.config {
            if !config_path.is_file() {
                return Err(format!(
                    "Config file does not exist: {}",
                    config_path.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
