//! Command-line interface for callflow.
//!
//! Diagnostic only: shows the resolved operation defaults and the error-code
//! catalogue. Operations themselves need a live channel and are driven from
//! library code.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config;
use crate::error::ErrorCode;

/// Log filter variable, in `EnvFilter` directive syntax
pub const ENV_LOG: &str = "CALLFLOW_LOG";

/// Build the log filter; an unset or unparsable value keeps the CLI quiet
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

/// callflow - correlated call-flow orchestrator
#[derive(Parser, Debug)]
#[command(name = "callflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show resolved configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List error codes and their message templates
    Codes,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Config { json } => show_config(json),
            Commands::Codes => list_codes(),
        }
    }
}

fn show_config(json: bool) -> Result<()> {
    let cfg = config::config()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&cfg.defaults)?);
        return Ok(());
    }

    let config_file = cfg
        .config_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none - using defaults)".to_string());
    let deadline = cfg
        .defaults
        .operation_deadline_secs
        .map(|secs| format!("{}s", secs))
        .unwrap_or_else(|| "(none - wait indefinitely)".to_string());

    println!("Config file: {}", config_file);
    println!();
    println!("Operation defaults:");
    println!("  Max call duration:  {}s", cfg.defaults.max_call_duration_secs);
    println!("  DTMF timeout:       {}s", cfg.defaults.dtmf_timeout_secs);
    println!("  Operation deadline: {}", deadline);

    Ok(())
}

fn list_codes() -> Result<()> {
    for code in ErrorCode::ALL {
        println!("{:<10} {}", code.as_str(), code.template());
    }
    Ok(())
}
