use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;

#[derive(Parser)]
#[command(author, version, about = "Self-healing element locator", long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// AutoHeal config file. Defaults to ./config/autoheal.yaml, then
    /// <config dir>/autoheal/config.yaml; built-in defaults when neither exists
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Minimum level for pipeline logs (error, warn, info, debug, trace).
    /// RUST_LOG takes precedence when set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Shorthand for --log-level debug: logs every probe, candidate and breaker transition
    #[arg(short, long)]
    pub debug: bool,

    /// Format of command reports on stdout
    #[arg(short, long, default_value = "human")]
    pub output: crate::cli::output::OutputFormat,

    /// Write stderr logs as JSON lines instead of plain text
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}
