//! CLI module for vidpress
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::adapters::toml_config::CliOverrides;

pub mod args;
pub mod commands;

/// vidpress video compression planner and container tools
#[derive(Parser, Debug)]
#[command(name = "vidpress")]
#[command(about = "vidpress - plan video compressions and prepare MP4 files for streaming")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Log level or filter directives (overrides config and VIDPRESS_LOG_LEVEL)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Configuration file (defaults to ./vidpress.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            log_level: self.log_level.clone(),
            json_logs: self.json_logs,
            max_concurrent_jobs: None,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute the encoding plan for a source
    Plan(args::PlanArgs),
    /// Move the MP4 index ahead of the media data
    Faststart(args::FaststartArgs),
    /// Print the effective configuration as TOML
    Config,
}
