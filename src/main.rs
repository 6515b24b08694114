//! vidpress CLI
//!
//! Plans video compressions and prepares MP4 files for progressive playback.
//!
//! # Usage
//!
//! ```bash
//! vidpress plan --width 3840 --height 2160 --bitrate 8000000 --duration-ms 60000 --quality medium
//! vidpress plan --input clip.mp4 --resize limit:1280x720 --json   # with the `libav` feature
//! vidpress faststart --input recorded.mp4 --output streamable.mp4
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use vidpress::adapters::{init_tracing, AppConfig};
use vidpress::cli::{commands, Cli, Commands};

/// Main entry point for the vidpress CLI application
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref(), &cli.overrides()).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;
    debug!(?cli, "Parsed command line");

    match cli.command {
        Commands::Plan(args) => {
            info!("Executing plan command");
            commands::plan(args, &config).await?;
        }
        Commands::Faststart(args) => {
            info!("Executing faststart command");
            commands::faststart(args)?;
        }
        Commands::Config => commands::show_config(&config)?,
    }

    Ok(())
}
