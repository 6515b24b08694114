//! Command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::adapters::toml_config::AppConfig;
use crate::adapters::{FaststartAdapter, ScriptedMediaInfo};
use crate::cli::args::{FaststartArgs, PlanArgs};
use crate::domain::model::{EncodingPlan, SourceMetadata};
use crate::domain::rules::{BitratePlanner, PlanBuilder};
use crate::ports::{MediaInfoPort, RawMetadata, StreamFinalizer};
use crate::probe::MetadataProber;

/// What `plan` prints
#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub source: SourceMetadata,
    pub plan: EncodingPlan,
    pub estimated_size_mb: u64,
}

/// Execute the plan command
pub async fn plan(args: PlanArgs, config: &AppConfig) -> Result<()> {
    let configuration = args.configuration();
    configuration.validate(0)?;

    let (media_info, source) = metadata_source(&args)?;
    let prober = MetadataProber::new(media_info)
        .with_fallback_dimensions(config.compressor.fallback_width, config.compressor.fallback_height);
    let probed = prober.probe(&source, &configuration).await?;

    let planner = PlanBuilder::new(BitratePlanner::new(config.compressor.min_source_bitrate));
    let plan = planner.build(&probed.metadata, probed.window, &configuration)?;
    let report = PlanReport {
        source: probed.metadata,
        plan,
        estimated_size_mb: plan.estimated_size_mb(),
    };
    info!(width = plan.width, height = plan.height, bitrate = plan.bitrate, "Planned encoding");

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize plan to JSON")?;
        println!("{}", json);
    } else {
        display_plan(&report);
    }
    Ok(())
}

/// Metadata from the command line, or probed from `--input`
fn metadata_source(args: &PlanArgs) -> Result<(Arc<dyn MediaInfoPort>, PathBuf)> {
    let source = args.input.clone().unwrap_or_else(|| PathBuf::from("<command line>"));

    if args.has_metadata_flags() {
        let raw = RawMetadata {
            width: args.width.map(|w| w.to_string()),
            height: args.height.map(|h| h.to_string()),
            rotation: Some(args.rotation.unwrap_or(0).to_string()),
            bitrate: args.bitrate.map(|b| b.to_string()),
            duration_ms: args.duration_ms.map(|d| d.to_string()),
        };
        return Ok((Arc::new(ScriptedMediaInfo::from_raw(raw)), source));
    }

    let Some(input) = &args.input else {
        anyhow::bail!("either --input or the source metadata flags (--bitrate, --duration-ms, ...) are required");
    };
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    probe_input(input).map(|info| (info, source))
}

#[cfg(feature = "libav")]
fn probe_input(_input: &Path) -> Result<Arc<dyn MediaInfoPort>> {
    Ok(Arc::new(crate::adapters::LibavMediaInfo::new()?))
}

#[cfg(not(feature = "libav"))]
fn probe_input(input: &Path) -> Result<Arc<dyn MediaInfoPort>> {
    anyhow::bail!(
        "probing {} needs a build with the `libav` feature; pass --bitrate and --duration-ms instead",
        input.display()
    )
}

/// Execute the faststart command
pub fn faststart(args: FaststartArgs) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    let rewritten = FaststartAdapter::new()
        .rewrite(&args.input, &args.output)
        .with_context(|| format!("Failed to rewrite {}", args.input.display()))?;
    if !rewritten {
        anyhow::bail!(
            "{} cannot be prepared for streaming (missing or oversized moov/mdat)",
            args.input.display()
        );
    }

    info!(output = %args.output.display(), "Rewrote file for streaming");
    println!("{}", args.output.display());
    Ok(())
}

/// Execute the config command
pub fn show_config(config: &AppConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

/// Display the plan in human-readable format
fn display_plan(report: &PlanReport) {
    let plan = &report.plan;
    println!("Encoding Plan");
    println!("=============");
    println!(
        "Source: {}x{} @ {} bps, rotation {}, {:.3}s",
        report.source.width,
        report.source.height,
        report.source.bitrate,
        report.source.rotation,
        report.source.duration_us as f64 / 1_000_000.0
    );
    println!("Target: {}x{}", plan.width, plan.height);
    println!("Bitrate: {} bps", plan.bitrate);
    println!("Quality: {}", plan.quality);
    println!("Rotation: {}", plan.rotation);
    println!(
        "Window: {}us - {}us ({}s)",
        plan.window.start_us,
        plan.window.end_us,
        plan.window.clipped_seconds()
    );
    println!("Estimated size: {} MB", report.estimated_size_mb);
}
