// src/commands/mirror.rs
//! `archivist mirror`

use super::progress::TerminalSink;
use super::{print_problems, run_request};
use crate::cli::SourceArgs;
use anyhow::{Context, Result};
use archivist::convert::CommandEncoder;
use archivist::pipeline::Pipeline;
use archivist::PipelineConfig;
use tracing::info;

/// Mirror a source folder into its destination and normalize names
pub fn cmd_mirror(args: &SourceArgs, config: &PipelineConfig, quiet: bool) -> Result<()> {
    let request = run_request(args, None)?;
    info!(
        "Mirroring {} ({}, classes: {})",
        request.source.display(),
        request.profile,
        request.filter
    );

    let encoder = CommandEncoder::new(config.encoders.clone(), config.timeouts.clone());
    let pipeline = Pipeline::new(config, &encoder);
    let summary = pipeline
        .mirror(&request, &TerminalSink::new(quiet))
        .with_context(|| format!("Mirror of {} failed", request.source.display()))?;

    let report = &summary.mirror;
    println!("Destination: {}", summary.destination.display());
    println!("  Mode: {:?}", report.mode);
    println!("  Copied: {}", report.copied());
    println!("  Already present: {}", report.skipped_existing());
    println!("  Filtered out: {}", report.skipped_type());
    println!("  Renamed: {}", summary.renamed.renamed.len());

    print_problems(
        "Mirror errors",
        report.errors.iter().map(|(p, e)| (p.as_path(), e)),
    );
    print_problems(
        "Rename errors",
        summary.renamed.errors.iter().map(|(p, e)| (p.as_path(), e)),
    );
    Ok(())
}
