// src/commands/process.rs
//! `archivist process`

use super::progress::TerminalSink;
use super::{print_problems, run_request};
use crate::cli::SourceArgs;
use anyhow::{Context, Result};
use archivist::convert::{CommandEncoder, UnitStatus};
use archivist::package::PackageScope;
use archivist::pipeline::Pipeline;
use archivist::PipelineConfig;
use tracing::info;

/// Run the whole pipeline for one source folder
pub fn cmd_process(
    args: &SourceArgs,
    package_scope: Option<&str>,
    no_package: bool,
    config: &PipelineConfig,
    quiet: bool,
) -> Result<()> {
    let package = if no_package {
        None
    } else {
        Some(match package_scope {
            Some(scope) => PackageScope::parse(scope)?,
            None => config.package_scope,
        })
    };
    let request = run_request(args, package)?;
    info!(
        "Processing {} ({}, classes: {}, {} worker(s))",
        request.source.display(),
        request.profile,
        request.filter,
        config.worker_count()
    );

    let encoder = CommandEncoder::new(config.encoders.clone(), config.timeouts.clone());
    let pipeline = Pipeline::new(config, &encoder);
    let summary = pipeline
        .run(&request, &TerminalSink::new(quiet))
        .with_context(|| format!("Processing {} failed", request.source.display()))?;

    let conversion = &summary.conversion;
    println!("Destination: {}", summary.destination.display());
    println!(
        "  Mirror: {} copied, {} already present, {} filtered out",
        summary.mirror.copied(),
        summary.mirror.skipped_existing(),
        summary.mirror.skipped_type()
    );
    println!("  Renamed: {}", summary.renamed.renamed.len());
    println!(
        "  Conversion: {} converted, {} already done, {} not converted, {} failed",
        conversion.converted(),
        conversion.skipped_done(),
        conversion.skipped_unsupported(),
        conversion.failed()
    );
    println!("  Empty directories removed: {}", summary.reaped.removed.len());
    match &summary.packaging {
        Some(packaging) => println!(
            "  Packages: {} wrapped, {} updated",
            packaging.wrapped(),
            packaging.updated()
        ),
        None => println!("  Packages: skipped"),
    }

    if !quiet {
        for unit in &conversion.units {
            if let Ok(UnitStatus::SkippedUnsupported(reason)) = &unit.result {
                info!("Not converted: {} ({})", unit.path.display(), reason);
            }
        }
    }

    print_problems(
        "Mirror errors",
        summary.mirror.errors.iter().map(|(p, e)| (p.as_path(), e)),
    );
    print_problems(
        "Rename errors",
        summary.renamed.errors.iter().map(|(p, e)| (p.as_path(), e)),
    );
    print_problems("Conversion failures", conversion.failures());
    print_problems(
        "Cleanup errors",
        summary.reaped.errors.iter().map(|(p, e)| (p.as_path(), e)),
    );
    if let Some(packaging) = &summary.packaging {
        print_problems(
            "Packaging errors",
            packaging.errors.iter().map(|(p, e)| (p.as_path(), e)),
        );
    }

    if summary.error_count() > 0 {
        println!();
        println!(
            "Finished with {} problem(s); failed inputs were left in place for a re-run",
            summary.error_count()
        );
    }
    Ok(())
}
