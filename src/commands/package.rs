// src/commands/package.rs
//! `archivist package`

use super::print_problems;
use super::progress::TerminalSink;
use anyhow::{Context, Result};
use archivist::package::{package_tree, PackageOutcome, PackageScope};
use archivist::pipeline::{Phase, ProgressSink};
use archivist::PipelineConfig;
use std::path::Path;
use tracing::info;

/// Wrap, update or regenerate the packages under `path`
pub fn cmd_package(
    path: &Path,
    scope: Option<&str>,
    regenerate: bool,
    config: &PipelineConfig,
    quiet: bool,
) -> Result<()> {
    let scope = match scope {
        Some(scope) => PackageScope::parse(scope)?,
        None => config.package_scope,
    };
    info!(
        "Packaging {} (scope: {}, checksum: {})",
        path.display(),
        scope,
        config.checksum
    );

    let progress = TerminalSink::new(quiet).phase(Phase::Package);
    let report = package_tree(path, scope, config.checksum, regenerate, progress.as_ref())
        .with_context(|| format!("Packaging {} failed", path.display()))?;

    for (target, outcome) in &report.outcomes {
        match outcome {
            PackageOutcome::Wrapped { files } => {
                println!("Wrapped {} ({} file(s))", target.display(), files)
            }
            PackageOutcome::Updated { added } if added.is_empty() => {
                println!("Up to date {}", target.display())
            }
            PackageOutcome::Updated { added } => {
                println!("Updated {} (+{} file(s))", target.display(), added.len());
                if !quiet {
                    for file in added {
                        println!("  + {}", file);
                    }
                }
            }
            PackageOutcome::Regenerated { files } => {
                println!("Regenerated {} ({} file(s))", target.display(), files)
            }
        }
    }
    print_problems(
        "Packaging errors",
        report.errors.iter().map(|(p, e)| (p.as_path(), e)),
    );
    Ok(())
}
