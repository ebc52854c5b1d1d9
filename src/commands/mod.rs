// src/commands/mod.rs
//! Command implementations for archivist

mod mirror;
mod package;
mod process;
pub mod progress;
mod rename;
mod validate;

pub use mirror::cmd_mirror;
pub use package::cmd_package;
pub use process::cmd_process;
pub use rename::cmd_rename;
pub use validate::cmd_validate;

use crate::cli::SourceArgs;
use anyhow::{Context, Result};
use archivist::media::{ClassFilter, PreservationProfile};
use archivist::package::PackageScope;
use archivist::pipeline::RunRequest;
use archivist::PipelineConfig;
use std::path::Path;

/// Load and validate the run configuration
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    PipelineConfig::load(path).with_context(|| match path {
        Some(path) => format!("Invalid configuration {}", path.display()),
        None => "Invalid default configuration".to_string(),
    })
}

/// Turn the shared source options into a run request
fn run_request(args: &SourceArgs, package: Option<PackageScope>) -> Result<RunRequest> {
    let profile = PreservationProfile::parse(&args.profile)?;
    let filter = ClassFilter::parse_list(&args.classes)?;
    Ok(RunRequest {
        source: args.source.clone(),
        destination: args.dest.clone(),
        profile,
        filter,
        package,
    })
}

/// Print per-file problems below a summary
fn print_problems<'a, D>(title: &str, problems: impl IntoIterator<Item = (&'a Path, D)>)
where
    D: std::fmt::Display,
{
    let problems: Vec<_> = problems.into_iter().collect();
    if problems.is_empty() {
        return;
    }
    println!();
    println!("{} ({}):", title, problems.len());
    for (path, problem) in problems {
        println!("  {}: {}", path.display(), problem);
    }
}
