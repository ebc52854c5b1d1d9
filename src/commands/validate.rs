// src/commands/validate.rs
//! `archivist validate`

use anyhow::{Context, Result};
use archivist::package::{validate_tree, ValidationReport};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct JsonSummary<'a> {
    path: &'a Path,
    valid: bool,
    packages: &'a [ValidationReport],
}

/// Validate packages and print a PASS/FAIL line for each
///
/// Returns whether every package passed.
pub fn cmd_validate(path: &Path, json: bool) -> Result<bool> {
    if !path.is_dir() {
        anyhow::bail!("Not a directory: {}", path.display());
    }

    let reports = validate_tree(path);
    let valid = reports.iter().all(ValidationReport::is_valid);

    if json {
        let summary = JsonSummary {
            path,
            valid,
            packages: &reports,
        };
        let out = serde_json::to_string_pretty(&summary).context("Failed to serialize report")?;
        println!("{}", out);
        return Ok(valid);
    }

    if reports.is_empty() {
        println!("No packages found under {}", path.display());
        return Ok(true);
    }

    for report in &reports {
        let status = if report.is_valid() { "PASS" } else { "FAIL" };
        println!(
            "[{}] {} ({} file(s) checked)",
            status,
            report.package.display(),
            report.files_checked
        );
        for problem in &report.problems {
            println!("    {}", problem);
        }
    }

    let failed = reports.iter().filter(|r| !r.is_valid()).count();
    println!();
    if failed == 0 {
        println!("All {} package(s) valid", reports.len());
    } else {
        println!("{} of {} package(s) failed validation", failed, reports.len());
    }
    Ok(valid)
}
