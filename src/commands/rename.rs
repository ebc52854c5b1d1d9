// src/commands/rename.rs
//! `archivist rename`

use super::print_problems;
use super::progress::TerminalSink;
use anyhow::Result;
use archivist::naming::normalize_tree;
use archivist::pipeline::{Phase, ProgressSink};
use std::path::Path;

/// Normalize names below a folder
pub fn cmd_rename(path: &Path, quiet: bool) -> Result<()> {
    if !path.is_dir() {
        return Err(archivist::Error::SourceNotFound(path.to_path_buf()).into());
    }

    let progress = TerminalSink::new(quiet).phase(Phase::Rename);
    let report = normalize_tree(path, progress.as_ref());
    progress.finish_with_message("names normalized");

    println!("Renamed {} entr(ies) under {}", report.renamed.len(), path.display());
    if !quiet {
        for (old, new) in &report.renamed {
            println!("  {} -> {}", old.display(), new.display());
        }
    }
    print_problems(
        "Rename errors",
        report.errors.iter().map(|(p, e)| (p.as_path(), e)),
    );
    Ok(())
}
