// src/cli/mod.rs
//! CLI definitions for archivist
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `mirror` - Copy new material into the destination and normalize names
//! - `process` - Full run: mirror, convert, clean up, package
//! - `validate` - Check package fixity
//! - `rename` - Normalize names in place
//! - `package` - Wrap, update or regenerate packages

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "archivist")]
#[command(author = "Archivist Contributors")]
#[command(version)]
#[command(about = "Incremental preservation pipeline for personal media archives", long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only report warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options shared by the commands that mirror a source tree
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Source folder
    pub source: PathBuf,

    /// Destination folder (default: AIP_/DIP_/CLONE_ sibling of the source)
    #[arg(short, long, value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Preservation profile: archival (aip), distribution (dip), raw-clone
    #[arg(short, long, default_value = "archival")]
    pub profile: String,

    /// Media classes to include: all, or a list such as image,audio,dvd
    #[arg(short, long, default_value = "all")]
    pub classes: String,
}

#[derive(Subcommand)]
pub enum Commands {
    // =========================================================================
    // Pipeline
    // =========================================================================
    /// Copy new material from the source and normalize destination names
    Mirror {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Mirror, convert, remove emptied directories and package the result
    Process {
        #[command(flatten)]
        source: SourceArgs,

        /// What to wrap: each top-level item, or the destination root
        #[arg(long, value_name = "SCOPE")]
        package_scope: Option<String>,

        /// Skip the packaging phase
        #[arg(long, conflicts_with = "package_scope")]
        no_package: bool,
    },

    // =========================================================================
    // Packages
    // =========================================================================
    /// Validate a package, or every package directly under a folder
    Validate {
        /// Package or folder of packages
        path: PathBuf,

        /// Print a machine-readable report
        #[arg(long)]
        json: bool,
    },

    /// Wrap unwrapped items and record additions in wrapped ones
    Package {
        /// Destination folder
        path: PathBuf,

        /// What to wrap: each top-level item, or the folder itself
        #[arg(long, value_name = "SCOPE")]
        scope: Option<String>,

        /// Rebuild manifests from scratch instead of appending
        #[arg(long)]
        regenerate: bool,
    },

    // =========================================================================
    // Maintenance
    // =========================================================================
    /// Normalize every file and directory name below a folder
    Rename {
        /// Folder to normalize
        path: PathBuf,
    },
}
