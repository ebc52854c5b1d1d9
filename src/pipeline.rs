// src/pipeline.rs

//! End-to-end pipeline runs
//!
//! A full run is a strict sequence of phases, each finishing completely
//! before the next starts:
//!
//! 1. mirror the source into the destination
//! 2. normalize names in the destination
//! 3. convert
//! 4. remove directories emptied by conversion
//! 5. wrap or update packages (optional)

use crate::config::PipelineConfig;
use crate::convert::{convert_all, ConversionReport, ConvertOptions, Encoder};
use crate::error::{Error, Result};
use crate::media::{ClassFilter, PreservationProfile};
use crate::mirror::{mirror, MirrorReport};
use crate::naming::{normalize_tree, RenameReport};
use crate::package::{package_tree, PackageRunReport, PackageScope};
use crate::progress::ProgressTracker;
use crate::reaper::{reap_empty_dirs, ReapReport};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix stripped from source folder names when deriving a destination
const SOURCE_PREFIX: &str = "SIP_";

/// Pipeline phase, used to label progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Mirror,
    Rename,
    Convert,
    Reap,
    Package,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mirror => "mirror",
            Self::Rename => "rename",
            Self::Convert => "convert",
            Self::Reap => "cleanup",
            Self::Package => "package",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Hands out a progress tracker per phase
pub trait ProgressSink {
    fn phase(&self, phase: Phase) -> Box<dyn ProgressTracker>;
}

impl<F> ProgressSink for F
where
    F: Fn(Phase) -> Box<dyn ProgressTracker>,
{
    fn phase(&self, phase: Phase) -> Box<dyn ProgressTracker> {
        self(phase)
    }
}

/// Default destination for a source folder
///
/// A sibling named `AIP_<name>`, `DIP_<name>` or `CLONE_<name>`, where a
/// leading `SIP_` is dropped from the source name.
pub fn destination_for(source: &Path, profile: PreservationProfile) -> Result<PathBuf> {
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(source.display().to_string()))?;
    let base = base.strip_prefix(SOURCE_PREFIX).unwrap_or(&base);
    let name = format!("{}_{}", profile.destination_prefix(), base);
    Ok(match source.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    })
}

/// What to run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: PathBuf,
    /// Defaults to [`destination_for`]
    pub destination: Option<PathBuf>,
    pub profile: PreservationProfile,
    pub filter: ClassFilter,
    /// Package scope, or `None` to skip packaging
    pub package: Option<PackageScope>,
}

impl RunRequest {
    pub fn destination(&self) -> Result<PathBuf> {
        match &self.destination {
            Some(dest) => Ok(dest.clone()),
            None => destination_for(&self.source, self.profile),
        }
    }
}

/// Reports of a mirror-only run
#[derive(Debug)]
pub struct MirrorSummary {
    pub destination: PathBuf,
    pub mirror: MirrorReport,
    pub renamed: RenameReport,
}

/// Reports of every phase of a full run
#[derive(Debug)]
pub struct RunSummary {
    pub destination: PathBuf,
    pub mirror: MirrorReport,
    pub renamed: RenameReport,
    pub conversion: ConversionReport,
    pub reaped: ReapReport,
    pub packaging: Option<PackageRunReport>,
}

impl RunSummary {
    /// Per-file problems across all phases
    pub fn error_count(&self) -> usize {
        self.mirror.errors.len()
            + self.renamed.errors.len()
            + self.conversion.failed()
            + self.reaped.errors.len()
            + self.packaging.as_ref().map_or(0, |p| p.errors.len())
    }
}

/// Pipeline bound to a configuration and an encoder
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    encoder: &'a dyn Encoder,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig, encoder: &'a dyn Encoder) -> Self {
        Self { config, encoder }
    }

    /// Mirror the source and normalize the destination
    pub fn mirror(&self, request: &RunRequest, sink: &dyn ProgressSink) -> Result<MirrorSummary> {
        self.config.validate()?;
        let destination = request.destination()?;

        let mirror = {
            let progress = sink.phase(Phase::Mirror);
            mirror(
                &request.source,
                &destination,
                request.profile,
                &request.filter,
                progress.as_ref(),
            )?
        };
        let renamed = self.rename(&destination, sink);

        Ok(MirrorSummary {
            destination,
            mirror,
            renamed,
        })
    }

    /// Run every phase
    pub fn run(&self, request: &RunRequest, sink: &dyn ProgressSink) -> Result<RunSummary> {
        let MirrorSummary {
            destination,
            mirror,
            renamed,
        } = self.mirror(request, sink)?;

        let conversion = {
            let progress = sink.phase(Phase::Convert);
            convert_all(
                &destination,
                request.profile,
                &request.filter,
                self.encoder,
                &ConvertOptions::from_config(self.config),
                progress.as_ref(),
            )?
        };

        let reaped = {
            let progress = sink.phase(Phase::Reap);
            let report = reap_empty_dirs(&destination, progress.as_ref());
            progress.finish_with_message("cleanup complete");
            report
        };

        let packaging = match request.package {
            Some(scope) => {
                let progress = sink.phase(Phase::Package);
                Some(package_tree(
                    &destination,
                    scope,
                    self.config.checksum,
                    false,
                    progress.as_ref(),
                )?)
            }
            None => None,
        };

        let summary = RunSummary {
            destination,
            mirror,
            renamed,
            conversion,
            reaped,
            packaging,
        };
        info!(
            "Run finished for {}: {} converted, {} problem(s)",
            summary.destination.display(),
            summary.conversion.converted(),
            summary.error_count()
        );
        Ok(summary)
    }

    fn rename(&self, destination: &Path, sink: &dyn ProgressSink) -> RenameReport {
        let progress = sink.phase(Phase::Rename);
        let report = normalize_tree(destination, progress.as_ref());
        progress.finish_with_message("names normalized");
        report
    }
}
