// src/mirror/mod.rs

//! Incremental mirroring of a source tree into a destination
//!
//! Two modes:
//! - **Full copy** when the destination does not exist yet: every selected
//!   file is copied under its source relative path.
//! - **Reconciliation** when it does: source files are renamed to their
//!   normalized names, and a file is copied only if neither its plain
//!   destination, its predicted converted output, nor (for DVD members) the
//!   DVD unit output exists. Existing destination files are never
//!   overwritten.
//!
//! Destination paths go through [`payload_path`], so files land in `data/`
//! once an item has been wrapped into a package.

use crate::error::{Error, Result};
use crate::media::{
    classify, is_system_junk, predict, predict_dvd, ClassFilter, MediaClass, PreservationProfile,
    VIDEO_TS,
};
use crate::naming::{normalize_relative, rename_if_free};
use crate::package::{is_package_file, payload_path, METADATA_FILE};
use crate::progress::ProgressTracker;
use filetime::FileTime;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// How the destination is populated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    FullCopy,
    Reconcile,
}

impl fmt::Display for MirrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullCopy => write!(f, "full copy"),
            Self::Reconcile => write!(f, "reconciliation"),
        }
    }
}

/// Decision taken for one source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAction {
    /// Copied to the destination
    Copy,
    /// Destination or its converted form already present
    SkipExists,
    /// Media class not selected
    SkipType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub action: MirrorAction,
}

/// Outcome of a mirror run
#[derive(Debug)]
pub struct MirrorReport {
    pub mode: MirrorMode,
    pub entries: Vec<MirrorEntry>,
    pub errors: Vec<(PathBuf, String)>,
}

impl MirrorReport {
    fn new(mode: MirrorMode) -> Self {
        Self {
            mode,
            entries: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn copied(&self) -> usize {
        self.count(MirrorAction::Copy)
    }

    pub fn skipped_existing(&self) -> usize {
        self.count(MirrorAction::SkipExists)
    }

    pub fn skipped_type(&self) -> usize {
        self.count(MirrorAction::SkipType)
    }

    fn count(&self, action: MirrorAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }
}

/// Hidden entries and system litter are invisible to the mirror
fn is_visible(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.depth() == 0 || !(name.starts_with('.') || is_system_junk(&name))
}

/// Package bookkeeping from an earlier packaging of the source is not copied
///
/// Descriptive `metadata.json` files are content and do get copied.
fn is_mirrored_file(name: &str) -> bool {
    name == METADATA_FILE || !is_package_file(name)
}

/// Number of progress steps a mirror of `source_root` takes
///
/// Directories plus the files that pass `filter`.
pub fn count_items(source_root: &Path, filter: &ClassFilter) -> u64 {
    WalkDir::new(source_root)
        .min_depth(1)
        .into_iter()
        .filter_entry(is_visible)
        .filter_map(|e| e.ok())
        .filter(|e| {
            if e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            is_mirrored_file(&name) && filter.admits_file(&name)
        })
        .count() as u64
}

/// Mirror `source_root` into `dest_root`
///
/// Fails only when the source is missing; per-file problems are recorded in
/// the report and the walk carries on.
pub fn mirror(
    source_root: &Path,
    dest_root: &Path,
    profile: PreservationProfile,
    filter: &ClassFilter,
    progress: &dyn ProgressTracker,
) -> Result<MirrorReport> {
    if !source_root.is_dir() {
        return Err(Error::SourceNotFound(source_root.to_path_buf()));
    }

    let mode = if dest_root.exists() {
        MirrorMode::Reconcile
    } else {
        MirrorMode::FullCopy
    };
    info!(
        "Mirroring {} -> {} ({})",
        source_root.display(),
        dest_root.display(),
        mode
    );

    progress.set_length(count_items(source_root, filter));
    let mut report = MirrorReport::new(mode);

    let walker = WalkDir::new(source_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(is_visible);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(source_root).to_path_buf();
                warn!("Cannot read {}: {}", path.display(), e);
                report.errors.push((path, e.to_string()));
                continue;
            }
        };

        if entry.file_type().is_dir() {
            progress.increment(1);
            continue;
        }
        if !entry.file_type().is_file() {
            debug!("Skipping special file {}", entry.path().display());
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_mirrored_file(&name) {
            continue;
        }
        if !filter.admits_file(&name) {
            report.entries.push(MirrorEntry {
                source_path: entry.path().to_path_buf(),
                destination_path: dest_root.join(relative_to(source_root, entry.path())),
                action: MirrorAction::SkipType,
            });
            continue;
        }

        let result = match mode {
            MirrorMode::FullCopy => copy_verbatim(source_root, dest_root, entry.path()),
            MirrorMode::Reconcile => reconcile_file(source_root, dest_root, entry.path(), profile),
        };
        match result {
            Ok(entry) => report.entries.push(entry),
            Err(e) => {
                warn!("Failed to mirror {}: {}", entry.path().display(), e);
                report.errors.push((entry.path().to_path_buf(), e.to_string()));
            }
        }
        progress.increment(1);
    }

    progress.finish_with_message("mirror complete");
    info!(
        "Mirror finished: {} copied, {} already present, {} not selected, {} error(s)",
        report.copied(),
        report.skipped_existing(),
        report.skipped_type(),
        report.errors.len()
    );
    Ok(report)
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

fn copy_verbatim(source_root: &Path, dest_root: &Path, source: &Path) -> io::Result<MirrorEntry> {
    let destination = dest_root.join(relative_to(source_root, source));
    copy_file(source, &destination)?;
    Ok(MirrorEntry {
        source_path: source.to_path_buf(),
        destination_path: destination,
        action: MirrorAction::Copy,
    })
}

fn reconcile_file(
    source_root: &Path,
    dest_root: &Path,
    source: &Path,
    profile: PreservationProfile,
) -> io::Result<MirrorEntry> {
    let source = rename_if_free(source)?;
    let relative = normalize_relative(&relative_to(source_root, &source));
    let destination = payload_path(dest_root, &relative);

    let action = if already_mirrored(&destination, profile) {
        debug!("Already present: {}", destination.display());
        MirrorAction::SkipExists
    } else if is_folded_metadata(dest_root, &relative, &destination) {
        debug!("Metadata already folded into its package: {}", destination.display());
        MirrorAction::SkipExists
    } else {
        copy_file(&source, &destination)?;
        MirrorAction::Copy
    };

    Ok(MirrorEntry {
        source_path: source,
        destination_path: destination,
        action,
    })
}

/// Whether a destination file, its converted form or its DVD unit output exists
fn already_mirrored(destination: &Path, profile: PreservationProfile) -> bool {
    if destination.exists() {
        return true;
    }
    let Some(name) = destination.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return false;
    };

    let predicted = destination.with_file_name(predict(&name, profile));
    if predicted != destination && predicted.exists() {
        return true;
    }

    if classify(&name) == MediaClass::Dvd {
        if let Some(output) = dvd_unit_output(destination, profile) {
            return output.exists();
        }
    }
    false
}

/// A `metadata.json` bound for a package payload
///
/// Wrapping folds nested metadata into the package root, so copying it
/// again would only be merged away once more.
fn is_folded_metadata(dest_root: &Path, relative: &Path, destination: &Path) -> bool {
    relative.file_name().is_some_and(|n| n == METADATA_FILE) && destination != dest_root.join(relative)
}

/// Output of the DVD unit a member file belongs to
fn dvd_unit_output(member: &Path, profile: PreservationProfile) -> Option<PathBuf> {
    let video_ts = member.parent()?;
    if video_ts.file_name()? != VIDEO_TS {
        return None;
    }
    let unit_parent = video_ts.parent()?;
    let parent_name = unit_parent.file_name()?.to_string_lossy();
    predict_dvd(&parent_name, profile).map(|name| unit_parent.join(name))
}

/// Copy one file, creating parent directories and keeping the mtime
fn copy_file(source: &Path, destination: &Path) -> io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, destination)?;

    let metadata = fs::metadata(source)?;
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(destination, mtime)?;
    Ok(())
}
