// src/package/mod.rs

//! Fixity packages
//!
//! A package is a directory holding a tag file, an info file and one or
//! more payload manifests, with the content itself moved under `data/`:
//!
//! ```text
//! wedding/
//! ├── bagit.txt
//! ├── bag-info.txt
//! ├── manifest-sha256.txt
//! ├── metadata.json
//! ├── file-listing.json
//! └── data/
//!     ├── ceremony_ffv1.mkv
//!     └── photos/
//!         └── rings_tiff.tiff
//! ```
//!
//! Manifest paths are relative to `data/`. Wrapping, incremental updates and
//! wholesale regeneration all keep the manifest sorted and deterministic,
//! except that updates append new lines after the existing ones so the
//! prior manifest bytes stay untouched.

mod info;
mod manifest;
mod metadata;
mod validate;

pub use info::{ChangelogEntry, PackageInfo};
pub use manifest::{
    append_entries, payload_files, payload_key, MalformedLine, PackageManifest, PayloadListing,
};
pub use metadata::{
    merge_metadata, nested_metadata_files, FileListing, FileRecord, MetadataMerge, LISTING_FILE,
    METADATA_FILE,
};
pub use validate::{validate, validate_tree, Problem, ValidationReport};

use crate::error::{Error, Result};
use crate::hash::{hash_file, HashAlgorithm};
use crate::progress::ProgressTracker;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Tag file that marks a directory as a package
pub const TAG_FILE: &str = "bagit.txt";

/// Descriptive info file
pub const INFO_FILE: &str = "bag-info.txt";

/// Payload directory inside a package
pub const PAYLOAD_DIR: &str = "data";

/// Tag file contents
pub const TAG_FILE_CONTENT: &str = "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n";

/// Top-level files that stay beside the payload when wrapping
const KEPT_AT_ROOT: &[&str] = &[METADATA_FILE, LISTING_FILE];

/// Staging directory used while wrapping
const STAGING_DIR: &str = ".archivist-payload";

/// Check for a package bookkeeping file name
///
/// Covers the tag and info files, payload and tag manifests for any
/// algorithm (including the underscore spellings older tooling wrote) and
/// the item metadata files.
pub fn is_package_file(name: &str) -> bool {
    if name == TAG_FILE || name == INFO_FILE || name == "bag_info.txt" || KEPT_AT_ROOT.contains(&name) {
        return true;
    }
    let Some(stem) = name.strip_suffix(".txt") else {
        return false;
    };
    ["manifest-", "manifest_", "tagmanifest-", "tagmanifest_"]
        .iter()
        .filter_map(|prefix| stem.strip_prefix(prefix))
        .any(|alg| !alg.is_empty() && alg.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Check whether a directory is a package
pub fn is_package(dir: &Path) -> bool {
    dir.join(TAG_FILE).is_file()
}

/// Existing payload manifests of a package, preferred algorithm first
pub fn manifest_files(root: &Path) -> Vec<(HashAlgorithm, PathBuf)> {
    HashAlgorithm::all()
        .iter()
        .map(|alg| (*alg, root.join(alg.manifest_file_name())))
        .filter(|(_, path)| path.is_file())
        .collect()
}

/// Map a destination-relative path onto the filesystem
///
/// The outermost directory on the way down from `dest_root` (itself
/// included) that holds a tag file is the package; the rest of the path
/// goes under its payload directory. Tag files deeper inside a payload are
/// ordinary content.
pub fn payload_path(dest_root: &Path, relative: &Path) -> PathBuf {
    let components: Vec<Component<'_>> = relative
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();

    let mut dir = dest_root.to_path_buf();
    for depth in 0..components.len() {
        if is_package(&dir) {
            let remainder: PathBuf = components[depth..].iter().collect();
            return dir.join(PAYLOAD_DIR).join(remainder);
        }
        dir.push(components[depth]);
    }
    dest_root.join(relative)
}

/// Which directories a packaging pass wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageScope {
    /// Every top-level directory becomes its own package
    #[default]
    Items,
    /// The destination root is one package
    Root,
}

impl PackageScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::Root => "root",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "items" | "item" => Ok(Self::Items),
            "root" => Ok(Self::Root),
            other => Err(Error::Config(format!(
                "unknown package scope: {} (expected items or root)",
                other
            ))),
        }
    }
}

impl fmt::Display for PackageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a packaging pass did to one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    /// A plain directory was wrapped
    Wrapped { files: usize },
    /// New payload files were appended to an existing package
    Updated { added: Vec<String> },
    /// Every manifest was rebuilt from scratch
    Regenerated { files: usize },
}

/// Handle on an existing package
#[derive(Debug, Clone)]
pub struct Package {
    root: PathBuf,
}

impl Package {
    /// Open an existing package
    pub fn open(root: &Path) -> Result<Self> {
        if !is_package(root) {
            return Err(Error::NotAPackage(root.to_path_buf()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Wrap a plain directory into a package
    ///
    /// Nested `metadata.json` files are first folded into the item's own.
    /// Everything in `dir` except the item metadata files then moves under
    /// `data/`. The move goes through a staging directory, so content that
    /// is itself called `data` is handled. A staging directory left behind
    /// by an interrupted wrap is picked up again; if a move fails, the names
    /// moved by this call are put back.
    pub fn wrap(dir: &Path, algorithm: HashAlgorithm) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::SourceNotFound(dir.to_path_buf()));
        }
        if is_package(dir) {
            return Err(Error::AlreadyPackaged(dir.to_path_buf()));
        }

        if let Err(e) = merge_metadata(&dir.join(METADATA_FILE), dir, &nested_metadata_files(dir)) {
            warn!("Nested metadata of {} stays in the payload: {}", dir.display(), e);
        }

        let staging = dir.join(STAGING_DIR);
        if staging.is_dir() {
            warn!("Resuming interrupted wrap of {}", dir.display());
        } else {
            fs::create_dir(&staging)?;
        }
        let mut names: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name())
            .filter(|name| {
                let name = name.to_string_lossy();
                name != STAGING_DIR && !KEPT_AT_ROOT.contains(&&*name)
            })
            .collect();
        names.sort();

        let mut moved = Vec::with_capacity(names.len());
        for name in names {
            if let Err(e) = fs::rename(dir.join(&name), staging.join(&name)) {
                restore_staged(dir, &staging, &moved);
                return Err(e.into());
            }
            moved.push(name);
        }
        if let Err(e) = fs::rename(&staging, dir.join(PAYLOAD_DIR)) {
            restore_staged(dir, &staging, &moved);
            return Err(e.into());
        }

        let package = Self {
            root: dir.to_path_buf(),
        };
        let manifest = PackageManifest::build(&package.payload_dir(), algorithm)?;
        manifest.write(&package.root)?;
        fs::write(package.root.join(TAG_FILE), TAG_FILE_CONTENT)?;
        package.write_info(algorithm, None)?;
        package.write_listing()?;

        info!(
            "Wrapped {} ({} payload files, {})",
            dir.display(),
            manifest.len(),
            algorithm
        );
        Ok(package)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn payload_dir(&self) -> PathBuf {
        self.root.join(PAYLOAD_DIR)
    }

    /// Name used as the external identifier
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Algorithm of the preferred existing manifest
    pub fn primary_algorithm(&self) -> Option<HashAlgorithm> {
        manifest_files(&self.root).first().map(|(alg, _)| *alg)
    }

    /// Payload paths listed in any manifest
    fn tracked_paths(&self) -> Result<BTreeSet<String>> {
        let mut tracked = BTreeSet::new();
        for (algorithm, path) in manifest_files(&self.root) {
            let (manifest, _) = PackageManifest::read(&path, algorithm)?;
            tracked.extend(manifest.entries().map(|(p, _)| p.to_string()));
        }
        Ok(tracked)
    }

    /// Payload files listed in no manifest
    pub fn untracked_files(&self) -> Result<Vec<String>> {
        let tracked = self.tracked_paths()?;
        Ok(payload_files(&self.payload_dir())
            .into_files()?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| !tracked.contains(key))
            .collect())
    }

    /// Append entries for new payload files to every manifest
    ///
    /// New `metadata.json` files in the payload are folded into the item's
    /// own metadata instead of being listed. A package without any manifest
    /// gets a fresh one with `fallback` as algorithm.
    pub fn update(&self, fallback: HashAlgorithm) -> Result<Vec<String>> {
        if manifest_files(&self.root).is_empty() {
            let manifest = PackageManifest::build(&self.payload_dir(), fallback)?;
            manifest.write(&self.root)?;
            let added: Vec<String> = manifest.entries().map(|(p, _)| p.to_string()).collect();
            self.write_info(fallback, Some(added_lines(&added)))?;
            self.write_listing()?;
            return Ok(added);
        }

        let untracked = self.untracked_files()?;
        let untracked = self.fold_new_metadata(untracked);
        self.update_paths(&untracked)
    }

    /// Append manifest entries for the given payload-relative paths
    ///
    /// Paths some manifest already lists are left alone, and so are repeats
    /// within `paths`. Existing lines are never rewritten: entries for files
    /// that changed or disappeared stay as they are, for validation to
    /// report. Returns the paths actually added, in the order given.
    pub fn update_paths(&self, paths: &[String]) -> Result<Vec<String>> {
        let manifests = manifest_files(&self.root);
        let Some(&(primary, _)) = manifests.first() else {
            return Err(Error::MissingManifest(self.root.clone()));
        };

        let payload_dir = self.payload_dir();
        let mut tracked = self.tracked_paths()?;
        let mut added = Vec::new();
        for path in paths {
            if tracked.contains(path) {
                continue;
            }
            if !is_payload_relative(path) || !payload_dir.join(path).is_file() {
                return Err(Error::InvalidPath(path.clone()));
            }
            tracked.insert(path.clone());
            added.push(path.clone());
        }

        if added.is_empty() {
            debug!("{} is up to date", self.root.display());
            return Ok(added);
        }

        for (algorithm, path) in &manifests {
            let mut digests = Vec::with_capacity(added.len());
            for key in &added {
                digests.push((key.as_str(), hash_file(*algorithm, &payload_dir.join(key))?));
            }
            append_entries(path, digests.iter().map(|(k, d)| (*k, d.as_str())))?;
        }
        self.write_info(primary, Some(added_lines(&added)))?;
        self.write_listing()?;
        info!("Updated {}: {} new file(s)", self.root.display(), added.len());
        Ok(added)
    }

    /// Fold new payload `metadata.json` files into the item metadata
    ///
    /// Returns `untracked` without the files that were merged away.
    fn fold_new_metadata(&self, untracked: Vec<String>) -> Vec<String> {
        let payload_dir = self.payload_dir();
        let nested: Vec<PathBuf> = untracked
            .iter()
            .filter(|key| key.rsplit('/').next() == Some(METADATA_FILE))
            .map(|key| payload_dir.join(key))
            .collect();
        let merge = match merge_metadata(&self.root.join(METADATA_FILE), &payload_dir, &nested) {
            Ok(merge) => merge,
            Err(e) => {
                warn!("New metadata of {} stays in the payload: {}", self.root.display(), e);
                return untracked;
            }
        };
        untracked
            .into_iter()
            .filter(|key| !merge.merged.contains(key))
            .collect()
    }

    /// Replace every manifest with one freshly computed manifest
    pub fn regenerate(&self, algorithm: HashAlgorithm) -> Result<PackageManifest> {
        for (_, path) in manifest_files(&self.root) {
            fs::remove_file(&path)?;
        }
        let manifest = PackageManifest::build(&self.payload_dir(), algorithm)?;
        manifest.write(&self.root)?;
        self.write_info(
            algorithm,
            Some(vec![format!(
                "Regenerated: {} ({} files)",
                manifest.file_name(),
                manifest.len()
            )]),
        )?;
        self.write_listing()?;
        info!("Regenerated {} ({} files)", self.root.display(), manifest.len());
        Ok(manifest)
    }

    /// Validate this package
    pub fn validate(&self) -> ValidationReport {
        validate(&self.root)
    }

    /// Rewrite the info file from the current payload
    ///
    /// The original bagging date and changelog are kept; `changes` becomes a
    /// new changelog section when given and non-empty.
    fn write_info(&self, algorithm: HashAlgorithm, changes: Option<Vec<String>>) -> Result<()> {
        let info_path = self.root.join(INFO_FILE);
        let previous = fs::read_to_string(&info_path).ok().map(|c| PackageInfo::parse(&c));

        let files = payload_files(&self.payload_dir()).into_files()?;
        let mut sizes = Vec::with_capacity(files.len());
        for (key, path) in &files {
            sizes.push((key.as_str(), fs::metadata(path)?.len()));
        }

        let now = Utc::now();
        let mut info = PackageInfo::describe(self.name(), sizes, algorithm, now.date_naive());
        if let Some(previous) = previous {
            if previous.bagging_date.is_some() {
                info.bagging_date = previous.bagging_date;
            }
            info.changelog = previous.changelog;
        }
        if let Some(lines) = changes {
            info.record_update(now, lines);
        }
        fs::write(info_path, info.render())?;
        Ok(())
    }

    fn write_listing(&self) -> Result<()> {
        FileListing::build(self.name(), &self.payload_dir())?.write(&self.root)?;
        Ok(())
    }
}

/// Move names staged by a failed wrap back to the item root
fn restore_staged(dir: &Path, staging: &Path, moved: &[std::ffi::OsString]) {
    for name in moved.iter().rev() {
        if let Err(e) = fs::rename(staging.join(name), dir.join(name)) {
            warn!(
                "Failed to restore {} from {}: {}",
                name.to_string_lossy(),
                staging.display(),
                e
            );
        }
    }
    if let Err(e) = fs::remove_dir(staging) {
        debug!("Keeping {}: {}", staging.display(), e);
    }
}

/// A `/`-separated path of plain components
fn is_payload_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

fn added_lines(added: &[String]) -> Vec<String> {
    added.iter().map(|p| format!("Added: {}", p)).collect()
}

/// Directories a packaging pass works on
pub fn package_targets(root: &Path, scope: PackageScope) -> Result<Vec<PathBuf>> {
    match scope {
        PackageScope::Root => Ok(vec![root.to_path_buf()]),
        PackageScope::Items => {
            if is_package(root) {
                return Ok(vec![root.to_path_buf()]);
            }
            let mut items: Vec<PathBuf> = fs::read_dir(root)?
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
                .map(|e| e.path())
                .collect();
            items.sort();
            Ok(items)
        }
    }
}

/// Result of a packaging pass over a tree
#[derive(Debug, Default)]
pub struct PackageRunReport {
    pub outcomes: Vec<(PathBuf, PackageOutcome)>,
    pub errors: Vec<(PathBuf, Error)>,
}

impl PackageRunReport {
    pub fn wrapped(&self) -> usize {
        self.count(|o| matches!(o, PackageOutcome::Wrapped { .. }))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, PackageOutcome::Updated { .. }))
    }

    pub fn regenerated(&self) -> usize {
        self.count(|o| matches!(o, PackageOutcome::Regenerated { .. }))
    }

    fn count(&self, pred: impl Fn(&PackageOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Wrap, update or regenerate every package target below `root`
///
/// Plain directories are wrapped. Existing packages are updated, or have
/// their manifests rebuilt when `regenerate` is set. A failure on one
/// target is recorded and the pass moves on.
pub fn package_tree(
    root: &Path,
    scope: PackageScope,
    algorithm: HashAlgorithm,
    regenerate: bool,
    progress: &dyn ProgressTracker,
) -> Result<PackageRunReport> {
    if !root.is_dir() {
        return Err(Error::SourceNotFound(root.to_path_buf()));
    }

    let targets = package_targets(root, scope)?;
    progress.set_length(targets.len() as u64);
    let mut report = PackageRunReport::default();

    for target in targets {
        progress.set_message(&target.display().to_string());
        let outcome = if is_package(&target) {
            Package::open(&target).and_then(|package| {
                if regenerate {
                    let alg = package.primary_algorithm().unwrap_or(algorithm);
                    package
                        .regenerate(alg)
                        .map(|m| PackageOutcome::Regenerated { files: m.len() })
                } else {
                    package
                        .update(algorithm)
                        .map(|added| PackageOutcome::Updated { added })
                }
            })
        } else {
            Package::wrap(&target, algorithm).and_then(|package| {
                let files = payload_files(&package.payload_dir()).into_files()?.len();
                Ok(PackageOutcome::Wrapped { files })
            })
        };

        match outcome {
            Ok(outcome) => report.outcomes.push((target, outcome)),
            Err(e) => {
                warn!("Packaging {} failed: {}", target.display(), e);
                report.errors.push((target, e));
            }
        }
        progress.increment(1);
    }

    progress.finish_with_message("packaging complete");
    Ok(report)
}
