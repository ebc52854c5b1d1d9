// src/package/validate.rs

//! Fixity validation
//!
//! Validation never fails as an operation: every integrity problem becomes a
//! [`Problem`] in the report, and an empty problem list means the package
//! is intact.

use super::manifest::{payload_files, PackageManifest};
use super::{is_package, manifest_files, PAYLOAD_DIR, TAG_FILE};
use crate::hash::hash_file;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A single integrity problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    /// No tag file at the package root
    MissingTagFile,
    /// No payload manifest at all
    MissingManifest,
    /// A manifest line that could not be parsed
    MalformedManifestLine {
        manifest: String,
        line: usize,
        content: String,
    },
    /// Listed in a manifest but absent from the payload
    MissingFile { path: String },
    /// Present in the payload but listed in no manifest
    UntrackedFile { path: String },
    /// Digest differs from the manifest
    ChecksumMismatch {
        path: String,
        algorithm: String,
        expected: String,
        found: String,
    },
    /// A payload file or manifest could not be read
    Unreadable { path: String, reason: String },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTagFile => write!(f, "missing {}", TAG_FILE),
            Self::MissingManifest => write!(f, "no payload manifest"),
            Self::MalformedManifestLine { manifest, line, content } => {
                write!(f, "{}:{}: malformed line {:?}", manifest, line, content)
            }
            Self::MissingFile { path } => write!(f, "missing file: {}", path),
            Self::UntrackedFile { path } => write!(f, "untracked file: {}", path),
            Self::ChecksumMismatch {
                path,
                algorithm,
                expected,
                found,
            } => write!(
                f,
                "checksum mismatch: {} ({} expected {}, found {})",
                path, algorithm, expected, found
            ),
            Self::Unreadable { path, reason } => write!(f, "unreadable: {}: {}", path, reason),
        }
    }
}

/// Outcome of validating one package
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub package: PathBuf,
    /// Payload files whose digest was computed
    pub files_checked: usize,
    pub problems: Vec<Problem>,
}

impl ValidationReport {
    fn new(package: &Path) -> Self {
        Self {
            package: package.to_path_buf(),
            files_checked: 0,
            problems: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    /// Number of digest mismatches
    pub fn mismatches(&self) -> usize {
        self.problems
            .iter()
            .filter(|p| matches!(p, Problem::ChecksumMismatch { .. }))
            .count()
    }
}

/// Validate the package rooted at `root`
pub fn validate(root: &Path) -> ValidationReport {
    let mut report = ValidationReport::new(root);

    if !root.join(TAG_FILE).is_file() {
        report.problems.push(Problem::MissingTagFile);
    }

    let manifests = manifest_files(root);
    if manifests.is_empty() {
        report.problems.push(Problem::MissingManifest);
        return report;
    }

    let payload_dir = root.join(PAYLOAD_DIR);
    let listing = payload_files(&payload_dir);
    for (path, e) in &listing.unreadable {
        report.problems.push(Problem::Unreadable {
            path: path.clone(),
            reason: e.to_string(),
        });
    }
    let present: BTreeSet<&str> = listing.files.iter().map(|(key, _)| key.as_str()).collect();
    let mut tracked: BTreeSet<String> = BTreeSet::new();

    for (algorithm, manifest_path) in manifests {
        let manifest_name = algorithm.manifest_file_name();
        let (manifest, malformed) = match PackageManifest::read(&manifest_path, algorithm) {
            Ok(parsed) => parsed,
            Err(e) => {
                report.problems.push(Problem::Unreadable {
                    path: manifest_name,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        for line in malformed {
            report.problems.push(Problem::MalformedManifestLine {
                manifest: manifest_name.clone(),
                line: line.line,
                content: line.content,
            });
        }

        for (path, expected) in manifest.entries() {
            tracked.insert(path.to_string());
            if !present.contains(path) {
                report.problems.push(Problem::MissingFile {
                    path: path.to_string(),
                });
                continue;
            }

            match hash_file(algorithm, &payload_dir.join(path)) {
                Ok(found) => {
                    report.files_checked += 1;
                    if !found.eq_ignore_ascii_case(expected) {
                        report.problems.push(Problem::ChecksumMismatch {
                            path: path.to_string(),
                            algorithm: algorithm.to_string(),
                            expected: expected.to_string(),
                            found,
                        });
                    }
                }
                Err(e) => report.problems.push(Problem::Unreadable {
                    path: path.to_string(),
                    reason: e.to_string(),
                }),
            }
        }
    }

    for key in present {
        if !tracked.contains(key) {
            report.problems.push(Problem::UntrackedFile {
                path: key.to_string(),
            });
        }
    }

    if report.is_valid() {
        debug!("{} is valid ({} files)", root.display(), report.files_checked);
    } else {
        warn!(
            "{} has {} problem(s)",
            root.display(),
            report.problems.len()
        );
    }
    report
}

/// Validate `path` if it is a package, otherwise every directory directly below it
///
/// Directories below a non-package path that are not packages themselves
/// are reported with [`Problem::MissingTagFile`].
pub fn validate_tree(path: &Path) -> Vec<ValidationReport> {
    if is_package(path) {
        return vec![validate(path)];
    }

    let mut items: Vec<PathBuf> = match fs::read_dir(path) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| e.path())
            .collect(),
        Err(e) => {
            let mut report = ValidationReport::new(path);
            report.problems.push(Problem::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            });
            return vec![report];
        }
    };
    items.sort();

    if items.is_empty() {
        return vec![validate(path)];
    }
    items.iter().map(|item| validate(item)).collect()
}
