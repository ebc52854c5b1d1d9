// src/naming.rs

//! Name normalization for preservation trees
//!
//! Archive trees arrive with names typed on every kind of system: accents,
//! quotes, ampersands, double spaces. `normalize` folds a name into a
//! lowercase, underscore separated form that survives any filesystem or
//! archive format, while keeping the extension exactly as it was.
//!
//! `normalize` is idempotent, so running the rename pass over an already
//! normalized tree renames nothing.

use crate::media::{is_system_junk, VIDEO_TS};
use crate::package::is_package_file;
use crate::progress::ProgressTracker;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

/// Stem used when nothing printable is left of a name
const EMPTY_STEM: &str = "unnamed";

/// Split a name into stem and extension
///
/// Only a trailing run of ASCII letters and digits after the last dot counts
/// as an extension, and a leading dot (hidden files) never does.
pub fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => {
            let extension = &name[idx + 1..];
            if extension.chars().all(|c| c.is_ascii_alphanumeric()) {
                (&name[..idx], Some(extension))
            } else {
                (name, None)
            }
        }
        _ => (name, None),
    }
}

/// Normalize a file or folder name
///
/// Package files and `VIDEO_TS` are structural names and come back unchanged.
pub fn normalize(name: &str) -> String {
    if is_package_file(name) || name == VIDEO_TS {
        return name.to_string();
    }

    let (stem, extension) = split_name(name);
    let mut normalized = normalize_stem(stem);
    if normalized.is_empty() {
        normalized.push_str(EMPTY_STEM);
    }
    if let Some(extension) = extension {
        normalized.push('.');
        normalized.push_str(extension);
    }
    normalized
}

fn normalize_stem(stem: &str) -> String {
    // Lowercasing can produce characters with decompositions of their own,
    // so fold twice.
    let lowered: String = fold_marks(stem).to_lowercase();
    let folded = fold_marks(&lowered);

    let mut out = String::with_capacity(folded.len());
    let mut separator = false;
    for c in folded.chars() {
        if c.is_alphanumeric() {
            if separator && !out.is_empty() {
                out.push('_');
            }
            separator = false;
            out.push(c);
        } else {
            separator = true;
        }
    }
    out
}

fn fold_marks(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Normalize every component of a relative path
pub fn normalize_relative(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(normalize(&name.to_string_lossy())),
            _ => None,
        })
        .collect()
}

/// Check whether a directory holds an entry with exactly this name
///
/// `Path::exists` cannot tell `A.jpg` from `a.jpg` on case-insensitive
/// filesystems.
fn has_entry_named(dir: &Path, name: &str) -> bool {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy() == name),
        Err(_) => false,
    }
}

/// Pick `<stem>_<n>.<ext>` that does not exist yet in `dir`
fn unique_name(dir: &Path, name: &str) -> String {
    let (stem, extension) = split_name(name);
    (1..)
        .map(|n| match extension {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        })
        .find(|candidate| !has_entry_named(dir, candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Rename a file or directory in place to its normalized name
///
/// Returns the path after the rename. Names that are already normalized are
/// left alone; a normalized name that is taken by another entry gets a
/// numeric suffix.
pub fn rename_to_normalized(path: &Path) -> io::Result<PathBuf> {
    rename_normalized(path, true)
}

/// Rename in place to the normalized name unless that name is already taken
///
/// Used while reconciling a source tree: an entry whose normalized name is
/// held by a sibling keeps its current name.
pub fn rename_if_free(path: &Path) -> io::Result<PathBuf> {
    rename_normalized(path, false)
}

fn rename_normalized(path: &Path, disambiguate: bool) -> io::Result<PathBuf> {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Ok(path.to_path_buf());
    };
    let name = name.to_string_lossy();
    let mut normalized = normalize(&name);
    if normalized == name {
        return Ok(path.to_path_buf());
    }
    if has_entry_named(parent, &normalized) {
        if !disambiguate {
            return Ok(path.to_path_buf());
        }
        normalized = unique_name(parent, &normalized);
    }

    let target = parent.join(&normalized);
    fs::rename(path, &target)?;
    debug!("Renamed {} -> {}", path.display(), normalized);
    Ok(target)
}

/// Result of a rename pass
#[derive(Debug, Default)]
pub struct RenameReport {
    /// (old path, new path) for every renamed entry
    pub renamed: Vec<(PathBuf, PathBuf)>,
    /// Entries that could not be renamed
    pub errors: Vec<(PathBuf, String)>,
}

/// Normalize every name below `root`, deepest entries first
///
/// Hidden files, system litter, package files and `VIDEO_TS` directories
/// keep their names. `root` itself is never renamed.
pub fn normalize_tree(root: &Path, progress: &dyn ProgressTracker) -> RenameReport {
    let mut report = RenameReport::default();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                warn!("Cannot read {}: {}", path.display(), e);
                report.errors.push((path, e.to_string()));
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy();
        progress.increment(1);
        if name.starts_with('.') || is_system_junk(&name) {
            continue;
        }

        match rename_to_normalized(entry.path()) {
            Ok(new_path) if new_path != entry.path() => {
                report.renamed.push((entry.path().to_path_buf(), new_path));
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to rename {}: {}", entry.path().display(), e);
                report.errors.push((entry.path().to_path_buf(), e.to_string()));
            }
        }
    }

    info!(
        "Normalized {} name(s) under {}",
        report.renamed.len(),
        root.display()
    );
    report
}
