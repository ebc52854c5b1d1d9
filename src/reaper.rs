// src/reaper.rs

//! Removal of directories left empty by conversion

use crate::media::is_system_junk;
use crate::package::{is_package, PAYLOAD_DIR};
use crate::progress::ProgressTracker;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Result of a reaping pass
#[derive(Debug, Default)]
pub struct ReapReport {
    pub removed: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, String)>,
}

/// Remove every empty directory below `root`, deepest first
///
/// A directory holding nothing but system litter counts as empty. `root`
/// itself and the payload directory of a package are always kept.
pub fn reap_empty_dirs(root: &Path, progress: &dyn ProgressTracker) -> ReapReport {
    let mut report = ReapReport::default();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                report.errors.push((path, e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_dir() || is_protected(entry.path()) {
            continue;
        }

        match remove_if_empty(entry.path()) {
            Ok(true) => {
                debug!("Removed empty directory {}", entry.path().display());
                report.removed.push(entry.into_path());
                progress.increment(1);
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Failed to remove {}: {}", entry.path().display(), e);
                report.errors.push((entry.into_path(), e.to_string()));
            }
        }
    }

    if !report.removed.is_empty() {
        info!("Removed {} empty director(ies)", report.removed.len());
    }
    report
}

fn is_protected(dir: &Path) -> bool {
    dir.file_name().is_some_and(|n| n == PAYLOAD_DIR) && dir.parent().is_some_and(is_package)
}

fn remove_if_empty(dir: &Path) -> io::Result<bool> {
    let mut junk = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if entry.file_type()?.is_file() && is_system_junk(&name.to_string_lossy()) {
            junk.push(entry.path());
        } else {
            return Ok(false);
        }
    }
    for path in junk {
        fs::remove_file(path)?;
    }
    fs::remove_dir(dir)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::TAG_FILE_CONTENT;
    use crate::progress::SilentProgress;

    #[test]
    fn test_cascading_removal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::create_dir_all(root.join("keep")).unwrap();
        fs::write(root.join("keep/file.txt"), b"x").unwrap();
        fs::create_dir_all(root.join("junk_only")).unwrap();
        fs::write(root.join("junk_only/.DS_Store"), b"").unwrap();

        let report = reap_empty_dirs(root, &SilentProgress::new());

        assert!(report.errors.is_empty());
        assert!(!root.join("a").exists());
        assert!(!root.join("junk_only").exists());
        assert!(root.join("keep/file.txt").exists());
        assert!(root.exists());
        assert_eq!(report.removed.len(), 4);
    }

    #[test]
    fn test_keeps_package_payload() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("item/data/empty")).unwrap();
        fs::write(root.join("item/bagit.txt"), TAG_FILE_CONTENT).unwrap();

        reap_empty_dirs(root, &SilentProgress::new());

        assert!(root.join("item/data").is_dir());
        assert!(!root.join("item/data/empty").exists());
    }
}
