// src/package/metadata.rs

//! Item metadata files kept at the package root
//!
//! - `metadata.json` holds descriptive metadata. Nested `metadata.json`
//!   files found in an item are folded into it, keyed by the directory they
//!   came from, and then removed from the content.
//! - `file-listing.json` lists every payload file with its size and
//!   timestamps. It is rewritten whenever the payload changes.
//!
//! Neither file is payload, so neither appears in a manifest.

use super::manifest::payload_files;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Descriptive metadata file
pub const METADATA_FILE: &str = "metadata.json";

/// Per-item file listing
pub const LISTING_FILE: &str = "file-listing.json";

/// One payload file in the listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Payload-relative path, as written in the manifest
    pub name: String,
    pub size: u64,
    /// `None` where the filesystem keeps no creation time
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Every payload file of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub item: String,
    pub generated: DateTime<Utc>,
    pub files: Vec<FileRecord>,
}

impl FileListing {
    /// Describe every file below `payload_dir`, sorted by path
    pub fn build(item: impl Into<String>, payload_dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for (name, path) in payload_files(payload_dir).into_files()? {
            let metadata = fs::metadata(&path)?;
            files.push(FileRecord {
                name,
                size: metadata.len(),
                created: metadata.created().ok().map(DateTime::<Utc>::from),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        Ok(Self {
            item: item.into(),
            generated: Utc::now(),
            files,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write into `package_root`, returning the file path
    pub fn write(&self, package_root: &Path) -> Result<PathBuf> {
        let path = package_root.join(LISTING_FILE);
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        fs::write(&path, json)?;
        Ok(path)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Outcome of folding nested metadata files into the root one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataMerge {
    /// Merged and removed, relative to the merge base
    pub merged: Vec<String>,
    /// Left in place, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Nested `metadata.json` files below `dir`, not counting `dir`'s own
///
/// Hidden directories are not entered.
pub fn nested_metadata_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == METADATA_FILE)
        .map(|e| e.into_path())
        .collect()
}

/// Fold `nested` metadata files into `root_file`
///
/// Each nested document must be a JSON object. Its keys are merged into the
/// root document under the path of its directory relative to `base`
/// (`trip/day1/metadata.json` lands in `root["trip"]["day1"]`), and nested
/// keys win over existing ones. The root file is written before any nested
/// file is removed. Nested files that do not parse are left where they are.
///
/// A root file that exists but is not a JSON object is an error, and
/// nothing is merged.
pub fn merge_metadata(root_file: &Path, base: &Path, nested: &[PathBuf]) -> Result<MetadataMerge> {
    let mut report = MetadataMerge::default();
    if nested.is_empty() {
        return Ok(report);
    }

    let mut root = match fs::read_to_string(root_file) {
        Ok(content) if content.trim().is_empty() => Map::new(),
        Ok(content) => parse_object(&content).map_err(|reason| Error::InvalidMetadata {
            path: root_file.to_path_buf(),
            reason,
        })?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Map::new(),
        Err(e) => return Err(e.into()),
    };

    let mut merged_files = Vec::new();
    for path in nested {
        let relative = path.strip_prefix(base).unwrap_or(path);
        let shown = relative_string(relative);
        let keys: Vec<String> = relative
            .parent()
            .map(|dir| {
                dir.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        let document = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| parse_object(&content))
            .and_then(|document| insert_at(&mut root, &keys, document));
        match document {
            Ok(()) => {
                debug!("Merged {} into {}", path.display(), root_file.display());
                report.merged.push(shown);
                merged_files.push(path);
            }
            Err(reason) => {
                warn!("Leaving {} in place: {}", path.display(), reason);
                report.skipped.push((shown, reason));
            }
        }
    }

    if merged_files.is_empty() {
        return Ok(report);
    }

    let mut json = serde_json::to_string_pretty(&Value::Object(root))?;
    json.push('\n');
    fs::write(root_file, json)?;
    for path in merged_files {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove merged {}: {}", path.display(), e);
        }
    }
    info!(
        "Merged {} metadata file(s) into {}",
        report.merged.len(),
        root_file.display()
    );
    Ok(report)
}

fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parse a JSON object, dropping stray control characters first
fn parse_object(content: &str) -> std::result::Result<Map<String, Value>, String> {
    let cleaned: String = content
        .chars()
        .filter(|c| *c >= ' ' || matches!(c, '\n' | '\r' | '\t'))
        .collect();
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("not a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Merge `document` into `root` below `keys`, creating objects on the way
fn insert_at(
    root: &mut Map<String, Value>,
    keys: &[String],
    document: Map<String, Value>,
) -> std::result::Result<(), String> {
    let mut level = root;
    for key in keys {
        let entry = level
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        level = match entry {
            Value::Object(map) => map,
            _ => return Err(format!("key {:?} already holds a non-object value", key)),
        };
    }
    level.extend(document);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_listing_describes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("data");
        write(&payload.join("b.txt"), "bb");
        write(&payload.join("sub/a.txt"), "a");
        write(&payload.join(".DS_Store"), "junk");

        let listing = FileListing::build("item", &payload).unwrap();
        let names: Vec<&str> = listing.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "sub/a.txt"]);
        assert_eq!(listing.files[0].size, 2);
        assert!(listing.files.iter().all(|f| f.modified.is_some()));
        assert_eq!(listing.total_bytes(), 3);

        let path = listing.write(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(LISTING_FILE));
        assert_eq!(FileListing::read(&path).unwrap(), listing);
    }

    #[test]
    fn test_merge_nested_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        let item = dir.path();
        write(&item.join("metadata.json"), r#"{"title": "Family", "trip": {"year": 1999}}"#);
        write(&item.join("trip/metadata.json"), r#"{"place": "Coast"}"#);
        write(&item.join("trip/day1/metadata.json"), "{\"note\": \"sun\u{1}ny\"}");
        write(&item.join("party/metadata.json"), "[1, 2]");
        write(&item.join(".hidden/metadata.json"), r#"{"x": 1}"#);

        let nested = nested_metadata_files(item);
        assert_eq!(nested.len(), 3);

        let report = merge_metadata(&item.join(METADATA_FILE), item, &nested).unwrap();
        assert_eq!(report.merged, vec!["trip/day1/metadata.json", "trip/metadata.json"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, "party/metadata.json");

        let root: Value =
            serde_json::from_str(&fs::read_to_string(item.join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(
            root,
            json!({
                "title": "Family",
                "trip": {"year": 1999, "place": "Coast", "day1": {"note": "sunny"}}
            })
        );
        assert!(!item.join("trip/metadata.json").exists());
        assert!(!item.join("trip/day1/metadata.json").exists());
        assert!(item.join("party/metadata.json").is_file());
        assert!(item.join(".hidden/metadata.json").is_file());
    }

    #[test]
    fn test_merge_without_root_file() {
        let dir = tempfile::tempdir().unwrap();
        let item = dir.path();
        write(&item.join("a/metadata.json"), r#"{"k": "v"}"#);

        let report =
            merge_metadata(&item.join(METADATA_FILE), item, &nested_metadata_files(item)).unwrap();
        assert_eq!(report.merged.len(), 1);
        let root: Value =
            serde_json::from_str(&fs::read_to_string(item.join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(root, json!({"a": {"k": "v"}}));
    }

    #[test]
    fn test_invalid_root_blocks_merge() {
        let dir = tempfile::tempdir().unwrap();
        let item = dir.path();
        write(&item.join("metadata.json"), "not json");
        write(&item.join("a/metadata.json"), r#"{"k": "v"}"#);

        let result = merge_metadata(&item.join(METADATA_FILE), item, &nested_metadata_files(item));
        assert!(matches!(result, Err(Error::InvalidMetadata { .. })));
        assert!(item.join("a/metadata.json").is_file());
        assert_eq!(fs::read_to_string(item.join("metadata.json")).unwrap(), "not json");
    }
}
