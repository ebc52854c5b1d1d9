// src/package/manifest.rs

//! Payload manifest (`manifest-<alg>.txt`)
//!
//! One line per payload file: `<hex digest>  <path>`, path relative to the
//! payload directory with `/` separators. Line breaks and `%` inside a path
//! are percent-encoded so every entry stays on one line.

use crate::error::{Error, Result};
use crate::hash::{hash_file, is_valid_digest, HashAlgorithm};
use crate::media::is_system_junk;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// A manifest line that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// 1-based line number
    pub line: usize,
    pub content: String,
}

/// Digest of every payload file, keyed by payload-relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    algorithm: HashAlgorithm,
    entries: BTreeMap<String, String>,
}

impl PackageManifest {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            entries: BTreeMap::new(),
        }
    }

    /// Hash every file below `payload_dir`
    pub fn build(payload_dir: &Path, algorithm: HashAlgorithm) -> Result<Self> {
        let mut manifest = Self::new(algorithm);
        for (key, path) in payload_files(payload_dir).into_files()? {
            let digest = hash_file(algorithm, &path)?;
            manifest.insert(key, digest);
        }
        Ok(manifest)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// File name this manifest is stored under
    pub fn file_name(&self) -> String {
        self.algorithm.manifest_file_name()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add or replace an entry, returning the previous digest
    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) -> Option<String> {
        self.entries.insert(path.into(), digest.into())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Entries in path order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_str()))
    }

    /// Parse manifest text, collecting lines that do not parse
    ///
    /// A path listed twice keeps its first digest; the repeat is reported as
    /// malformed.
    pub fn parse(algorithm: HashAlgorithm, content: &str) -> (Self, Vec<MalformedLine>) {
        let mut manifest = Self::new(algorithm);
        let mut malformed = Vec::new();

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let parsed = line
                .split_once(char::is_whitespace)
                .map(|(digest, path)| (digest, path.trim_start()))
                .filter(|(digest, path)| !path.is_empty() && is_valid_digest(algorithm, digest));

            match parsed {
                Some((digest, path)) if !manifest.contains(&decode_path(path)) => {
                    manifest.insert(decode_path(path), digest.to_ascii_lowercase());
                }
                _ => malformed.push(MalformedLine {
                    line: idx + 1,
                    content: line.to_string(),
                }),
            }
        }

        (manifest, malformed)
    }

    /// Read a manifest file
    pub fn read(path: &Path, algorithm: HashAlgorithm) -> io::Result<(Self, Vec<MalformedLine>)> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(algorithm, &content))
    }

    /// Render the manifest, sorted by path
    pub fn to_manifest_string(&self) -> String {
        let mut out = String::new();
        for (path, digest) in &self.entries {
            out.push_str(&format_line(digest, path));
        }
        out
    }

    /// Write the whole manifest into `package_root`
    pub fn write(&self, package_root: &Path) -> io::Result<PathBuf> {
        let path = package_root.join(self.file_name());
        fs::write(&path, self.to_manifest_string())?;
        Ok(path)
    }
}

fn format_line(digest: &str, path: &str) -> String {
    format!("{}  {}\n", digest, encode_path(path))
}

/// Append entries to an existing manifest file without touching its prior bytes
pub fn append_entries<'a>(
    manifest_path: &Path,
    entries: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> io::Result<()> {
    let existing = fs::read(manifest_path).unwrap_or_default();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(manifest_path)?;

    if !existing.is_empty() && !existing.ends_with(b"\n") {
        file.write_all(b"\n")?;
    }
    for (path, digest) in entries {
        file.write_all(format_line(digest, path).as_bytes())?;
    }
    file.flush()
}

fn encode_path(path: &str) -> String {
    path.replace('%', "%25")
        .replace('\n', "%0A")
        .replace('\r', "%0D")
}

fn decode_path(path: &str) -> String {
    path.replace("%0A", "\n")
        .replace("%0a", "\n")
        .replace("%0D", "\r")
        .replace("%0d", "\r")
        .replace("%25", "%")
}

/// Manifest key for a path below the payload directory
pub fn payload_key(payload_dir: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(payload_dir)
        .map_err(|_| Error::InvalidPath(path.display().to_string()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;
                parts.push(part);
            }
            _ => return Err(Error::InvalidPath(path.display().to_string())),
        }
    }
    Ok(parts.join("/"))
}

/// Result of walking a payload directory
///
/// Entries that cannot be listed (unreadable directories, names that are
/// not valid UTF-8) are collected instead of ending the walk.
#[derive(Debug, Default)]
pub struct PayloadListing {
    /// (manifest key, absolute path), sorted by path
    pub files: Vec<(String, PathBuf)>,
    /// (payload-relative path as far as it can be shown, error)
    pub unreadable: Vec<(String, Error)>,
}

impl PayloadListing {
    /// The listed files, or the first entry that could not be listed
    pub fn into_files(self) -> Result<Vec<(String, PathBuf)>> {
        match self.unreadable.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(self.files),
        }
    }
}

/// Every payload file below `payload_dir`
///
/// System litter is not payload.
pub fn payload_files(payload_dir: &Path) -> PayloadListing {
    let mut listing = PayloadListing::default();
    if !payload_dir.is_dir() {
        return listing;
    }

    let walker = WalkDir::new(payload_dir).min_depth(1).sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let shown = e
                    .path()
                    .map(|p| shown_path(payload_dir, p))
                    .unwrap_or_else(|| ".".to_string());
                listing.unreadable.push((shown, e.into()));
                continue;
            }
        };
        if !entry.file_type().is_file() || is_system_junk(&entry.file_name().to_string_lossy()) {
            continue;
        }
        match payload_key(payload_dir, entry.path()) {
            Ok(key) => listing.files.push((key, entry.into_path())),
            Err(e) => listing
                .unreadable
                .push((shown_path(payload_dir, entry.path()), e)),
        }
    }
    listing
}

/// Lossy payload-relative rendering of `path` for reports
fn shown_path(payload_dir: &Path, path: &Path) -> String {
    path.strip_prefix(payload_dir)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    const SHA_A: &str = "ca978112ca1bbdcafac231b39a23dc4da786eff8146d46f38a8a3c4a4d0d3c7e";

    #[test]
    fn test_render_sorted() {
        let mut manifest = PackageManifest::new(HashAlgorithm::Sha256);
        manifest.insert("sub/c.txt", SHA_A);
        manifest.insert("a.tiff", SHA_A);

        let text = manifest.to_manifest_string();
        assert_eq!(text, format!("{SHA_A}  a.tiff\n{SHA_A}  sub/c.txt\n"));
    }

    #[test]
    fn test_parse_collects_malformed_lines() {
        let content = format!(
            "{SHA_A}  a.tiff\nnot-a-digest  b.wav\n\n{SHA_A}\n{SHA_A}  a.tiff\n{SHA_A} \tspaced name.pdf\n"
        );
        let (manifest, malformed) = PackageManifest::parse(HashAlgorithm::Sha256, &content);

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get("a.tiff"), Some(SHA_A));
        assert!(manifest.contains("spaced name.pdf"));
        let lines: Vec<usize> = malformed.iter().map(|m| m.line).collect();
        assert_eq!(lines, vec![2, 4, 5]);
    }

    #[test]
    fn test_odd_paths_round_trip() {
        let mut manifest = PackageManifest::new(HashAlgorithm::Md5);
        let digest = hash_bytes(HashAlgorithm::Md5, b"x");
        manifest.insert("100%\nreal.txt", digest.clone());

        let text = manifest.to_manifest_string();
        assert_eq!(text.lines().count(), 1);
        let (parsed, malformed) = PackageManifest::parse(HashAlgorithm::Md5, &text);
        assert!(malformed.is_empty());
        assert_eq!(parsed.get("100%\nreal.txt"), Some(digest.as_str()));
    }

    #[cfg(unix)]
    #[test]
    fn test_listing_keeps_going_past_bad_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("data");
        fs::create_dir_all(payload.join("sub")).unwrap();
        fs::write(payload.join("a"), b"a").unwrap();
        fs::write(payload.join("sub").join(OsStr::from_bytes(b"\xfe.txt")), b"?").unwrap();
        fs::write(payload.join("z"), b"z").unwrap();

        let listing = payload_files(&payload);
        let keys: Vec<&str> = listing.files.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "z"]);
        assert_eq!(listing.unreadable.len(), 1);
        assert_eq!(listing.unreadable[0].0, "sub/\u{FFFD}.txt");
        assert!(matches!(listing.unreadable[0].1, Error::InvalidPath(_)));

        // Writers still refuse an incomplete listing
        assert!(PackageManifest::build(&payload, HashAlgorithm::Sha256).is_err());
    }

    #[test]
    fn test_build_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("data");
        fs::create_dir_all(payload.join("sub")).unwrap();
        fs::write(payload.join("a"), b"a").unwrap();
        fs::write(payload.join("sub/b"), b"b").unwrap();
        fs::write(payload.join(".DS_Store"), b"junk").unwrap();

        let manifest = PackageManifest::build(&payload, HashAlgorithm::Sha256).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get("a"), Some(SHA_A));

        let path = manifest.write(dir.path()).unwrap();
        let before = fs::read(&path).unwrap();
        append_entries(&path, [("z", SHA_A)]).unwrap();
        let after = fs::read(&path).unwrap();
        assert!(after.starts_with(&before));
        assert!(String::from_utf8(after).unwrap().ends_with(&format!("{SHA_A}  z\n")));
    }
}
