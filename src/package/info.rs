// src/package/info.rs

//! Package info file (`bag-info.txt`)

use crate::hash::HashAlgorithm;
use crate::media::mime_type;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::collections::BTreeSet;
use std::fmt::Write as _;

const CHANGELOG_PREFIX: &str = "--- Update ";
const CHANGELOG_SUFFIX: &str = " ---";

/// One appended changelog section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub timestamp: DateTime<Utc>,
    pub lines: Vec<String>,
}

impl ChangelogEntry {
    pub fn new(timestamp: DateTime<Utc>, lines: Vec<String>) -> Self {
        Self { timestamp, lines }
    }

    fn header(&self) -> String {
        format!(
            "{}{}{}",
            CHANGELOG_PREFIX,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            CHANGELOG_SUFFIX
        )
    }
}

/// Descriptive metadata stored next to the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub external_identifier: String,
    /// Total payload size in bytes
    pub payload_bytes: u64,
    pub payload_file_count: u64,
    pub bagging_date: Option<NaiveDate>,
    /// Distinct MIME types of the payload, sorted
    pub media_types: BTreeSet<String>,
    pub checksum_algorithm: HashAlgorithm,
    pub changelog: Vec<ChangelogEntry>,
}

impl PackageInfo {
    /// Describe a payload given as (name, size) pairs
    pub fn describe<'a>(
        identifier: impl Into<String>,
        files: impl IntoIterator<Item = (&'a str, u64)>,
        algorithm: HashAlgorithm,
        date: NaiveDate,
    ) -> Self {
        let mut info = Self {
            external_identifier: identifier.into(),
            payload_bytes: 0,
            payload_file_count: 0,
            bagging_date: Some(date),
            media_types: BTreeSet::new(),
            checksum_algorithm: algorithm,
            changelog: Vec::new(),
        };
        for (name, size) in files {
            info.payload_bytes += size;
            info.payload_file_count += 1;
            let file_name = name.rsplit('/').next().unwrap_or(name);
            if let Some(mime) = mime_type(file_name) {
                info.media_types.insert(mime.to_string());
            }
        }
        info
    }

    /// Parse an info file
    ///
    /// Unknown keys are ignored and missing ones keep their defaults, so a
    /// file written by other tooling still yields its date and changelog.
    pub fn parse(content: &str) -> Self {
        let mut info = Self {
            external_identifier: String::new(),
            payload_bytes: 0,
            payload_file_count: 0,
            bagging_date: None,
            media_types: BTreeSet::new(),
            checksum_algorithm: HashAlgorithm::default(),
            changelog: Vec::new(),
        };

        for line in content.lines() {
            if let Some(stamp) = line
                .strip_prefix(CHANGELOG_PREFIX)
                .and_then(|rest| rest.strip_suffix(CHANGELOG_SUFFIX))
            {
                if let Ok(timestamp) = DateTime::parse_from_rfc3339(stamp.trim()) {
                    info.changelog
                        .push(ChangelogEntry::new(timestamp.with_timezone(&Utc), Vec::new()));
                    continue;
                }
            }

            if let Some(entry) = info.changelog.last_mut() {
                if !line.trim().is_empty() {
                    entry.lines.push(line.to_string());
                }
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "External-Identifier" => info.external_identifier = value.to_string(),
                "Payload-Oxum" => {
                    if let Some((bytes, count)) = value.split_once('.') {
                        info.payload_bytes = bytes.parse().unwrap_or(0);
                        info.payload_file_count = count.parse().unwrap_or(0);
                    }
                }
                "Bagging-Date" => {
                    info.bagging_date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok();
                }
                "Media-Types" => {
                    info.media_types = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "Checksum-Algorithm" => {
                    if let Ok(alg) = value.parse() {
                        info.checksum_algorithm = alg;
                    }
                }
                _ => {}
            }
        }
        info
    }

    /// Append a changelog section; empty sections are dropped
    pub fn record_update(&mut self, timestamp: DateTime<Utc>, lines: Vec<String>) {
        if !lines.is_empty() {
            self.changelog.push(ChangelogEntry::new(timestamp, lines));
        }
    }

    /// Render the info file
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "External-Identifier: {}", self.external_identifier);
        let _ = writeln!(out, "Bag-Size: {}", human_size(self.payload_bytes));
        let _ = writeln!(out, "Payload-Oxum: {}.{}", self.payload_bytes, self.payload_file_count);
        if let Some(date) = self.bagging_date {
            let _ = writeln!(out, "Bagging-Date: {}", date.format("%Y-%m-%d"));
        }
        let _ = writeln!(out, "Payload-File-Count: {}", self.payload_file_count);
        if !self.media_types.is_empty() {
            let types: Vec<&str> = self.media_types.iter().map(String::as_str).collect();
            let _ = writeln!(out, "Media-Types: {}", types.join(", "));
        }
        let _ = writeln!(out, "Checksum-Algorithm: {}", self.checksum_algorithm);

        for entry in &self.changelog {
            out.push('\n');
            let _ = writeln!(out, "{}", entry.header());
            for line in &entry.lines {
                let _ = writeln!(out, "{}", line);
            }
        }
        out
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} bytes", bytes);
    }
    let mut size = bytes as f64;
    let mut unit = "bytes";
    for u in UNITS {
        if size < 1024.0 {
            break;
        }
        size /= 1024.0;
        unit = u;
    }
    format!("{:.1} {}", size, unit)
}
