// src/media/mod.rs

//! Media classification by file name
//!
//! Every file the pipeline sees is put into exactly one [`MediaClass`]. The
//! class decides which encoder handles the file and whether the caller's
//! class selection lets it through. Classification is a pure function of
//! the name; nothing here touches the filesystem.

mod profile;

pub use profile::{predict, predict_dvd, ConversionSuffix, PreservationProfile};

use crate::error::{Error, Result};
use crate::naming::split_name;
use crate::package::is_package_file;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Name of the DVD structure directory
pub const VIDEO_TS: &str = "VIDEO_TS";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "tif", "tiff", "png", "gif", "bmp", "heic", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "mpeg", "mpg", "m4v", "3gp", "3g2",
];
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "aac", "m4a", "flac", "ogg", "aif", "aiff", "wma"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "doc", "docx", "rtf", "odt", "pdf"];
const DVD_EXTENSIONS: &[&str] = &["vob", "ifo", "bup"];

/// Operating system litter that is never copied, converted or packaged
const SYSTEM_JUNK: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Media class of a file or directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaClass {
    Image,
    Video,
    Audio,
    Text,
    /// A `VIDEO_TS` directory or one of its member files
    Dvd,
    /// Anything else, including already converted files and package files
    Unclassified,
}

impl MediaClass {
    /// Get the string representation of the class
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Text => "text",
            Self::Dvd => "dvd",
            Self::Unclassified => "unclassified",
        }
    }

    /// Parse a selectable class from a string
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "image" | "images" => Ok(Self::Image),
            "video" | "videos" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "text" => Ok(Self::Text),
            "dvd" | "video_ts" => Ok(Self::Dvd),
            other => Err(Error::UnknownMediaClass(other.to_string())),
        }
    }

    /// Classes a caller can select
    pub fn selectable() -> &'static [MediaClass] {
        &[Self::Image, Self::Video, Self::Audio, Self::Text, Self::Dvd]
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a file or directory name
///
/// Order of checks matters: package files and names that already carry a
/// conversion suffix are unclassified whatever their extension says.
pub fn classify(name: &str) -> MediaClass {
    if is_package_file(name) {
        return MediaClass::Unclassified;
    }
    if name == VIDEO_TS {
        return MediaClass::Dvd;
    }

    let (stem, extension) = split_name(name);
    let Some(extension) = extension else {
        return MediaClass::Unclassified;
    };

    let class = class_for_extension(&extension.to_ascii_lowercase());
    if class != MediaClass::Unclassified && ConversionSuffix::carried_by(stem).is_some() {
        return MediaClass::Unclassified;
    }
    class
}

fn class_for_extension(extension: &str) -> MediaClass {
    if IMAGE_EXTENSIONS.contains(&extension) {
        MediaClass::Image
    } else if VIDEO_EXTENSIONS.contains(&extension) {
        MediaClass::Video
    } else if AUDIO_EXTENSIONS.contains(&extension) {
        MediaClass::Audio
    } else if TEXT_EXTENSIONS.contains(&extension) {
        MediaClass::Text
    } else if DVD_EXTENSIONS.contains(&extension) {
        MediaClass::Dvd
    } else {
        MediaClass::Unclassified
    }
}

/// Check for operating system litter (`.DS_Store`, AppleDouble files, ...)
pub fn is_system_junk(name: &str) -> bool {
    SYSTEM_JUNK.contains(&name) || name.starts_with("._")
}

/// Best-effort MIME type for the package info file
pub fn mime_type(name: &str) -> Option<&'static str> {
    let (_, extension) = split_name(name);
    let mime = match extension?.to_ascii_lowercase().as_str() {
        "tif" | "tiff" => "image/tiff",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "webp" => "image/webp",
        "mkv" => "video/x-matroska",
        "mp4" | "m4v" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "webm" => "video/webm",
        "mpeg" | "mpg" | "vob" => "video/mpeg",
        "wav" => "audio/x-wav",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "aac" | "m4a" => "audio/aac",
        "aif" | "aiff" => "audio/aiff",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "rtf" => "application/rtf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        _ => return None,
    };
    Some(mime)
}

/// The set of media classes selected for a run
///
/// Unclassified content always passes the filter: unknown files are copied
/// rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFilter {
    classes: BTreeSet<MediaClass>,
}

impl ClassFilter {
    /// Select every class
    pub fn all() -> Self {
        Self {
            classes: MediaClass::selectable().iter().copied().collect(),
        }
    }

    /// Build a filter from explicit classes
    pub fn from_classes(classes: impl IntoIterator<Item = MediaClass>) -> Result<Self> {
        let classes: BTreeSet<MediaClass> = classes
            .into_iter()
            .filter(|c| *c != MediaClass::Unclassified)
            .collect();
        if classes.is_empty() {
            return Err(Error::EmptyClassSelection);
        }
        Ok(Self { classes })
    }

    /// Parse a comma separated list such as `image,audio,dvd`
    ///
    /// `all` selects every class.
    pub fn parse_list(list: &str) -> Result<Self> {
        if list.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let classes = list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(MediaClass::parse)
            .collect::<Result<Vec<_>>>()?;
        Self::from_classes(classes)
    }

    /// Whether the class was selected by the caller
    pub fn contains(&self, class: MediaClass) -> bool {
        self.classes.contains(&class)
    }

    /// Whether content of this class passes the filter
    pub fn admits(&self, class: MediaClass) -> bool {
        class == MediaClass::Unclassified || self.contains(class)
    }

    /// Whether a file with this name passes the filter
    pub fn admits_file(&self, name: &str) -> bool {
        !is_system_junk(name) && self.admits(classify(name))
    }

    /// Selected classes in stable order
    pub fn classes(&self) -> impl Iterator<Item = MediaClass> + '_ {
        self.classes.iter().copied()
    }
}

impl Default for ClassFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for ClassFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.classes.iter().map(|c| c.as_str()).collect();
        write!(f, "{}", names.join(","))
    }
}
