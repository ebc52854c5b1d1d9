// src/media/profile.rs

//! Preservation profiles, conversion suffixes and output name prediction
//!
//! A converted file is named `<stem>_<token>.<target-ext>`. The token is the
//! only record that a file has been processed, so the same
//! [`ConversionSuffix`] values are used to write names, to recognize them,
//! and to predict them before any work is done.

use super::{classify, MediaClass};
use crate::error::{Error, Result};
use crate::naming::{normalize, split_name};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversion target policy for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreservationProfile {
    /// Archival master (lossless, open formats)
    Archival,
    /// Distribution derivative (compact, widely playable)
    Distribution,
    /// Plain copy, no conversion
    RawClone,
}

impl PreservationProfile {
    /// Get the string representation of the profile
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archival => "archival",
            Self::Distribution => "distribution",
            Self::RawClone => "raw-clone",
        }
    }

    /// Parse a profile name
    ///
    /// Accepts the OAIS package abbreviations as aliases.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "archival" | "aip" => Ok(Self::Archival),
            "distribution" | "dip" => Ok(Self::Distribution),
            "raw-clone" | "raw_clone" | "clone" => Ok(Self::RawClone),
            other => Err(Error::UnknownProfile(other.to_string())),
        }
    }

    /// Prefix for a destination folder created next to the source
    pub fn destination_prefix(&self) -> &'static str {
        match self {
            Self::Archival => "AIP",
            Self::Distribution => "DIP",
            Self::RawClone => "CLONE",
        }
    }

    /// Whether this profile converts anything at all
    pub fn converts(&self) -> bool {
        !matches!(self, Self::RawClone)
    }
}

impl fmt::Display for PreservationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Marker appended to the stem of a converted file
///
/// One variant per convertible media class and converting profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionSuffix {
    ArchivalImage,
    DistributionImage,
    ArchivalVideo,
    DistributionVideo,
    ArchivalAudio,
    DistributionAudio,
    ArchivalText,
    DistributionText,
    ArchivalDvd,
    DistributionDvd,
}

impl ConversionSuffix {
    /// Every suffix
    pub const fn all() -> &'static [ConversionSuffix] {
        &[
            Self::ArchivalImage,
            Self::DistributionImage,
            Self::ArchivalVideo,
            Self::DistributionVideo,
            Self::ArchivalAudio,
            Self::DistributionAudio,
            Self::ArchivalText,
            Self::DistributionText,
            Self::ArchivalDvd,
            Self::DistributionDvd,
        ]
    }

    /// The suffix a class gets under a profile, if it is converted at all
    pub fn for_class(class: MediaClass, profile: PreservationProfile) -> Option<Self> {
        use PreservationProfile::{Archival, Distribution};

        match (class, profile) {
            (MediaClass::Image, Archival) => Some(Self::ArchivalImage),
            (MediaClass::Image, Distribution) => Some(Self::DistributionImage),
            (MediaClass::Video, Archival) => Some(Self::ArchivalVideo),
            (MediaClass::Video, Distribution) => Some(Self::DistributionVideo),
            (MediaClass::Audio, Archival) => Some(Self::ArchivalAudio),
            (MediaClass::Audio, Distribution) => Some(Self::DistributionAudio),
            (MediaClass::Text, Archival) => Some(Self::ArchivalText),
            (MediaClass::Text, Distribution) => Some(Self::DistributionText),
            (MediaClass::Dvd, Archival) => Some(Self::ArchivalDvd),
            (MediaClass::Dvd, Distribution) => Some(Self::DistributionDvd),
            (MediaClass::Unclassified, _) | (_, PreservationProfile::RawClone) => None,
        }
    }

    /// Token written into the file name
    pub const fn token(&self) -> &'static str {
        match self {
            Self::ArchivalImage => "tiff",
            Self::DistributionImage => "jpg",
            Self::ArchivalVideo | Self::ArchivalDvd => "ffv1",
            Self::DistributionVideo | Self::DistributionDvd => "mp4",
            Self::ArchivalAudio => "wav",
            Self::DistributionAudio => "mp3",
            Self::ArchivalText | Self::DistributionText => "pdfa",
        }
    }

    /// Extension of the converted file
    pub const fn target_extension(&self) -> &'static str {
        match self {
            Self::ArchivalImage => "tiff",
            Self::DistributionImage => "jpg",
            Self::ArchivalVideo | Self::ArchivalDvd => "mkv",
            Self::DistributionVideo | Self::DistributionDvd => "mp4",
            Self::ArchivalAudio => "wav",
            Self::DistributionAudio => "mp3",
            Self::ArchivalText | Self::DistributionText => "pdf",
        }
    }

    /// Profile this suffix belongs to
    pub const fn profile(&self) -> PreservationProfile {
        match self {
            Self::ArchivalImage
            | Self::ArchivalVideo
            | Self::ArchivalAudio
            | Self::ArchivalText
            | Self::ArchivalDvd => PreservationProfile::Archival,
            _ => PreservationProfile::Distribution,
        }
    }

    /// Media class this suffix belongs to
    pub const fn class(&self) -> MediaClass {
        match self {
            Self::ArchivalImage | Self::DistributionImage => MediaClass::Image,
            Self::ArchivalVideo | Self::DistributionVideo => MediaClass::Video,
            Self::ArchivalAudio | Self::DistributionAudio => MediaClass::Audio,
            Self::ArchivalText | Self::DistributionText => MediaClass::Text,
            Self::ArchivalDvd | Self::DistributionDvd => MediaClass::Dvd,
        }
    }

    /// Find a suffix of the given profile carried by a stem
    pub fn recognize(stem: &str, profile: PreservationProfile) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .filter(|s| s.profile() == profile)
            .find(|s| s.is_carried_by(stem))
    }

    /// Find a suffix of any profile carried by a stem
    pub fn carried_by(stem: &str) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.is_carried_by(stem))
    }

    fn is_carried_by(&self, stem: &str) -> bool {
        stem.to_ascii_lowercase()
            .strip_suffix(self.token())
            .is_some_and(|rest| rest.ends_with('_') && rest.len() > 1)
    }

    /// Build the converted file name for a stem
    pub fn apply(&self, stem: &str) -> String {
        format!("{}_{}.{}", stem, self.token(), self.target_extension())
    }
}

impl fmt::Display for ConversionSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.token())
    }
}

/// Predict the name a file will have once converted under a profile
///
/// Names that are not converted (raw clones, unclassified files, DVD member
/// files, already converted names) are returned unchanged.
pub fn predict(name: &str, profile: PreservationProfile) -> String {
    let class = classify(name);
    if class == MediaClass::Dvd {
        return name.to_string();
    }

    match ConversionSuffix::for_class(class, profile) {
        Some(suffix) => {
            let (stem, _) = split_name(name);
            suffix.apply(stem)
        }
        None => name.to_string(),
    }
}

/// Predict the output name of a DVD unit found in `parent_dir_name`
pub fn predict_dvd(parent_dir_name: &str, profile: PreservationProfile) -> Option<String> {
    ConversionSuffix::for_class(MediaClass::Dvd, profile).map(|s| s.apply(&normalize(parent_dir_name)))
}
