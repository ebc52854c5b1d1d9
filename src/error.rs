// src/error.rs

//! Error types for the preservation pipeline
//!
//! Only configuration problems and a missing source abort a run. Everything
//! that goes wrong with an individual file is recovered where it happens and
//! surfaces in a report instead (see `mirror::MirrorReport`,
//! `convert::ConversionReport` and `package::ValidationReport`).

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort a pipeline operation
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Unrecognized preservation profile name
    #[error("unknown preservation profile: {0} (expected archival, distribution or raw-clone)")]
    UnknownProfile(String),

    /// Unrecognized media class name
    #[error("unknown media class: {0} (expected image, video, audio, text or dvd)")]
    UnknownMediaClass(String),

    /// No media class selected
    #[error("no media class selected")]
    EmptyClassSelection,

    /// Source tree missing or not a directory
    #[error("source folder not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Directory is already wrapped into a package
    #[error("already a package: {}", .0.display())]
    AlreadyPackaged(PathBuf),

    /// Directory is not a package (no tag file)
    #[error("not a package: {}", .0.display())]
    NotAPackage(PathBuf),

    /// Package has a tag file but no payload manifest
    #[error("package has no payload manifest: {}", .0.display())]
    MissingManifest(PathBuf),

    /// Metadata file that is not a JSON object
    #[error("invalid metadata file {}: {reason}", path.display())]
    InvalidMetadata { path: PathBuf, reason: String },

    /// Path that cannot be used inside a package or destination tree
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Configuration file could not be parsed
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// JSON metadata could not be read or written
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory walk failed
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Worker pool could not be built
    #[error("worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// True for errors raised while validating the run configuration
    ///
    /// These are raised before any filesystem work starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnknownProfile(_)
                | Self::UnknownMediaClass(_)
                | Self::EmptyClassSelection
                | Self::ConfigParse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors() {
        assert!(Error::EmptyClassSelection.is_configuration());
        assert!(Error::UnknownProfile("x".into()).is_configuration());
        assert!(!Error::SourceNotFound(PathBuf::from("/nope")).is_configuration());
    }

    #[test]
    fn test_error_display() {
        let err = Error::SourceNotFound(PathBuf::from("/tmp/missing"));
        assert_eq!(err.to_string(), "source folder not found: /tmp/missing");
    }
}
