// src/config.rs

//! Pipeline configuration
//!
//! Everything has a default; a TOML file only needs the keys it changes:
//!
//! ```toml
//! workers = 6
//! checksum = "sha256"
//! package_scope = "items"
//! dvd_min_segment_secs = 5.0
//!
//! [encoders]
//! ffmpeg = "/opt/ffmpeg/bin/ffmpeg"
//!
//! [timeouts]
//! video = 3600
//! ```

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use crate::package::PackageScope;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Minimum duration of a DVD segment worth keeping (menus, idents)
pub const DEFAULT_DVD_MIN_SEGMENT_SECS: f64 = 5.0;

/// Top-level configuration for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Conversion workers; defaults to the available cores minus `reserve_cores`
    pub workers: Option<usize>,
    /// Cores left free for the rest of the system
    pub reserve_cores: usize,
    /// Digest algorithm for new manifests
    pub checksum: HashAlgorithm,
    /// Which directories are wrapped into packages
    pub package_scope: PackageScope,
    /// DVD segments shorter than this are dropped
    pub dvd_min_segment_secs: f64,
    /// External encoder programs
    pub encoders: EncoderPrograms,
    /// Per-job wall-clock limits
    pub timeouts: Timeouts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            reserve_cores: 1,
            checksum: HashAlgorithm::Sha256,
            package_scope: PackageScope::Items,
            dvd_min_segment_secs: DEFAULT_DVD_MIN_SEGMENT_SECS,
            encoders: EncoderPrograms::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional file, falling back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject values that would make a run misbehave
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if !self.dvd_min_segment_secs.is_finite() || self.dvd_min_segment_secs < 0.0 {
            return Err(Error::Config(format!(
                "dvd_min_segment_secs must be a non-negative number, got {}",
                self.dvd_min_segment_secs
            )));
        }
        self.encoders.validate()?;
        self.timeouts.validate()?;
        Ok(())
    }

    /// Number of conversion workers to run
    pub fn worker_count(&self) -> usize {
        if let Some(workers) = self.workers {
            return workers;
        }
        let cores = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);
        cores.saturating_sub(self.reserve_cores).max(1)
    }
}

/// Program names or paths for the external encoders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderPrograms {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub ghostscript: String,
    pub unoconv: String,
    pub magick: String,
}

impl Default for EncoderPrograms {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            ghostscript: "gs".to_string(),
            unoconv: "unoconv".to_string(),
            magick: "magick".to_string(),
        }
    }
}

impl EncoderPrograms {
    fn validate(&self) -> Result<()> {
        let programs = [
            ("ffmpeg", &self.ffmpeg),
            ("ffprobe", &self.ffprobe),
            ("ghostscript", &self.ghostscript),
            ("unoconv", &self.unoconv),
            ("magick", &self.magick),
        ];
        for (key, program) in programs {
            if program.trim().is_empty() {
                return Err(Error::Config(format!("encoders.{} must not be empty", key)));
            }
        }
        Ok(())
    }
}

/// Wall-clock limits per job kind, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    pub probe: u64,
    pub image: u64,
    pub audio: u64,
    pub text: u64,
    pub video: u64,
    pub dvd_segment: u64,
    pub concat: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: 30,
            image: 300,
            audio: 300,
            text: 600,
            video: 1800,
            dvd_segment: 1200,
            concat: 3600,
        }
    }
}

impl Timeouts {
    fn validate(&self) -> Result<()> {
        let all = [
            self.probe,
            self.image,
            self.audio,
            self.text,
            self.video,
            self.dvd_segment,
            self.concat,
        ];
        if all.contains(&0) {
            return Err(Error::Config("timeouts must be at least one second".to_string()));
        }
        Ok(())
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe)
    }

    pub fn image(&self) -> Duration {
        Duration::from_secs(self.image)
    }

    pub fn audio(&self) -> Duration {
        Duration::from_secs(self.audio)
    }

    pub fn text(&self) -> Duration {
        Duration::from_secs(self.text)
    }

    pub fn video(&self) -> Duration {
        Duration::from_secs(self.video)
    }

    pub fn dvd_segment(&self) -> Duration {
        Duration::from_secs(self.dvd_segment)
    }

    pub fn concat(&self) -> Duration {
        Duration::from_secs(self.concat)
    }
}
