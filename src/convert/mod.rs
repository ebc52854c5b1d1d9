// src/convert/mod.rs

//! Idempotent conversion of a working tree
//!
//! [`convert_all`] walks the destination tree, turns every entry into a
//! conversion unit (a file, or a whole `VIDEO_TS` directory) and runs the
//! units on a bounded worker pool. Each unit moves through
//!
//! ```text
//! Pending -> SkippedAlreadyDone
//!         -> InProgress -> Converted | Failed | SkippedUnsupported
//! ```
//!
//! A unit is skipped when its name already carries the active profile's
//! conversion suffix or when its predicted output exists, so a second run
//! over the same tree converts nothing. Inputs are deleted only once their
//! output exists and is non-empty.
//!
//! Two inputs may predict the same output (`a.jpg` and `a.png` both become
//! `a_tiff.tiff`). Only the first of them in path order is converted; the
//! others are left in place as [`SkipReason::OutputConflict`].

pub mod dvd;
pub mod encoder;

pub use encoder::{CommandEncoder, EncodeJob, Encoder, EncoderError, Invocation};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::media::{
    classify, is_system_junk, predict, ClassFilter, ConversionSuffix, MediaClass,
    PreservationProfile, VIDEO_TS,
};
use crate::naming::split_name;
use crate::package::is_package_file;
use crate::progress::ProgressTracker;
use rayon::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Knobs for a conversion pass
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    /// Worker threads
    pub workers: usize,
    /// DVD segments shorter than this are dropped
    pub dvd_min_segment_secs: f64,
}

impl ConvertOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            workers: config.worker_count(),
            dvd_min_segment_secs: config.dvd_min_segment_secs,
        }
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Lifecycle of a conversion unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    SkippedAlreadyDone,
    InProgress,
    Converted,
    Failed,
    SkippedUnsupported,
}

/// Why a unit was not converted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Name carries the active profile's conversion suffix
    AlreadyConverted,
    /// Predicted output already exists
    OutputExists,
    /// Media class not selected for this run
    FilteredOut,
    /// No encoder for unclassified content
    Unclassified,
    /// The profile does not convert
    RawClone,
    /// DVD member file found outside a `VIDEO_TS` directory
    LooseDvdFile,
    /// Every DVD segment was too short or of unknown duration
    NoQualifyingSegments,
    /// An earlier unit converts to the same output path
    OutputConflict,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::AlreadyConverted => "already converted",
            Self::OutputExists => "output already exists",
            Self::FilteredOut => "class not selected",
            Self::Unclassified => "unclassified",
            Self::RawClone => "raw clone",
            Self::LooseDvdFile => "DVD file outside VIDEO_TS",
            Self::NoQualifyingSegments => "no qualifying DVD segments",
            Self::OutputConflict => "another input converts to the same output",
        };
        write!(f, "{}", reason)
    }
}

/// Successful end state of a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Converted { output: PathBuf, segments: usize },
    SkippedAlreadyDone(SkipReason),
    SkippedUnsupported(SkipReason),
}

/// Why a unit failed
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error("encoder produced no output at {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error("not a convertible unit: {}", .0.display())]
    InvalidUnit(PathBuf),

    #[error("profile does not convert")]
    Unsupported,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A file or `VIDEO_TS` directory to convert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionUnit {
    pub path: PathBuf,
    pub class: MediaClass,
}

/// Outcome of one unit
#[derive(Debug)]
pub struct UnitReport {
    pub path: PathBuf,
    pub class: MediaClass,
    pub result: std::result::Result<UnitStatus, UnitError>,
}

impl UnitReport {
    /// Terminal state reached by the unit
    pub fn state(&self) -> UnitState {
        match &self.result {
            Ok(UnitStatus::Converted { .. }) => UnitState::Converted,
            Ok(UnitStatus::SkippedAlreadyDone(_)) => UnitState::SkippedAlreadyDone,
            Ok(UnitStatus::SkippedUnsupported(_)) => UnitState::SkippedUnsupported,
            Err(_) => UnitState::Failed,
        }
    }

    /// Whether the unit got as far as `InProgress`
    pub fn advanced(&self) -> bool {
        matches!(
            &self.result,
            Ok(UnitStatus::Converted { .. })
                | Ok(UnitStatus::SkippedUnsupported(SkipReason::NoQualifyingSegments))
                | Err(_)
        )
    }
}

/// Outcome of a conversion pass
#[derive(Debug, Default)]
pub struct ConversionReport {
    pub units: Vec<UnitReport>,
}

impl ConversionReport {
    pub fn converted(&self) -> usize {
        self.count(UnitState::Converted)
    }

    pub fn failed(&self) -> usize {
        self.count(UnitState::Failed)
    }

    pub fn skipped_done(&self) -> usize {
        self.count(UnitState::SkippedAlreadyDone)
    }

    pub fn skipped_unsupported(&self) -> usize {
        self.count(UnitState::SkippedUnsupported)
    }

    /// Failed units with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&Path, &UnitError)> {
        self.units
            .iter()
            .filter_map(|u| u.result.as_ref().err().map(|e| (u.path.as_path(), e)))
    }

    fn count(&self, state: UnitState) -> usize {
        self.units.iter().filter(|u| u.state() == state).count()
    }
}

/// Every conversion unit below `root`, sorted by path
///
/// Hidden entries, system litter and package files are left out. A
/// `VIDEO_TS` directory is a single unit and its members are not listed.
pub fn discover_units(root: &Path) -> Vec<ConversionUnit> {
    let mut units = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cannot read {}: {}", e.path().unwrap_or(root).display(), e);
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || is_system_junk(&name) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        if entry.file_type().is_dir() {
            if name == VIDEO_TS {
                units.push(ConversionUnit {
                    path: entry.into_path(),
                    class: MediaClass::Dvd,
                });
                walker.skip_current_dir();
            }
            continue;
        }

        if entry.file_type().is_file() && !is_package_file(&name) {
            units.push(ConversionUnit {
                class: classify(&name),
                path: entry.into_path(),
            });
        }
    }
    units
}

/// Output `unit` would be converted to, if it is due for conversion at all
fn planned_output(
    unit: &ConversionUnit,
    profile: PreservationProfile,
    filter: &ClassFilter,
) -> Option<PathBuf> {
    if !profile.converts() || !filter.admits(unit.class) {
        return None;
    }
    let name = unit.path.file_name()?.to_string_lossy();
    match unit.class {
        MediaClass::Unclassified => None,
        MediaClass::Dvd if name == VIDEO_TS => dvd::unit_output(&unit.path, profile).ok(),
        MediaClass::Dvd => None,
        MediaClass::Image | MediaClass::Video | MediaClass::Audio | MediaClass::Text => {
            let (stem, _) = split_name(&name);
            if ConversionSuffix::recognize(stem, profile).is_some() {
                return None;
            }
            Some(unit.path.with_file_name(predict(&name, profile)))
        }
    }
}

/// Units whose output is already claimed by an earlier unit
///
/// Maps each losing unit path to the contested output. `units` must be in
/// discovery order, which decides the winner.
pub fn output_conflicts(
    units: &[ConversionUnit],
    profile: PreservationProfile,
    filter: &ClassFilter,
) -> HashMap<PathBuf, PathBuf> {
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    let mut conflicts = HashMap::new();

    for unit in units {
        let Some(output) = planned_output(unit, profile, filter) else {
            continue;
        };
        match claimed.entry(output) {
            Entry::Occupied(entry) => {
                warn!(
                    "{} and {} both convert to {}; leaving {} in place",
                    entry.get().display(),
                    unit.path.display(),
                    entry.key().display(),
                    unit.path.display()
                );
                conflicts.insert(unit.path.clone(), entry.key().clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(&unit.path);
            }
        }
    }
    conflicts
}

/// Convert every unit below `root`
///
/// Never fails because of an individual unit: failures are logged and
/// recorded in the report. Only a worker pool that cannot be built is an
/// error.
pub fn convert_all(
    root: &Path,
    profile: PreservationProfile,
    filter: &ClassFilter,
    encoder: &dyn Encoder,
    options: &ConvertOptions,
    progress: &dyn ProgressTracker,
) -> Result<ConversionReport> {
    let units = discover_units(root);
    let conflicts = output_conflicts(&units, profile, filter);
    progress.set_length(units.len() as u64);
    info!(
        "Converting {} unit(s) under {} ({} profile, {} worker(s))",
        units.len(),
        root.display(),
        profile,
        options.workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .thread_name(|i| format!("convert-{}", i))
        .build()?;

    let reports: Vec<UnitReport> = pool.install(|| {
        units
            .par_iter()
            .map(|unit| {
                let conflict = conflicts.contains_key(&unit.path);
                let report = process_unit(unit, conflict, profile, filter, encoder, options);
                if report.advanced() {
                    progress.increment(1);
                }
                report
            })
            .collect()
    });

    // Skipped units never advanced
    progress.clamp_to_position();
    let report = ConversionReport { units: reports };
    progress.finish_with_message(&format!(
        "{} converted, {} failed",
        report.converted(),
        report.failed()
    ));
    info!(
        "Conversion finished: {} converted, {} already done, {} not converted, {} failed",
        report.converted(),
        report.skipped_done(),
        report.skipped_unsupported(),
        report.failed()
    );
    Ok(report)
}

fn process_unit(
    unit: &ConversionUnit,
    conflict: bool,
    profile: PreservationProfile,
    filter: &ClassFilter,
    encoder: &dyn Encoder,
    options: &ConvertOptions,
) -> UnitReport {
    let result = run_unit(unit, conflict, profile, filter, encoder, options);
    match &result {
        Ok(UnitStatus::Converted { output, .. }) => {
            info!("Converted {} -> {}", unit.path.display(), output.display());
        }
        Ok(UnitStatus::SkippedAlreadyDone(reason) | UnitStatus::SkippedUnsupported(reason)) => {
            debug!("Skipped {}: {}", unit.path.display(), reason);
        }
        Err(e) => error!("Failed to convert {}: {}", unit.path.display(), e),
    }
    UnitReport {
        path: unit.path.clone(),
        class: unit.class,
        result,
    }
}

fn run_unit(
    unit: &ConversionUnit,
    conflict: bool,
    profile: PreservationProfile,
    filter: &ClassFilter,
    encoder: &dyn Encoder,
    options: &ConvertOptions,
) -> std::result::Result<UnitStatus, UnitError> {
    let name = unit
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| UnitError::InvalidUnit(unit.path.clone()))?;

    if unit.class != MediaClass::Dvd {
        let (stem, _) = split_name(&name);
        if ConversionSuffix::recognize(stem, profile).is_some() {
            return Ok(UnitStatus::SkippedAlreadyDone(SkipReason::AlreadyConverted));
        }
    }
    if !profile.converts() {
        return Ok(UnitStatus::SkippedUnsupported(SkipReason::RawClone));
    }
    if !filter.admits(unit.class) {
        return Ok(UnitStatus::SkippedUnsupported(SkipReason::FilteredOut));
    }
    if conflict {
        return Ok(UnitStatus::SkippedUnsupported(SkipReason::OutputConflict));
    }

    let status = match unit.class {
        MediaClass::Unclassified => UnitStatus::SkippedUnsupported(SkipReason::Unclassified),
        MediaClass::Dvd if name != VIDEO_TS => UnitStatus::SkippedUnsupported(SkipReason::LooseDvdFile),
        MediaClass::Dvd => {
            debug!("{}: {:?}", unit.path.display(), UnitState::InProgress);
            dvd::convert_dvd(&unit.path, profile, encoder, options.dvd_min_segment_secs)?
        }
        MediaClass::Image | MediaClass::Video | MediaClass::Audio | MediaClass::Text => {
            let output = unit.path.with_file_name(predict(&name, profile));
            if output.exists() {
                UnitStatus::SkippedAlreadyDone(SkipReason::OutputExists)
            } else {
                debug!("{}: {:?}", unit.path.display(), UnitState::InProgress);
                convert_file(unit, profile, encoder, &output)?
            }
        }
    };
    Ok(status)
}

fn convert_file(
    unit: &ConversionUnit,
    profile: PreservationProfile,
    encoder: &dyn Encoder,
    output: &Path,
) -> std::result::Result<UnitStatus, UnitError> {
    let job = EncodeJob {
        class: unit.class,
        profile,
        input: &unit.path,
        output,
    };

    let encoded = encoder
        .encode(&job)
        .map_err(UnitError::from)
        .and_then(|()| verify_output(output));
    if let Err(e) = encoded {
        if output.exists() {
            if let Err(remove_err) = fs::remove_file(output) {
                warn!("Failed to remove {}: {}", output.display(), remove_err);
            }
        }
        return Err(e);
    }

    fs::remove_file(&unit.path)?;
    Ok(UnitStatus::Converted {
        output: output.to_path_buf(),
        segments: 1,
    })
}

/// An output counts only if it exists and is non-empty
pub(crate) fn verify_output(output: &Path) -> std::result::Result<(), UnitError> {
    match fs::metadata(output) {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => Ok(()),
        _ => Err(UnitError::EmptyOutput(output.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use std::sync::Mutex;

    /// Writes the input bytes to the output, or fails for names containing "broken"
    #[derive(Default)]
    struct CopyEncoder {
        jobs: Mutex<Vec<PathBuf>>,
    }

    impl Encoder for CopyEncoder {
        fn encode(&self, job: &EncodeJob<'_>) -> std::result::Result<(), EncoderError> {
            self.jobs.lock().unwrap().push(job.input.to_path_buf());
            if job.input.to_string_lossy().contains("broken") {
                fs::write(job.output, b"")?;
                return Ok(());
            }
            fs::copy(job.input, job.output)?;
            Ok(())
        }

        fn probe_duration(&self, _input: &Path) -> std::result::Result<Option<f64>, EncoderError> {
            Ok(Some(60.0))
        }

        fn concat(
            &self,
            segments: &[PathBuf],
            output: &Path,
            _scratch: &Path,
        ) -> std::result::Result<(), EncoderError> {
            let mut joined = Vec::new();
            for segment in segments {
                joined.extend(fs::read(segment)?);
            }
            fs::write(output, joined)?;
            Ok(())
        }
    }

    fn options() -> ConvertOptions {
        ConvertOptions {
            workers: 2,
            dvd_min_segment_secs: 5.0,
        }
    }

    #[test]
    fn test_discover_units() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("disc/VIDEO_TS")).unwrap();
        fs::write(root.join("disc/VIDEO_TS/VTS_01_1.VOB"), b"v").unwrap();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::write(root.join("bagit.txt"), b"").unwrap();
        fs::write(root.join("Thumbs.db"), b"").unwrap();

        let units = discover_units(root);
        let classes: Vec<_> = units.iter().map(|u| u.class).collect();
        assert_eq!(classes, vec![MediaClass::Image, MediaClass::Dvd]);
        assert_eq!(units[1].path, root.join("disc/VIDEO_TS"));
    }

    #[test]
    fn test_convert_and_delete_input() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::write(root.join("notes.xyz"), b"n").unwrap();

        let encoder = CopyEncoder::default();
        let progress = SilentProgress::new();
        let report = convert_all(
            root,
            PreservationProfile::Archival,
            &ClassFilter::all(),
            &encoder,
            &options(),
            &progress,
        )
        .unwrap();

        assert_eq!(report.converted(), 1);
        assert_eq!(report.skipped_unsupported(), 1);
        assert!(root.join("a_tiff.tiff").is_file());
        assert!(!root.join("a.jpg").exists());
        assert!(root.join("notes.xyz").is_file());
        // The unclassified file never advanced, so the total shrinks to match
        assert_eq!(progress.position(), 1);
        assert_eq!(progress.length(), 1);
    }

    #[test]
    fn test_shared_output_converts_one_input() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.jpg"), b"jpeg").unwrap();
        fs::write(root.join("a.png"), b"png").unwrap();
        fs::create_dir_all(root.join("movie/VIDEO_TS")).unwrap();
        fs::write(root.join("movie/VIDEO_TS/VTS_01_1.VOB"), b"vob").unwrap();
        fs::write(root.join("movie/movie.mov"), b"mov").unwrap();

        let encoder = CopyEncoder::default();
        let progress = SilentProgress::new();
        let report = convert_all(
            root,
            PreservationProfile::Archival,
            &ClassFilter::all(),
            &encoder,
            &options(),
            &progress,
        )
        .unwrap();

        assert_eq!(report.converted(), 2);
        let conflicted: Vec<PathBuf> = report
            .units
            .iter()
            .filter(|u| {
                matches!(
                    u.result,
                    Ok(UnitStatus::SkippedUnsupported(SkipReason::OutputConflict))
                )
            })
            .map(|u| u.path.clone())
            .collect();
        assert_eq!(
            conflicted,
            vec![root.join("a.png"), root.join("movie/movie.mov")]
        );

        assert_eq!(fs::read(root.join("a_tiff.tiff")).unwrap(), b"jpeg");
        assert!(!root.join("a.jpg").exists());
        assert_eq!(fs::read(root.join("a.png")).unwrap(), b"png");
        assert_eq!(fs::read(root.join("movie/movie_ffv1.mkv")).unwrap(), b"vob");
        assert_eq!(fs::read(root.join("movie/movie.mov")).unwrap(), b"mov");
        assert_eq!(progress.position(), 2);
        assert_eq!(progress.length(), 2);
    }

    #[test]
    fn test_output_conflicts_ignore_units_not_due() {
        let root = Path::new("/archive");
        let unit = |name: &str| ConversionUnit {
            path: root.join(name),
            class: classify(name),
        };
        let units = vec![unit("a.jpg"), unit("a.png"), unit("b.jpg"), unit("b_tiff.tiff")];

        let conflicts = output_conflicts(&units, PreservationProfile::Archival, &ClassFilter::all());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts.get(&root.join("a.png")), Some(&root.join("a_tiff.tiff")));

        let audio = ClassFilter::from_classes([MediaClass::Audio]).unwrap();
        assert!(output_conflicts(&units, PreservationProfile::Archival, &audio).is_empty());
        assert!(output_conflicts(&units, PreservationProfile::RawClone, &ClassFilter::all()).is_empty());
    }

    #[test]
    fn test_empty_output_keeps_input() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("broken.wav"), b"w").unwrap();

        let report = convert_all(
            root,
            PreservationProfile::Archival,
            &ClassFilter::all(),
            &CopyEncoder::default(),
            &options(),
            &SilentProgress::new(),
        )
        .unwrap();

        assert_eq!(report.failed(), 1);
        assert!(root.join("broken.wav").is_file());
        assert!(!root.join("broken_wav.wav").exists());
        let (path, err) = report.failures().next().unwrap();
        assert_eq!(path, root.join("broken.wav"));
        assert!(matches!(err, UnitError::EmptyOutput(_)));
    }

    #[test]
    fn test_existing_output_leaves_input() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::write(root.join("a_tiff.tiff"), b"done").unwrap();

        let encoder = CopyEncoder::default();
        let report = convert_all(
            root,
            PreservationProfile::Archival,
            &ClassFilter::all(),
            &encoder,
            &options(),
            &SilentProgress::new(),
        )
        .unwrap();

        assert_eq!(report.converted(), 0);
        assert_eq!(report.skipped_done(), 2);
        assert!(root.join("a.jpg").is_file());
        assert!(encoder.jobs.lock().unwrap().is_empty());
    }

    #[test]
    fn test_filter_and_raw_clone() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::write(root.join("b.wav"), b"b").unwrap();

        let images = ClassFilter::from_classes([MediaClass::Image]).unwrap();
        let report = convert_all(
            root,
            PreservationProfile::Distribution,
            &images,
            &CopyEncoder::default(),
            &options(),
            &SilentProgress::new(),
        )
        .unwrap();
        assert_eq!(report.converted(), 1);
        assert!(root.join("a_jpg.jpg").is_file());
        assert!(root.join("b.wav").is_file());

        let clone = convert_all(
            root,
            PreservationProfile::RawClone,
            &ClassFilter::all(),
            &CopyEncoder::default(),
            &options(),
            &SilentProgress::new(),
        )
        .unwrap();
        assert_eq!(clone.converted(), 0);
        assert!(clone
            .units
            .iter()
            .all(|u| u.state() == UnitState::SkippedUnsupported));
    }
}
