// src/convert/dvd.rs

//! DVD unit conversion
//!
//! A `VIDEO_TS` directory is converted as a whole. Its title segments are
//! probed and converted in disc order, short segments (menus, idents) are
//! dropped, and the survivors are joined into a single file placed next to
//! `VIDEO_TS`, named after the directory holding it.

use super::encoder::{EncodeJob, Encoder};
use super::{SkipReason, UnitError, UnitStatus};
use crate::media::{predict_dvd, MediaClass, PreservationProfile};
use crate::naming::split_name;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Scratch directory for converted segments, created beside `VIDEO_TS`
pub const SCRATCH_DIR: &str = "converting_videos";

static VTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^vts_(\d+)_(\d+)\.vob$").unwrap());

/// Sort key putting `VTS_<title>_<part>.VOB` in disc order
///
/// Names that do not follow the pattern go last, by name.
fn segment_key(name: &str) -> (u8, u32, u32, String) {
    match VTS_RE.captures(name) {
        Some(caps) => {
            let title = caps[1].parse().unwrap_or(u32::MAX);
            let part = caps[2].parse().unwrap_or(u32::MAX);
            (0, title, part, name.to_lowercase())
        }
        None => (1, 0, 0, name.to_lowercase()),
    }
}

/// `.vob` members of a `VIDEO_TS` directory in disc order
pub fn ordered_segments(video_ts: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut segments: Vec<(String, PathBuf)> = fs::read_dir(video_ts)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let is_vob = split_name(&name)
                .1
                .is_some_and(|ext| ext.eq_ignore_ascii_case("vob"));
            is_vob.then(|| (name, e.path()))
        })
        .collect();
    segments.sort_by_cached_key(|(name, _)| segment_key(name));
    Ok(segments.into_iter().map(|(_, path)| path).collect())
}

/// Output path of the unit rooted at `video_ts`
pub fn unit_output(video_ts: &Path, profile: PreservationProfile) -> Result<PathBuf, UnitError> {
    let parent = video_ts
        .parent()
        .ok_or_else(|| UnitError::InvalidUnit(video_ts.to_path_buf()))?;
    let parent_name = parent
        .file_name()
        .ok_or_else(|| UnitError::InvalidUnit(video_ts.to_path_buf()))?
        .to_string_lossy();
    let name = predict_dvd(&parent_name, profile).ok_or(UnitError::Unsupported)?;
    Ok(parent.join(name))
}

/// Convert the DVD unit rooted at `video_ts`
///
/// The scratch directory and `VIDEO_TS` itself are removed afterwards,
/// whatever the outcome.
pub fn convert_dvd(
    video_ts: &Path,
    profile: PreservationProfile,
    encoder: &dyn Encoder,
    min_segment_secs: f64,
) -> Result<UnitStatus, UnitError> {
    let output = unit_output(video_ts, profile)?;
    if output.exists() {
        return Ok(UnitStatus::SkippedAlreadyDone(SkipReason::OutputExists));
    }
    let parent = output
        .parent()
        .ok_or_else(|| UnitError::InvalidUnit(video_ts.to_path_buf()))?;
    let scratch = parent.join(SCRATCH_DIR);

    let result = build_unit(video_ts, &scratch, &output, profile, encoder, min_segment_secs);

    if let Err(e) = &result {
        warn!("DVD unit {} failed: {}", video_ts.display(), e);
        if output.exists() {
            if let Err(remove_err) = fs::remove_file(&output) {
                warn!("Failed to remove {}: {}", output.display(), remove_err);
            }
        }
    }
    cleanup(&scratch);
    cleanup(video_ts);
    result
}

fn build_unit(
    video_ts: &Path,
    scratch: &Path,
    output: &Path,
    profile: PreservationProfile,
    encoder: &dyn Encoder,
    min_segment_secs: f64,
) -> Result<UnitStatus, UnitError> {
    let segments = ordered_segments(video_ts)?;
    fs::create_dir_all(scratch)?;

    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut converted = Vec::new();

    for segment in &segments {
        match encoder.probe_duration(segment)? {
            Some(secs) if secs >= min_segment_secs => {}
            Some(secs) => {
                debug!("Skipping short segment {} ({:.1}s)", segment.display(), secs);
                continue;
            }
            None => {
                debug!("Skipping segment {} of unknown duration", segment.display());
                continue;
            }
        }

        let target = scratch.join(format!("segment_{:03}.{}", converted.len() + 1, extension));
        let job = EncodeJob {
            class: MediaClass::Dvd,
            profile,
            input: segment,
            output: &target,
        };
        encoder.encode(&job)?;
        converted.push(target);
    }

    match converted.len() {
        0 => {
            info!("No qualifying segments in {}", video_ts.display());
            return Ok(UnitStatus::SkippedUnsupported(SkipReason::NoQualifyingSegments));
        }
        1 => fs::rename(&converted[0], output)?,
        _ => encoder.concat(&converted, output, scratch)?,
    }

    super::verify_output(output)?;
    Ok(UnitStatus::Converted {
        output: output.to_path_buf(),
        segments: converted.len(),
    })
}

fn cleanup(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!("Failed to remove {}: {}", dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_order() {
        let mut names = vec![
            "VTS_02_1.VOB",
            "VIDEO_TS.VOB",
            "vts_01_10.vob",
            "VTS_01_2.VOB",
            "VTS_01_1.VOB",
        ];
        names.sort_by_cached_key(|n| segment_key(n));
        assert_eq!(
            names,
            vec!["VTS_01_1.VOB", "VTS_01_2.VOB", "vts_01_10.vob", "VTS_02_1.VOB", "VIDEO_TS.VOB"]
        );
    }

    #[test]
    fn test_ordered_segments_only_vobs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["VTS_01_2.VOB", "VTS_01_1.VOB", "VTS_01_0.IFO", "VTS_01_0.BUP"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let segments = ordered_segments(dir.path()).unwrap();
        let names: Vec<_> = segments
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["VTS_01_1.VOB", "VTS_01_2.VOB"]);
    }

    #[test]
    fn test_unit_output() {
        let output = unit_output(
            Path::new("/dest/Family Tapes/VIDEO_TS"),
            PreservationProfile::Distribution,
        )
        .unwrap();
        assert_eq!(output, PathBuf::from("/dest/Family Tapes/family_tapes_mp4.mp4"));
    }
}
