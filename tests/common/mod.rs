// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use archivist::convert::{EncodeJob, Encoder, EncoderError};
use archivist::media::MediaClass;
use archivist::pipeline::{Phase, ProgressSink};
use archivist::progress::{ProgressTracker, SilentProgress};
use archivist::PipelineConfig;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Encoder that never leaves the process
///
/// `encode` writes `[<input bytes>]` to the output, so concatenated DVD
/// outputs show their segment order. Durations are looked up by lowercase
/// file name and default to one minute.
#[derive(Default)]
pub struct FakeEncoder {
    jobs: Mutex<Vec<(MediaClass, PathBuf, PathBuf)>>,
    durations: HashMap<String, f64>,
    failing: Vec<String>,
    delay: Option<Duration>,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `secs` as the duration of files called `name`
    pub fn with_duration(mut self, name: &str, secs: f64) -> Self {
        self.durations.insert(name.to_lowercase(), secs);
        self
    }

    /// Fail every job whose input name contains `pattern`
    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.failing.push(pattern.to_string());
        self
    }

    /// Sleep this long inside every `encode`, so jobs overlap on the pool
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Input file names of every job so far, sorted
    pub fn encoded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .map(|(_, input, _)| file_name(input))
            .collect();
        names.sort();
        names
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.jobs.lock().unwrap().clear();
    }
}

impl Encoder for FakeEncoder {
    fn encode(&self, job: &EncodeJob<'_>) -> Result<(), EncoderError> {
        self.jobs.lock().unwrap().push((
            job.class,
            job.input.to_path_buf(),
            job.output.to_path_buf(),
        ));

        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        let name = file_name(job.input);
        if self.failing.iter().any(|p| name.contains(p.as_str())) {
            return Err(EncoderError::Failed {
                program: "fake".to_string(),
                code: 1,
                stderr: format!("cannot convert {}", name),
            });
        }

        let mut content = b"[".to_vec();
        content.extend(fs::read(job.input)?);
        content.push(b']');
        fs::write(job.output, content)?;
        Ok(())
    }

    fn probe_duration(&self, input: &Path) -> Result<Option<f64>, EncoderError> {
        let name = file_name(input).to_lowercase();
        Ok(Some(self.durations.get(&name).copied().unwrap_or(60.0)))
    }

    fn concat(&self, segments: &[PathBuf], output: &Path, _scratch: &Path) -> Result<(), EncoderError> {
        let mut content = Vec::new();
        for segment in segments {
            content.extend(fs::read(segment)?);
        }
        fs::write(output, content)?;
        Ok(())
    }
}

/// Progress sink that discards everything
pub struct QuietSink;

impl ProgressSink for QuietSink {
    fn phase(&self, _phase: Phase) -> Box<dyn ProgressTracker> {
        Box::new(SilentProgress::new())
    }
}

/// Configuration with a small fixed worker pool
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        workers: Some(2),
        ..PipelineConfig::default()
    }
}

/// Write a file, creating its parent directories
pub fn write_file(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Every file below `root` as a sorted list of `/`-separated relative paths
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();
    files.sort();
    files
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}
