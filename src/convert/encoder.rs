// src/convert/encoder.rs

//! External encoder boundary
//!
//! Conversion itself happens in external programs. The [`Encoder`] trait is
//! the seam: [`CommandEncoder`] runs the real tools with fixed argument
//! templates, tests substitute a fake.
//!
//! Every invocation runs with stdin closed and a hard wall-clock limit. A
//! process that outlives its limit is killed and the job fails.

use crate::config::{EncoderPrograms, Timeouts};
use crate::media::{MediaClass, PreservationProfile};
use crate::naming::split_name;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Longest stderr excerpt kept in an error
const STDERR_EXCERPT: usize = 2000;

/// Errors raised at the encoder boundary
#[derive(Debug, Error)]
pub enum EncoderError {
    /// The program could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The program exited unsuccessfully
    #[error("{program} failed with exit code {code}: {stderr}")]
    Failed {
        program: String,
        /// -1 when the process was ended by a signal
        code: i32,
        stderr: String,
    },

    /// The program exceeded its time limit and was killed
    #[error("{program} timed out after {seconds} seconds")]
    TimedOut { program: String, seconds: u64 },

    /// No encoder exists for this class under this profile
    #[error("no encoder for {class} under the {profile} profile")]
    Unsupported {
        class: MediaClass,
        profile: PreservationProfile,
    },

    /// Local file handling around the job failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One conversion job
#[derive(Debug, Clone, Copy)]
pub struct EncodeJob<'a> {
    pub class: MediaClass,
    pub profile: PreservationProfile,
    pub input: &'a Path,
    pub output: &'a Path,
}

/// Something that can convert files
///
/// Implementations are shared across conversion workers.
pub trait Encoder: Send + Sync {
    /// Convert `job.input` into `job.output`
    fn encode(&self, job: &EncodeJob<'_>) -> Result<(), EncoderError>;

    /// Duration of a media file in seconds, `None` when it cannot be told
    fn probe_duration(&self, input: &Path) -> Result<Option<f64>, EncoderError>;

    /// Join already converted segments, in order, into `output`
    ///
    /// `scratch` is a directory the implementation may write helper files to.
    fn concat(&self, segments: &[PathBuf], output: &Path, scratch: &Path) -> Result<(), EncoderError>;
}

/// A fully resolved external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub timeout: Duration,
}

impl Invocation {
    fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            timeout,
        }
    }

    fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

const FFV1_VIDEO: &[&str] = &[
    "-map_metadata", "0", "-c:v", "ffv1", "-level", "3", "-g", "1", "-slicecrc", "1", "-c:a", "flac",
];
const H264_VIDEO: &[&str] = &[
    "-map_metadata", "0", "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-pix_fmt",
    "yuv420p", "-c:a", "aac", "-movflags", "+faststart",
];

/// Encoder backed by ImageMagick, FFmpeg, Ghostscript and unoconv
#[derive(Debug, Clone, Default)]
pub struct CommandEncoder {
    programs: EncoderPrograms,
    timeouts: Timeouts,
}

impl CommandEncoder {
    pub fn new(programs: EncoderPrograms, timeouts: Timeouts) -> Self {
        Self { programs, timeouts }
    }

    /// Command line for a conversion job
    pub fn invocation(&self, job: &EncodeJob<'_>) -> Result<Invocation, EncoderError> {
        use PreservationProfile::{Archival, Distribution};

        let p = &self.programs;
        let t = &self.timeouts;
        let input = job.input.as_os_str();
        let output = job.output.as_os_str();

        let invocation = match (job.class, job.profile) {
            (MediaClass::Image, Archival) => Invocation::new(&p.magick, t.image())
                .arg(input)
                .args(["-compress", "None"])
                .arg(output),
            (MediaClass::Image, Distribution) => Invocation::new(&p.magick, t.image())
                .arg(input)
                .args(["-quality", "90"])
                .arg(output),
            (MediaClass::Video, Archival) => Invocation::new(&p.ffmpeg, t.video())
                .args(["-y", "-i"])
                .arg(input)
                .args(FFV1_VIDEO.iter().copied())
                .arg(output),
            (MediaClass::Video, Distribution) => Invocation::new(&p.ffmpeg, t.video())
                .args(["-y", "-i"])
                .arg(input)
                .args(H264_VIDEO.iter().copied())
                .arg(output),
            (MediaClass::Dvd, Archival) => Invocation::new(&p.ffmpeg, t.dvd_segment())
                .args(["-y", "-i"])
                .arg(input)
                .args(FFV1_VIDEO.iter().copied())
                .arg(output),
            (MediaClass::Dvd, Distribution) => Invocation::new(&p.ffmpeg, t.dvd_segment())
                .args(["-y", "-i"])
                .arg(input)
                .args(H264_VIDEO.iter().copied())
                .arg(output),
            (MediaClass::Audio, Archival) => Invocation::new(&p.ffmpeg, t.audio())
                .args(["-y", "-i"])
                .arg(input)
                .args(["-acodec", "pcm_s16le", "-ar", "44100"])
                .arg(output),
            (MediaClass::Audio, Distribution) => Invocation::new(&p.ffmpeg, t.audio())
                .args(["-y", "-i"])
                .arg(input)
                .args(["-codec:a", "libmp3lame", "-qscale:a", "2"])
                .arg(output),
            (MediaClass::Text, Archival | Distribution) if is_pdf(job.input) => {
                let mut out_arg = OsString::from("-sOutputFile=");
                out_arg.push(output);
                Invocation::new(&p.ghostscript, t.text())
                    .args([
                        "-dPDFA=2",
                        "-dBATCH",
                        "-dNOPAUSE",
                        "-sColorConversionStrategy=UseDeviceIndependentColor",
                        "-sDEVICE=pdfwrite",
                        "-dPDFACompatibilityPolicy=1",
                    ])
                    .arg(out_arg)
                    .arg(input)
            }
            (MediaClass::Text, Archival | Distribution) => Invocation::new(&p.unoconv, t.text())
                .args(["-f", "pdf", "-eSelectPdfVersion=2", "-o"])
                .arg(output)
                .arg(input),
            (class, profile) => return Err(EncoderError::Unsupported { class, profile }),
        };
        Ok(invocation)
    }

    fn probe_invocation(&self, input: &Path) -> Invocation {
        Invocation::new(&self.programs.ffprobe, self.timeouts.probe())
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input.as_os_str())
    }

    fn concat_invocation(&self, list: &Path, output: &Path) -> Invocation {
        Invocation::new(&self.programs.ffmpeg, self.timeouts.concat())
            .args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(list.as_os_str())
            .args(["-map_metadata", "0", "-c", "copy"])
            .arg(output.as_os_str())
    }
}

fn is_pdf(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .and_then(|n| split_name(&n).1.map(|e| e.eq_ignore_ascii_case("pdf")))
        .unwrap_or(false)
}

impl Encoder for CommandEncoder {
    fn encode(&self, job: &EncodeJob<'_>) -> Result<(), EncoderError> {
        let invocation = self.invocation(job)?;
        run(&invocation, &job.input.display().to_string())?;
        Ok(())
    }

    fn probe_duration(&self, input: &Path) -> Result<Option<f64>, EncoderError> {
        let invocation = self.probe_invocation(input);
        let stdout = run(&invocation, &input.display().to_string())?;
        Ok(parse_duration(&stdout))
    }

    fn concat(&self, segments: &[PathBuf], output: &Path, scratch: &Path) -> Result<(), EncoderError> {
        let list = scratch.join("concat.txt");
        fs::write(&list, concat_list(segments))?;
        let invocation = self.concat_invocation(&list, output);
        let result = run(&invocation, &output.display().to_string());
        let _ = fs::remove_file(&list);
        result.map(|_| ())
    }
}

/// First line of probe output as seconds
pub fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Concat demuxer list for `segments`
pub fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|s| format!("file '{}'\n", s.display().to_string().replace('\'', "'\\''")))
        .collect()
}

/// Run an invocation to completion or until its timeout
///
/// Returns stdout. Both pipes are drained on their own threads so a chatty
/// encoder cannot block on a full pipe while we wait.
fn run(invocation: &Invocation, label: &str) -> Result<String, EncoderError> {
    let program = invocation.program.clone();
    debug!("Executing: {} {:?}", program, invocation.args);

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| EncoderError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    let status = match child.wait_timeout(invocation.timeout)? {
        Some(status) => status,
        None => {
            // Timeout - kill the process
            let _ = child.kill();
            let _ = child.wait();
            return Err(EncoderError::TimedOut {
                program,
                seconds: invocation.timeout.as_secs(),
            });
        }
    };

    let stdout = stdout_reader.map(collect).unwrap_or_default();
    let stderr = stderr_reader.map(collect).unwrap_or_default();

    if status.success() {
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!("[{}] {}", label, line);
        }
        Ok(stdout)
    } else {
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            warn!("[{}] {}", label, line);
        }
        Err(EncoderError::Failed {
            program,
            code: status.code().unwrap_or(-1),
            stderr: excerpt(stderr.trim()),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: thread::JoinHandle<Vec<u8>>) -> String {
    handle
        .join()
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

/// Tail of a long stderr, where the actual error usually is
fn excerpt(stderr: &str) -> String {
    if stderr.len() <= STDERR_EXCERPT {
        return stderr.to_string();
    }
    let mut start = stderr.len() - STDERR_EXCERPT;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &stderr[start..])
}
