//! Media inspection through ffprobe.
//!
//! Probes are short, bounded subprocess calls. The output is parsed into a
//! small typed summary; only stream heights and container duration matter to
//! the pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe exited unsuccessfully.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("ffprobe timed out after {0:?}")]
    Timeout(Duration),

    /// IO error during probe, including a missing binary.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Information about a video stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoStream {
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
}

/// Information about an audio stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioStream {
    pub codec_name: String,
    pub channels: u32,
}

/// Container format information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatInfo {
    /// Duration in seconds; 0 when ffprobe reported none.
    pub duration_secs: f64,
    pub size_bytes: u64,
}

/// Result of probing a media file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub video_streams: Vec<VideoStream>,
    pub audio_streams: Vec<AudioStream>,
    pub subtitle_streams: usize,
    pub format: FormatInfo,
}

impl ProbeResult {
    /// Height of the first video stream.
    pub fn primary_height(&self) -> Option<u32> {
        self.video_streams
            .first()
            .map(|v| v.height)
            .filter(|h| *h > 0)
    }
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub channels: Option<u32>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
        pub size: Option<String>,
    }
}

/// Run ffprobe with `args` followed by `path`, returning stdout.
async fn run_ffprobe(
    ffprobe: &Path,
    args: &[&str],
    path: &Path,
    timeout: Duration,
) -> Result<String, ProbeError> {
    let mut cmd = Command::new(ffprobe);
    cmd.args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| ProbeError::Timeout(timeout))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Probe stream and format metadata.
///
/// Runs `ffprobe -v quiet -print_format json -show_streams -show_format <path>`.
pub async fn probe_file(
    ffprobe: &Path,
    path: &Path,
    timeout: Duration,
) -> Result<ProbeResult, ProbeError> {
    let stdout = run_ffprobe(
        ffprobe,
        &[
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ],
        path,
        timeout,
    )
    .await?;
    parse_ffprobe_output(&stdout)
}

/// Probe only the container duration.
pub async fn probe_duration(
    ffprobe: &Path,
    path: &Path,
    timeout: Duration,
) -> Result<f64, ProbeError> {
    let stdout = run_ffprobe(
        ffprobe,
        &[
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ],
        path,
        timeout,
    )
    .await?;
    parse_duration_output(&stdout)
}

/// Parse the single-value output of a `format=duration` probe.
pub fn parse_duration_output(stdout: &str) -> Result<f64, ProbeError> {
    let value = stdout.lines().map(str::trim).find(|l| !l.is_empty());
    match value {
        Some(v) => v
            .parse::<f64>()
            .map_err(|_| ProbeError::ParseError(format!("duration is not a number: {}", v))),
        None => Err(ProbeError::ParseError("no duration reported".to_string())),
    }
}

/// Parses ffprobe JSON output into a ProbeResult.
pub fn parse_ffprobe_output(json_str: &str) -> Result<ProbeResult, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let streams = ffprobe.streams.unwrap_or_default();
    let format = ffprobe.format.ok_or_else(|| {
        ProbeError::ParseError("Missing format information in ffprobe output".to_string())
    })?;

    let mut video_streams = Vec::new();
    let mut audio_streams = Vec::new();
    let mut subtitle_streams = 0;

    for stream in streams {
        let codec_name = stream.codec_name.clone().unwrap_or_default();
        match stream.codec_type.as_deref().unwrap_or("") {
            "video" => video_streams.push(VideoStream {
                codec_name,
                width: stream.width.unwrap_or(0),
                height: stream.height.unwrap_or(0),
            }),
            "audio" => audio_streams.push(AudioStream {
                codec_name,
                channels: stream.channels.unwrap_or(0),
            }),
            "subtitle" => subtitle_streams += 1,
            _ => {}
        }
    }

    let duration_secs = format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size_bytes = format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(ProbeResult {
        video_streams,
        audio_streams,
        subtitle_streams,
        format: FormatInfo {
            duration_secs,
            size_bytes,
        },
    })
}
