//! ffmpeg command building and execution.

use crate::profile::EncoderArgs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Failed to spawn ffmpeg process
    #[error("Failed to spawn ffmpeg: {0}")]
    SpawnFailed(std::io::Error),

    /// ffmpeg ran past the encode ceiling and was killed
    #[error("ffmpeg timed out after {0:?}")]
    Timeout(Duration),

    /// IO error while waiting on the process
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One encode: source in, temp artifact out.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub source: PathBuf,
    /// Written by ffmpeg; renamed into place only after verification.
    pub temp_output: PathBuf,
    pub args: EncoderArgs,
    pub timeout: Duration,
}

/// Fixed audio re-encode settings.
pub const AUDIO_CODEC: &str = "libopus";
pub const AUDIO_BITRATE: &str = "128k";
pub const AUDIO_CHANNELS: &str = "2";

/// Build the ffmpeg argument list for a request.
///
/// The temp path ends in `.tmp`, so the container is forced with `-f`.
pub fn build_encode_args(request: &EncodeRequest) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into()];

    args.extend(request.args.input_args.iter().cloned());
    args.push("-i".into());
    args.push(request.source.to_string_lossy().into_owned());

    for map in ["0:v:0", "0:a?", "0:s?"] {
        args.push("-map".into());
        args.push(map.into());
    }

    args.push("-vf".into());
    args.push(request.args.video_filter.clone());
    args.push("-c:v".into());
    args.push(request.args.video_codec.clone());
    args.extend(request.args.quality_args.iter().cloned());

    args.extend(
        [
            "-c:a",
            AUDIO_CODEC,
            "-b:a",
            AUDIO_BITRATE,
            "-ac",
            AUDIO_CHANNELS,
            "-c:s",
            "copy",
            "-f",
            "matroska",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    args.push(request.temp_output.to_string_lossy().into_owned());
    args
}

/// Build the ffmpeg command for a request.
///
/// Both output pipes are captured so the log can be streamed; the child is
/// killed if the handle is dropped.
pub fn build_encode_command(ffmpeg: &Path, request: &EncodeRequest) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(build_encode_args(request))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, source: String) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "ffmpeg", source = %source, "{}", line);
    }
}

/// Run ffmpeg for `request`, returning its exit code.
///
/// Output is forwarded line by line as it arrives. A run exceeding the
/// request timeout is killed. Termination by signal reports `-1`.
pub async fn run_encode(ffmpeg: &Path, request: &EncodeRequest) -> Result<i32, EncodeError> {
    let source = request.source.display().to_string();
    info!(
        source = %source,
        output = %request.temp_output.display(),
        codec = %request.args.video_codec,
        "starting ffmpeg"
    );

    let mut child = build_encode_command(ffmpeg, request)
        .spawn()
        .map_err(EncodeError::SpawnFailed)?;

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(stdout, source.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(stderr, source.clone())));
    }

    let status = match tokio::time::timeout(request.timeout, child.wait()).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(source = %source, timeout = ?request.timeout, "ffmpeg timed out, killing");
            child.kill().await?;
            return Err(EncodeError::Timeout(request.timeout));
        }
    };

    for reader in readers {
        let _ = reader.await;
    }

    Ok(status.code().unwrap_or(-1))
}
