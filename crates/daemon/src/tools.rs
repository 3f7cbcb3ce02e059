//! External media tools behind a trait, so the pipeline can run against fakes.

use crate::config::ToolsConfig;
use crate::encode::{run_encode, EncodeError, EncodeRequest};
use crate::probe::{self, ProbeError, ProbeResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Stream and format metadata.
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError>;

    /// Container duration in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, ProbeError>;

    /// Run one encode and return the process exit code.
    async fn encode(&self, request: &EncodeRequest) -> Result<i32, EncodeError>;
}

/// ffmpeg/ffprobe subprocesses.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    probe_timeout: Duration,
}

impl FfmpegTools {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, probe_timeout: Duration) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            probe_timeout,
        }
    }

    pub fn from_config(cfg: &ToolsConfig) -> Self {
        Self::new(
            cfg.ffmpeg.clone(),
            cfg.ffprobe.clone(),
            Duration::from_secs(cfg.probe_timeout_secs.max(1)),
        )
    }
}

#[async_trait]
impl MediaTools for FfmpegTools {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        probe::probe_file(&self.ffprobe, path, self.probe_timeout).await
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, ProbeError> {
        probe::probe_duration(&self.ffprobe, path, self.probe_timeout).await
    }

    async fn encode(&self, request: &EncodeRequest) -> Result<i32, EncodeError> {
        run_encode(&self.ffmpeg, request).await
    }
}
