//! In-process stand-in for ffmpeg/ffprobe used by unit tests.

use crate::encode::{EncodeError, EncodeRequest};
use crate::probe::{FormatInfo, ProbeError, ProbeResult, VideoStream};
use crate::tools::MediaTools;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fake tools.
///
/// A file is "valid media" when it exists and is non-empty. `encode` writes
/// the temp output itself unless configured to produce an empty file.
pub struct FakeTools {
    probe_height: Option<u32>,
    exit_code: i32,
    write_valid_output: bool,
    encode_delay: Duration,
    probe_calls: AtomicUsize,
    active_encodes: AtomicUsize,
    max_active_encodes: AtomicUsize,
    encoded: Mutex<Vec<PathBuf>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self {
            probe_height: Some(1080),
            exit_code: 0,
            write_valid_output: true,
            encode_delay: Duration::ZERO,
            probe_calls: AtomicUsize::new(0),
            active_encodes: AtomicUsize::new(0),
            max_active_encodes: AtomicUsize::new(0),
            encoded: Mutex::new(Vec::new()),
        }
    }

    /// `None` makes every probe fail.
    pub fn with_probe_height(mut self, height: Option<u32>) -> Self {
        self.probe_height = height;
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Encodes exit 0 but leave an empty, unverifiable output.
    pub fn with_invalid_output(mut self) -> Self {
        self.write_valid_output = false;
        self
    }

    pub fn with_encode_delay(mut self, delay: Duration) -> Self {
        self.encode_delay = delay;
        self
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn encode_calls(&self) -> usize {
        self.encoded.lock().unwrap().len()
    }

    pub fn encoded_sources(&self) -> Vec<PathBuf> {
        self.encoded.lock().unwrap().clone()
    }

    pub fn max_concurrent_encodes(&self) -> usize {
        self.max_active_encodes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaTools for FakeTools {
    async fn probe(&self, _path: &Path) -> Result<ProbeResult, ProbeError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        match self.probe_height {
            Some(height) => Ok(ProbeResult {
                video_streams: vec![VideoStream {
                    codec_name: "h264".to_string(),
                    width: height * 16 / 9,
                    height,
                }],
                audio_streams: Vec::new(),
                subtitle_streams: 0,
                format: FormatInfo {
                    duration_secs: 60.0,
                    size_bytes: 0,
                },
            }),
            None => Err(ProbeError::FfprobeFailed("fake probe failure".to_string())),
        }
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, ProbeError> {
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > 0 {
            Ok(metadata.len() as f64)
        } else {
            Ok(0.0)
        }
    }

    async fn encode(&self, request: &EncodeRequest) -> Result<i32, EncodeError> {
        self.encoded.lock().unwrap().push(request.source.clone());
        let active = self.active_encodes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_encodes.fetch_max(active, Ordering::SeqCst);

        let body: &[u8] = if self.write_valid_output { b"encoded" } else { b"" };
        let result = tokio::fs::write(&request.temp_output, body).await;
        if !self.encode_delay.is_zero() {
            tokio::time::sleep(self.encode_delay).await;
        }

        self.active_encodes.fetch_sub(1, Ordering::SeqCst);
        result?;
        Ok(self.exit_code)
    }
}
