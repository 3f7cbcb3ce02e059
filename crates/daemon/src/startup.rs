//! Preflight checks run before the monitor starts.
//!
//! - ffmpeg and ffprobe must run (`-version`); their major versions are logged
//! - with hardware acceleration disabled, the resolved encoder arguments must
//!   not name a hardware encoder or device
//! - the destination root is created; a missing source root only warns, since
//!   the cleanup safety rails already refuse to act on it

use crate::config::Config;
use crate::profile::QualityProfile;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::{info, warn};

/// Substrings naming hardware encoders, devices or APIs.
const FORBIDDEN_HW_FLAGS: &[&str] = &["nvenc", "qsv", "vaapi", "cuda", "amf", "vce", "qsvenc"];

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Hardware encoding detected: {0}")]
    HardwareEncodingDetected(String),

    #[error("cannot prepare destination root {path}: {source}")]
    DestinationRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// First forbidden hardware flag contained in `s`, case-insensitively.
pub fn detect_hardware_flag(s: &str) -> Option<&'static str> {
    let lower = s.to_lowercase();
    FORBIDDEN_HW_FLAGS
        .iter()
        .find(|&&flag| lower.contains(flag))
        .copied()
}

/// Reject hardware flags in `args` unless hardware encoding is allowed.
pub fn check_args_for_hardware_flags(
    args: &[&str],
    hardware_allowed: bool,
) -> Result<(), StartupError> {
    if hardware_allowed {
        return Ok(());
    }

    for arg in args {
        if let Some(flag) = detect_hardware_flag(arg) {
            return Err(StartupError::HardwareEncodingDetected(format!(
                "Hardware encoding flag '{}' found in '{}', but hardware acceleration is disabled",
                flag, arg
            )));
        }
    }

    Ok(())
}

/// Major version from `<tool> version X.Y ...` output.
///
/// Handles `n`-prefixed git builds (`n7.1-12-gabcdef`).
pub fn parse_tool_version(version_output: &str, tool: &str) -> Option<u32> {
    let marker = format!("{} version", tool.to_lowercase());
    let line = version_output
        .lines()
        .map(|l| l.to_lowercase())
        .find(|l| l.contains(&marker))?;

    let token = line.split(&marker).nth(1)?.split_whitespace().next()?.to_string();
    let token = token.trim_start_matches('n');
    token.split(['.', '-']).next()?.parse().ok()
}

pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    parse_tool_version(version_output, "ffmpeg")
}

/// Run `<binary> -version`. Returns the parsed major version, if any.
pub fn check_tool(binary: &Path, tool: &str) -> Result<Option<u32>, StartupError> {
    let unavailable = |reason: String| StartupError::ToolUnavailable {
        tool: tool.to_string(),
        reason,
    };

    let output = Command::new(binary)
        .arg("-version")
        .output()
        .map_err(|e| unavailable(format!("failed to run {} -version: {}", binary.display(), e)))?;

    if !output.status.success() {
        return Err(unavailable(format!(
            "{} -version exited with {}",
            binary.display(),
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = parse_tool_version(&stdout, tool);
    match version {
        Some(major) => info!(tool, major, "found {}", tool),
        None => warn!(tool, "could not parse version output"),
    }
    Ok(version)
}

/// Warn about a missing source root; create the destination root.
pub fn prepare_roots(cfg: &Config) -> Result<(), StartupError> {
    let source = &cfg.paths.source_folder;
    if !source.is_dir() {
        warn!(path = %source.display(), "source root is not an accessible directory");
    }

    let dest = &cfg.paths.dest_folder;
    std::fs::create_dir_all(dest).map_err(|source| StartupError::DestinationRoot {
        path: dest.display().to_string(),
        source,
    })?;
    Ok(())
}

/// Run all startup checks in order:
/// 1. hardware flags against the resolved profile
/// 2. ffmpeg
/// 3. ffprobe
/// 4. roots
pub fn run_startup_checks(cfg: &Config, profile: &QualityProfile) -> Result<(), StartupError> {
    let encoder_args = profile.encoder_args(cfg.encoding.target_height);
    check_args_for_hardware_flags(&encoder_args.all_args(), cfg.encoding.enable_hw_accel)?;
    info!(profile = %profile, "encoder profile resolved");

    check_tool(&cfg.tools.ffmpeg, "ffmpeg")?;
    check_tool(&cfg.tools.ffprobe, "ffprobe")?;
    prepare_roots(cfg)
}
