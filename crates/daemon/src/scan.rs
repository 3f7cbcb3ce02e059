//! Scanner module for discovering source video files.
//!
//! Recursively walks the source root, filtering by extension and by a set of
//! filename patterns that mark partial downloads and OS metadata files.

use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// Video file extensions recognised by the scanner (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "mpeg", "mpg", "webm", "iso", "m4v", "ts", "m2ts",
];

/// Filenames that are never candidates: AppleDouble files, partial
/// downloads, encoder temps and OS metadata.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    r"^\._",
    r"\.tmp$",
    r"\.part$",
    r"\.!qB$",
    r"^\.DS_Store$",
    r"^Thumbs\.db$",
];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid ignore pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Part of the tree could not be listed.
    #[error("incomplete listing of {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// A candidate video file discovered during scanning.
#[derive(Debug, Clone)]
pub struct ScanCandidate {
    /// Full path to the video file.
    pub path: PathBuf,
    /// File size in bytes at discovery time.
    pub size_bytes: u64,
    /// Last modified time of the file.
    pub modified_time: SystemTime,
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Filename patterns excluded from scanning, matched case-insensitively.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    patterns: Vec<Regex>,
}

impl IgnoreFilter {
    /// Built-in patterns plus `extra` user patterns.
    pub fn new(extra: &[String]) -> Result<Self, ScanError> {
        let sources = DEFAULT_IGNORE_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .chain(extra.iter().cloned());

        let mut patterns = Vec::new();
        for pattern in sources {
            let regex = compile(&pattern).map_err(|source| ScanError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            patterns.push(regex);
        }
        Ok(Self { patterns })
    }

    /// True if the file name matches any ignore pattern.
    pub fn is_ignored(&self, path: &Path) -> bool {
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => self.patterns.iter().any(|re| re.is_match(name)),
            None => true,
        }
    }
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        let patterns = DEFAULT_IGNORE_PATTERNS
            .iter()
            .filter_map(|p| compile(p).ok())
            .collect();
        Self { patterns }
    }
}

/// Checks if a file has a video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// A video file that no ignore pattern excludes.
pub fn is_candidate(path: &Path, filter: &IgnoreFilter) -> bool {
    is_video_file(path) && !filter.is_ignored(path)
}

fn not_hidden_dir(entry: &DirEntry) -> bool {
    // The root itself may start with '.'
    if entry.depth() > 0 && entry.file_type().is_dir() {
        if let Some(name) = entry.file_name().to_str() {
            return !name.starts_with('.');
        }
    }
    true
}

fn to_candidate(entry: &DirEntry, filter: &IgnoreFilter) -> Option<ScanCandidate> {
    // Symlinks are never followed nor reported; version links live here.
    if !entry.file_type().is_file() {
        return None;
    }
    let path = entry.path();
    if !is_candidate(path, filter) {
        return None;
    }
    let metadata = entry.metadata().ok()?;
    Some(ScanCandidate {
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        modified_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    })
}

/// Whether a root can be listed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootStatus {
    Accessible,
    Missing,
    NotADirectory,
    Unreadable,
}

pub fn source_root_status(root: &Path) -> RootStatus {
    match std::fs::metadata(root) {
        Ok(meta) if !meta.is_dir() => RootStatus::NotADirectory,
        Ok(_) => match std::fs::read_dir(root) {
            Ok(_) => RootStatus::Accessible,
            Err(_) => RootStatus::Unreadable,
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RootStatus::Missing,
        Err(_) => RootStatus::Unreadable,
    }
}

/// Scan the source root for candidates, skipping unreadable entries.
///
/// Used for discovery, where a partial listing only delays work.
pub fn scan_sources(root: &Path, filter: &IgnoreFilter) -> Vec<ScanCandidate> {
    if !root.exists() {
        return Vec::new();
    }

    let walker = WalkDir::new(root).into_iter().filter_entry(not_hidden_dir);

    let mut candidates = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => candidates.extend(to_candidate(&entry, filter)),
            Err(e) => warn!(root = %root.display(), error = %e, "skipping unreadable entry"),
        }
    }
    candidates
}

/// Scan the source root, failing on the first unreadable entry.
///
/// Used where a partial listing would be mistaken for deleted sources.
pub fn try_scan_sources(
    root: &Path,
    filter: &IgnoreFilter,
) -> Result<Vec<ScanCandidate>, ScanError> {
    let walker = WalkDir::new(root).into_iter().filter_entry(not_hidden_dir);

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|source| ScanError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        candidates.extend(to_candidate(&entry, filter));
    }
    Ok(candidates)
}
