//! Read-only comparison of the source and destination trees.
//!
//! Reports sources without an encode, encodes without a source, and
//! sources the quality markers say were never meant to be encoded. Keys go
//! through the [`PathMapper`] so a shared multi-version tree compares
//! outputs against the names they were given.

use crate::paths::{relative_stem, Mapping, PathMapper};
use crate::quality_gate::{classify_markers, MarkerVerdict};
use crate::scan::{scan_sources, source_root_status, IgnoreFilter, RootStatus, ScanCandidate};
use humansize::{format_size, BINARY};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("{role} folder is not accessible ({status:?}): {path}")]
    RootInaccessible {
        role: &'static str,
        path: PathBuf,
        status: RootStatus,
    },

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write CSV report: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

/// One file in the report, relative to its tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub path: String,
    pub size_bytes: u64,
}

impl ReportEntry {
    fn new(candidate: &ScanCandidate, root: &Path) -> Self {
        let path = candidate
            .path
            .strip_prefix(root)
            .unwrap_or(&candidate.path)
            .to_string_lossy()
            .into_owned();
        Self {
            path,
            size_bytes: candidate.size_bytes,
        }
    }

    pub fn size_human(&self) -> String {
        format_size(self.size_bytes, BINARY)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonResult {
    pub source_folder: PathBuf,
    pub dest_folder: PathBuf,
    pub missing_encodes: Vec<ReportEntry>,
    pub orphaned_encodes: Vec<ReportEntry>,
    pub skipped_low_quality: Vec<ReportEntry>,
    pub matched_count: usize,
    pub total_source_files: usize,
    pub total_dest_files: usize,
}

impl ComparisonResult {
    pub fn total_missing_size(&self) -> u64 {
        self.missing_encodes.iter().map(|e| e.size_bytes).sum()
    }

    pub fn total_orphaned_size(&self) -> u64 {
        self.orphaned_encodes.iter().map(|e| e.size_bytes).sum()
    }

    pub fn has_issues(&self) -> bool {
        !self.missing_encodes.is_empty() || !self.orphaned_encodes.is_empty()
    }

    /// 1 when anything is missing or orphaned.
    pub fn exit_code(&self) -> u8 {
        u8::from(self.has_issues())
    }
}

fn require_root(role: &'static str, path: &Path) -> Result<(), CompareError> {
    match source_root_status(path) {
        RootStatus::Accessible => Ok(()),
        status => Err(CompareError::RootInaccessible {
            role,
            path: path.to_path_buf(),
            status,
        }),
    }
}

/// Diff the two trees of `mapper`.
pub fn compare_trees(
    mapper: &PathMapper,
    filter: &IgnoreFilter,
) -> Result<ComparisonResult, CompareError> {
    let source_root = mapper.source_root();
    let dest_root = mapper.dest_root();
    require_root("source", source_root)?;
    require_root("destination", dest_root)?;

    let mut sources: BTreeMap<String, ReportEntry> = BTreeMap::new();
    let mut dests: BTreeMap<String, ReportEntry> = BTreeMap::new();

    for candidate in scan_sources(source_root, filter) {
        if let Mapping::Target(final_path) = mapper.map(&candidate.path) {
            if let Some(key) = relative_stem(&final_path, dest_root) {
                sources.insert(key, ReportEntry::new(&candidate, source_root));
            }
        }
    }

    for candidate in scan_sources(dest_root, filter) {
        let owned = !mapper.same_tree()
            || candidate
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| mapper.is_version_named(stem));
        if !owned {
            continue;
        }
        if let Some(key) = relative_stem(&candidate.path, dest_root) {
            dests.insert(key, ReportEntry::new(&candidate, dest_root));
        }
    }

    let mut result = ComparisonResult {
        source_folder: source_root.to_path_buf(),
        dest_folder: dest_root.to_path_buf(),
        total_source_files: sources.len(),
        total_dest_files: dests.len(),
        ..ComparisonResult::default()
    };

    for (key, entry) in &sources {
        if dests.contains_key(key) {
            result.matched_count += 1;
        } else if classify_markers(&entry.path) == MarkerVerdict::Low {
            result.skipped_low_quality.push(entry.clone());
        } else {
            result.missing_encodes.push(entry.clone());
        }
    }
    for (key, entry) in dests {
        if !sources.contains_key(&key) {
            result.orphaned_encodes.push(entry);
        }
    }

    for list in [
        &mut result.missing_encodes,
        &mut result.orphaned_encodes,
        &mut result.skipped_low_quality,
    ] {
        list.sort_by(|a, b| a.path.cmp(&b.path));
    }
    Ok(result)
}

pub fn format_report(
    result: &ComparisonResult,
    format: ReportFormat,
    show_skipped: bool,
) -> Result<String, CompareError> {
    match format {
        ReportFormat::Text => Ok(format_text(result, show_skipped)),
        ReportFormat::Json => format_json(result, show_skipped),
        ReportFormat::Csv => format_csv(result, show_skipped),
    }
}

fn push_section(out: &mut String, title: &str, entries: &[ReportEntry]) {
    let rule = "-".repeat(40);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", rule);
    for entry in entries {
        let _ = writeln!(out, "  [{:>12}] {}", entry.size_human(), entry.path);
    }
    out.push('\n');
}

pub fn format_text(result: &ComparisonResult, show_skipped: bool) -> String {
    let banner = "=".repeat(80);
    let mut out = String::new();

    let _ = writeln!(out, "{}\nENCODING COMPARISON REPORT\n{}\n", banner, banner);
    let _ = writeln!(out, "Source folder:      {}", result.source_folder.display());
    let _ = writeln!(out, "Destination folder: {}\n", result.dest_folder.display());

    let _ = writeln!(out, "Total source files:      {}", result.total_source_files);
    let _ = writeln!(out, "Total destination files: {}", result.total_dest_files);
    let _ = writeln!(out, "Matched (encoded):       {}", result.matched_count);
    let _ = writeln!(out, "Missing encodes:         {}", result.missing_encodes.len());
    let _ = writeln!(out, "Orphaned encodes:        {}", result.orphaned_encodes.len());
    let _ = writeln!(out, "Skipped (low quality):   {}\n", result.skipped_low_quality.len());

    if !result.missing_encodes.is_empty() {
        let title = format!(
            "MISSING ENCODES ({} files, {} total)",
            result.missing_encodes.len(),
            format_size(result.total_missing_size(), BINARY)
        );
        push_section(&mut out, &title, &result.missing_encodes);
    }
    if !result.orphaned_encodes.is_empty() {
        let title = format!(
            "ORPHANED ENCODES ({} files, {} total)",
            result.orphaned_encodes.len(),
            format_size(result.total_orphaned_size(), BINARY)
        );
        push_section(&mut out, &title, &result.orphaned_encodes);
    }
    if show_skipped && !result.skipped_low_quality.is_empty() {
        let title = format!(
            "SKIPPED - LOW QUALITY ({} files)",
            result.skipped_low_quality.len()
        );
        push_section(&mut out, &title, &result.skipped_low_quality);
    }

    let _ = writeln!(out, "{}", banner);
    if result.has_issues() {
        let mut issues = Vec::new();
        if !result.missing_encodes.is_empty() {
            issues.push(format!("{} missing encodes", result.missing_encodes.len()));
        }
        if !result.orphaned_encodes.is_empty() {
            issues.push(format!("{} orphaned files", result.orphaned_encodes.len()));
        }
        let _ = writeln!(out, "STATUS: Issues found - {}", issues.join(", "));
    } else {
        let _ = writeln!(out, "STATUS: All files are in sync");
    }
    out.push_str(&banner);
    out
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    path: &'a str,
    size_bytes: u64,
    size_human: String,
}

impl<'a> From<&'a ReportEntry> for JsonEntry<'a> {
    fn from(entry: &'a ReportEntry) -> Self {
        Self {
            path: &entry.path,
            size_bytes: entry.size_bytes,
            size_human: entry.size_human(),
        }
    }
}

#[derive(Serialize)]
struct JsonSummary {
    total_source_files: usize,
    total_dest_files: usize,
    matched_count: usize,
    missing_encodes_count: usize,
    orphaned_encodes_count: usize,
    skipped_low_quality_count: usize,
    total_missing_size_bytes: u64,
    total_orphaned_size_bytes: u64,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    source_folder: String,
    dest_folder: String,
    summary: JsonSummary,
    missing_encodes: Vec<JsonEntry<'a>>,
    orphaned_encodes: Vec<JsonEntry<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped_low_quality: Option<Vec<JsonEntry<'a>>>,
}

pub fn format_json(result: &ComparisonResult, show_skipped: bool) -> Result<String, CompareError> {
    let report = JsonReport {
        source_folder: result.source_folder.to_string_lossy().into_owned(),
        dest_folder: result.dest_folder.to_string_lossy().into_owned(),
        summary: JsonSummary {
            total_source_files: result.total_source_files,
            total_dest_files: result.total_dest_files,
            matched_count: result.matched_count,
            missing_encodes_count: result.missing_encodes.len(),
            orphaned_encodes_count: result.orphaned_encodes.len(),
            skipped_low_quality_count: result.skipped_low_quality.len(),
            total_missing_size_bytes: result.total_missing_size(),
            total_orphaned_size_bytes: result.total_orphaned_size(),
        },
        missing_encodes: result.missing_encodes.iter().map(JsonEntry::from).collect(),
        orphaned_encodes: result.orphaned_encodes.iter().map(JsonEntry::from).collect(),
        skipped_low_quality: show_skipped
            .then(|| result.skipped_low_quality.iter().map(JsonEntry::from).collect()),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

pub fn format_csv(result: &ComparisonResult, show_skipped: bool) -> Result<String, CompareError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["type", "path", "size_bytes", "size_human"])?;

    let mut sections = vec![
        ("missing_encode", &result.missing_encodes),
        ("orphaned_encode", &result.orphaned_encodes),
    ];
    if show_skipped {
        sections.push(("skipped_low_quality", &result.skipped_low_quality));
    }
    for (kind, entries) in sections {
        for entry in entries {
            let size = entry.size_bytes.to_string();
            let human = entry.size_human();
            writer.write_record([kind, entry.path.as_str(), size.as_str(), human.as_str()])?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CompareError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; len]).unwrap();
    }

    fn fixture() -> (TempDir, PathMapper) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        write(&src.join("Movies/Alpha.mkv"), 10);
        write(&src.join("Movies/Beta.mp4"), 2048);
        write(&src.join("Shows/Gamma.720p.HDTV.mkv"), 5);
        write(&src.join("Shows/Delta.mkv.part"), 5);
        write(&dst.join("movies/alpha.mkv"), 4);
        write(&dst.join("Old/Zeta.mkv"), 1024);
        write(&dst.join("Movies/Beta.mkv.tmp"), 1);
        let mapper = PathMapper::new(&src, &dst, false, " - 720p");
        (dir, mapper)
    }

    #[test]
    fn test_compare_separate_trees() {
        let (_dir, mapper) = fixture();
        let result = compare_trees(&mapper, &IgnoreFilter::default()).unwrap();

        assert_eq!(result.total_source_files, 3);
        assert_eq!(result.total_dest_files, 2);
        assert_eq!(result.matched_count, 1);
        assert_eq!(
            result.missing_encodes,
            vec![ReportEntry {
                path: "Movies/Beta.mp4".to_string(),
                size_bytes: 2048
            }]
        );
        assert_eq!(result.orphaned_encodes.len(), 1);
        assert_eq!(result.orphaned_encodes[0].path, "Old/Zeta.mkv");
        assert_eq!(result.skipped_low_quality.len(), 1);
        assert!(result.has_issues());
        assert_eq!(result.exit_code(), 1);
    }

    #[test]
    fn test_in_sync_tree_exits_zero() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        write(&src.join("A.avi"), 1);
        write(&dst.join("A.mkv"), 1);

        let result =
            compare_trees(&PathMapper::new(&src, &dst, false, ""), &IgnoreFilter::default())
                .unwrap();
        assert!(!result.has_issues());
        assert_eq!(result.exit_code(), 0);
        assert!(format_text(&result, false).contains("STATUS: All files are in sync"));
    }

    #[test]
    fn test_compare_same_tree_multi_version() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        write(&root.join("Show/S01E01 - 1080p.mkv"), 1);
        write(&root.join("Show/S01E01 - 720p.mkv"), 1);
        write(&root.join("Show/S01E02 - 1080p.mkv"), 1);
        write(&root.join("Show/S01E03 - 720p.mkv"), 1);

        let mapper = PathMapper::new(&root, &root, true, " - 720p");
        let result = compare_trees(&mapper, &IgnoreFilter::default()).unwrap();

        assert_eq!(result.matched_count, 1);
        assert_eq!(result.missing_encodes.len(), 1);
        assert_eq!(result.missing_encodes[0].path, "Show/S01E02 - 1080p.mkv");
        assert_eq!(result.orphaned_encodes.len(), 1);
        assert_eq!(result.orphaned_encodes[0].path, "Show/S01E03 - 720p.mkv");
    }

    #[test]
    fn test_missing_destination_is_an_error() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("src/A.mkv"), 1);
        let mapper = PathMapper::new(dir.path().join("src"), dir.path().join("dst"), false, "");
        assert!(matches!(
            compare_trees(&mapper, &IgnoreFilter::default()),
            Err(CompareError::RootInaccessible {
                role: "destination",
                ..
            })
        ));
    }

    #[test]
    fn test_text_report_sections() {
        let (_dir, mapper) = fixture();
        let result = compare_trees(&mapper, &IgnoreFilter::default()).unwrap();

        let text = format_text(&result, false);
        assert!(text.contains("MISSING ENCODES (1 files, 2 KiB total)"));
        assert!(text.contains("ORPHANED ENCODES (1 files, 1 KiB total)"));
        assert!(text.contains("Movies/Beta.mp4"));
        assert!(!text.contains("SKIPPED - LOW QUALITY"));
        assert!(text.contains("STATUS: Issues found - 1 missing encodes, 1 orphaned files"));

        assert!(format_text(&result, true).contains("Shows/Gamma.720p.HDTV.mkv"));
    }

    #[test]
    fn test_json_report() {
        let (_dir, mapper) = fixture();
        let result = compare_trees(&mapper, &IgnoreFilter::default()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&format_json(&result, false).unwrap()).unwrap();
        assert_eq!(value["summary"]["matched_count"], 1);
        assert_eq!(value["summary"]["total_missing_size_bytes"], 2048);
        assert_eq!(value["missing_encodes"][0]["path"], "Movies/Beta.mp4");
        assert!(value.get("skipped_low_quality").is_none());

        let value: serde_json::Value =
            serde_json::from_str(&format_json(&result, true).unwrap()).unwrap();
        assert_eq!(value["skipped_low_quality"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_csv_report() {
        let (_dir, mapper) = fixture();
        let result = compare_trees(&mapper, &IgnoreFilter::default()).unwrap();

        let csv = format_csv(&result, true).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "type,path,size_bytes,size_human");
        assert_eq!(lines[1], "missing_encode,Movies/Beta.mp4,2048,2 KiB");
        assert_eq!(lines[2], "orphaned_encode,Old/Zeta.mkv,1024,1 KiB");
        assert!(lines[3].starts_with("skipped_low_quality,Shows/Gamma.720p.HDTV.mkv,5,"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_report_format_parse() {
        assert_eq!("JSON".parse::<ReportFormat>(), Ok(ReportFormat::Json));
        assert_eq!("text".parse::<ReportFormat>(), Ok(ReportFormat::Text));
        assert!("xml".parse::<ReportFormat>().is_err());
    }
}
