//! Source to destination path mapping.
//!
//! Every destination artifact is named from its source path alone, so the
//! mapping must be a pure function: the coordinator, the cleanup reconciler
//! and the comparison report all derive the same names independently.

use crate::config::Config;
use std::path::{Component, Path, PathBuf};

/// Container extension of every produced artifact.
pub const OUTPUT_EXTENSION: &str = "mkv";

/// Appended to the final path while the encoder is still writing.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Quality markers recognised at the end of a stem. Checked in order.
pub const QUALITY_TOKENS: &[&str] = &[
    "bdremux", "web-dl", "webrip", "bluray", "2160p", "1440p", "1080p", "1080i", "remux",
    "hdtv", "720p", "576p", "480p", "uhd", "4k",
];

/// Separators that may precede a quality marker.
const TOKEN_SEPARATORS: &[&str] = &[" - ", " ", ".", "_", "-"];

/// Result of mapping one source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    /// Final destination path of the artifact.
    Target(PathBuf),
    /// The source is itself an output of this system.
    AlreadyEncoded,
    /// The source lies outside the source root, or its output would
    /// overwrite the source file itself.
    Unmappable,
}

/// Maps source files onto destination artifact paths.
#[derive(Debug, Clone)]
pub struct PathMapper {
    source_root: PathBuf,
    dest_root: PathBuf,
    multi_version: bool,
    version_suffix: String,
}

impl PathMapper {
    pub fn new(
        source_root: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
        multi_version: bool,
        version_suffix: impl Into<String>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
            multi_version,
            version_suffix: version_suffix.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            &cfg.paths.source_folder,
            &cfg.paths.dest_folder,
            cfg.versions.multi_version_mode,
            cfg.versions.symlink_version_suffix.clone(),
        )
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    pub fn version_suffix(&self) -> &str {
        &self.version_suffix
    }

    /// Source and destination trees coincide.
    pub fn same_tree(&self) -> bool {
        self.source_root == self.dest_root
    }

    /// Multi-version naming only applies when both trees are the same directory.
    pub fn multi_version_active(&self) -> bool {
        self.multi_version && self.same_tree()
    }

    /// Map a source file to its destination artifact.
    pub fn map(&self, source: &Path) -> Mapping {
        let Some(stem) = source.file_stem().and_then(|s| s.to_str()) else {
            return Mapping::Unmappable;
        };

        if self.is_version_named(stem) {
            return Mapping::AlreadyEncoded;
        }

        let Ok(relative) = source.strip_prefix(&self.source_root) else {
            return Mapping::Unmappable;
        };
        let relative_dir = relative.parent().unwrap_or_else(|| Path::new(""));

        let file_stem = if self.multi_version_active() {
            let trimmed = strip_quality_token(stem).unwrap_or(stem);
            if self.is_version_named(trimmed) {
                return Mapping::AlreadyEncoded;
            }
            format!("{}{}", trimmed, self.version_suffix)
        } else {
            stem.to_string()
        };

        let target = self
            .dest_root
            .join(relative_dir)
            .join(format!("{}.{}", file_stem, OUTPUT_EXTENSION));

        if target == source {
            return Mapping::Unmappable;
        }
        Mapping::Target(target)
    }

    /// A stem carrying the version suffix names an output of this system.
    pub fn is_version_named(&self, stem: &str) -> bool {
        !self.version_suffix.is_empty()
            && find_suffix_ignore_ascii_case(stem, &self.version_suffix).is_some()
    }
}

/// `<final>.tmp` beside the final path.
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut temp = final_path.as_os_str().to_owned();
    temp.push(TEMP_SUFFIX);
    PathBuf::from(temp)
}

/// Strip a trailing quality marker (and the separator before it).
///
/// Returns `None` when the stem carries no recognised marker, or when the
/// marker is the whole stem.
pub fn strip_quality_token(stem: &str) -> Option<&str> {
    for token in QUALITY_TOKENS {
        for sep in TOKEN_SEPARATORS {
            let pattern = format!("{}{}", sep, token);
            if let Some(start) = find_suffix_ignore_ascii_case(stem, &pattern) {
                if start > 0 {
                    return Some(&stem[..start]);
                }
            }
        }
    }
    None
}

/// Lowercased relative path without its extension, `/`-joined.
///
/// Temp artifacts (`x.mkv.tmp`) share the stem of their final path. This is
/// the join key between source and destination trees.
pub fn relative_stem(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let name = relative.file_name()?.to_str()?;
    let name = strip_suffix_ignore_ascii_case(name, TEMP_SUFFIX).unwrap_or(name);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };

    let mut parts: Vec<String> = Vec::new();
    if let Some(parent) = relative.parent() {
        for component in parent.components() {
            if let Component::Normal(part) = component {
                parts.push(part.to_str()?.to_lowercase());
            }
        }
    }
    parts.push(stem.to_lowercase());
    Some(parts.join("/"))
}

/// Byte offset where `suffix` starts if `s` ends with it, ignoring ASCII case.
pub(crate) fn find_suffix_ignore_ascii_case(s: &str, suffix: &str) -> Option<usize> {
    if suffix.len() > s.len() {
        return None;
    }
    let start = s.len() - suffix.len();
    if !s.is_char_boundary(start) {
        return None;
    }
    s[start..].eq_ignore_ascii_case(suffix).then_some(start)
}

pub(crate) fn strip_suffix_ignore_ascii_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    find_suffix_ignore_ascii_case(s, suffix).map(|start| &s[..start])
}
