//! Version symlinks beside source files.
//!
//! A playback host that only sees the source tree discovers the encoded
//! variant through a link named `<stem><suffix>.mkv` next to the original.
//! Link targets are written in the host's view of the destination tree
//! (`symlink_target_prefix`), so they usually dangle inside this process.

use crate::config::Config;
use crate::paths::{find_suffix_ignore_ascii_case, OUTPUT_EXTENSION};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum SymlinkError {
    #[error("symlink I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SymlinkError {
    fn io(path: &Path, source: io::Error) -> Self {
        SymlinkError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VersionSymlinkManager {
    source_root: PathBuf,
    dest_root: PathBuf,
    target_prefix: String,
    suffix: String,
}

impl VersionSymlinkManager {
    pub fn new(
        source_root: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
        target_prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
            target_prefix: target_prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            &cfg.paths.source_folder,
            &cfg.paths.dest_folder,
            cfg.versions.symlink_target_prefix.clone(),
            cfg.versions.symlink_version_suffix.clone(),
        )
    }

    /// Links are only managed when a host prefix is configured.
    pub fn enabled(&self) -> bool {
        !self.target_prefix.is_empty() && !self.suffix.is_empty()
    }

    /// `<source dir>/<source stem><suffix>.mkv`
    pub fn link_path(&self, source: &Path) -> Option<PathBuf> {
        let stem = source.file_stem()?.to_str()?;
        let dir = source.parent()?;
        Some(dir.join(format!("{}{}.{}", stem, self.suffix, OUTPUT_EXTENSION)))
    }

    /// Rewrite the destination root of `final_dest` to the host prefix.
    pub fn link_target(&self, final_dest: &Path) -> Option<PathBuf> {
        let relative = final_dest.strip_prefix(&self.dest_root).ok()?;
        Some(Path::new(&self.target_prefix).join(relative))
    }

    /// Create or refresh the link for a committed artifact.
    ///
    /// Returns the link path, or `None` when disabled or when the link
    /// would sit on the artifact itself. A regular file in the link's place
    /// is never replaced.
    pub fn create(
        &self,
        source: &Path,
        final_dest: &Path,
    ) -> Result<Option<PathBuf>, SymlinkError> {
        if !self.enabled() {
            return Ok(None);
        }
        let (Some(link), Some(target)) = (self.link_path(source), self.link_target(final_dest))
        else {
            return Ok(None);
        };
        if link == final_dest {
            return Ok(None);
        }

        match fs::symlink_metadata(&link) {
            Ok(meta) if meta.file_type().is_symlink() => {
                fs::remove_file(&link).map_err(|e| SymlinkError::io(&link, e))?;
            }
            Ok(_) => {
                warn!(link = %link.display(), "regular file in place of version link, leaving it");
                return Ok(None);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(SymlinkError::io(&link, e)),
        }

        make_symlink(&target, &link).map_err(|e| SymlinkError::io(&link, e))?;
        info!(link = %link.display(), target = %target.display(), "version link created");
        Ok(Some(link))
    }

    /// Remove the link for `source` if one exists. Returns whether one was removed.
    pub fn delete(&self, source: &Path) -> Result<bool, SymlinkError> {
        if !self.enabled() {
            return Ok(false);
        }
        match self.link_path(source) {
            Some(link) => remove_if_symlink(&link),
            None => Ok(false),
        }
    }

    /// Remove the link that would point at `final_dest`.
    ///
    /// Used when the source is already gone: the link sits in the mirrored
    /// source directory and carries the destination stem.
    pub fn delete_for_destination(&self, final_dest: &Path) -> Result<bool, SymlinkError> {
        if !self.enabled() {
            return Ok(false);
        }
        let Ok(relative) = final_dest.strip_prefix(&self.dest_root) else {
            return Ok(false);
        };
        let Some(stem) = relative.file_stem().and_then(|s| s.to_str()) else {
            return Ok(false);
        };
        let dir = self
            .source_root
            .join(relative.parent().unwrap_or_else(|| Path::new("")));

        let link = if find_suffix_ignore_ascii_case(stem, &self.suffix).is_some() {
            dir.join(format!("{}.{}", stem, OUTPUT_EXTENSION))
        } else {
            dir.join(format!("{}{}.{}", stem, self.suffix, OUTPUT_EXTENSION))
        };
        remove_if_symlink(&link)
    }

    /// Remove every version link under the source root whose destination
    /// artifact no longer exists. Links pointing outside the prefix are not ours.
    pub fn sweep_orphans(&self) -> Result<usize, SymlinkError> {
        if !self.enabled() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in WalkDir::new(&self.source_root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.path_is_symlink() {
                continue;
            }
            let path = entry.path();
            if !self.is_version_link_name(path) {
                continue;
            }
            let target = match fs::read_link(path) {
                Ok(t) => t,
                Err(e) => {
                    debug!(link = %path.display(), error = %e, "unreadable link");
                    continue;
                }
            };
            let Ok(relative) = target.strip_prefix(&self.target_prefix) else {
                continue;
            };
            if !self.dest_root.join(relative).exists() && remove_if_symlink(path)? {
                info!(link = %path.display(), target = %target.display(), "removed orphaned version link");
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn is_version_link_name(&self, path: &Path) -> bool {
        let is_output = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(OUTPUT_EXTENSION));
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        is_output && find_suffix_ignore_ascii_case(stem, &self.suffix).is_some()
    }
}

fn remove_if_symlink(link: &Path) -> Result<bool, SymlinkError> {
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(link).map_err(|e| SymlinkError::io(link, e))?;
            debug!(link = %link.display(), "version link removed");
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SymlinkError::io(link, e)),
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "version links require a unix host",
    ))
}
