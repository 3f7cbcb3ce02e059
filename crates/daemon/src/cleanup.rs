//! Periodic reconciliation of the destination tree against the sources.
//!
//! Cleanup only ever deletes destination-owned artifacts whose source stem
//! is absent from a complete, non-empty listing of an accessible source root.
//! It reads both trees from disk and ignores the in-memory caches.

use crate::config::Config;
use crate::metrics::{unix_ms_now, SharedMetrics};
use crate::paths::{
    relative_stem, strip_suffix_ignore_ascii_case, Mapping, PathMapper, OUTPUT_EXTENSION,
    TEMP_SUFFIX,
};
use crate::scan::{source_root_status, try_scan_sources, IgnoreFilter, RootStatus};
use crate::stability::is_growing;
use crate::symlink::VersionSymlinkManager;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Reasons a sweep declines to run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyAbort {
    #[error("source root is not accessible ({0:?})")]
    SourceRootInaccessible(RootStatus),

    #[error("source tree contains no video files")]
    EmptySourceTree,

    #[error("source listing incomplete: {0}")]
    IncompleteListing(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub source_files: usize,
    pub deleted: Vec<PathBuf>,
    pub skipped_growing: Vec<PathBuf>,
    pub symlinks_removed: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Aborted(SafetyAbort),
    Completed(CleanupReport),
}

/// Both sides of one sweep, read from disk.
struct Listing {
    source_files: usize,
    expected_stems: HashSet<String>,
    orphans: Vec<PathBuf>,
}

#[derive(Clone)]
pub struct CleanupReconciler {
    mapper: PathMapper,
    symlinks: VersionSymlinkManager,
    filter: IgnoreFilter,
    temp_growth_window: Duration,
    metrics: SharedMetrics,
}

impl CleanupReconciler {
    pub fn new(
        mapper: PathMapper,
        symlinks: VersionSymlinkManager,
        filter: IgnoreFilter,
        temp_growth_window: Duration,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            mapper,
            symlinks,
            filter,
            temp_growth_window,
            metrics,
        }
    }

    pub fn from_config(cfg: &Config, filter: IgnoreFilter, metrics: SharedMetrics) -> Self {
        Self::new(
            PathMapper::from_config(cfg),
            VersionSymlinkManager::from_config(cfg),
            filter,
            Duration::from_secs(cfg.stability.temp_growth_window_secs),
            metrics,
        )
    }

    /// One reconciliation sweep.
    pub async fn run(&self) -> CleanupOutcome {
        info!(
            source = %self.mapper.source_root().display(),
            dest = %self.mapper.dest_root().display(),
            "cleanup sweep starting"
        );

        let this = self.clone();
        let listing = match tokio::task::spawn_blocking(move || this.list()).await {
            Ok(Ok(listing)) => listing,
            Ok(Err(abort)) => {
                warn!(reason = %abort, "cleanup aborted");
                return CleanupOutcome::Aborted(abort);
            }
            Err(e) => {
                let abort = SafetyAbort::IncompleteListing(e.to_string());
                warn!(reason = %abort, "cleanup aborted");
                return CleanupOutcome::Aborted(abort);
            }
        };

        let mut report = CleanupReport {
            source_files: listing.source_files,
            ..CleanupReport::default()
        };
        debug!(
            sources = listing.source_files,
            stems = listing.expected_stems.len(),
            orphans = listing.orphans.len(),
            "cleanup listing complete"
        );

        for orphan in listing.orphans {
            self.reconcile_orphan(orphan, &mut report).await;
        }

        let symlinks = self.symlinks.clone();
        match tokio::task::spawn_blocking(move || symlinks.sweep_orphans()).await {
            Ok(Ok(removed)) => report.symlinks_removed += removed,
            Ok(Err(e)) => {
                warn!(error = %e, "orphaned link sweep failed");
                report.errors += 1;
            }
            Err(e) => {
                warn!(error = %e, "orphaned link sweep panicked");
                report.errors += 1;
            }
        }

        {
            let mut metrics = self.metrics.write().await;
            metrics.cleanup_deletions += report.deleted.len() as u64;
            metrics.last_cleanup_unix_ms = Some(unix_ms_now());
        }
        info!(
            deleted = report.deleted.len(),
            skipped_growing = report.skipped_growing.len(),
            symlinks_removed = report.symlinks_removed,
            errors = report.errors,
            "cleanup sweep finished"
        );
        CleanupOutcome::Completed(report)
    }

    async fn reconcile_orphan(&self, orphan: PathBuf, report: &mut CleanupReport) {
        if is_temp(&orphan) && is_growing(&orphan, self.temp_growth_window).await {
            info!(path = %orphan.display(), "orphaned temp still growing, leaving it");
            report.skipped_growing.push(orphan);
            return;
        }

        match tokio::fs::remove_file(&orphan).await {
            Ok(()) => info!(path = %orphan.display(), "deleted orphaned artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %orphan.display(), "orphan already gone");
                return;
            }
            Err(e) => {
                warn!(path = %orphan.display(), error = %e, "failed to delete orphaned artifact");
                report.errors += 1;
                return;
            }
        }

        let final_path = final_path_of(&orphan);
        match self.symlinks.delete_for_destination(&final_path) {
            Ok(true) => report.symlinks_removed += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(path = %final_path.display(), error = %e, "failed to delete version link");
                report.errors += 1;
            }
        }
        report.deleted.push(orphan);
    }

    /// Read both trees. Any doubt about the source side aborts the sweep.
    fn list(&self) -> Result<Listing, SafetyAbort> {
        let source_root = self.mapper.source_root();
        let dest_root = self.mapper.dest_root();

        match source_root_status(source_root) {
            RootStatus::Accessible => {}
            status => return Err(SafetyAbort::SourceRootInaccessible(status)),
        }

        let sources = try_scan_sources(source_root, &self.filter)
            .map_err(|e| SafetyAbort::IncompleteListing(e.to_string()))?;
        if sources.is_empty() {
            return Err(SafetyAbort::EmptySourceTree);
        }

        let mut expected_stems = HashSet::new();
        for candidate in &sources {
            let stem = match self.mapper.map(&candidate.path) {
                Mapping::Target(final_path) => relative_stem(&final_path, dest_root),
                Mapping::AlreadyEncoded => None,
                // protect anything that shares a name with a real file
                Mapping::Unmappable => relative_stem(&candidate.path, source_root),
            };
            expected_stems.extend(stem);
        }

        let orphans = self
            .destination_artifacts()
            .into_iter()
            .filter(|artifact| {
                relative_stem(artifact, dest_root)
                    .is_some_and(|stem| !expected_stems.contains(&stem))
            })
            .collect();

        Ok(Listing {
            source_files: sources.len(),
            expected_stems,
            orphans,
        })
    }

    /// Final and temp artifacts this system may own under the destination root.
    fn destination_artifacts(&self) -> Vec<PathBuf> {
        WalkDir::new(self.mapper.dest_root())
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "skipping unreadable destination entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.is_owned_artifact(path))
            .collect()
    }

    fn is_owned_artifact(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = strip_suffix_ignore_ascii_case(name, TEMP_SUFFIX).unwrap_or(name);
        let Some(stem) = strip_suffix_ignore_ascii_case(name, &format!(".{}", OUTPUT_EXTENSION))
        else {
            return false;
        };
        // In a shared tree only version-named files are ours.
        !self.mapper.same_tree() || self.mapper.is_version_named(stem)
    }
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| strip_suffix_ignore_ascii_case(n, TEMP_SUFFIX).is_some())
}

fn final_path_of(artifact: &Path) -> PathBuf {
    match artifact.to_str() {
        Some(s) => PathBuf::from(strip_suffix_ignore_ascii_case(s, TEMP_SUFFIX).unwrap_or(s)),
        None => artifact.to_path_buf(),
    }
}
