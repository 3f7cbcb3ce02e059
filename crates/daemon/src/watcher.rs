//! Bridge from `notify` into the monitor's tokio loop.
//!
//! The notify callback runs on the backend's own thread and forwards
//! translated events with `blocking_send`. Filtering by extension and ignore
//! pattern happens at the monitor, which owns the scan filter.

use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A path appeared, or finished being written.
    Created(PathBuf),
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(p) | WatchEvent::Removed(p) => p,
        }
    }
}

/// Keeps the recursive watch alive; dropping it stops the event stream.
pub struct DirectoryWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Watch `root` recursively. Events arrive on the returned receiver.
    pub fn watch(
        root: &Path,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<WatchEvent>), WatchError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let notify_err = |source| WatchError::Notify {
            path: root.to_path_buf(),
            source,
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for translated in translate(&event) {
                        if tx.blocking_send(translated).is_err() {
                            debug!("watch channel closed, dropping event");
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "filesystem watch error"),
            },
            NotifyConfig::default(),
        )
        .map_err(notify_err)?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(notify_err)?;
        debug!(root = %root.display(), "watching source tree");

        Ok((
            Self {
                root: root.to_path_buf(),
                _watcher: watcher,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Map one raw notify event onto zero or more monitor events.
pub fn translate(event: &Event) -> Vec<WatchEvent> {
    let paths = &event.paths;
    match event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To))
        | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            paths.iter().cloned().map(WatchEvent::Created).collect()
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.iter().cloned().map(WatchEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.as_slice() {
            [from, to, ..] => vec![
                WatchEvent::Removed(from.clone()),
                WatchEvent::Created(to.clone()),
            ],
            [only] => vec![WatchEvent::Created(only.clone())],
            [] => Vec::new(),
        },
        // Backends that cannot tell the rename side apart.
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .map(|p| {
                if p.exists() {
                    WatchEvent::Created(p.clone())
                } else {
                    WatchEvent::Removed(p.clone())
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}
