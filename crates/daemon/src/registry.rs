//! Shared in-flight registry and processed cache.
//!
//! Registration happens before any check so concurrent discoveries of the
//! same source cannot both pass. The guard returned by registration removes
//! the entry when dropped, which covers every exit path of a job.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicked holder leaves plain data behind; keep serving it.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sources with an active job.
#[derive(Debug, Default)]
pub struct ProcessingRegistry {
    active: Mutex<HashSet<PathBuf>>,
}

impl ProcessingRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `source`, or `None` if a job for it is already active.
    pub fn try_register(self: &Arc<Self>, source: &Path) -> Option<RegistrationGuard> {
        let inserted = lock(&self.active).insert(source.to_path_buf());
        inserted.then(|| RegistrationGuard {
            registry: Arc::clone(self),
            source: source.to_path_buf(),
        })
    }

    pub fn is_active(&self, source: &Path) -> bool {
        lock(&self.active).contains(source)
    }

    pub fn len(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unregister(&self, source: &Path) {
        lock(&self.active).remove(source);
    }
}

/// Proof of registration; unregisters on drop.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<ProcessingRegistry>,
    source: PathBuf,
}

impl RegistrationGuard {
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.source);
    }
}

/// Final destination paths known to hold a verified artifact.
///
/// Only an accelerator: an empty cache falls back to on-disk verification.
#[derive(Debug, Default)]
pub struct ProcessedCache {
    entries: Mutex<HashMap<PathBuf, bool>>,
}

impl ProcessedCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_verified(&self, final_path: &Path) {
        lock(&self.entries).insert(final_path.to_path_buf(), true);
    }

    pub fn is_verified(&self, final_path: &Path) -> bool {
        lock(&self.entries)
            .get(final_path)
            .copied()
            .unwrap_or(false)
    }

    pub fn forget(&self, final_path: &Path) {
        lock(&self.entries).remove(final_path);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
