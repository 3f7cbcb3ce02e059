//! Bounded worker pool for coordinator jobs.
//!
//! Each accepted source runs end-to-end (stability wait, encode, verify,
//! commit) on one task holding one semaphore permit. Registration happens in
//! `submit`, before any await, so duplicates are refused even while queued.

use crate::concurrency::ConcurrencyPlan;
use crate::coordinator::{JobOutcome, SkipReason, TranscodeCoordinator};
use crate::tools::MediaTools;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Result of handing a source to the pool.
#[derive(Debug)]
pub enum Submission {
    /// Queued; the handle resolves when the job ends.
    Accepted(JoinHandle<JobOutcome>),
    AlreadyActive,
    ShuttingDown,
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted(_))
    }
}

pub struct WorkerPool<T: MediaTools + 'static> {
    coordinator: Arc<TranscodeCoordinator<T>>,
    semaphore: Arc<Semaphore>,
    capacity: u32,
    shutting_down: Arc<AtomicBool>,
}

impl<T: MediaTools + 'static> WorkerPool<T> {
    pub fn new(coordinator: Arc<TranscodeCoordinator<T>>, capacity: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            coordinator,
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_plan(coordinator: Arc<TranscodeCoordinator<T>>, plan: &ConcurrencyPlan) -> Self {
        Self::new(coordinator, plan.max_concurrent_jobs)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn coordinator(&self) -> &Arc<TranscodeCoordinator<T>> {
        &self.coordinator
    }

    /// Register `source` and queue its job.
    pub fn submit(&self, source: PathBuf) -> Submission {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Submission::ShuttingDown;
        }
        let Some(guard) = self.coordinator.try_accept(&source) else {
            return Submission::AlreadyActive;
        };

        let coordinator = Arc::clone(&self.coordinator);
        let semaphore = Arc::clone(&self.semaphore);
        let shutting_down = Arc::clone(&self.shutting_down);

        let handle = tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                debug!(path = %guard.source().display(), "pool closed before job started");
                return JobOutcome::Skipped(SkipReason::ShuttingDown);
            };
            if shutting_down.load(Ordering::SeqCst) {
                debug!(path = %guard.source().display(), "shutting down, job not started");
                return JobOutcome::Skipped(SkipReason::ShuttingDown);
            }
            coordinator.process(guard).await
        });
        Submission::Accepted(handle)
    }

    /// Refuse new work and wait for running jobs to finish.
    ///
    /// Jobs still waiting for a permit exit without touching any file.
    pub async fn drain(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(capacity = self.capacity, "draining worker pool");
        if let Ok(all) = self.semaphore.acquire_many(self.capacity).await {
            self.semaphore.close();
            drop(all);
        }
        info!("worker pool drained");
    }
}
