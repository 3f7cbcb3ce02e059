//! Write-completion detection.
//!
//! There is no close/flush signal for files written by another process, so a
//! file counts as complete once its size has stopped changing for a number of
//! consecutive samples. The decision logic is a pure state machine driven by
//! a sampler, which keeps it testable with a paused clock.

use crate::config::StabilityConfig;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Sampling policy for a stability wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    /// Consecutive unchanged samples required.
    pub required_samples: u32,
    /// Delay between samples.
    pub interval: Duration,
    /// Give up after this long.
    pub timeout: Duration,
}

impl StabilityPolicy {
    pub fn from_config(cfg: &StabilityConfig) -> Self {
        Self {
            required_samples: cfg.required_stable_samples,
            interval: Duration::from_secs(cfg.sample_interval_secs.max(1)),
            timeout: Duration::from_secs(cfg.timeout_hours.saturating_mul(3600)),
        }
    }
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self::from_config(&StabilityConfig::default())
    }
}

/// State after one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityState {
    /// Still waiting; `unchanged` equal samples seen so far.
    Growing { last_size: u64, unchanged: u32 },
    Stable,
    TimedOut,
    Gone,
}

/// Terminal result of a stability wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityOutcome {
    Stable,
    TimedOut,
    Gone,
}

/// Counts consecutive unchanged size samples.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    policy: StabilityPolicy,
    last_size: Option<u64>,
    unchanged: u32,
}

impl StabilityTracker {
    pub fn new(policy: StabilityPolicy) -> Self {
        Self {
            policy,
            last_size: None,
            unchanged: 0,
        }
    }

    /// Feed one size sample. `None` means the file no longer exists.
    ///
    /// `elapsed` is the time since the wait started; the timeout is only
    /// checked once the sample has failed to prove stability.
    pub fn observe(&mut self, size: Option<u64>, elapsed: Duration) -> StabilityState {
        let Some(size) = size else {
            return StabilityState::Gone;
        };

        match self.last_size {
            Some(last) if last == size => self.unchanged = self.unchanged.saturating_add(1),
            _ => self.unchanged = 0,
        }
        self.last_size = Some(size);

        if self.unchanged >= self.policy.required_samples {
            StabilityState::Stable
        } else if elapsed >= self.policy.timeout {
            StabilityState::TimedOut
        } else {
            StabilityState::Growing {
                last_size: size,
                unchanged: self.unchanged,
            }
        }
    }
}

async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

/// Block until `path` stops growing, times out, or disappears.
pub async fn wait_until_stable(path: &Path, policy: StabilityPolicy) -> StabilityOutcome {
    wait_until_stable_with(policy, || file_size(path)).await
}

/// Drive a [`StabilityTracker`] with an arbitrary size sampler.
pub async fn wait_until_stable_with<F, Fut>(
    policy: StabilityPolicy,
    mut sample: F,
) -> StabilityOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<u64>>,
{
    let start = Instant::now();
    let mut tracker = StabilityTracker::new(policy);

    loop {
        let size = sample().await;
        match tracker.observe(size, start.elapsed()) {
            StabilityState::Stable => return StabilityOutcome::Stable,
            StabilityState::TimedOut => return StabilityOutcome::TimedOut,
            StabilityState::Gone => return StabilityOutcome::Gone,
            StabilityState::Growing { .. } => sleep(policy.interval).await,
        }
    }
}

/// Two samples `window` apart; true only if the file exists and changed size.
///
/// A vanished file is not growing.
pub async fn is_growing(path: &Path, window: Duration) -> bool {
    let Some(before) = file_size(path).await else {
        return false;
    };
    sleep(window).await;
    match file_size(path).await {
        Some(after) => after != before,
        None => false,
    }
}
