//! Metrics module for the transcode monitor
//!
//! Provides structs for job metrics, system metrics, and metrics snapshots
//! with JSON serialization support.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// Terminal job entries kept in the snapshot.
pub const JOB_HISTORY_LIMIT: usize = 100;

/// Per-job entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMetrics {
    pub id: String,
    pub source_path: String,
    pub dest_path: String,
    pub stage: String,
    pub started_unix_ms: i64,
    pub updated_unix_ms: i64,
    pub size_in_bytes_before: u64,
    pub size_in_bytes_after: u64,
    pub detail: Option<String>,
}

impl JobMetrics {
    pub fn is_terminal(&self) -> bool {
        matches!(self.stage.as_str(), "committed" | "failed" | "skipped")
    }
}

/// System-level metrics for resource monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub mem_usage_percent: f32,
    pub load_avg_1: f32,
    pub load_avg_5: f32,
    pub load_avg_15: f32,
}

/// Complete metrics snapshot including jobs, system, and aggregate stats
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub timestamp_unix_ms: i64,
    pub jobs: Vec<JobMetrics>,
    pub system: SystemMetrics,
    pub running_jobs: usize,
    pub committed_jobs: u64,
    pub failed_jobs: u64,
    pub skipped_jobs: u64,
    pub total_bytes_encoded: u64,
    pub cleanup_deletions: u64,
    pub last_cleanup_unix_ms: Option<i64>,
}

impl MetricsSnapshot {
    /// Insert or replace the entry with the same id, then recount.
    pub fn upsert_job(&mut self, job: JobMetrics) {
        match self.jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job,
            None => self.jobs.push(job),
        }
        self.prune_history();
        self.running_jobs = self.jobs.iter().filter(|j| !j.is_terminal()).count();
    }

    /// Drop the oldest terminal entries beyond [`JOB_HISTORY_LIMIT`].
    fn prune_history(&mut self) {
        let terminal = self.jobs.iter().filter(|j| j.is_terminal()).count();
        let mut excess = terminal.saturating_sub(JOB_HISTORY_LIMIT);
        if excess == 0 {
            return;
        }
        self.jobs.retain(|j| {
            if excess > 0 && j.is_terminal() {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}

/// Shared metrics state for concurrent access across monitor components
pub type SharedMetrics = Arc<RwLock<MetricsSnapshot>>;

/// Creates a new SharedMetrics instance with default values
pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(RwLock::new(MetricsSnapshot::default()))
}

pub fn unix_ms_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Collects current system metrics using sysinfo
pub fn collect_system_metrics() -> SystemMetrics {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let cpu_usage = sys.global_cpu_usage();
    let total_memory = sys.total_memory();
    let used_memory = sys.used_memory();
    let mem_usage = if total_memory > 0 {
        (used_memory as f64 / total_memory as f64 * 100.0) as f32
    } else {
        0.0
    };

    let load_avg = System::load_average();

    SystemMetrics {
        cpu_usage_percent: cpu_usage,
        mem_usage_percent: mem_usage,
        load_avg_1: load_avg.one as f32,
        load_avg_5: load_avg.five as f32,
        load_avg_15: load_avg.fifteen as f32,
    }
}
