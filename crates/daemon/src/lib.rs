//! Transcode Monitor
//!
//! Watches a source media tree and keeps a destination tree of transcoded
//! copies in sync: each source is encoded at most once, artifacts are
//! committed atomically, and orphans are swept on a schedule.

pub mod cleanup;
pub mod compare;
pub mod concurrency;
pub mod coordinator;
pub mod daemon;
pub mod encode;
pub mod metrics;
pub mod metrics_server;
pub mod paths;
pub mod probe;
pub mod profile;
pub mod quality_gate;
pub mod registry;
pub mod scan;
pub mod stability;
pub mod startup;
pub mod symlink;
pub mod tools;
pub mod verify;
pub mod watcher;
pub mod worker_pool;

#[cfg(test)]
mod testing;

pub use transcode_monitor_config as config;
pub use transcode_monitor_config::Config;
pub use cleanup::{CleanupOutcome, CleanupReconciler, CleanupReport, SafetyAbort};
pub use compare::{compare_trees, format_report, CompareError, ComparisonResult, ReportFormat};
pub use concurrency::{derive_plan, ConcurrencyPlan};
pub use coordinator::{JobOutcome, SkipReason, TranscodeCoordinator};
pub use daemon::{shutdown_signal, DaemonError, Monitor};
pub use metrics::{
    collect_system_metrics, new_shared_metrics, JobMetrics, MetricsSnapshot, SharedMetrics,
    SystemMetrics,
};
pub use metrics_server::{create_metrics_router, run_metrics_server, ServerError};
pub use paths::{Mapping, PathMapper};
pub use profile::QualityProfile;
pub use scan::{IgnoreFilter, ScanError};
pub use startup::{run_startup_checks, StartupError};
pub use tools::{FfmpegTools, MediaTools};
pub use watcher::{DirectoryWatcher, WatchEvent};
pub use worker_pool::{Submission, WorkerPool};
