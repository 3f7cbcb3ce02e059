//! Monitor startup and main loop.
//!
//! Startup runs the preflight checks, starts the watcher, then submits every
//! source found by a full scan. The loop multiplexes watch events, the
//! periodic rescan, the periodic cleanup sweep and the shutdown signal.
//!
//! An unreachable source root never stops the monitor. The watch is retried
//! on every rescan tick; meanwhile rescans find nothing and cleanup aborts.

use crate::cleanup::{CleanupOutcome, CleanupReconciler};
use crate::concurrency::{derive_plan, ConcurrencyPlan};
use crate::config::Config;
use crate::coordinator::TranscodeCoordinator;
use crate::metrics::{new_shared_metrics, SharedMetrics};
use crate::metrics_server::{refresh_system_metrics, run_metrics_server};
use crate::profile::QualityProfile;
use crate::scan::{is_candidate, is_video_file, scan_sources, IgnoreFilter, ScanError};
use crate::startup::{run_startup_checks, StartupError};
use crate::tools::{FfmpegTools, MediaTools};
use crate::watcher::{DirectoryWatcher, WatchEvent};
use crate::worker_pool::{Submission, WorkerPool};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const WATCH_CHANNEL_CAPACITY: usize = 1024;
const SYSTEM_METRICS_PERIOD: Duration = Duration::from_secs(2);

/// Error type for monitor operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Invalid scan configuration
    #[error("Scan configuration error: {0}")]
    Scan(#[from] ScanError),
}

/// Long-running transcode monitor.
pub struct Monitor<T: MediaTools + 'static = FfmpegTools> {
    pub config: Config,
    pub profile: QualityProfile,
    pub concurrency_plan: ConcurrencyPlan,
    pub metrics: SharedMetrics,
    filter: IgnoreFilter,
    pool: WorkerPool<T>,
    cleanup: CleanupReconciler,
    rescan_period: Duration,
    cleanup_period: Duration,
}

impl Monitor<FfmpegTools> {
    /// Run the startup checks and build a monitor backed by ffmpeg/ffprobe.
    pub fn new(config: Config) -> Result<Self, DaemonError> {
        let profile = QualityProfile::resolve(&config.encoding);
        run_startup_checks(&config, &profile)?;
        let tools = Arc::new(FfmpegTools::from_config(&config.tools));
        Self::with_tools(config, tools)
    }

    /// Build without startup checks, for hosts without the tools installed.
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        let tools = Arc::new(FfmpegTools::from_config(&config.tools));
        Self::with_tools(config, tools)
    }
}

impl<T: MediaTools + 'static> Monitor<T> {
    pub fn with_tools(config: Config, tools: Arc<T>) -> Result<Self, DaemonError> {
        let profile = QualityProfile::resolve(&config.encoding);
        let concurrency_plan = derive_plan(&config, &profile);
        let metrics = new_shared_metrics();
        let filter = IgnoreFilter::new(&config.scan.ignore_patterns)?;

        let coordinator = Arc::new(TranscodeCoordinator::new(
            &config,
            profile,
            tools,
            metrics.clone(),
        ));
        let pool = WorkerPool::from_plan(coordinator, &concurrency_plan);
        let cleanup = CleanupReconciler::from_config(&config, filter.clone(), metrics.clone());

        info!(
            source = %config.paths.source_folder.display(),
            dest = %config.paths.dest_folder.display(),
            profile = %profile,
            workers = concurrency_plan.max_concurrent_jobs,
            "monitor configured"
        );

        let rescan_period =
            Duration::from_secs(config.cleanup.rescan_interval_minutes.max(1) * 60);
        let cleanup_period = Duration::from_secs(config.cleanup.interval_hours.max(1) * 3600);

        Ok(Self {
            rescan_period,
            cleanup_period,
            config,
            profile,
            concurrency_plan,
            metrics,
            filter,
            pool,
            cleanup,
        })
    }

    /// Override the rescan and cleanup periods taken from the config.
    pub fn with_periods(mut self, rescan: Duration, cleanup: Duration) -> Self {
        self.rescan_period = rescan;
        self.cleanup_period = cleanup;
        self
    }

    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    pub fn pool(&self) -> &WorkerPool<T> {
        &self.pool
    }

    /// Submit every candidate under the source root. Returns how many were accepted.
    pub async fn scan_and_submit(&self) -> usize {
        let root = self.config.paths.source_folder.clone();
        let filter = self.filter.clone();
        let candidates = match tokio::task::spawn_blocking(move || scan_sources(&root, &filter)).await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "source scan panicked");
                return 0;
            }
        };

        let found = candidates.len();
        let accepted = candidates
            .into_iter()
            .filter(|c| self.pool.submit(c.path.clone()).is_accepted())
            .count();
        debug!(found, accepted, "source scan submitted");
        accepted
    }

    /// React to one watch event.
    pub fn handle_watch_event(&self, event: WatchEvent) {
        match event {
            WatchEvent::Created(path) => {
                if !is_candidate(&path, &self.filter) || !is_regular_file(&path) {
                    return;
                }
                match self.pool.submit(path.clone()) {
                    Submission::Accepted(_) => debug!(path = %path.display(), "queued from watch event"),
                    Submission::AlreadyActive => {}
                    Submission::ShuttingDown => debug!(path = %path.display(), "ignoring event during shutdown"),
                }
            }
            WatchEvent::Removed(path) => {
                if is_video_file(&path) {
                    self.pool.coordinator().forget(&path);
                }
            }
        }
    }

    /// Serve `/metrics` in the background when enabled.
    pub fn start_metrics_server(&self) -> Option<JoinHandle<()>> {
        if !self.config.metrics.enabled {
            return None;
        }
        let metrics = self.metrics.clone();
        let bind = self.config.metrics.bind.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = run_metrics_server(metrics, &bind).await {
                error!(bind = %bind, error = %e, "metrics server stopped");
            }
        }))
    }

    /// Periodically refresh the system section of the snapshot.
    pub fn start_metrics_updater(&self) -> JoinHandle<()> {
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            loop {
                refresh_system_metrics(&metrics).await;
                tokio::time::sleep(SYSTEM_METRICS_PERIOD).await;
            }
        })
    }

    /// Run until Ctrl-C or SIGTERM.
    pub async fn run(&self) -> Result<(), DaemonError> {
        self.run_with_server(shutdown_signal()).await
    }

    /// Run with the metrics tasks alongside the main loop.
    pub async fn run_with_server<F>(&self, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        let server = self.start_metrics_server();
        let updater = self.start_metrics_updater();

        let result = self.run_until(shutdown).await;

        updater.abort();
        if let Some(server) = server {
            server.abort();
        }
        result
    }

    /// Main loop. Returns once `shutdown` resolves and running jobs have drained.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        // Watch first so files created during the scan are not missed.
        let (mut watcher, mut events) = self.start_watcher().unzip();

        let submitted = self.scan_and_submit().await;
        info!(submitted, "initial scan complete");

        let mut rescan = periodic(self.rescan_period);
        let mut cleanup = periodic(self.cleanup_period);
        let mut cleanup_task: Option<JoinHandle<CleanupOutcome>> = None;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                event = next_event(&mut events), if events.is_some() => match event {
                    Some(event) => self.handle_watch_event(event),
                    None => {
                        warn!("watch channel closed, retrying on the next rescan");
                        watcher = None;
                        events = None;
                    }
                },
                _ = rescan.tick() => {
                    if watcher.is_none() {
                        if let Some((w, rx)) = self.start_watcher() {
                            watcher = Some(w);
                            events = Some(rx);
                        }
                    }
                    let submitted = self.scan_and_submit().await;
                    info!(submitted, "periodic rescan complete");
                }
                _ = cleanup.tick() => {
                    if cleanup_task.as_ref().is_some_and(|t| !t.is_finished()) {
                        warn!("previous cleanup sweep still running, skipping this one");
                    } else {
                        let reconciler = self.cleanup.clone();
                        cleanup_task = Some(tokio::spawn(async move { reconciler.run().await }));
                    }
                }
            }
        }

        drop(watcher);
        self.pool.drain().await;
        if let Some(task) = cleanup_task {
            if let Err(e) = task.await {
                warn!(error = %e, "cleanup sweep ended abnormally");
            }
        }
        info!("monitor stopped");
        Ok(())
    }
}

impl<T: MediaTools + 'static> Monitor<T> {
    fn start_watcher(&self) -> Option<(DirectoryWatcher, mpsc::Receiver<WatchEvent>)> {
        let root = &self.config.paths.source_folder;
        match DirectoryWatcher::watch(root, WATCH_CHANNEL_CAPACITY) {
            Ok(started) => {
                info!(root = %root.display(), "watching source tree");
                Some(started)
            }
            Err(e) => {
                warn!(error = %e, "source tree not watchable, retrying on the next rescan");
                None
            }
        }
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<WatchEvent>>) -> Option<WatchEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// First tick one full period from now.
fn periodic(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn is_regular_file(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_file())
        .unwrap_or(false)
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
