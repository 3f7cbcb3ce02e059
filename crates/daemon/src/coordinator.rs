//! Per-source job pipeline.
//!
//! Accepting a source registers it before anything else is checked, so two
//! discoveries of one path can never both reach the encoder. Once mapped, the
//! destination is claimed too, so two sources sharing an output (`Film.mp4`
//! and `Film.avi`) never write the same temp file. The pipeline
//! then walks the artifact through `Pending -> Encoding -> Verifying ->
//! Committed`, or `Failed`, and the registration guard is released on every
//! way out.
//!
//! Durable state lives only on disk: a final artifact that verifies is
//! committed, a temp file that is not growing is stale. That is what makes a
//! restart resume correctly with empty in-memory caches.

use crate::config::Config;
use crate::encode::EncodeRequest;
use crate::metrics::{unix_ms_now, JobMetrics, SharedMetrics};
use crate::paths::{temp_path_for, Mapping, PathMapper};
use crate::profile::{EncoderArgs, QualityProfile};
use crate::quality_gate::{GateDecision, QualityGate};
use crate::registry::{ProcessedCache, ProcessingRegistry, RegistrationGuard};
use crate::stability::{is_growing, wait_until_stable, StabilityOutcome, StabilityPolicy};
use crate::symlink::VersionSymlinkManager;
use crate::tools::MediaTools;
use crate::verify::{verify_artifact, Verification};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle of one destination artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Pending,
    Encoding,
    Verifying,
    Committed,
    Failed,
}

impl ArtifactState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactState::Pending => "pending",
            ArtifactState::Encoding => "encoding",
            ArtifactState::Verifying => "verifying",
            ArtifactState::Committed => "committed",
            ArtifactState::Failed => "failed",
        }
    }
}

/// Output of one accepted source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationArtifact {
    pub final_path: PathBuf,
    pub temp_path: PathBuf,
    pub state: ArtifactState,
}

impl DestinationArtifact {
    pub fn new(final_path: PathBuf) -> Self {
        Self {
            temp_path: temp_path_for(&final_path),
            final_path,
            state: ArtifactState::Pending,
        }
    }
}

/// Why a source was not encoded. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Another job holds the source or its destination.
    AlreadyActive,
    QualityGate(String),
    /// The source is an output of this system.
    AlreadyEncoded,
    Unmappable,
    /// A temp artifact is still being written by someone else.
    TempInUse,
    StabilityTimeout,
    SourceGone,
    ShuttingDown,
}

/// Why an encode attempt was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    EncodeExit(i32),
    EncodeError(String),
    Verification(String),
    Io(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::EncodeExit(code) => write!(f, "encoder exited with {}", code),
            FailureReason::EncodeError(e) => write!(f, "encoder error: {}", e),
            FailureReason::Verification(e) => write!(f, "verification failed: {}", e),
            FailureReason::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Committed(PathBuf),
    /// A verified artifact already existed.
    AlreadyCommitted(PathBuf),
    Skipped(SkipReason),
    Failed(FailureReason),
}

/// Timing and sizing knobs for the pipeline.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub stability: StabilityPolicy,
    pub temp_growth_window: Duration,
    pub encode_timeout: Duration,
    pub target_height: u32,
}

impl CoordinatorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            stability: StabilityPolicy::from_config(&cfg.stability),
            temp_growth_window: Duration::from_secs(cfg.stability.temp_growth_window_secs),
            encode_timeout: Duration::from_secs(
                cfg.encoding.encode_timeout_hours.max(1).saturating_mul(3600),
            ),
            target_height: cfg.encoding.target_height,
        }
    }
}

/// Identity of a job in the metrics snapshot.
struct JobRecord {
    id: String,
    source: PathBuf,
    dest: PathBuf,
    started_unix_ms: i64,
    size_before: u64,
}

pub struct TranscodeCoordinator<T: MediaTools> {
    mapper: PathMapper,
    gate: QualityGate,
    encoder_args: EncoderArgs,
    tools: Arc<T>,
    registry: Arc<ProcessingRegistry>,
    destinations: Arc<ProcessingRegistry>,
    cache: Arc<ProcessedCache>,
    symlinks: VersionSymlinkManager,
    metrics: SharedMetrics,
    settings: CoordinatorSettings,
}

impl<T: MediaTools> TranscodeCoordinator<T> {
    pub fn new(
        cfg: &Config,
        profile: QualityProfile,
        tools: Arc<T>,
        metrics: SharedMetrics,
    ) -> Self {
        Self::with_settings(cfg, profile, tools, metrics, CoordinatorSettings::from_config(cfg))
    }

    pub fn with_settings(
        cfg: &Config,
        profile: QualityProfile,
        tools: Arc<T>,
        metrics: SharedMetrics,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            mapper: PathMapper::from_config(cfg),
            gate: QualityGate::from_config(&cfg.quality_gate),
            encoder_args: profile.encoder_args(settings.target_height),
            tools,
            registry: ProcessingRegistry::new(),
            destinations: ProcessingRegistry::new(),
            cache: ProcessedCache::new(),
            symlinks: VersionSymlinkManager::from_config(cfg),
            metrics,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ProcessingRegistry> {
        &self.registry
    }

    /// Destination paths claimed by an active job.
    pub fn destinations(&self) -> &Arc<ProcessingRegistry> {
        &self.destinations
    }

    pub fn cache(&self) -> &Arc<ProcessedCache> {
        &self.cache
    }

    pub fn mapper(&self) -> &PathMapper {
        &self.mapper
    }

    pub fn symlinks(&self) -> &VersionSymlinkManager {
        &self.symlinks
    }

    /// Register `source`, or `None` if a job for it is already active.
    pub fn try_accept(&self, source: &Path) -> Option<RegistrationGuard> {
        let guard = self.registry.try_register(source);
        if guard.is_none() {
            debug!(path = %source.display(), "job already active, dropping discovery");
        }
        guard
    }

    /// Accept and process in one step.
    pub async fn handle(&self, source: &Path) -> JobOutcome {
        match self.try_accept(source) {
            Some(guard) => self.process(guard).await,
            None => JobOutcome::Skipped(SkipReason::AlreadyActive),
        }
    }

    /// Run the pipeline for an accepted source. Consumes the registration.
    pub async fn process(&self, guard: RegistrationGuard) -> JobOutcome {
        let outcome = self.run_pipeline(guard.source()).await;
        self.count_outcome(&outcome).await;
        drop(guard);
        outcome
    }

    /// A source disappeared: drop its version link and cache entry.
    ///
    /// Destination artifacts are left for the cleanup reconciler.
    pub fn forget(&self, source: &Path) {
        match self.symlinks.delete(source) {
            Ok(true) => info!(path = %source.display(), "source removed, version link deleted"),
            Ok(false) => {}
            Err(e) => warn!(path = %source.display(), error = %e, "failed to delete version link"),
        }
        if let Mapping::Target(final_path) = self.mapper.map(source) {
            self.cache.forget(&final_path);
        }
    }

    async fn run_pipeline(&self, source: &Path) -> JobOutcome {
        if let GateDecision::Skip(reason) = self.gate.check(self.tools.as_ref(), source).await {
            info!(path = %source.display(), reason = %reason, "skipping: quality gate");
            return JobOutcome::Skipped(SkipReason::QualityGate(reason));
        }

        let final_path = match self.mapper.map(source) {
            Mapping::Target(p) => p,
            Mapping::AlreadyEncoded => {
                debug!(path = %source.display(), "skipping: already an encoded output");
                return JobOutcome::Skipped(SkipReason::AlreadyEncoded);
            }
            Mapping::Unmappable => {
                warn!(path = %source.display(), "skipping: no destination for source");
                return JobOutcome::Skipped(SkipReason::Unmappable);
            }
        };
        let Some(_claim) = self.destinations.try_register(&final_path) else {
            debug!(
                path = %source.display(),
                dest = %final_path.display(),
                "skipping: destination claimed by another job"
            );
            return JobOutcome::Skipped(SkipReason::AlreadyActive);
        };
        let mut artifact = DestinationArtifact::new(final_path);

        if exists(&artifact.temp_path).await {
            if is_growing(&artifact.temp_path, self.settings.temp_growth_window).await {
                info!(
                    path = %source.display(),
                    temp = %artifact.temp_path.display(),
                    "skipping: temp artifact still growing"
                );
                return JobOutcome::Skipped(SkipReason::TempInUse);
            }
            info!(temp = %artifact.temp_path.display(), "deleting stale temp artifact");
            remove_quietly(&artifact.temp_path).await;
        }

        if self.cache.is_verified(&artifact.final_path) {
            debug!(path = %source.display(), "skipping: already committed (cached)");
            return JobOutcome::AlreadyCommitted(artifact.final_path);
        }

        if exists(&artifact.final_path).await {
            match verify_artifact(self.tools.as_ref(), &artifact.final_path).await {
                Verification::Valid { .. } => {
                    debug!(path = %source.display(), dest = %artifact.final_path.display(), "skipping: already committed");
                    self.cache.mark_verified(&artifact.final_path);
                    self.link(source, &artifact.final_path);
                    return JobOutcome::AlreadyCommitted(artifact.final_path);
                }
                Verification::Invalid(reason) => {
                    warn!(dest = %artifact.final_path.display(), reason = %reason, "deleting invalid artifact");
                    remove_quietly(&artifact.final_path).await;
                }
            }
        }

        match wait_until_stable(source, self.settings.stability).await {
            StabilityOutcome::Stable => {}
            StabilityOutcome::TimedOut => {
                warn!(path = %source.display(), "skipping: source never stabilised");
                return JobOutcome::Skipped(SkipReason::StabilityTimeout);
            }
            StabilityOutcome::Gone => {
                info!(path = %source.display(), "skipping: source disappeared");
                return JobOutcome::Skipped(SkipReason::SourceGone);
            }
        }

        let record = JobRecord {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_path_buf(),
            dest: artifact.final_path.clone(),
            started_unix_ms: unix_ms_now(),
            size_before: file_len(source).await,
        };

        match self.encode_and_commit(&record, &mut artifact).await {
            Ok(()) => JobOutcome::Committed(artifact.final_path),
            Err(reason) => {
                self.transition(&record, &mut artifact, ArtifactState::Failed, Some(reason.to_string()))
                    .await;
                remove_quietly(&artifact.temp_path).await;
                warn!(path = %source.display(), reason = %reason, "job failed");
                JobOutcome::Failed(reason)
            }
        }
    }

    async fn encode_and_commit(
        &self,
        record: &JobRecord,
        artifact: &mut DestinationArtifact,
    ) -> Result<(), FailureReason> {
        if let Some(parent) = artifact.final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FailureReason::Io(e.to_string()))?;
        }

        self.transition(record, artifact, ArtifactState::Encoding, None)
            .await;
        let request = EncodeRequest {
            source: record.source.clone(),
            temp_output: artifact.temp_path.clone(),
            args: self.encoder_args.clone(),
            timeout: self.settings.encode_timeout,
        };
        match self.tools.encode(&request).await {
            Ok(0) => {}
            Ok(code) => return Err(FailureReason::EncodeExit(code)),
            Err(e) => return Err(FailureReason::EncodeError(e.to_string())),
        }

        self.transition(record, artifact, ArtifactState::Verifying, None)
            .await;
        if let Verification::Invalid(reason) =
            verify_artifact(self.tools.as_ref(), &artifact.temp_path).await
        {
            return Err(FailureReason::Verification(reason));
        }

        tokio::fs::rename(&artifact.temp_path, &artifact.final_path)
            .await
            .map_err(|e| FailureReason::Io(e.to_string()))?;
        self.cache.mark_verified(&artifact.final_path);
        self.transition(record, artifact, ArtifactState::Committed, None)
            .await;

        let size_after = file_len(&artifact.final_path).await;
        {
            let mut metrics = self.metrics.write().await;
            metrics.total_bytes_encoded += size_after;
            if let Some(job) = metrics.jobs.iter_mut().find(|j| j.id == record.id) {
                job.size_in_bytes_after = size_after;
            }
        }

        self.link(&record.source, &artifact.final_path);
        Ok(())
    }

    async fn transition(
        &self,
        record: &JobRecord,
        artifact: &mut DestinationArtifact,
        state: ArtifactState,
        detail: Option<String>,
    ) {
        artifact.state = state;
        info!(
            path = %record.source.display(),
            dest = %artifact.final_path.display(),
            state = state.as_str(),
            "artifact state"
        );

        let now = unix_ms_now();
        let entry = JobMetrics {
            id: record.id.clone(),
            source_path: record.source.to_string_lossy().into_owned(),
            dest_path: record.dest.to_string_lossy().into_owned(),
            stage: state.as_str().to_string(),
            started_unix_ms: record.started_unix_ms,
            updated_unix_ms: now,
            size_in_bytes_before: record.size_before,
            size_in_bytes_after: 0,
            detail,
        };
        let mut metrics = self.metrics.write().await;
        metrics.timestamp_unix_ms = now;
        metrics.upsert_job(entry);
    }

    async fn count_outcome(&self, outcome: &JobOutcome) {
        let mut metrics = self.metrics.write().await;
        match outcome {
            JobOutcome::Committed(_) => metrics.committed_jobs += 1,
            JobOutcome::Failed(_) => metrics.failed_jobs += 1,
            JobOutcome::Skipped(SkipReason::AlreadyActive | SkipReason::ShuttingDown) => {}
            JobOutcome::Skipped(_) => metrics.skipped_jobs += 1,
            JobOutcome::AlreadyCommitted(_) => {}
        }
    }

    fn link(&self, source: &Path, final_path: &Path) {
        if let Err(e) = self.symlinks.create(source, final_path) {
            warn!(path = %source.display(), error = %e, "failed to create version link");
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

async fn file_len(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::new_shared_metrics;
    use crate::testing::FakeTools;
    use std::fs;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        src: PathBuf,
        dst: PathBuf,
        cfg: Config,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        let mut cfg = Config::default();
        cfg.paths.source_folder = src.clone();
        cfg.paths.dest_folder = dst.clone();
        cfg.encoding.enable_hw_accel = false;
        Harness {
            _dir: dir,
            src,
            dst,
            cfg,
        }
    }

    fn fast_settings(cfg: &Config) -> CoordinatorSettings {
        CoordinatorSettings {
            stability: StabilityPolicy {
                required_samples: 0,
                interval: Duration::from_millis(10),
                timeout: Duration::from_secs(5),
            },
            temp_growth_window: Duration::from_millis(50),
            ..CoordinatorSettings::from_config(cfg)
        }
    }

    fn coordinator(h: &Harness, tools: Arc<FakeTools>) -> TranscodeCoordinator<FakeTools> {
        let profile = QualityProfile::resolve(&h.cfg.encoding);
        TranscodeCoordinator::with_settings(
            &h.cfg,
            profile,
            tools,
            new_shared_metrics(),
            fast_settings(&h.cfg),
        )
    }

    fn write_source(h: &Harness, rel: &str) -> PathBuf {
        let path = h.src.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"source media").unwrap();
        path
    }

    #[tokio::test]
    async fn test_commit_happy_path() {
        let h = harness();
        let tools = Arc::new(FakeTools::new());
        let coord = coordinator(&h, Arc::clone(&tools));
        let source = write_source(&h, "Movies/Film.mp4");

        let outcome = coord.handle(&source).await;

        let final_path = h.dst.join("Movies/Film.mkv");
        assert_eq!(outcome, JobOutcome::Committed(final_path.clone()));
        assert_eq!(fs::read(&final_path).unwrap(), b"encoded");
        assert!(!temp_path_for(&final_path).exists());
        assert!(coord.cache().is_verified(&final_path));
        assert!(coord.registry().is_empty());

        let metrics = coord.metrics.read().await;
        assert_eq!(metrics.committed_jobs, 1);
        assert_eq!(metrics.jobs.len(), 1);
        assert_eq!(metrics.jobs[0].stage, "committed");
        assert_eq!(metrics.total_bytes_encoded, 7);
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let h = harness();
        let tools = Arc::new(FakeTools::new());
        let coord = coordinator(&h, Arc::clone(&tools));
        let a = write_source(&h, "A.mkv");
        let b = write_source(&h, "Show/B.avi");

        for source in [&a, &b] {
            assert!(matches!(coord.handle(source).await, JobOutcome::Committed(_)));
        }
        for source in [&a, &b] {
            assert!(matches!(
                coord.handle(source).await,
                JobOutcome::AlreadyCommitted(_)
            ));
        }
        assert_eq!(tools.encode_calls(), 2);

        // a fresh coordinator (restart) falls back to on-disk verification
        let restarted = coordinator(&h, Arc::clone(&tools));
        assert!(matches!(
            restarted.handle(&a).await,
            JobOutcome::AlreadyCommitted(_)
        ));
        assert_eq!(tools.encode_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_discovery_is_dropped() {
        let h = harness();
        let tools = Arc::new(FakeTools::new().with_encode_delay(Duration::from_millis(200)));
        let coord = Arc::new(coordinator(&h, Arc::clone(&tools)));
        let source = write_source(&h, "Film.mkv");

        let first = {
            let coord = Arc::clone(&coord);
            let source = source.clone();
            tokio::spawn(async move { coord.handle(&source).await })
        };
        while tools.encode_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(
            coord.handle(&source).await,
            JobOutcome::Skipped(SkipReason::AlreadyActive)
        );
        assert!(matches!(first.await.unwrap(), JobOutcome::Committed(_)));
        assert_eq!(tools.encode_calls(), 1);
        assert!(coord.registry().is_empty());
    }

    #[tokio::test]
    async fn test_sources_sharing_a_destination_encode_once() {
        let h = harness();
        let tools = Arc::new(FakeTools::new().with_encode_delay(Duration::from_millis(200)));
        let coord = coordinator(&h, Arc::clone(&tools));
        let mp4 = write_source(&h, "Film.mp4");
        let avi = write_source(&h, "Film.avi");

        let (first, second) = tokio::join!(coord.handle(&mp4), coord.handle(&avi));

        let final_path = h.dst.join("Film.mkv");
        let mut outcomes = vec![first, second];
        outcomes.sort_by_key(|o| matches!(o, JobOutcome::Committed(_)));
        assert!(matches!(
            outcomes[0],
            JobOutcome::Skipped(SkipReason::AlreadyActive) | JobOutcome::AlreadyCommitted(_)
        ));
        assert_eq!(outcomes[1], JobOutcome::Committed(final_path.clone()));
        assert_eq!(tools.encode_calls(), 1);
        assert_eq!(tools.max_concurrent_encodes(), 1);
        assert_eq!(fs::read(&final_path).unwrap(), b"encoded");
        assert!(coord.destinations().is_empty());
        assert!(coord.registry().is_empty());
    }

    #[tokio::test]
    async fn test_stale_temp_is_deleted_before_encode() {
        let h = harness();
        let tools = Arc::new(FakeTools::new());
        let coord = coordinator(&h, Arc::clone(&tools));
        let source = write_source(&h, "Movie.mkv");
        let temp = h.dst.join("Movie.mkv.tmp");
        fs::write(&temp, b"half written").unwrap();

        let outcome = coord.handle(&source).await;

        assert_eq!(outcome, JobOutcome::Committed(h.dst.join("Movie.mkv")));
        assert_eq!(tools.encode_calls(), 1);
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn test_growing_temp_is_left_alone() {
        let h = harness();
        let tools = Arc::new(FakeTools::new());
        let coord = coordinator(&h, Arc::clone(&tools));
        let source = write_source(&h, "Movie.mkv");
        let temp = h.dst.join("Movie.mkv.tmp");
        fs::write(&temp, b"x").unwrap();

        let writer = {
            let temp = temp.clone();
            tokio::spawn(async move {
                for i in 0..20 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    let _ = tokio::fs::write(&temp, vec![b'x'; i + 2]).await;
                }
            })
        };

        let outcome = coord.handle(&source).await;
        writer.await.unwrap();

        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::TempInUse));
        assert_eq!(tools.encode_calls(), 0);
        assert!(temp.exists());
        assert!(coord.registry().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_existing_final_is_replaced() {
        let h = harness();
        let tools = Arc::new(FakeTools::new());
        let coord = coordinator(&h, Arc::clone(&tools));
        let source = write_source(&h, "Movie.mkv");
        let final_path = h.dst.join("Movie.mkv");
        fs::write(&final_path, b"").unwrap();

        let outcome = coord.handle(&source).await;

        assert_eq!(outcome, JobOutcome::Committed(final_path.clone()));
        assert_eq!(fs::read(&final_path).unwrap(), b"encoded");
    }

    #[tokio::test]
    async fn test_encode_failure_cleans_temp() {
        let h = harness();
        let tools = Arc::new(FakeTools::new().with_exit_code(1));
        let coord = coordinator(&h, Arc::clone(&tools));
        let source = write_source(&h, "Movie.mkv");

        let outcome = coord.handle(&source).await;

        assert_eq!(outcome, JobOutcome::Failed(FailureReason::EncodeExit(1)));
        assert!(!h.dst.join("Movie.mkv.tmp").exists());
        assert!(!h.dst.join("Movie.mkv").exists());
        assert!(coord.registry().is_empty());
        assert_eq!(coord.metrics.read().await.failed_jobs, 1);

        // no automatic retry, but the next discovery tries again
        coord.handle(&source).await;
        assert_eq!(tools.encode_calls(), 2);
    }

    #[tokio::test]
    async fn test_verification_failure_cleans_temp() {
        let h = harness();
        let tools = Arc::new(FakeTools::new().with_invalid_output());
        let coord = coordinator(&h, Arc::clone(&tools));
        let source = write_source(&h, "Movie.mkv");

        let outcome = coord.handle(&source).await;

        assert!(matches!(
            outcome,
            JobOutcome::Failed(FailureReason::Verification(_))
        ));
        assert!(!h.dst.join("Movie.mkv.tmp").exists());
        assert!(!h.dst.join("Movie.mkv").exists());
        assert!(!coord.cache().is_verified(&h.dst.join("Movie.mkv")));
    }

    #[tokio::test]
    async fn test_quality_gate_skip_never_encodes() {
        let h = harness();
        let tools = Arc::new(FakeTools::new());
        let coord = coordinator(&h, Arc::clone(&tools));
        let source = write_source(&h, "Show.S01E01.720p.HDTV.mkv");

        let outcome = coord.handle(&source).await;

        assert!(matches!(
            outcome,
            JobOutcome::Skipped(SkipReason::QualityGate(_))
        ));
        assert_eq!(tools.encode_calls(), 0);
        assert!(coord.registry().is_empty());
        assert_eq!(coord.metrics.read().await.skipped_jobs, 1);
    }

    #[tokio::test]
    async fn test_vanished_source_is_skipped() {
        let h = harness();
        let tools = Arc::new(FakeTools::new());
        let coord = coordinator(&h, Arc::clone(&tools));
        let source = h.src.join("Never.mkv");

        let outcome = coord.handle(&source).await;

        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::SourceGone));
        assert_eq!(tools.encode_calls(), 0);
    }

    #[tokio::test]
    async fn test_multi_version_same_tree() {
        let h = harness();
        let mut cfg = h.cfg.clone();
        cfg.paths.dest_folder = h.src.clone();
        cfg.versions.multi_version_mode = true;
        let tools = Arc::new(FakeTools::new());
        let coord = TranscodeCoordinator::with_settings(
            &cfg,
            QualityProfile::resolve(&cfg.encoding),
            Arc::clone(&tools),
            new_shared_metrics(),
            fast_settings(&cfg),
        );
        let source = write_source(&h, "Show/S01E01 - 1080p.mkv");

        let outcome = coord.handle(&source).await;
        let output = h.src.join("Show/S01E01 - 720p.mkv");
        assert_eq!(outcome, JobOutcome::Committed(output.clone()));

        // the output itself is discovered next and recognised
        assert!(matches!(
            coord.handle(&output).await,
            JobOutcome::Skipped(_)
        ));
        assert_eq!(tools.encode_calls(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_commit_creates_version_link_and_forget_removes_it() {
        let mut h = harness();
        h.cfg.versions.symlink_target_prefix = h.dst.to_string_lossy().into_owned();
        let tools = Arc::new(FakeTools::new());
        let coord = coordinator(&h, Arc::clone(&tools));
        let source = write_source(&h, "Movies/Film.mp4");

        coord.handle(&source).await;

        let link = h.src.join("Movies/Film - 720p.mkv");
        assert_eq!(fs::read_link(&link).unwrap(), h.dst.join("Movies/Film.mkv"));

        fs::remove_file(&source).unwrap();
        coord.forget(&source);
        assert!(fs::symlink_metadata(&link).is_err());
        assert!(!coord.cache().is_verified(&h.dst.join("Movies/Film.mkv")));
        // destination artifact is left for cleanup
        assert!(h.dst.join("Movies/Film.mkv").exists());
    }
}
