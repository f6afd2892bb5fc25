//! Engine facade tying discovery, admission, the queue and the pool
//! together behind one handle.
//!
//! Presentation layers talk to this type only: they feed it roots and
//! control calls, and observe the run through the event channel or by
//! snapshotting the queue.

use crate::admit::{admit, canonical_identity, Admission};
use crate::codec::{CodecRegistry, Encoder};
use crate::concurrency::ConcurrencyPlan;
use crate::discover::{is_audio_file, scan, CancelFlag, DiscoveryReport, ScanOptions};
use crate::events::{emit, event_channel, EngineEvent, EventReceiver, EventSender};
use crate::output::Profile;
use crate::pool::{PoolError, WorkerPool};
use crate::queue::{new_shared_queue, Job, JobState, QueueSummary, SharedQueue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested profile is not configured
    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    /// Pool control failed
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The operation touches a job that is currently converting
    #[error("job is running: {0}")]
    JobRunning(PathBuf),
}

/// Result of adding a single file by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The file was queued.
    Added(PathBuf),
    /// The file is already queued under this identity.
    SkippedAsDuplicate(PathBuf),
    /// The extension is not recognized and best-effort is off.
    SkippedAsUnrecognized(PathBuf),
}

/// Handle to a discovery pass in flight.
pub struct DiscoveryHandle {
    cancel: CancelFlag,
    task: JoinHandle<DiscoveryReport>,
}

impl DiscoveryHandle {
    /// Cancel the walk; already-admitted jobs stay queued.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the walk and its admissions to complete.
    pub async fn wait(self) -> DiscoveryReport {
        self.task.await.unwrap_or_else(|err| {
            tracing::error!(error = %err, "discovery task panicked");
            DiscoveryReport::default()
        })
    }
}

/// Conversion engine over one job queue.
pub struct Engine {
    queue: SharedQueue,
    events: EventSender,
    registry: Arc<CodecRegistry>,
    pool: WorkerPool,
    profile: Profile,
    scan_options: ScanOptions,
    /// Queue files whose extension is unknown and let the format probe
    /// decide at dispatch time.
    best_effort: bool,
}

impl Engine {
    /// Build an engine from configuration.
    ///
    /// `profile_name` of `None` selects the file-system default profile.
    pub fn new(
        config: &oggforge_config::Config,
        profile_name: Option<&str>,
        registry: Arc<CodecRegistry>,
        encoder: Arc<dyn Encoder>,
        best_effort: bool,
    ) -> Result<Self, EngineError> {
        let profile_config = match profile_name {
            Some(name) => Some(
                config
                    .profile(name)
                    .ok_or_else(|| EngineError::UnknownProfile(name.to_string()))?,
            ),
            None => None,
        };
        let profile = Profile::from_config(config, profile_config);

        let plan = ConcurrencyPlan::derive(&config.conversion);
        tracing::info!(
            profile = %profile.name,
            total_cores = plan.total_cores,
            max_concurrent_jobs = plan.max_concurrent_jobs,
            "engine configured"
        );

        let queue = new_shared_queue();
        let (events, _rx) = event_channel();
        let pool = WorkerPool::new(
            queue.clone(),
            events.clone(),
            registry.clone(),
            encoder,
            profile.clone(),
            plan.max_concurrent_jobs,
        );

        Ok(Self {
            queue,
            events,
            registry,
            pool,
            profile,
            scan_options: ScanOptions::from(&config.discovery),
            best_effort,
        })
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The active profile.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Snapshot of all jobs in queue order.
    pub async fn jobs(&self) -> Vec<Job> {
        self.queue.read().await.jobs()
    }

    /// Aggregate counts per state.
    pub async fn summary(&self) -> QueueSummary {
        self.queue.read().await.summary()
    }

    /// Add a single file, bypassing directory discovery.
    pub async fn add_file(&self, path: &Path) -> AddOutcome {
        let recognized = is_audio_file(path) || self.registry.probe_format(path).is_some();
        if !recognized && !self.best_effort {
            tracing::debug!(path = %path.display(), "unrecognized file not queued");
            return AddOutcome::SkippedAsUnrecognized(path.to_path_buf());
        }

        // Same canonical form discovery yields, so the base lines up
        // with the queue identity during destination resolution.
        let source = canonical_identity(path);
        let base = source.parent().map(Path::to_path_buf).unwrap_or_default();
        let candidate = crate::discover::Candidate {
            path: source,
            base,
            recognized,
        };

        let mut queue = self.queue.write().await;
        match admit(&mut queue, &candidate, &self.profile.name) {
            Admission::Accepted(identity) => {
                drop(queue);
                emit(
                    &self.events,
                    EngineEvent::JobAdded {
                        path: identity.clone(),
                    },
                );
                self.pool.notify_jobs_changed();
                AddOutcome::Added(identity)
            }
            Admission::SkippedAsDuplicate(path) => AddOutcome::SkippedAsDuplicate(path),
        }
    }

    /// Walk the given roots and admit what they contain.
    ///
    /// Runs in the background; candidates stream into the queue as they
    /// are found. Duplicates are collected and reported in one
    /// aggregate event once the walk ends.
    pub fn start_discovery(&self, roots: Vec<PathBuf>) -> DiscoveryHandle {
        let cancel = CancelFlag::new();
        let (mut rx, walker) = scan(roots, self.scan_options, cancel.clone(), self.events.clone());

        let queue = self.queue.clone();
        let events = self.events.clone();
        let profile = self.profile.name.clone();
        let best_effort = self.best_effort;
        let pool = self.pool.clone();

        let task = tokio::spawn(async move {
            let mut skipped = Vec::new();

            while let Some(candidate) = rx.recv().await {
                if !candidate.recognized && !best_effort {
                    continue;
                }

                let admission = {
                    let mut queue = queue.write().await;
                    admit(&mut queue, &candidate, &profile)
                };
                match admission {
                    Admission::Accepted(identity) => {
                        emit(&events, EngineEvent::JobAdded { path: identity });
                        pool.notify_jobs_changed();
                    }
                    Admission::SkippedAsDuplicate(path) => skipped.push(path),
                }
            }

            if !skipped.is_empty() {
                tracing::info!(count = skipped.len(), "duplicate candidates skipped");
                emit(&events, EngineEvent::SkippedReport { skipped });
            }

            walker.await.unwrap_or_else(|err| {
                tracing::error!(error = %err, "discovery walker panicked");
                DiscoveryReport::default()
            })
        });

        DiscoveryHandle { cancel, task }
    }

    /// Start converting queued jobs.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.pool.start().await?;
        Ok(())
    }

    /// Stop the current run; interrupted jobs go back to Idle.
    pub async fn stop(&self) {
        self.pool.stop().await;
    }

    /// Whether a conversion run is in progress.
    pub async fn is_running(&self) -> bool {
        self.pool.is_running().await
    }

    /// Change the concurrency cap between runs.
    pub async fn configure_concurrency(&self, max_jobs: u32) -> Result<(), EngineError> {
        self.pool.configure(max_jobs).await?;
        Ok(())
    }

    /// Put a finished or failed job back to Idle for another attempt.
    pub async fn reset(&self, path: &Path) -> bool {
        let reset = self.queue.write().await.reset(path);
        if reset {
            emit(
                &self.events,
                EngineEvent::JobStateChanged {
                    path: path.to_path_buf(),
                    state: JobState::Idle,
                    progress: 0.0,
                    error: None,
                },
            );
            self.pool.notify_jobs_changed();
        }
        reset
    }

    /// Reset every terminal job.
    pub async fn reset_all(&self) -> usize {
        let paths: Vec<PathBuf> = {
            let queue = self.queue.read().await;
            queue
                .jobs()
                .into_iter()
                .filter(|j| j.is_terminal())
                .map(|j| j.source_path)
                .collect()
        };

        let mut count = 0;
        for path in paths {
            if self.reset(&path).await {
                count += 1;
            }
        }
        count
    }

    /// Remove one job from the queue. Refused while it is converting.
    pub async fn remove(&self, path: &Path) -> Result<bool, EngineError> {
        let identity = canonical_identity(path);
        let mut queue = self.queue.write().await;
        if let Some(job) = queue.job(&identity) {
            if job.state == JobState::Running {
                return Err(EngineError::JobRunning(identity));
            }
        }
        Ok(queue.remove(&identity).is_some())
    }

    /// Remove all jobs. Refused while a run is in progress.
    pub async fn clear(&self) -> Result<usize, EngineError> {
        if self.pool.is_running().await {
            return Err(EngineError::Pool(PoolError::AlreadyRunning));
        }
        Ok(self.queue.write().await.clear())
    }

    /// Wait until no job is Idle or Running.
    ///
    /// Intended for one-shot runs; a run must be started first or this
    /// never settles for a non-empty queue.
    pub async fn wait_until_settled(&self) {
        loop {
            if !self.queue.read().await.has_unfinished() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{EncodeError, EncodeSink, EncodeSpec};
    use std::fs::{self, File};
    use tempfile::TempDir;

    struct NullEncoder;

    impl Encoder for NullEncoder {
        fn create(
            &self,
            path: &Path,
            _spec: &EncodeSpec,
        ) -> Result<Box<dyn EncodeSink>, EncodeError> {
            std::fs::write(path, b"")?;
            Ok(Box::new(NullSink))
        }
    }

    struct NullSink;

    impl EncodeSink for NullSink {
        fn write_chunk(&mut self, _samples: &[i16]) -> Result<(), EncodeError> {
            Ok(())
        }

        fn finish(&mut self) -> Result<(), EncodeError> {
            Ok(())
        }
    }

    fn engine(config: &oggforge_config::Config, best_effort: bool) -> Engine {
        Engine::new(
            config,
            None,
            Arc::new(CodecRegistry::with_builtins()),
            Arc::new(NullEncoder),
            best_effort,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_profile_is_an_error() {
        let config = oggforge_config::Config::default();
        let result = Engine::new(
            &config,
            Some("nope"),
            Arc::new(CodecRegistry::with_builtins()),
            Arc::new(NullEncoder),
            false,
        );
        assert!(matches!(result, Err(EngineError::UnknownProfile(name)) if name == "nope"));
    }

    #[tokio::test]
    async fn test_discovery_fills_the_queue() {
        let temp = TempDir::new().unwrap();
        let music = temp.path().join("music/album");
        fs::create_dir_all(&music).unwrap();
        File::create(music.join("a.flac")).unwrap();
        File::create(music.join("b.wav")).unwrap();
        File::create(music.join("notes.txt")).unwrap();

        let config = oggforge_config::Config::default();
        let engine = engine(&config, false);

        let report = engine
            .start_discovery(vec![temp.path().join("music")])
            .wait()
            .await;

        assert_eq!(report.found, 2);
        assert_eq!(engine.jobs().await.len(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_roots_yield_one_job_and_a_skip_report() {
        let temp = TempDir::new().unwrap();
        let music = temp.path().join("music");
        fs::create_dir_all(&music).unwrap();
        File::create(music.join("a.flac")).unwrap();

        let config = oggforge_config::Config::default();
        let engine = engine(&config, false);
        let mut events = engine.subscribe();

        // Same tree reached twice
        engine
            .start_discovery(vec![music.clone(), music.clone()])
            .wait()
            .await;

        assert_eq!(engine.jobs().await.len(), 1);

        let mut saw_skip_report = false;
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::SkippedReport { skipped } = event {
                assert_eq!(skipped.len(), 1);
                saw_skip_report = true;
            }
        }
        assert!(saw_skip_report);
    }

    #[tokio::test]
    async fn test_add_file_respects_best_effort() {
        let temp = TempDir::new().unwrap();
        let odd = temp.path().join("mystery.bin");
        File::create(&odd).unwrap();

        let config = oggforge_config::Config::default();

        let strict = engine(&config, false);
        assert_eq!(
            strict.add_file(&odd).await,
            AddOutcome::SkippedAsUnrecognized(odd.clone())
        );
        assert!(strict.jobs().await.is_empty());

        let lenient = engine(&config, true);
        assert!(matches!(lenient.add_file(&odd).await, AddOutcome::Added(_)));
        assert_eq!(lenient.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_file_twice_is_a_duplicate() {
        let temp = TempDir::new().unwrap();
        let track = temp.path().join("a.wav");
        File::create(&track).unwrap();

        let config = oggforge_config::Config::default();
        let engine = engine(&config, false);

        assert!(matches!(engine.add_file(&track).await, AddOutcome::Added(_)));
        assert!(matches!(
            engine.add_file(&track).await,
            AddOutcome::SkippedAsDuplicate(_)
        ));
        assert_eq!(engine.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear_respect_run_state() {
        let temp = TempDir::new().unwrap();
        let track = temp.path().join("a.wav");
        File::create(&track).unwrap();

        let config = oggforge_config::Config::default();
        let engine = engine(&config, false);
        engine.add_file(&track).await;

        assert!(engine.remove(&track).await.unwrap());
        assert!(!engine.remove(&track).await.unwrap());

        engine.add_file(&track).await;
        engine.start().await.unwrap();
        assert!(matches!(
            engine.clear().await,
            Err(EngineError::Pool(PoolError::AlreadyRunning))
        ));
        engine.stop().await;
        assert_eq!(engine.clear().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_discovery_keeps_admitted_jobs() {
        let temp = TempDir::new().unwrap();
        let music = temp.path().join("music");
        fs::create_dir_all(&music).unwrap();
        File::create(music.join("a.flac")).unwrap();

        let config = oggforge_config::Config::default();
        let engine = engine(&config, false);

        let handle = engine.start_discovery(vec![music]);
        handle.cancel();
        let report = handle.wait().await;

        // Whatever made it in before the flag stays queued
        assert!(engine.jobs().await.len() <= 1);
        assert!(report.found <= 1);
    }
}
