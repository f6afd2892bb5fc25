//! Worker pool driving conversions with bounded concurrency.
//!
//! A scheduler task holds a semaphore sized to the concurrency plan and
//! hands one permit to each worker. Jobs are dispatched in queue order;
//! a pre-flight format probe fails unsupported sources before a worker
//! is ever spawned. Stopping is cooperative: the per-run cancel flag is
//! raised, workers observe it between chunks, and their jobs fall back
//! to Idle with partial outputs removed.

use crate::codec::{CodecRegistry, Encoder};
use crate::discover::CancelFlag;
use crate::events::{emit, EngineEvent, EventSender};
use crate::output::Profile;
use crate::pipeline::{run_conversion, Outcome, PipelineSettings};
use crate::queue::{ErrorKind, JobState, SharedQueue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Error type for pool control operations
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool cannot be reconfigured or restarted mid-run
    #[error("a conversion run is already in progress")]
    AlreadyRunning,
}

struct RunHandle {
    cancel: CancelFlag,
    scheduler: JoinHandle<()>,
}

struct PoolState {
    max_concurrent_jobs: u32,
    run: Option<RunHandle>,
}

struct Inner {
    queue: SharedQueue,
    events: EventSender,
    registry: Arc<CodecRegistry>,
    encoder: Arc<dyn Encoder>,
    profile: Profile,
    settings: PipelineSettings,
    state: Mutex<PoolState>,
    wake: Notify,
}

/// Pool of conversion workers over the shared job queue.
///
/// Clones share the same pool; control calls from any clone affect the
/// one run.
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl Clone for WorkerPool {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl WorkerPool {
    /// Create a pool; `max_concurrent_jobs` comes from the concurrency
    /// plan and must be at least 1.
    pub fn new(
        queue: SharedQueue,
        events: EventSender,
        registry: Arc<CodecRegistry>,
        encoder: Arc<dyn Encoder>,
        profile: Profile,
        max_concurrent_jobs: u32,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue,
                events,
                registry,
                encoder,
                profile,
                settings: PipelineSettings::default(),
                state: Mutex::new(PoolState {
                    max_concurrent_jobs: max_concurrent_jobs.max(1),
                    run: None,
                }),
                wake: Notify::new(),
            }),
        }
    }

    /// Change the concurrency cap. Refused while a run is in progress.
    pub async fn configure(&self, max_concurrent_jobs: u32) -> Result<(), PoolError> {
        let mut state = self.inner.state.lock().await;
        if state.run.is_some() {
            return Err(PoolError::AlreadyRunning);
        }
        state.max_concurrent_jobs = max_concurrent_jobs.max(1);
        Ok(())
    }

    /// Current concurrency cap.
    pub async fn max_concurrent_jobs(&self) -> u32 {
        self.inner.state.lock().await.max_concurrent_jobs
    }

    /// Whether a run is in progress.
    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.run.is_some()
    }

    /// Start converting queued jobs.
    pub async fn start(&self) -> Result<(), PoolError> {
        let mut state = self.inner.state.lock().await;
        if state.run.is_some() {
            return Err(PoolError::AlreadyRunning);
        }

        let cancel = CancelFlag::new();
        let max_jobs = state.max_concurrent_jobs;
        let scheduler = tokio::spawn(scheduler_loop(
            self.inner.clone(),
            cancel.clone(),
            max_jobs,
        ));
        state.run = Some(RunHandle { cancel, scheduler });
        tracing::info!(max_concurrent_jobs = max_jobs, "conversion run started");
        Ok(())
    }

    /// Stop the run cooperatively and wait for workers to wind down.
    ///
    /// Jobs interrupted mid-conversion return to Idle; finished and
    /// failed jobs keep their state. No-op when not running.
    pub async fn stop(&self) {
        // The state lock stays held across the drain so a concurrent
        // start() cannot open a second semaphore while the old run's
        // workers still hold permits.
        let mut state = self.inner.state.lock().await;
        let Some(run) = state.run.take() else { return };

        run.cancel.cancel();
        self.inner.wake.notify_waiters();
        if run.scheduler.await.is_err() {
            tracing::error!("scheduler task panicked during shutdown");
        }
        tracing::info!("conversion run stopped");
    }

    /// Wake the scheduler after jobs were added or reset.
    pub fn notify_jobs_changed(&self) {
        self.inner.wake.notify_one();
    }
}

async fn scheduler_loop(inner: Arc<Inner>, cancel: CancelFlag, max_jobs: u32) {
    let semaphore = Arc::new(Semaphore::new(max_jobs as usize));

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = inner.wake.notified() => continue,
        };

        match dispatch_next(&inner).await {
            Some((source, base)) => {
                spawn_worker(inner.clone(), permit, cancel.clone(), source, base);
            }
            None => {
                drop(permit);
                inner.wake.notified().await;
            }
        }
    }

    // Wait for outstanding workers before reporting the run as stopped
    let _ = semaphore.acquire_many_owned(max_jobs).await;
}

/// Dispatch the first runnable Idle job, failing unprobeable ones on
/// the way. Returns the dispatched job's source and base paths.
///
/// The probe reads from the filesystem, so it runs between lock takes;
/// snapshot reads keep flowing while a slow disk is being sniffed. The
/// transition guards re-check the state afterwards, a job that changed
/// in between is simply looked at again.
async fn dispatch_next(inner: &Inner) -> Option<(PathBuf, PathBuf)> {
    loop {
        let job = inner.queue.read().await.next_idle()?;
        let path = job.source_path.clone();

        let probed = inner.registry.probe_format(&path);

        let mut queue = inner.queue.write().await;
        match probed {
            None => {
                if queue.reject_unsupported(&path) {
                    tracing::warn!(path = %path.display(), "no decoder for source");
                    emit(
                        &inner.events,
                        EngineEvent::JobStateChanged {
                            path,
                            state: JobState::Error,
                            progress: 0.0,
                            error: Some(ErrorKind::FormatNotSupported),
                        },
                    );
                }
            }
            Some(format) => {
                if queue.dispatch(&path) {
                    queue.set_format(&path, &format);
                    emit(
                        &inner.events,
                        EngineEvent::JobStateChanged {
                            path: path.clone(),
                            state: JobState::Running,
                            progress: 0.0,
                            error: None,
                        },
                    );
                    return Some((path, job.base_path));
                }
            }
        }
    }
}

fn spawn_worker(
    inner: Arc<Inner>,
    permit: OwnedSemaphorePermit,
    cancel: CancelFlag,
    source: PathBuf,
    base: PathBuf,
) {
    tokio::spawn(async move {
        let _permit = permit;

        let Some(decoder) = inner.registry.decoder_for(&source) else {
            // The source vanished or changed since dispatch
            apply_outcome(&inner, &source, Outcome::Failed(ErrorKind::ReadError)).await;
            inner.wake.notify_one();
            return;
        };

        let outcome = {
            let queue = inner.queue.clone();
            let events = inner.events.clone();
            let encoder = inner.encoder.clone();
            let profile = inner.profile.clone();
            let settings = inner.settings.clone();
            let cancel = cancel.clone();
            let source = source.clone();
            let base = base.clone();

            tokio::task::spawn_blocking(move || {
                run_conversion(
                    &source,
                    &base,
                    decoder.as_ref(),
                    encoder.as_ref(),
                    &profile,
                    &settings,
                    &queue,
                    &events,
                    &cancel,
                )
            })
            .await
        };

        match outcome {
            Ok(outcome) => apply_outcome(&inner, &source, outcome).await,
            Err(err) => {
                tracing::error!(path = %source.display(), error = %err, "conversion task panicked");
                apply_outcome(&inner, &source, Outcome::Failed(ErrorKind::Unknown)).await;
            }
        }

        inner.wake.notify_one();
    });
}

async fn apply_outcome(inner: &Inner, source: &Path, outcome: Outcome) {
    let mut queue = inner.queue.write().await;

    let (applied, state, progress, error) = match outcome {
        Outcome::Finished => (queue.finish(source), JobState::Finished, 1.0, None),
        Outcome::Stopped => (queue.revert_to_idle(source), JobState::Idle, 0.0, None),
        Outcome::Failed(kind) => {
            let applied = queue.fail(source, kind);
            let progress = queue.job(source).map(|j| j.progress).unwrap_or(0.0);
            (applied, JobState::Error, progress, Some(kind))
        }
    };

    if applied {
        emit(
            &inner.events,
            EngineEvent::JobStateChanged {
                path: source.to_path_buf(),
                state,
                progress,
                error,
            },
        );
    }
}
