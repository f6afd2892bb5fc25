//! Job queue module: the ordered set of conversion jobs and their state machine.
//!
//! The queue is the single owner of job state. Workers and the discovery
//! intake mutate jobs only through the transition methods here, which act
//! as guards: an illegal transition is a no-op that returns `false`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Classification of a failed conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No decoder recognizes the source format (assigned before dispatch).
    FormatNotSupported,
    /// Source demux/decode failed mid-stream.
    ConvertingError,
    /// Source I/O failed.
    ReadError,
    /// Destination I/O failed.
    WriteError,
    /// Unclassified failure.
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::FormatNotSupported => write!(f, "format_not_supported"),
            ErrorKind::ConvertingError => write!(f, "converting_error"),
            ErrorKind::ReadError => write!(f, "read_error"),
            ErrorKind::WriteError => write!(f, "write_error"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// State of a job in the conversion pipeline.
///
/// Legal transitions: `Idle -> Running -> {Finished, Error}`, plus
/// `Running -> Idle` on an explicit stop and `{Finished, Error} -> Idle`
/// on an explicit reset ("mark for repeat"). `Idle -> Error` is allowed
/// only for the pre-flight format probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in queue.
    Idle,
    /// Job is held by a worker.
    Running,
    /// Job completed successfully.
    Finished,
    /// Job failed; the error kind says where in the pipeline.
    Error,
}

impl Default for JobState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Idle => write!(f, "idle"),
            JobState::Running => write!(f, "running"),
            JobState::Finished => write!(f, "finished"),
            JobState::Error => write!(f, "error"),
        }
    }
}

/// A single conversion job.
///
/// Identity is the canonical source path; the queue rejects a second job
/// with the same canonical path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Canonical path of the source file (queue key).
    pub source_path: PathBuf,
    /// Base directory the file was discovered under, used to mirror the
    /// source hierarchy below the destination root.
    pub base_path: PathBuf,
    /// Short name for presentation.
    pub display_name: String,
    /// Current state.
    pub state: JobState,
    /// Progress fraction in [0, 1].
    pub progress: f64,
    /// Error kind, set only in the Error state.
    pub error: Option<ErrorKind>,
    /// Detected source format name, if recognized by extension.
    pub format: Option<String>,
    /// Name of the profile this job converts under.
    pub profile: String,
}

impl Job {
    /// Create a new idle job.
    pub fn new(source_path: PathBuf, base_path: PathBuf, profile: &str) -> Self {
        let display_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_path.to_string_lossy().into_owned());

        Self {
            source_path,
            base_path,
            display_name,
            state: JobState::Idle,
            progress: 0.0,
            error: None,
            format: None,
            profile: profile.to_string(),
        }
    }

    /// Check if the job is in a terminal state for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Finished | JobState::Error)
    }
}

/// Per-state job counts, for run summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub idle: usize,
    pub running: usize,
    pub finished: usize,
    pub failed: usize,
}

/// Insertion-ordered collection of jobs keyed by canonical source path.
#[derive(Debug, Default)]
pub struct JobQueue {
    order: Vec<PathBuf>,
    jobs: HashMap<PathBuf, Job>,
}

/// Shared handle to the job queue.
///
/// The queue is the only shared mutable structure between discovery,
/// the worker pool and presentation reads; every mutation happens under
/// this lock so a reader never observes a half-updated job.
pub type SharedQueue = Arc<RwLock<JobQueue>>;

/// Create a new empty shared queue.
pub fn new_shared_queue() -> SharedQueue {
    Arc::new(RwLock::new(JobQueue::new()))
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs in the queue.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Check whether a job exists for the given canonical path.
    pub fn contains(&self, path: &Path) -> bool {
        self.jobs.contains_key(path)
    }

    /// Snapshot of a single job.
    pub fn job(&self, path: &Path) -> Option<Job> {
        self.jobs.get(path).cloned()
    }

    /// Snapshot of all jobs in insertion order.
    pub fn jobs(&self) -> Vec<Job> {
        self.order
            .iter()
            .filter_map(|p| self.jobs.get(p).cloned())
            .collect()
    }

    /// Insert a job, keyed by its canonical source path.
    ///
    /// Returns `false` without modifying the queue when a job with the
    /// same canonical path already exists.
    pub fn insert(&mut self, job: Job) -> bool {
        if self.jobs.contains_key(&job.source_path) {
            return false;
        }

        self.order.push(job.source_path.clone());
        self.jobs.insert(job.source_path.clone(), job);
        true
    }

    /// Remove a job, returning it if it existed.
    pub fn remove(&mut self, path: &Path) -> Option<Job> {
        let job = self.jobs.remove(path)?;
        self.order.retain(|p| p != path);
        Some(job)
    }

    /// Remove all jobs, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.order.len();
        self.order.clear();
        self.jobs.clear();
        count
    }

    /// First Idle job in queue order, if any.
    pub fn next_idle(&self) -> Option<Job> {
        self.order
            .iter()
            .filter_map(|p| self.jobs.get(p))
            .find(|j| j.state == JobState::Idle)
            .cloned()
    }

    /// Count of jobs currently Running.
    pub fn running_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|j| j.state == JobState::Running)
            .count()
    }

    /// Whether any job is not yet terminal.
    pub fn has_unfinished(&self) -> bool {
        self.jobs.values().any(|j| !j.is_terminal())
    }

    /// Per-state counts.
    pub fn summary(&self) -> QueueSummary {
        let mut summary = QueueSummary::default();
        for job in self.jobs.values() {
            match job.state {
                JobState::Idle => summary.idle += 1,
                JobState::Running => summary.running += 1,
                JobState::Finished => summary.finished += 1,
                JobState::Error => summary.failed += 1,
            }
        }
        summary
    }

    /// Transition `Idle -> Running` (worker takes the job lease).
    ///
    /// Returns `false` for a missing or non-Idle job, which makes
    /// re-dispatch of an already-held job impossible.
    pub fn dispatch(&mut self, path: &Path) -> bool {
        match self.jobs.get_mut(path) {
            Some(job) if job.state == JobState::Idle => {
                job.state = JobState::Running;
                job.progress = 0.0;
                job.error = None;
                true
            }
            _ => false,
        }
    }

    /// Update progress of a Running job.
    ///
    /// Progress is clamped to [0, 1] and never moves backwards while
    /// the job stays Running.
    pub fn set_progress(&mut self, path: &Path, progress: f64) -> bool {
        match self.jobs.get_mut(path) {
            Some(job) if job.state == JobState::Running => {
                let clamped = progress.clamp(0.0, 1.0);
                if clamped > job.progress {
                    job.progress = clamped;
                }
                true
            }
            _ => false,
        }
    }

    /// Transition `Running -> Finished` with progress pinned to 1.
    pub fn finish(&mut self, path: &Path) -> bool {
        match self.jobs.get_mut(path) {
            Some(job) if job.state == JobState::Running => {
                job.state = JobState::Finished;
                job.progress = 1.0;
                job.error = None;
                true
            }
            _ => false,
        }
    }

    /// Transition `Running -> Error` with the given kind.
    pub fn fail(&mut self, path: &Path, kind: ErrorKind) -> bool {
        match self.jobs.get_mut(path) {
            Some(job) if job.state == JobState::Running => {
                job.state = JobState::Error;
                job.error = Some(kind);
                true
            }
            _ => false,
        }
    }

    /// Transition `Idle -> Error(FormatNotSupported)`.
    ///
    /// The only failure assignable before a worker holds the job; set by
    /// the pre-flight format probe.
    pub fn reject_unsupported(&mut self, path: &Path) -> bool {
        match self.jobs.get_mut(path) {
            Some(job) if job.state == JobState::Idle => {
                job.state = JobState::Error;
                job.error = Some(ErrorKind::FormatNotSupported);
                true
            }
            _ => false,
        }
    }

    /// Transition `Running -> Idle` (cooperative stop, not a failure).
    pub fn revert_to_idle(&mut self, path: &Path) -> bool {
        match self.jobs.get_mut(path) {
            Some(job) if job.state == JobState::Running => {
                job.state = JobState::Idle;
                job.progress = 0.0;
                job.error = None;
                true
            }
            _ => false,
        }
    }

    /// Transition `{Finished, Error} -> Idle` ("mark for repeat").
    pub fn reset(&mut self, path: &Path) -> bool {
        match self.jobs.get_mut(path) {
            Some(job) if job.is_terminal() => {
                job.state = JobState::Idle;
                job.progress = 0.0;
                job.error = None;
                true
            }
            _ => false,
        }
    }

    /// Record the detected format for a job.
    pub fn set_format(&mut self, path: &Path, format: &str) -> bool {
        match self.jobs.get_mut(path) {
            Some(job) => {
                job.format = Some(format.to_string());
                true
            }
            None => false,
        }
    }
}
