//! Admission of discovered candidates into the job queue.
//!
//! Each candidate is reduced to its canonical identity before insertion,
//! so the same file reached through different source roots (or through
//! symlinks and `..` segments) collides on one queue entry. First seen
//! wins; later duplicates are skipped and reported in aggregate.

use crate::discover::Candidate;
use crate::queue::{Job, JobQueue};
use std::path::{Component, Path, PathBuf};

/// Outcome of admitting one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A new job was inserted under this canonical path.
    Accepted(PathBuf),
    /// The canonical path already has a queue entry.
    SkippedAsDuplicate(PathBuf),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted(_))
    }
}

/// Canonical identity of a path.
///
/// Resolves symlinks via the filesystem when possible; for paths that do
/// not (yet) exist, falls back to a lexical cleanup of `.` and `..`
/// segments over an absolute form, so admission stays deterministic.
pub fn canonical_identity(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Admit a candidate into the queue, first-seen-wins.
///
/// On acceptance the job is inserted in Idle state, keyed by the
/// canonical path. The caller owns the skipped report and appends the
/// duplicate paths it gets back here.
pub fn admit(queue: &mut JobQueue, candidate: &Candidate, profile: &str) -> Admission {
    let identity = canonical_identity(&candidate.path);

    if queue.contains(&identity) {
        tracing::debug!(path = %candidate.path.display(), "skipping duplicate candidate");
        return Admission::SkippedAsDuplicate(candidate.path.clone());
    }

    let job = Job::new(identity.clone(), candidate.base.clone(), profile);
    queue.insert(job);
    Admission::Accepted(identity)
}
