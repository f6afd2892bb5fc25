//! Discovery module for finding audio files under source roots.
//!
//! Walks one or more roots recursively on a blocking task and streams
//! candidates over a bounded channel, so callers see files as they are
//! found instead of waiting for the full walk. Cancellation is
//! cooperative and checked between directory entries.

use crate::admit::canonical_identity;
use crate::events::{emit, EngineEvent, EventSender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

/// Audio file extensions recognized by the scanner (case-insensitive matching).
pub const AUDIO_EXTENSIONS: &[&str] = &[
    ".wav", ".flac", ".mp3", ".ogg", ".oga", ".aiff", ".aif", ".wv", ".ape", ".mpc",
];

/// Capacity of the candidate channel between the walker and the intake.
const CANDIDATE_CHANNEL_CAPACITY: usize = 64;

/// Checks if a file has a recognized audio extension (case-insensitive).
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            AUDIO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Cooperative cancellation flag shared between the requester and the walker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the walker stops at its next check point.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A candidate audio file discovered under a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Path of the discovered file.
    pub path: PathBuf,
    /// Base directory the destination hierarchy is mirrored from.
    pub base: PathBuf,
    /// Whether the extension matched a known audio format. Files given
    /// directly as roots are reported even when unrecognized, so the
    /// caller may offer a best-effort conversion.
    pub recognized: bool,
}

/// Counters accumulated over one discovery session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Candidates produced (recognized or not).
    pub found: usize,
    /// File roots whose extension was not recognized.
    pub unrecognized: usize,
    /// Paths skipped because they could not be read.
    pub unreadable: usize,
    /// Whether the session ended by cancellation.
    pub cancelled: bool,
}

/// Walk behavior knobs, taken from the discovery config section.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub follow_symlinks: bool,
    pub skip_hidden: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            skip_hidden: true,
        }
    }
}

impl From<&oggforge_config::DiscoveryConfig> for ScanOptions {
    fn from(cfg: &oggforge_config::DiscoveryConfig) -> Self {
        Self {
            follow_symlinks: cfg.follow_symlinks,
            skip_hidden: cfg.skip_hidden,
        }
    }
}

/// Start a discovery session over the given roots.
///
/// Directory roots are walked recursively and yield only files with a
/// recognized extension; other files inside directories are silently
/// skipped. A root that is itself a file is always yielded, carrying
/// `recognized = false` when its extension is unknown.
///
/// Candidates stream over the returned channel while the walk runs.
/// `DiscoveryProgress` events carry the running count, and a single
/// `DiscoveryFinished` event carries the final counters, also when the
/// session is cancelled. The returned handle resolves to the same
/// counters once the walk ends.
pub fn scan(
    roots: Vec<PathBuf>,
    options: ScanOptions,
    cancel: CancelFlag,
    events: EventSender,
) -> (mpsc::Receiver<Candidate>, JoinHandle<DiscoveryReport>) {
    let (tx, rx) = mpsc::channel(CANDIDATE_CHANNEL_CAPACITY);

    let walker = tokio::task::spawn_blocking(move || {
        let report = walk_roots(&roots, options, &cancel, &events, &tx);
        emit(&events, EngineEvent::DiscoveryFinished { report });
        report
    });

    (rx, walker)
}

fn walk_roots(
    roots: &[PathBuf],
    options: ScanOptions,
    cancel: &CancelFlag,
    events: &EventSender,
    tx: &mpsc::Sender<Candidate>,
) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();

    'roots: for root in roots {
        if cancel.is_cancelled() {
            break;
        }

        // Resolve the root up front: candidates, their base and the
        // queue identity must agree on one canonical form, or relative
        // roots leak into destination resolution.
        let root = canonical_identity(root);

        let meta = match std::fs::metadata(&root) {
            Ok(meta) => meta,
            Err(_) => {
                report.unreadable += 1;
                continue;
            }
        };

        if meta.is_file() {
            // Explicitly given files are yielded even when the extension
            // is unknown; the receiver decides about a best-effort attempt.
            let recognized = is_audio_file(&root);
            if !recognized {
                report.unrecognized += 1;
            }
            let base = root.parent().unwrap_or(Path::new("")).to_path_buf();
            if !yield_candidate(root.clone(), base, recognized, &mut report, events, tx) {
                break;
            }
            continue;
        }

        // Mirror the hierarchy from the parent of the root, so the root
        // directory name itself appears in destination paths.
        let base = root.parent().unwrap_or(root.as_path()).to_path_buf();

        let walker = WalkDir::new(&root)
            .follow_links(options.follow_symlinks)
            .into_iter()
            .filter_entry(move |entry| {
                if options.skip_hidden && entry.file_type().is_dir() && entry.depth() > 0 {
                    if let Some(name) = entry.file_name().to_str() {
                        if name.starts_with('.') {
                            return false;
                        }
                    }
                }
                true
            });

        for entry in walker {
            if cancel.is_cancelled() {
                break 'roots;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => {
                    // Unreadable directory or permission failure, counted
                    // but never fatal to the session.
                    report.unreadable += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if !is_audio_file(entry.path()) {
                continue;
            }

            let path = entry.path().to_path_buf();
            if !yield_candidate(path, base.clone(), true, &mut report, events, tx) {
                break 'roots;
            }
        }
    }

    report.cancelled = cancel.is_cancelled();
    report
}

/// Push one candidate to the channel; returns false when the receiver is gone.
fn yield_candidate(
    path: PathBuf,
    base: PathBuf,
    recognized: bool,
    report: &mut DiscoveryReport,
    events: &EventSender,
    tx: &mpsc::Sender<Candidate>,
) -> bool {
    if tx
        .blocking_send(Candidate {
            path,
            base,
            recognized,
        })
        .is_err()
    {
        return false;
    }

    report.found += 1;
    emit(
        events,
        EngineEvent::DiscoveryProgress {
            found: report.found,
        },
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use std::fs::{self, File};
    use tempfile::TempDir;

    async fn collect(mut rx: mpsc::Receiver<Candidate>) -> Vec<Candidate> {
        let mut out = Vec::new();
        while let Some(candidate) = rx.recv().await {
            out.push(candidate);
        }
        out
    }

    async fn wait_for_report(rx: &mut crate::events::EventReceiver) -> DiscoveryReport {
        loop {
            if let EngineEvent::DiscoveryFinished { report } = rx.recv().await.unwrap() {
                return report;
            }
        }
    }

    #[test]
    fn test_audio_extensions_defined() {
        assert!(AUDIO_EXTENSIONS.contains(&".wav"));
        assert!(AUDIO_EXTENSIONS.contains(&".flac"));
        assert!(AUDIO_EXTENSIONS.contains(&".mp3"));
        assert!(AUDIO_EXTENSIONS.contains(&".ogg"));
        assert_eq!(AUDIO_EXTENSIONS.len(), 10);
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("/music/track.flac")));
        assert!(is_audio_file(Path::new("/music/track.FLAC"))); // case-insensitive
        assert!(is_audio_file(Path::new("/music/track.Mp3")));
        assert!(!is_audio_file(Path::new("/music/cover.jpg")));
        assert!(!is_audio_file(Path::new("/music/track"))); // no extension
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_scan_finds_audio_files_recursively() {
        let temp = TempDir::new().unwrap();
        let temp_path = fs::canonicalize(temp.path()).unwrap();
        let root = temp_path.join("library");
        fs::create_dir_all(root.join("album")).unwrap();
        File::create(root.join("one.flac")).unwrap();
        File::create(root.join("album/two.mp3")).unwrap();
        File::create(root.join("album/cover.jpg")).unwrap();

        let (events, mut event_rx) = event_channel();
        let (rx, _walker) = scan(
            vec![root.clone()],
            ScanOptions::default(),
            CancelFlag::new(),
            events,
        );

        let mut found = collect(rx).await;
        found.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.recognized));
        assert!(found.iter().all(|c| c.base == temp_path));
        assert_eq!(found[0].path, root.join("album/two.mp3"));
        assert_eq!(found[1].path, root.join("one.flac"));

        let report = wait_for_report(&mut event_rx).await;
        assert_eq!(report.found, 2);
        assert_eq!(report.unrecognized, 0);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_relative_root_yields_canonical_candidates() {
        let temp = TempDir::new().unwrap();
        let temp_path = fs::canonicalize(temp.path()).unwrap();
        fs::create_dir_all(temp_path.join("library/album")).unwrap();
        File::create(temp_path.join("library/album/track.wav")).unwrap();

        // The only test that changes the working directory; everything
        // else in this binary walks absolute paths.
        std::env::set_current_dir(&temp_path).unwrap();

        let (events, _event_rx) = event_channel();
        let (rx, _walker) = scan(
            vec![PathBuf::from("library")],
            ScanOptions::default(),
            CancelFlag::new(),
            events,
        );

        let found = collect(rx).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].base, temp_path);
        assert_eq!(found[0].path, temp_path.join("library/album/track.wav"));

        // Routing against a profile destination stays under that root
        let profile = crate::output::Profile {
            name: "player".to_string(),
            source_roots: Vec::new(),
            destination: Some(PathBuf::from("/outroot")),
            quality: 0.5,
            prepend_year: false,
        };
        let output =
            crate::output::resolve_output_path(&found[0].path, &found[0].base, &profile, None);
        assert_eq!(output, PathBuf::from("/outroot/library/album/track.ogg"));
    }

    #[tokio::test]
    async fn test_file_root_yields_unrecognized_candidate() {
        let temp = TempDir::new().unwrap();
        let temp_path = fs::canonicalize(temp.path()).unwrap();
        let notes = temp_path.join("notes.txt");
        let track = temp_path.join("track.wav");
        File::create(&notes).unwrap();
        File::create(&track).unwrap();

        let (events, mut event_rx) = event_channel();
        let (rx, _walker) = scan(
            vec![notes.clone(), track.clone()],
            ScanOptions::default(),
            CancelFlag::new(),
            events,
        );

        let found = collect(rx).await;
        assert_eq!(found.len(), 2);

        let by_path = |p: &Path| found.iter().find(|c| c.path == p).unwrap().clone();
        assert!(!by_path(&notes).recognized);
        assert!(by_path(&track).recognized);

        let report = wait_for_report(&mut event_rx).await;
        assert_eq!(report.found, 2);
        assert_eq!(report.unrecognized, 1);
    }

    #[tokio::test]
    async fn test_hidden_directories_are_skipped() {
        let temp = TempDir::new().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap().join("library");
        fs::create_dir_all(root.join(".trash")).unwrap();
        File::create(root.join("keep.flac")).unwrap();
        File::create(root.join(".trash/gone.flac")).unwrap();

        let (events, _event_rx) = event_channel();
        let (rx, _walker) = scan(
            vec![root.clone()],
            ScanOptions::default(),
            CancelFlag::new(),
            events,
        );

        let found = collect(rx).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, root.join("keep.flac"));
    }

    #[tokio::test]
    async fn test_missing_root_is_counted_not_fatal() {
        let temp = TempDir::new().unwrap();
        let good = fs::canonicalize(temp.path()).unwrap().join("track.wav");
        File::create(&good).unwrap();

        let (events, mut event_rx) = event_channel();
        let (rx, _walker) = scan(
            vec![temp.path().join("does-not-exist"), good.clone()],
            ScanOptions::default(),
            CancelFlag::new(),
            events,
        );

        let found = collect(rx).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, good);

        let report = wait_for_report(&mut event_rx).await;
        assert_eq!(report.unreadable, 1);
        assert_eq!(report.found, 1);
    }

    #[tokio::test]
    async fn test_cancelled_scan_produces_nothing_further() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("library");
        fs::create_dir_all(&root).unwrap();
        for i in 0..32 {
            File::create(root.join(format!("track-{i:02}.flac"))).unwrap();
        }

        let cancel = CancelFlag::new();
        cancel.cancel();

        let (events, mut event_rx) = event_channel();
        let (rx, walker) = scan(
            vec![root],
            ScanOptions::default(),
            cancel,
            events,
        );

        let found = collect(rx).await;
        assert!(found.is_empty());

        let report = wait_for_report(&mut event_rx).await;
        assert!(report.cancelled);
        assert_eq!(report.found, 0);

        // The handle resolves to the same counters as the event
        assert_eq!(walker.await.unwrap(), report);
    }
}
