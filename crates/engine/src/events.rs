//! Event channel from the engine to the presentation layer.
//!
//! Events are broadcast; a presentation layer that prefers polling can
//! ignore them and snapshot the shared queue instead. Sends never block
//! and a lagging or absent subscriber is not an error.

use crate::discover::DiscoveryReport;
use crate::queue::{ErrorKind, JobState};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Default capacity of the broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notification emitted by the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A job entered the queue.
    JobAdded { path: PathBuf },
    /// A job changed state or progress.
    JobStateChanged {
        path: PathBuf,
        state: JobState,
        progress: f64,
        error: Option<ErrorKind>,
    },
    /// Discovery found another candidate (running count so far).
    DiscoveryProgress { found: usize },
    /// Discovery walked all roots or was cancelled.
    DiscoveryFinished { report: DiscoveryReport },
    /// Aggregate list of candidates skipped as duplicates.
    SkippedReport { skipped: Vec<PathBuf> },
}

pub type EventSender = broadcast::Sender<EngineEvent>;
pub type EventReceiver = broadcast::Receiver<EngineEvent>;

/// Create the engine event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}

/// Send an event, ignoring the absence of subscribers.
pub(crate) fn emit(tx: &EventSender, event: EngineEvent) {
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_does_not_panic() {
        let (tx, rx) = event_channel();
        drop(rx);
        emit(&tx, EngineEvent::DiscoveryProgress { found: 1 });
    }

    #[tokio::test]
    async fn test_events_reach_all_subscribers() {
        let (tx, mut rx1) = event_channel();
        let mut rx2 = tx.subscribe();

        emit(
            &tx,
            EngineEvent::JobAdded {
                path: PathBuf::from("/music/a.flac"),
            },
        );

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                EngineEvent::JobAdded { path } => {
                    assert_eq!(path, PathBuf::from("/music/a.flac"));
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
