//! Per-job conversion pipeline.
//!
//! Runs synchronously on a blocking thread: open the source stream,
//! resolve the destination, then pump interleaved sample chunks from
//! decoder to encoder sink with a stop checkpoint between chunks.
//! Partial outputs never survive, a stopped or failed job deletes
//! whatever it wrote.

use crate::codec::{DecodeError, Decoder, EncodeError, EncodeSpec, Encoder};
use crate::discover::CancelFlag;
use crate::events::{emit, EngineEvent, EventSender};
use crate::output::{resolve_output_path, year_from_tags, Profile};
use crate::queue::{ErrorKind, JobState, SharedQueue};
use std::path::Path;
use std::time::{Duration, Instant};

/// Interleaved samples moved per chunk.
const CHUNK_SAMPLES: usize = 8192;

/// Minimum progress delta before another update is published.
const PROGRESS_MIN_DELTA: f64 = 0.01;

/// Minimum interval between progress updates.
const PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(200);

/// How a conversion attempt ended.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The output was written completely.
    Finished,
    /// The stop flag was observed; the job goes back to Idle.
    Stopped,
    /// The job failed with the given classification.
    Failed(ErrorKind),
}

/// Knobs for destination opening, separated out so tests can drop the
/// retry delay.
#[derive(Debug, Clone)]
pub(crate) struct PipelineSettings {
    pub sink_open_attempts: u32,
    pub sink_retry_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sink_open_attempts: 4,
            sink_retry_delay: Duration::from_millis(500),
        }
    }
}

/// Convert one job, publishing rate-limited progress into the queue.
///
/// `source` must be the canonical queue key of a job already in Running
/// state. Blocking; callers run this via `spawn_blocking`.
pub(crate) fn run_conversion(
    source: &Path,
    base: &Path,
    decoder: &dyn Decoder,
    encoder: &dyn Encoder,
    profile: &Profile,
    settings: &PipelineSettings,
    queue: &SharedQueue,
    events: &EventSender,
    cancel: &CancelFlag,
) -> Outcome {
    let mut stream = match decoder.open(source) {
        Ok(stream) => stream,
        Err(DecodeError::Io(err)) => {
            tracing::warn!(path = %source.display(), error = %err, "source open failed");
            return Outcome::Failed(ErrorKind::ReadError);
        }
        Err(DecodeError::Unsupported) => {
            return Outcome::Failed(ErrorKind::FormatNotSupported);
        }
        Err(DecodeError::Corrupt(reason)) => {
            tracing::warn!(path = %source.display(), %reason, "source stream corrupt");
            return Outcome::Failed(ErrorKind::ConvertingError);
        }
    };

    let channels = stream.channels();
    if channels == 0 || channels > 2 {
        tracing::warn!(path = %source.display(), channels, "unsupported channel layout");
        return Outcome::Failed(ErrorKind::ConvertingError);
    }

    let year = year_from_tags(stream.tags());
    let output = resolve_output_path(source, base, profile, year);

    if let Some(parent) = output.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            tracing::warn!(path = %parent.display(), error = %err, "destination directory creation failed");
            return Outcome::Failed(ErrorKind::WriteError);
        }
    }

    let spec = EncodeSpec {
        channels,
        sample_rate: stream.sample_rate(),
        quality: profile.quality,
        tags: stream.tags().clone(),
    };

    let mut sink = match open_sink(encoder, &output, &spec, settings, cancel) {
        Ok(sink) => sink,
        Err(outcome) => return outcome,
    };

    let total = stream.total_samples().max(1) as f64;
    let mut consumed_per_channel: u64 = 0;
    let mut published_progress = 0.0;
    let mut published_at = Instant::now();
    let mut buf = vec![0i16; CHUNK_SAMPLES];

    loop {
        if cancel.is_cancelled() {
            discard_partial(&output);
            return Outcome::Stopped;
        }

        let read = match stream.read_chunk(&mut buf) {
            Ok(read) => read,
            Err(DecodeError::Io(err)) => {
                tracing::warn!(path = %source.display(), error = %err, "read failed mid-stream");
                discard_partial(&output);
                return Outcome::Failed(ErrorKind::ReadError);
            }
            Err(err) => {
                tracing::warn!(path = %source.display(), error = %err, "decode failed mid-stream");
                discard_partial(&output);
                return Outcome::Failed(ErrorKind::ConvertingError);
            }
        };
        if read == 0 {
            break;
        }

        if let Err(err) = sink.write_chunk(&buf[..read]) {
            discard_partial(&output);
            return Outcome::Failed(classify_encode_error(&output, err));
        }

        consumed_per_channel += (read / channels as usize) as u64;
        let progress = (consumed_per_channel as f64 / total).min(1.0);
        let now = Instant::now();
        if progress - published_progress >= PROGRESS_MIN_DELTA
            && now.duration_since(published_at) >= PROGRESS_MIN_INTERVAL
        {
            if queue.blocking_write().set_progress(source, progress) {
                emit(
                    events,
                    EngineEvent::JobStateChanged {
                        path: source.to_path_buf(),
                        state: JobState::Running,
                        progress,
                        error: None,
                    },
                );
            }
            published_progress = progress;
            published_at = now;
        }
    }

    if let Err(err) = sink.finish() {
        discard_partial(&output);
        return Outcome::Failed(classify_encode_error(&output, err));
    }

    Outcome::Finished
}

/// Open the encoder sink, retrying transient I/O failures. A stop
/// observed between attempts ends the job without waiting out the
/// remaining retry delays.
fn open_sink(
    encoder: &dyn Encoder,
    output: &Path,
    spec: &EncodeSpec,
    settings: &PipelineSettings,
    cancel: &CancelFlag,
) -> Result<Box<dyn crate::codec::EncodeSink>, Outcome> {
    let attempts = settings.sink_open_attempts.max(1);
    for attempt in 1..=attempts {
        match encoder.create(output, spec) {
            Ok(sink) => return Ok(sink),
            Err(EncodeError::Io(err)) if attempt < attempts => {
                if cancel.is_cancelled() {
                    return Err(Outcome::Stopped);
                }
                tracing::debug!(
                    path = %output.display(),
                    attempt,
                    error = %err,
                    "destination open failed, retrying"
                );
                std::thread::sleep(settings.sink_retry_delay);
            }
            Err(err) => return Err(Outcome::Failed(classify_encode_error(output, err))),
        }
    }
    unreachable!("retry loop always returns")
}

fn classify_encode_error(output: &Path, err: EncodeError) -> ErrorKind {
    match err {
        EncodeError::Io(io) => {
            tracing::warn!(path = %output.display(), error = %io, "write failed");
            ErrorKind::WriteError
        }
        EncodeError::Encode(reason) => {
            tracing::warn!(path = %output.display(), %reason, "encoder failed");
            ErrorKind::ConvertingError
        }
    }
}

/// Remove a partially written output, best effort.
fn discard_partial(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %output.display(), error = %err, "could not remove partial output");
        }
    }
}
