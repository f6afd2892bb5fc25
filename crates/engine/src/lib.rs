//! Oggforge conversion engine
//!
//! Discovers audio files under source roots, queues them as conversion
//! jobs and drives them through pluggable decoders into an Ogg/Vorbis
//! encoder sink with bounded concurrency.

pub mod admit;
pub mod codec;
pub mod concurrency;
pub mod discover;
pub mod engine;
pub mod events;
pub mod output;
pub mod pool;
pub mod queue;

mod pipeline;

pub use oggforge_config as config;
pub use oggforge_config::Config;

pub use admit::{admit, canonical_identity, Admission};
pub use codec::{
    CodecRegistry, DecodeError, DecodeStream, Decoder, EncodeError, EncodeSink, EncodeSpec,
    Encoder,
};
pub use concurrency::{derive_plan, ConcurrencyPlan};
pub use discover::{
    is_audio_file, scan, CancelFlag, Candidate, DiscoveryReport, ScanOptions, AUDIO_EXTENSIONS,
};
pub use engine::{AddOutcome, DiscoveryHandle, Engine, EngineError};
pub use events::{event_channel, EngineEvent, EventReceiver, EventSender};
pub use output::{resolve_output_path, year_from_tags, Profile};
pub use pool::{PoolError, WorkerPool};
pub use queue::{
    new_shared_queue, ErrorKind, Job, JobQueue, JobState, QueueSummary, SharedQueue,
};
