//! Pluggable decode/encode boundary.
//!
//! The engine never touches codec internals: decoders turn a source file
//! into a stream of interleaved 16-bit samples, encoder sinks consume
//! those samples and write the target container. Both sides report
//! typed failures so a worker can classify where a job broke.

pub mod wav;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Error type for decode operations.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Source I/O failed.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The decoder cannot handle this file.
    #[error("format not supported")]
    Unsupported,

    /// The stream is recognized but malformed.
    #[error("stream corrupt: {0}")]
    Corrupt(String),
}

/// Error type for encode operations.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Destination I/O failed.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The encoder itself failed.
    #[error("encoder failed: {0}")]
    Encode(String),
}

/// An open source file being decoded.
pub trait DecodeStream: Send {
    /// Channel count of the source.
    fn channels(&self) -> u16;

    /// Sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Total samples per channel, for progress computation.
    fn total_samples(&self) -> u64;

    /// Metadata tags carried by the source (keys uppercased by convention).
    fn tags(&self) -> &BTreeMap<String, String>;

    /// Fill `buf` with interleaved samples; returns the number written,
    /// 0 at end of stream.
    fn read_chunk(&mut self, buf: &mut [i16]) -> Result<usize, DecodeError>;
}

/// A decode capability for one source format.
pub trait Decoder: Send + Sync {
    /// Short format name reported on jobs (e.g. "wav").
    fn format_name(&self) -> &str;

    /// Extensions claimed by this decoder, lowercase without dots.
    fn extensions(&self) -> &[&str];

    /// Cheap content sniff, used for best-effort attempts on files whose
    /// extension is not recognized.
    fn probe(&self, path: &Path) -> bool;

    /// Open the source for streaming decode.
    fn open(&self, path: &Path) -> Result<Box<dyn DecodeStream>, DecodeError>;
}

/// Parameters for creating an encoder sink.
#[derive(Debug, Clone)]
pub struct EncodeSpec {
    pub channels: u16,
    pub sample_rate: u32,
    /// Vorbis VBR quality in [0.0, 1.0].
    pub quality: f32,
    /// Tags to carry over into the output.
    pub tags: BTreeMap<String, String>,
}

/// An open destination being encoded.
pub trait EncodeSink: Send {
    /// Consume one chunk of interleaved samples.
    fn write_chunk(&mut self, samples: &[i16]) -> Result<(), EncodeError>;

    /// Flush and close the output.
    fn finish(&mut self) -> Result<(), EncodeError>;
}

/// An encode capability producing the target format.
pub trait Encoder: Send + Sync {
    /// Create a sink writing to `path`.
    fn create(&self, path: &Path, spec: &EncodeSpec) -> Result<Box<dyn EncodeSink>, EncodeError>;
}

/// Registry of available decoders.
///
/// Lookup prefers an extension match and falls back to content probing,
/// so a file added despite an unknown extension can still convert when
/// some decoder recognizes its content.
#[derive(Default)]
pub struct CodecRegistry {
    decoders: Vec<Arc<dyn Decoder>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in decoders.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(wav::WavDecoder));
        registry
    }

    pub fn register(&mut self, decoder: Arc<dyn Decoder>) {
        self.decoders.push(decoder);
    }

    /// Find a decoder for the given path.
    ///
    /// Used as the pre-flight format probe: `None` means the job fails
    /// with `FormatNotSupported` before any worker is dispatched.
    pub fn decoder_for(&self, path: &Path) -> Option<Arc<dyn Decoder>> {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            let ext = ext.to_lowercase();
            for decoder in &self.decoders {
                if decoder.extensions().contains(&ext.as_str()) {
                    return Some(decoder.clone());
                }
            }
        }

        self.decoders.iter().find(|d| d.probe(path)).cloned()
    }

    /// Format name for the given path, when any decoder claims it.
    pub fn probe_format(&self, path: &Path) -> Option<String> {
        self.decoder_for(path)
            .map(|d| d.format_name().to_string())
    }
}
