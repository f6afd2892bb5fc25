//! Built-in WAV decoder backed by `hound`.
//!
//! WAV carries no tag chunk that `hound` exposes, so streams report an
//! empty tag map. Sources are decoded to interleaved 16-bit samples;
//! 8/24/32-bit and float sources are refused rather than resampled.

use super::{DecodeError, DecodeStream, Decoder};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Decoder for RIFF/WAVE sources.
pub struct WavDecoder;

impl Decoder for WavDecoder {
    fn format_name(&self) -> &str {
        "wav"
    }

    fn extensions(&self) -> &[&str] {
        &["wav"]
    }

    fn probe(&self, path: &Path) -> bool {
        let mut header = [0u8; 12];
        match File::open(path).and_then(|mut f| f.read_exact(&mut header)) {
            Ok(()) => &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE",
            Err(_) => false,
        }
    }

    fn open(&self, path: &Path) -> Result<Box<dyn DecodeStream>, DecodeError> {
        let reader = hound::WavReader::open(path).map_err(map_hound)?;
        let spec = reader.spec();

        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(DecodeError::Unsupported);
        }

        let total_samples = u64::from(reader.duration());
        Ok(Box::new(WavStream {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            total_samples,
            tags: BTreeMap::new(),
            reader,
        }))
    }
}

struct WavStream {
    reader: hound::WavReader<BufReader<File>>,
    channels: u16,
    sample_rate: u32,
    total_samples: u64,
    tags: BTreeMap<String, String>,
}

impl DecodeStream for WavStream {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_samples(&self) -> u64 {
        self.total_samples
    }

    fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    fn read_chunk(&mut self, buf: &mut [i16]) -> Result<usize, DecodeError> {
        let mut written = 0;
        let mut samples = self.reader.samples::<i16>();
        while written < buf.len() {
            match samples.next() {
                Some(Ok(sample)) => {
                    buf[written] = sample;
                    written += 1;
                }
                Some(Err(err)) => return Err(map_hound(err)),
                None => break,
            }
        }
        Ok(written)
    }
}

fn map_hound(err: hound::Error) -> DecodeError {
    match err {
        hound::Error::IoError(io) => DecodeError::Io(io),
        other => DecodeError::Corrupt(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_wav(path: &Path, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for ch in 0..channels {
                writer.write_sample((i as i16) + (ch as i16)).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_probe_accepts_riff_wave_only() {
        let temp = TempDir::new().unwrap();

        let wav = temp.path().join("a.wav");
        write_wav(&wav, 1, 10);
        assert!(WavDecoder.probe(&wav));

        let text = temp.path().join("b.wav");
        File::create(&text)
            .unwrap()
            .write_all(b"definitely not audio")
            .unwrap();
        assert!(!WavDecoder.probe(&text));

        assert!(!WavDecoder.probe(&temp.path().join("missing.wav")));
    }

    #[test]
    fn test_open_reports_stream_parameters() {
        let temp = TempDir::new().unwrap();
        let wav = temp.path().join("stereo.wav");
        write_wav(&wav, 2, 100);

        let stream = WavDecoder.open(&wav).unwrap();
        assert_eq!(stream.channels(), 2);
        assert_eq!(stream.sample_rate(), 44_100);
        assert_eq!(stream.total_samples(), 100);
        assert!(stream.tags().is_empty());
    }

    #[test]
    fn test_read_chunk_streams_all_samples() {
        let temp = TempDir::new().unwrap();
        let wav = temp.path().join("mono.wav");
        write_wav(&wav, 1, 250);

        let mut stream = WavDecoder.open(&wav).unwrap();
        let mut buf = [0i16; 64];
        let mut total = 0;
        loop {
            let n = stream.read_chunk(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 250);
    }

    #[test]
    fn test_float_wav_is_unsupported() {
        let temp = TempDir::new().unwrap();
        let wav = temp.path().join("float.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&wav, spec).unwrap();
        writer.write_sample(0.25f32).unwrap();
        writer.finalize().unwrap();

        match WavDecoder.open(&wav) {
            Err(DecodeError::Unsupported) => {}
            other => panic!("expected Unsupported, got {:?}", other.map(|_| ())),
        }
    }
}
