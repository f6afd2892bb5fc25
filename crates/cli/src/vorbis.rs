//! Ogg/Vorbis encoding through an external ffmpeg process.
//!
//! Raw interleaved 16-bit samples are piped to ffmpeg's stdin and
//! encoded with libvorbis. Quality in [0.0, 1.0] maps onto the libvorbis
//! VBR scale of -q:a 0..10.

use oggforge::{EncodeError, EncodeSink, EncodeSpec, Encoder};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// Encoder spawning one ffmpeg process per destination file.
pub struct FfmpegVorbisEncoder {
    ffmpeg: PathBuf,
}

impl FfmpegVorbisEncoder {
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self { ffmpeg }
    }
}

/// Build the ffmpeg invocation for one destination.
fn build_command(ffmpeg: &Path, output: &Path, spec: &EncodeSpec) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-y")
        .arg("-f")
        .arg("s16le")
        .arg("-ar")
        .arg(spec.sample_rate.to_string())
        .arg("-ac")
        .arg(spec.channels.to_string())
        .arg("-i")
        .arg("pipe:0")
        .arg("-c:a")
        .arg("libvorbis")
        .arg("-q:a")
        .arg(format!("{:.1}", f64::from(spec.quality) * 10.0));

    for (key, value) in &spec.tags {
        cmd.arg("-metadata").arg(format!("{key}={value}"));
    }

    cmd.arg(output);
    cmd
}

impl Encoder for FfmpegVorbisEncoder {
    fn create(&self, path: &Path, spec: &EncodeSpec) -> Result<Box<dyn EncodeSink>, EncodeError> {
        let mut cmd = build_command(&self.ffmpeg, path, spec);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncodeError::Encode("ffmpeg stdin unavailable".to_string()))?;

        Ok(Box::new(FfmpegSink {
            child,
            stdin: Some(stdin),
        }))
    }
}

struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl EncodeSink for FfmpegSink {
    fn write_chunk(&mut self, samples: &[i16]) -> Result<(), EncodeError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EncodeError::Encode("encoder already finished".to_string()))?;

        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        stdin.write_all(&bytes)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), EncodeError> {
        // Closing stdin signals end of input
        drop(self.stdin.take());

        let status = self.child.wait()?;
        if status.success() {
            return Ok(());
        }

        let mut stderr = String::new();
        if let Some(pipe) = self.child.stderr.as_mut() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let stderr = stderr.trim();
        if stderr.is_empty() {
            Err(EncodeError::Encode(format!("ffmpeg exited with {status}")))
        } else {
            Err(EncodeError::Encode(stderr.to_string()))
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // An abandoned sink must not leave an ffmpeg process behind
        if self.stdin.take().is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
