//! CLI entry point for oggforge
//!
//! Parses command line arguments, discovers audio files under the given
//! roots and converts them to Ogg/Vorbis.

mod vorbis;

use clap::Parser;
use oggforge::{CodecRegistry, Config, Engine};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vorbis::FfmpegVorbisEncoder;

/// oggforge - batch conversion of audio libraries to Ogg/Vorbis
#[derive(Parser, Debug)]
#[command(name = "oggforge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Files or directories to convert
    #[arg(required = true)]
    roots: Vec<PathBuf>,

    /// Path to the configuration file (oggforge.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output profile name from the configuration
    #[arg(short, long)]
    profile: Option<String>,

    /// Concurrent conversion jobs (0 = one per CPU core)
    #[arg(short, long)]
    jobs: Option<u32>,

    /// Queue files with unknown extensions and let the format probe
    /// decide at conversion time
    #[arg(long)]
    best_effort: bool,

    /// ffmpeg binary used for Vorbis encoding
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, oggforge::config::ConfigError> {
    match path {
        Some(path) => Config::load(path),
        None => {
            let mut config = Config::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match load_config(args.config.as_ref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Some(jobs) = args.jobs {
        config.conversion.concurrent_jobs = jobs;
    }

    let registry = Arc::new(CodecRegistry::with_builtins());
    let encoder = Arc::new(FfmpegVorbisEncoder::new(args.ffmpeg));

    let engine = match Engine::new(
        &config,
        args.profile.as_deref(),
        registry,
        encoder,
        args.best_effort,
    ) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("Failed to initialize engine: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let report = engine.start_discovery(args.roots).wait().await;
    tracing::info!(
        found = report.found,
        unrecognized = report.unrecognized,
        unreadable = report.unreadable,
        "discovery finished"
    );

    if engine.jobs().await.is_empty() {
        println!("No convertible files found.");
        return ExitCode::SUCCESS;
    }

    if let Err(err) = engine.start().await {
        eprintln!("Failed to start conversion: {}", err);
        return ExitCode::FAILURE;
    }
    engine.wait_until_settled().await;
    engine.stop().await;

    let summary = engine.summary().await;
    println!(
        "Converted {} file(s), {} failed.",
        summary.finished, summary.failed
    );

    if summary.failed > 0 {
        for job in engine.jobs().await {
            if let Some(kind) = job.error {
                eprintln!("  {}: {}", job.display_name, kind);
            }
        }
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
