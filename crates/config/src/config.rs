//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Conversion-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionConfig {
    /// Maximum concurrent conversion jobs (0 = one per logical core)
    #[serde(default)]
    pub concurrent_jobs: u32,
    /// Default Vorbis VBR quality in [0.0, 1.0] (default 0.5)
    #[serde(default = "default_quality")]
    pub default_quality: f32,
}

fn default_quality() -> f32 {
    0.5
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            concurrent_jobs: 0,
            default_quality: default_quality(),
        }
    }
}

/// Discovery-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// Follow symbolic links while walking source directories (default false)
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Skip hidden directories (names starting with `.`, default true)
    #[serde(default = "default_skip_hidden")]
    pub skip_hidden: bool,
}

fn default_skip_hidden() -> bool {
    true
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            skip_hidden: default_skip_hidden(),
        }
    }
}

/// A named output profile
///
/// A profile maps a set of source roots to a destination hierarchy.
/// When `destination` is absent the converted file is written next to
/// its source ("file system default").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileConfig {
    /// Unique profile name
    pub name: String,
    /// Destination root directory (None = alongside the source file)
    #[serde(default)]
    pub destination: Option<PathBuf>,
    /// Vorbis VBR quality override in [0.0, 1.0]
    #[serde(default)]
    pub quality: Option<f32>,
    /// Prefix destination file names with the release year when known
    #[serde(default)]
    pub prepend_year: bool,
    /// Ordered list of source root directories for this profile
    #[serde(default)]
    pub sources: Vec<PathBuf>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default, rename = "profile")]
    pub profiles: Vec<ProfileConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - OGGFORGE_CONCURRENT_JOBS -> conversion.concurrent_jobs
    /// - OGGFORGE_DEFAULT_QUALITY -> conversion.default_quality
    /// - OGGFORGE_FOLLOW_SYMLINKS -> discovery.follow_symlinks
    pub fn apply_env_overrides(&mut self) {
        // OGGFORGE_CONCURRENT_JOBS
        if let Ok(val) = env::var("OGGFORGE_CONCURRENT_JOBS") {
            if let Ok(jobs) = val.parse::<u32>() {
                self.conversion.concurrent_jobs = jobs;
            }
        }

        // OGGFORGE_DEFAULT_QUALITY
        if let Ok(val) = env::var("OGGFORGE_DEFAULT_QUALITY") {
            if let Ok(quality) = val.parse::<f32>() {
                self.conversion.default_quality = quality;
            }
        }

        // OGGFORGE_FOLLOW_SYMLINKS
        if let Ok(val) = env::var("OGGFORGE_FOLLOW_SYMLINKS") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.discovery.follow_symlinks = true,
                "false" | "0" | "no" => self.discovery.follow_symlinks = false,
                _ => {} // Invalid value, keep existing
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Effective VBR quality for a profile, clamped to [0.0, 1.0]
    ///
    /// A profile quality override wins over the global default.
    pub fn effective_quality(&self, profile: Option<&ProfileConfig>) -> f32 {
        let raw = profile
            .and_then(|p| p.quality)
            .unwrap_or(self.conversion.default_quality);
        raw.clamp(0.0, 1.0)
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.iter().find(|p| p.name == name)
    }
}
