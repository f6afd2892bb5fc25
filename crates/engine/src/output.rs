//! Output path resolution against the active profile.
//!
//! A profile maps source roots to a destination hierarchy: the converted
//! file keeps its path relative to the first source root that contains
//! it (falling back to the discovery base, then to the bare file name)
//! and gets an `.ogg` extension. Without a destination root the output
//! lands next to the source file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Immutable snapshot of the active output profile for one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Unique profile name.
    pub name: String,
    /// Ordered source roots used for relative path computation.
    pub source_roots: Vec<PathBuf>,
    /// Destination root; None means "next to the source file".
    pub destination: Option<PathBuf>,
    /// Vorbis VBR quality in [0.0, 1.0].
    pub quality: f32,
    /// Prefix the destination file name with the release year when known.
    pub prepend_year: bool,
}

impl Profile {
    /// Build the engine-side snapshot from configuration.
    ///
    /// With no named profile this yields the file-system default:
    /// converted files are written next to their sources with the
    /// global default quality.
    pub fn from_config(
        config: &oggforge_config::Config,
        profile: Option<&oggforge_config::ProfileConfig>,
    ) -> Self {
        Self {
            name: profile
                .map(|p| p.name.clone())
                .unwrap_or_else(|| "file-system".to_string()),
            source_roots: profile.map(|p| p.sources.clone()).unwrap_or_default(),
            destination: profile.and_then(|p| p.destination.clone()),
            quality: config.effective_quality(profile),
            prepend_year: profile.map(|p| p.prepend_year).unwrap_or(false),
        }
    }
}

/// Replace the extension with `ogg`, appending it when there is none.
fn ogged_file_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => format!("{stem}.ogg"),
        _ => format!("{name}.ogg"),
    }
}

/// Path of the source relative to the first profile root containing it,
/// else relative to the discovery base, else the bare file name.
fn relative_destination(source: &Path, base: &Path, roots: &[PathBuf]) -> PathBuf {
    for root in roots {
        if let Ok(relative) = source.strip_prefix(root) {
            return relative.to_path_buf();
        }
    }

    if let Ok(relative) = source.strip_prefix(base) {
        return relative.to_path_buf();
    }

    source
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| source.to_path_buf())
}

/// Extract a 4-digit release year from a DATE tag, when present.
pub fn year_from_tags(tags: &BTreeMap<String, String>) -> Option<u32> {
    let value = tags
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("date"))
        .map(|(_, value)| value)?;

    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() == 4 {
        digits.parse().ok()
    } else {
        None
    }
}

/// Compute the destination path for one job.
///
/// Consulted once per job at encode time; intermediate directories are
/// created by the worker, not here.
pub fn resolve_output_path(
    source: &Path,
    base: &Path,
    profile: &Profile,
    year: Option<u32>,
) -> PathBuf {
    let relative = relative_destination(source, base, &profile.source_roots);

    let file_name = relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| relative.to_string_lossy().into_owned());

    let mut file_name = ogged_file_name(&file_name);
    if profile.prepend_year {
        if let Some(year) = year {
            file_name = format!("{year:04} - {file_name}");
        }
    }

    match &profile.destination {
        Some(destination) => {
            let parent = relative.parent().unwrap_or(Path::new(""));
            destination.join(parent).join(file_name)
        }
        // File-system default: write next to the source.
        None => source
            .parent()
            .unwrap_or(Path::new(""))
            .join(file_name),
    }
}
