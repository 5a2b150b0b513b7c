//! Run configuration.
//!
//! A run is described by an immutable [`PipelineConfig`]: the export
//! directory given on the command line, the output directory derived from
//! it, and the [`Settings`] loaded from an optional TOML file.
//!
//! ## Output Location
//!
//! The output directory is never chosen by the user. It is always the
//! sibling `optimiert` next to the input:
//!
//! ```text
//! exports/
//! ├── site/          # --input exports/site
//! └── optimiert/     # derived output, purged before every run
//! ```
//!
//! ## Settings File
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [prune]
//! ignore = ["#overlay", ".image", "#imageZoomContainer", "/zoomOverlay\\w+/"]
//! timeout_ms = 500          # Unused-selector analysis bound
//!
//! [images]
//! quality = 90              # JPEG re-encode quality (1-100)
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//!
//! [output]
//! helper_page = false       # Write putzfish.html into the output root
//! ```
//!
//! Settings files are sparse: override just the values you want. Unknown
//! keys are rejected to catch typos early.

use crate::prune::IgnorePattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the output directory, created next to the input directory.
pub const OUTPUT_DIR_NAME: &str = "optimiert";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Input directory {} not found: {source}", .path.display())]
    InputNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Input {} is not a directory", .0.display())]
    InputNotDirectory(PathBuf),
    #[error("Cannot place output next to {}: {reason}", .input.display())]
    OutputDir { input: PathBuf, reason: &'static str },
}

/// Settings loaded from the optional TOML file.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Unused-selector analysis.
    pub prune: PruneConfig,
    /// Image re-encoding.
    pub images: ImagesConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Extra files written into the output.
    pub output: OutputConfig,
}

impl Settings {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.prune.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "prune.timeout_ms must be greater than zero".into(),
            ));
        }
        self.prune.ignore_patterns()?;
        Ok(())
    }
}

/// Unused-selector analysis settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PruneConfig {
    /// Selectors kept even when no markup uses them. `/…/` entries are regexes.
    pub ignore: Vec<String>,
    /// Upper bound for the whole analysis, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            ignore: vec![
                "#overlay".to_string(),
                ".image".to_string(),
                "#imageZoomContainer".to_string(),
                "/zoomOverlay\\w+/".to_string(),
            ],
            timeout_ms: 500,
        }
    }
}

impl PruneConfig {
    /// Compile the ignore list.
    pub fn ignore_patterns(&self) -> Result<Vec<IgnorePattern>, ConfigError> {
        self.ignore
            .iter()
            .map(|entry| {
                IgnorePattern::parse(entry).map_err(|e| {
                    ConfigError::Validation(format!("prune.ignore entry {entry:?}: {e}"))
                })
            })
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Image re-encoding settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// JPEG encoding quality (1 = worst, 100 = best).
    pub quality: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers per stage.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Extra output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Write the `putzfish.html` helper page into the output root.
    pub helper_page: bool,
}

// =============================================================================
// Loading
// =============================================================================

/// Parse and validate settings from TOML text.
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = toml::from_str(content)?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `path`, or the defaults when `path` is `None`.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    match path {
        Some(path) => parse_settings(&fs::read_to_string(path)?),
        None => Ok(Settings::default()),
    }
}

/// Returns a fully-commented stock settings file with all keys and explanations.
///
/// Used by the `--gen-config` CLI flag.
pub fn stock_config_toml() -> &'static str {
    r##"# putzfish settings
# =================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Unused-selector pruning (support/global_style.css)
# ---------------------------------------------------------------------------
[prune]
# Selectors that are kept even when no page uses them, e.g. elements that
# scripts create at runtime. Entries wrapped in slashes are regular
# expressions matched against the selector text; all others are literal
# names such as ".class", "#id" or a full selector.
ignore = ["#overlay", ".image", "#imageZoomContainer", "/zoomOverlay\\w+/"]

# Upper bound for the analysis in milliseconds. Exceeding it aborts the run.
timeout_ms = 500

# ---------------------------------------------------------------------------
# Image compression (media/)
# ---------------------------------------------------------------------------
[images]
# JPEG re-encode quality (1 = worst, 100 = best). PNG and WebP are
# re-encoded losslessly. A result is only kept when it is smaller.
quality = 90

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers per stage.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Also write the putzfish.html helper page into the output directory.
helper_page = false
"##
}

// =============================================================================
// Paths
// =============================================================================

/// The output directory for `input`: its sibling named [`OUTPUT_DIR_NAME`].
///
/// Fails when `input` has no parent or is itself the derived directory,
/// since the output is purged before every run.
pub fn derive_output_dir(input: &Path) -> Result<PathBuf, ConfigError> {
    let parent = input.parent().ok_or_else(|| ConfigError::OutputDir {
        input: input.to_path_buf(),
        reason: "input has no parent directory",
    })?;
    let output = parent.join(OUTPUT_DIR_NAME);
    if output == input {
        return Err(ConfigError::OutputDir {
            input: input.to_path_buf(),
            reason: "input is the output directory",
        });
    }
    Ok(output)
}

/// Everything a run needs, resolved once before any stage starts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    input: PathBuf,
    output: PathBuf,
    settings: Settings,
}

impl PipelineConfig {
    /// Check the input directory, validate `settings` and derive the output path.
    pub fn resolve(input: &Path, settings: Settings) -> Result<Self, ConfigError> {
        let input = fs::canonicalize(input).map_err(|source| ConfigError::InputNotFound {
            path: input.to_path_buf(),
            source,
        })?;
        if !input.is_dir() {
            return Err(ConfigError::InputNotDirectory(input));
        }
        settings.validate()?;
        let output = derive_output_dir(&input)?;
        Ok(Self {
            input,
            output,
            settings,
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
