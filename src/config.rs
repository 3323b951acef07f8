//! Job configuration.
//!
//! A [`JobConfig`] is built once, before any worker starts, from three
//! layers (later wins):
//!
//! 1. stock defaults
//! 2. an optional TOML file passed with `--config`
//! 3. command-line flags
//!
//! ## Config File
//!
//! Keys match the long CLI flags in snake_case. Every key is optional:
//!
//! ```toml
//! out_format = "heif"           # "heif" or "jpg"
//! max_edge = 6000               # long-edge bound in pixels
//! quality = 80                  # 1-100 (JPEG is capped at 95)
//! strip = false                 # JPEG: drop EXIF and ICC
//! keep_orientation_only = false # JPEG: minimal EXIF, needs the EXIF tag codec
//! bg = "white"                  # "white", "black" or "R,G,B"
//! workers = 8                   # omit for one per CPU
//! overwrite = false
//! flat = false                  # write every output directly into the output dir
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{EncodeSpec, MetadataPolicy, Quality};
use crate::types::OutputFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Invalid background color {0:?}: expected white, black, or R,G,B with 0-255 components")]
    InvalidBackground(String),
}

/// Opaque color used behind transparent pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundColor {
    r: u8,
    g: u8,
    b: u8,
}

impl BackgroundColor {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn channels(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Parse `white`, `black`, or `R,G,B`.
    ///
    /// Names are case-insensitive and whitespace around components is
    /// ignored. Anything else, including the wrong number of components or
    /// a component above 255, is rejected.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidBackground(s.to_string());
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "white" => return Ok(Self::WHITE),
            "black" => return Ok(Self::BLACK),
            _ => {}
        }

        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        let [r, g, b] = parts.as_slice() else {
            return Err(invalid());
        };
        let channel = |p: &str| p.parse::<u8>().map_err(|_| invalid());
        Ok(Self::new(channel(r)?, channel(g)?, channel(b)?))
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl FromStr for BackgroundColor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

/// Settings for one `shrink` run.
///
/// Once built it is never mutated; workers read it concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    /// Target container.
    pub out_format: OutputFormat,
    /// Upper bound on the long edge, in pixels.
    pub max_edge: u32,
    /// Lossy quality before clamping.
    pub quality: u32,
    /// JPEG only: no EXIF, no ICC.
    pub strip: bool,
    /// JPEG only: minimal EXIF with just the orientation tag.
    pub keep_orientation_only: bool,
    /// Background for transparent pixels, unparsed.
    pub bg: String,
    /// Worker count. `None` means one per available CPU.
    pub workers: Option<usize>,
    /// Re-encode even when the destination exists.
    pub overwrite: bool,
    /// Drop input subdirectories from output paths.
    pub flat: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            out_format: OutputFormat::Heif,
            max_edge: 6000,
            quality: 80,
            strip: false,
            keep_orientation_only: false,
            bg: "white".to_string(),
            workers: None,
            overwrite: false,
            flat: false,
        }
    }
}

impl JobConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_edge == 0 {
            return Err(ConfigError::Validation("max_edge must be at least 1".into()));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Validation("workers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn background(&self) -> Result<BackgroundColor, ConfigError> {
        BackgroundColor::parse(&self.bg)
    }

    pub fn metadata_policy(&self) -> MetadataPolicy {
        MetadataPolicy::from_flags(self.strip, self.keep_orientation_only)
    }

    pub fn encode_spec(&self) -> EncodeSpec {
        EncodeSpec {
            format: self.out_format,
            quality: Quality::new(self.quality),
            max_edge: self.max_edge,
            metadata: self.metadata_policy(),
        }
    }

    /// Whether this job needs the EXIF tag codec.
    pub fn needs_exif_tags(&self) -> bool {
        self.out_format == OutputFormat::Jpeg
            && self.metadata_policy() == MetadataPolicy::KeepOrientationOnly
    }
}

/// Resolve the effective worker count.
///
/// - `None` → one per available core
/// - `Some(n)` → exactly `n`
pub fn effective_workers(config: &JobConfig) -> usize {
    config.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

/// Flag values given on the command line. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOverrides {
    pub out_format: Option<OutputFormat>,
    pub max_edge: Option<u32>,
    pub quality: Option<u32>,
    pub strip: bool,
    pub keep_orientation_only: bool,
    pub bg: Option<String>,
    pub workers: Option<usize>,
    pub overwrite: bool,
    pub flat: bool,
}

impl JobOverrides {
    /// Apply on top of `config`. Boolean flags can only switch a setting on.
    pub fn apply(self, mut config: JobConfig) -> JobConfig {
        if let Some(v) = self.out_format {
            config.out_format = v;
        }
        if let Some(v) = self.max_edge {
            config.max_edge = v;
        }
        if let Some(v) = self.quality {
            config.quality = v;
        }
        if let Some(v) = self.bg {
            config.bg = v;
        }
        if let Some(v) = self.workers {
            config.workers = Some(v);
        }
        config.strip |= self.strip;
        config.keep_orientation_only |= self.keep_orientation_only;
        config.overwrite |= self.overwrite;
        config.flat |= self.flat;
        config
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(JobConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<JobConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: JobConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Stock defaults, overlaid with `path` when given, validated.
pub fn load_config(path: Option<&Path>) -> Result<JobConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = path.map(load_raw_config).transpose()?;
    resolve_config(base, overlay)
}
