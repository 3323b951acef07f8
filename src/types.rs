//! Shared types used across discovery, the job runner, and the CLI.
//!
//! Input formats are recognised purely by extension (case-insensitive).
//! Anything outside [`SUPPORTED_EXTENSIONS`] is never enumerated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Extensions enumerated by discovery, lower-case, without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "heic", "heif", "hif", "hifc", "arw"];

/// Format family of an input file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Jpeg,
    Png,
    /// HEIC, HEIF and Sony's HIF/HIFC variants.
    Heif,
    /// Sony ARW.
    Raw,
}

impl InputFormat {
    /// Classify a path by extension. `None` means "not an input".
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "heic" | "heif" | "hif" | "hifc" => Some(Self::Heif),
            "arw" => Some(Self::Raw),
            _ => None,
        }
    }
}

/// Target container for re-encoded images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Heif,
    #[value(name = "jpg", alias = "jpeg")]
    #[serde(rename = "jpg", alias = "jpeg")]
    Jpeg,
}

impl OutputFormat {
    /// Extension written for this format, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Heif => "heic",
            Self::Jpeg => "jpg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heif => f.write_str("heif"),
            Self::Jpeg => f.write_str("jpg"),
        }
    }
}

/// Process exit status for both subcommands.
///
/// Fatal configuration problems are reported before any file is touched;
/// per-file failures only ever produce [`ExitStatus::FilesFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    NoInputs,
    InvalidBackground,
    MetadataCodecMissing,
    HeifCodecMissing,
    InvalidConfig,
    ToolMissing,
    FilesFailed,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::NoInputs => 1,
            Self::InvalidBackground => 2,
            Self::MetadataCodecMissing => 3,
            Self::HeifCodecMissing => 4,
            Self::InvalidConfig => 5,
            Self::ToolMissing => 6,
            Self::FilesFailed => 10,
        }
    }
}
