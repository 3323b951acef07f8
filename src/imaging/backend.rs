//! Codec seams and the imaging error taxonomy.
//!
//! The two codecs that are either fragile or optional sit behind traits so
//! the rest of the pipeline never names a concrete library:
//!
//! - [`RawDecoder`]: sensor file in, developed 8-bit RGB raster out.
//! - [`HeifCodec`]: container decode, plus an ordered list of
//!   [`HeifEncodeStrategy`] values tried in sequence on encode.
//!
//! Production implementations live in [`raw`](super::raw) and
//! [`heif`](super::heif); `tests::Mock*` stand in for them in unit tests.

use super::params::{Quality, RawPolicy};
use super::raster::Raster;
use image::{DynamicImage, RgbImage};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Optional capability a code path may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    HeifDecode,
    HeifEncode,
    ExifTags,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeifDecode => f.write_str("HEIF decoding"),
            Self::HeifEncode => f.write_str("HEIF encoding"),
            Self::ExifTags => f.write_str("EXIF tag codec"),
        }
    }
}

/// One failed HEIF encode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub reason: String,
}

fn format_attempts(attempts: &[StrategyFailure]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.strategy, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("Unsupported input format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("{capability} unavailable: {reason}")]
    CapabilityUnavailable {
        capability: Capability,
        reason: String,
    },
    #[error("Failed to decode {}: {cause}", path.display())]
    DecodeFailure { path: PathBuf, cause: String },
    #[error("Encode failed: {0}")]
    EncodeFailure(String),
    #[error(
        "HEIF encode failed with every strategy ({}); the installed libheif can \
         likely decode but was built without a usable encoder (x265/aom)",
        format_attempts(.attempts)
    )]
    HeifEncoderMissing { attempts: Vec<StrategyFailure> },
    #[error("EXIF tag codec unavailable: {0}")]
    MetadataCapabilityUnavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised inside a codec implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CodecError(pub String);

impl From<image::ImageError> for CodecError {
    fn from(e: image::ImageError) -> Self {
        Self(e.to_string())
    }
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

/// Develops a RAW sensor file into an upright, alpha-free RGB raster.
pub trait RawDecoder: Sync {
    fn decode(&self, path: &Path, policy: &RawPolicy) -> Result<DynamicImage, CodecError>;
}

/// A single named way of producing a HEIF container.
pub trait HeifEncodeStrategy: Sync {
    fn name(&self) -> &'static str;

    fn encode(&self, image: &RgbImage, quality: Quality) -> Result<Vec<u8>, CodecError>;
}

/// HEIF container codec.
///
/// `decode` must return pixels with the container's rotation/mirror
/// transforms already applied.
pub trait HeifCodec: Sync {
    fn decode(&self, path: &Path) -> Result<Raster, CodecError>;

    /// Encode strategies, in the order they should be attempted.
    fn encode_strategies(&self) -> &[Box<dyn HeifEncodeStrategy>];
}
