//! Parameter types for decode and encode operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are built
//! once from the job configuration and passed by value to every worker.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`MetadataPolicy`]: What EXIF/ICC survives into JPEG output.
//! - [`EncodeSpec`]: Target format, quality, long-edge bound, metadata policy.
//! - [`RawPolicy`]: Fixed development settings handed to the RAW decoder.

use crate::types::OutputFormat;

/// Highest quality the JPEG encoder is driven at. Values above this grow the
/// file without visible gain.
pub const JPEG_MAX_QUALITY: u8 = 95;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Quality as handed to the JPEG encoder, clamped to 1–95.
    pub fn for_jpeg(self) -> u8 {
        self.0.min(JPEG_MAX_QUALITY)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Metadata carried into JPEG output. HEIF output is always metadata-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataPolicy {
    /// No EXIF block and no ICC profile.
    StripAll,
    /// ICC profile plus a minimal EXIF block holding only the orientation tag.
    KeepOrientationOnly,
    /// ICC profile plus the source EXIF blob (orientation normalised).
    #[default]
    KeepAll,
}

impl MetadataPolicy {
    /// Resolve the two CLI flags. `strip` wins over `keep_orientation_only`.
    pub fn from_flags(strip: bool, keep_orientation_only: bool) -> Self {
        match (strip, keep_orientation_only) {
            (true, _) => Self::StripAll,
            (false, true) => Self::KeepOrientationOnly,
            (false, false) => Self::KeepAll,
        }
    }

    pub fn keeps_icc(self) -> bool {
        !matches!(self, Self::StripAll)
    }
}

/// Everything an encoder needs to know about the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSpec {
    pub format: OutputFormat,
    pub quality: Quality,
    /// Upper bound on the long edge, in pixels.
    pub max_edge: u32,
    pub metadata: MetadataPolicy,
}

impl Default for EncodeSpec {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: Quality::default(),
            max_edge: 6000,
            metadata: MetadataPolicy::default(),
        }
    }
}

/// Development settings for RAW files.
///
/// `gamma` is `(power, toe_slope)` in the dcraw convention: `(2.222, 4.5)`
/// is the BT.709 transfer curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPolicy {
    pub auto_white_balance: bool,
    pub auto_brightness: bool,
    pub output_bits: u8,
    pub gamma: (f32, f32),
}

impl Default for RawPolicy {
    fn default() -> Self {
        Self {
            auto_white_balance: true,
            auto_brightness: false,
            output_bits: 8,
            gamma: (2.222, 4.5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_80() {
        assert_eq!(Quality::default().value(), 80);
    }

    #[test]
    fn jpeg_quality_caps_at_95() {
        assert_eq!(Quality::new(100).for_jpeg(), 95);
        assert_eq!(Quality::new(95).for_jpeg(), 95);
        assert_eq!(Quality::new(80).for_jpeg(), 80);
        assert_eq!(Quality::new(0).for_jpeg(), 1);
    }

    #[test]
    fn strip_wins_over_orientation_only() {
        assert_eq!(MetadataPolicy::from_flags(true, true), MetadataPolicy::StripAll);
        assert_eq!(MetadataPolicy::from_flags(true, false), MetadataPolicy::StripAll);
        assert_eq!(
            MetadataPolicy::from_flags(false, true),
            MetadataPolicy::KeepOrientationOnly
        );
        assert_eq!(MetadataPolicy::from_flags(false, false), MetadataPolicy::KeepAll);
    }

    #[test]
    fn icc_survives_unless_stripping() {
        assert!(!MetadataPolicy::StripAll.keeps_icc());
        assert!(MetadataPolicy::KeepOrientationOnly.keeps_icc());
        assert!(MetadataPolicy::KeepAll.keeps_icc());
    }

    #[test]
    fn raw_policy_defaults_match_fixed_development() {
        let p = RawPolicy::default();
        assert!(p.auto_white_balance);
        assert!(!p.auto_brightness);
        assert_eq!(p.output_bits, 8);
        assert_eq!(p.gamma, (2.222, 4.5));
    }
}
