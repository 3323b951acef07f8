//! Format dispatch on the write side.
//!
//! JPEG is always progressive with optimized Huffman tables and 4:2:0
//! chroma subsampling. What metadata it carries follows [`MetadataPolicy`]:
//!
//! | Policy | ICC | EXIF |
//! |---|---|---|
//! | `strip-all` | no | no |
//! | `keep-orientation-only` | yes | `Orientation = 1` if the source had the tag |
//! | `keep-all` | yes | source block, orientation normalised |
//!
//! HEIF output is RGB only and never carries metadata. Both paths reject an
//! empty result.

use super::backend::{HeifCodec, ImagingError, StrategyFailure};
use super::capability::Capabilities;
use super::exif::{self, APP1_EXIF_HEADER};
use super::params::{EncodeSpec, MetadataPolicy};
use super::raster::Raster;
use crate::types::OutputFormat;
use image::DynamicImage;
use image::metadata::Orientation;
use jpeg_encoder::{ColorType, Encoder as JpegEncoder, SamplingFactor};

/// Routes a normalised raster to the encoder for `spec.format`.
pub struct Encoder<'a> {
    capabilities: &'a Capabilities,
    heif: &'a dyn HeifCodec,
}

impl<'a> Encoder<'a> {
    pub fn new(capabilities: &'a Capabilities, heif: &'a dyn HeifCodec) -> Self {
        Self { capabilities, heif }
    }

    pub fn encode(&self, raster: &Raster, spec: &EncodeSpec) -> Result<Vec<u8>, ImagingError> {
        match spec.format {
            OutputFormat::Jpeg => encode_jpeg(raster, spec, self.capabilities),
            OutputFormat::Heif => encode_heif(raster, spec, self.capabilities, self.heif),
        }
    }
}

fn jpeg_err(e: jpeg_encoder::EncodingError) -> ImagingError {
    ImagingError::EncodeFailure(e.to_string())
}

/// The EXIF block JPEG output should carry under `policy`.
fn exif_for(
    raster: &Raster,
    policy: MetadataPolicy,
    capabilities: &Capabilities,
) -> Result<Option<Vec<u8>>, ImagingError> {
    match policy {
        MetadataPolicy::StripAll => Ok(None),
        MetadataPolicy::KeepAll => Ok(raster.exif.clone()),
        MetadataPolicy::KeepOrientationOnly => {
            capabilities.require_exif_tags()?;
            let had_tag = raster
                .exif
                .as_deref()
                .and_then(Orientation::from_exif_chunk)
                .is_some();
            if had_tag {
                exif::orientation_only_block().map(Some)
            } else {
                Ok(None)
            }
        }
    }
}

pub fn encode_jpeg(
    raster: &Raster,
    spec: &EncodeSpec,
    capabilities: &Capabilities,
) -> Result<Vec<u8>, ImagingError> {
    let (width, height) = raster.dimensions();
    let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(ImagingError::EncodeFailure(format!(
            "{width}x{height} exceeds the JPEG limit of 65535 pixels per side"
        )));
    };

    let exif_block = exif_for(raster, spec.metadata, capabilities)?;

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new(&mut out, spec.quality.for_jpeg());
    encoder.set_progressive(true);
    encoder.set_optimized_huffman_tables(true);
    encoder.set_sampling_factor(SamplingFactor::R_4_2_0);

    if let Some(block) = exif_block {
        let mut app1 = Vec::with_capacity(APP1_EXIF_HEADER.len() + block.len());
        app1.extend_from_slice(APP1_EXIF_HEADER);
        app1.extend_from_slice(&block);
        encoder.add_app_segment(1, &app1).map_err(jpeg_err)?;
    }
    if let Some(icc) = raster.icc_profile.as_ref().filter(|_| spec.metadata.keeps_icc()) {
        encoder.add_icc_profile(icc).map_err(jpeg_err)?;
    }

    match &raster.image {
        DynamicImage::ImageLuma8(gray) => encoder.encode(gray.as_raw(), w, h, ColorType::Luma),
        DynamicImage::ImageRgb8(rgb) => encoder.encode(rgb.as_raw(), w, h, ColorType::Rgb),
        other => encoder.encode(other.to_rgb8().as_raw(), w, h, ColorType::Rgb),
    }
    .map_err(jpeg_err)?;

    non_empty(out)
}

/// Try each HEIF strategy in order; the first non-empty output wins.
pub fn encode_heif(
    raster: &Raster,
    spec: &EncodeSpec,
    capabilities: &Capabilities,
    codec: &dyn HeifCodec,
) -> Result<Vec<u8>, ImagingError> {
    capabilities.require_heif_encode()?;
    let rgb = raster.image.to_rgb8();

    let mut attempts = Vec::new();
    for strategy in codec.encode_strategies() {
        let reason = match strategy.encode(&rgb, spec.quality) {
            Ok(bytes) if !bytes.is_empty() => {
                tracing::debug!(strategy = strategy.name(), bytes = bytes.len(), "HEIF encoded");
                return Ok(bytes);
            }
            Ok(_) => "produced empty output".to_string(),
            Err(e) => e.0,
        };
        tracing::debug!(strategy = strategy.name(), %reason, "HEIF strategy failed");
        attempts.push(StrategyFailure {
            strategy: strategy.name(),
            reason,
        });
    }
    Err(ImagingError::HeifEncoderMissing { attempts })
}

fn non_empty(bytes: Vec<u8>) -> Result<Vec<u8>, ImagingError> {
    if bytes.is_empty() {
        Err(ImagingError::EncodeFailure("encoder produced empty output".into()))
    } else {
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockHeifCodec, MockStrategy};
    use crate::imaging::capability::Availability;
    use crate::imaging::params::Quality;
    use crate::test_helpers::*;
    use image::GrayImage;

    fn jpeg_spec(metadata: MetadataPolicy) -> EncodeSpec {
        EncodeSpec {
            format: OutputFormat::Jpeg,
            quality: Quality::new(80),
            max_edge: 6000,
            metadata,
        }
    }

    fn raster_with_metadata() -> Raster {
        let mut raster = Raster::new(DynamicImage::ImageRgb8(gradient(64, 48)));
        // orientation already baked
        raster.exif = Some(tiff_with_orientation(Some(1), false));
        raster.icc_profile = Some(b"fake icc profile payload".to_vec());
        raster
    }

    fn write(bytes: &[u8]) -> (TempDir, std::path::PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.jpg");
        std::fs::write(&path, bytes).unwrap();
        (tmp, path)
    }

    // =========================================================================
    // JPEG
    // =========================================================================

    #[test]
    fn jpeg_output_decodes_at_same_size() {
        let bytes = encode_jpeg(
            &raster_with_metadata(),
            &jpeg_spec(MetadataPolicy::KeepAll),
            &Capabilities::all(),
        )
        .unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn strip_all_drops_exif_and_icc() {
        let bytes = encode_jpeg(
            &raster_with_metadata(),
            &jpeg_spec(MetadataPolicy::StripAll),
            &Capabilities::all(),
        )
        .unwrap();
        let (_tmp, path) = write(&bytes);
        assert_eq!(jpeg_exif(&path), None);
        assert_eq!(jpeg_icc(&path), None);
    }

    #[test]
    fn keep_all_preserves_exif_bytes() {
        let raster = raster_with_metadata();
        let bytes = encode_jpeg(&raster, &jpeg_spec(MetadataPolicy::KeepAll), &Capabilities::all())
            .unwrap();
        let (_tmp, path) = write(&bytes);
        assert_eq!(jpeg_exif(&path), raster.exif);
        assert_eq!(jpeg_icc(&path), raster.icc_profile);
    }

    #[cfg(feature = "exif")]
    #[test]
    fn orientation_only_emits_minimal_block() {
        let bytes = encode_jpeg(
            &raster_with_metadata(),
            &jpeg_spec(MetadataPolicy::KeepOrientationOnly),
            &Capabilities::all(),
        )
        .unwrap();
        let (_tmp, path) = write(&bytes);
        let block = jpeg_exif(&path).unwrap();
        assert_eq!(
            Orientation::from_exif_chunk(&block),
            Some(Orientation::NoTransforms)
        );
        assert!(jpeg_icc(&path).is_some(), "ICC kept when not stripping");
    }

    #[test]
    fn orientation_only_without_source_tag_emits_nothing() {
        let mut raster = raster_with_metadata();
        raster.exif = Some(tiff_with_orientation(None, false));
        let bytes = encode_jpeg(
            &raster,
            &jpeg_spec(MetadataPolicy::KeepOrientationOnly),
            &Capabilities::all(),
        )
        .unwrap();
        let (_tmp, path) = write(&bytes);
        assert_eq!(jpeg_exif(&path), None);
    }

    #[test]
    fn orientation_only_requires_tag_codec() {
        let caps = Capabilities {
            exif_tags: Availability::Unavailable("not built".into()),
            ..Capabilities::all()
        };
        let err = encode_jpeg(
            &raster_with_metadata(),
            &jpeg_spec(MetadataPolicy::KeepOrientationOnly),
            &caps,
        )
        .unwrap_err();
        assert!(matches!(err, ImagingError::MetadataCapabilityUnavailable(_)));
    }

    #[test]
    fn grayscale_jpeg_stays_grayscale() {
        let raster = Raster::new(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            16,
            16,
            image::Luma([120]),
        )));
        let bytes = encode_jpeg(&raster, &jpeg_spec(MetadataPolicy::StripAll), &Capabilities::all())
            .unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert!(matches!(img, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn oversized_jpeg_is_encode_failure() {
        let raster = Raster::new(DynamicImage::new_luma8(70_000, 1));
        let err = encode_jpeg(&raster, &jpeg_spec(MetadataPolicy::StripAll), &Capabilities::all())
            .unwrap_err();
        assert!(matches!(err, ImagingError::EncodeFailure(_)));
    }

    // =========================================================================
    // HEIF
    // =========================================================================

    fn heif_spec() -> EncodeSpec {
        EncodeSpec {
            format: OutputFormat::Heif,
            ..EncodeSpec::default()
        }
    }

    #[test]
    fn first_working_strategy_wins() {
        let codec = MockHeifCodec::encoding_with(vec![
            MockStrategy::failing("hevc", "no encoder plugin"),
            MockStrategy::ok("hevc-planar", b"heic-bytes"),
            MockStrategy::ok("av1", b"never reached"),
        ]);
        let bytes = Encoder::new(&Capabilities::all(), &codec)
            .encode(&raster_with_metadata(), &heif_spec())
            .unwrap();
        assert_eq!(bytes, b"heic-bytes");
    }

    #[test]
    fn empty_output_counts_as_failure() {
        let codec = MockHeifCodec::encoding_with(vec![
            MockStrategy::ok("hevc", b""),
            MockStrategy::ok("av1", b"ok"),
        ]);
        let bytes = encode_heif(
            &raster_with_metadata(),
            &heif_spec(),
            &Capabilities::all(),
            &codec,
        )
        .unwrap();
        assert_eq!(bytes, b"ok");
    }

    #[test]
    fn all_strategies_failing_lists_every_reason() {
        let codec = MockHeifCodec::encoding_with(vec![
            MockStrategy::failing("hevc", "x265 missing"),
            MockStrategy::ok("hevc-planar", b""),
            MockStrategy::failing("av1", "aom missing"),
        ]);
        let err = encode_heif(
            &raster_with_metadata(),
            &heif_spec(),
            &Capabilities::all(),
            &codec,
        )
        .unwrap_err();
        match err {
            ImagingError::HeifEncoderMissing { attempts } => {
                let names: Vec<_> = attempts.iter().map(|a| a.strategy).collect();
                assert_eq!(names, ["hevc", "hevc-planar", "av1"]);
                assert_eq!(attempts[0].reason, "x265 missing");
                assert_eq!(attempts[1].reason, "produced empty output");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn heif_requires_encode_capability() {
        let codec = MockHeifCodec::encoding_with(vec![MockStrategy::ok("hevc", b"x")]);
        let err = encode_heif(
            &raster_with_metadata(),
            &heif_spec(),
            &Capabilities::without_heif("libheif not found"),
            &codec,
        )
        .unwrap_err();
        assert!(matches!(err, ImagingError::CapabilityUnavailable { .. }));
    }
}
