//! Format dispatch on the read side.
//!
//! | Input | Path | Orientation |
//! |---|---|---|
//! | JPEG, PNG | `image` decoder, ICC + EXIF kept | baked from the EXIF tag |
//! | HEIF family | [`HeifCodec`], gated on capability | applied by the codec |
//! | ARW | [`RawDecoder`] with the fixed [`RawPolicy`] | already upright |
//!
//! Every path ends in [`transform::normalize`], so callers always get an
//! upright, opaque 8-bit RGB or grayscale [`Raster`].

use super::backend::{CodecError, HeifCodec, ImagingError, RawDecoder};
use super::capability::Capabilities;
use super::exif;
use super::params::RawPolicy;
use super::raster::Raster;
use super::transform::{self, OrientationState};
use crate::config::BackgroundColor;
use crate::types::InputFormat;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::path::Path;

/// Routes a path to the right codec and normalises the result.
pub struct Decoder<'a> {
    capabilities: &'a Capabilities,
    raw: &'a dyn RawDecoder,
    heif: &'a dyn HeifCodec,
    raw_policy: RawPolicy,
    background: BackgroundColor,
}

impl<'a> Decoder<'a> {
    pub fn new(
        capabilities: &'a Capabilities,
        raw: &'a dyn RawDecoder,
        heif: &'a dyn HeifCodec,
        background: BackgroundColor,
    ) -> Self {
        Self {
            capabilities,
            raw,
            heif,
            raw_policy: RawPolicy::default(),
            background,
        }
    }

    pub fn decode(&self, path: &Path) -> Result<Raster, ImagingError> {
        let format = InputFormat::from_path(path)
            .ok_or_else(|| ImagingError::UnsupportedFormat(path.to_path_buf()))?;
        let failure = |cause: CodecError| ImagingError::DecodeFailure {
            path: path.to_path_buf(),
            cause: cause.0,
        };

        let (raster, orientation) = match format {
            InputFormat::Raw => {
                let image = self.raw.decode(path, &self.raw_policy).map_err(failure)?;
                (Raster::new(image), OrientationState::Applied)
            }
            InputFormat::Heif => {
                self.capabilities.require_heif_decode()?;
                (self.heif.decode(path).map_err(failure)?, OrientationState::Applied)
            }
            InputFormat::Jpeg | InputFormat::Png => {
                (decode_raster(path).map_err(failure)?, OrientationState::FromTag)
            }
        };
        tracing::debug!(
            path = %path.display(),
            ?format,
            dimensions = ?raster.dimensions(),
            "decoded"
        );
        Ok(transform::normalize(raster, orientation, self.background))
    }
}

/// Decode a JPEG or PNG with its ICC profile and EXIF block.
///
/// The format is sniffed from content, so a mislabelled file still decodes.
pub fn decode_raster(path: &Path) -> Result<Raster, CodecError> {
    let mut reader = ImageReader::open(path)?.with_guessed_format()?;
    reader.no_limits();
    let mut decoder = reader.into_decoder()?;
    let icc_profile = decoder.icc_profile()?;
    let exif = decoder
        .exif_metadata()?
        .map(|block| exif::strip_app1_header(&block).to_vec());
    let image = DynamicImage::from_decoder(decoder)?;
    Ok(Raster {
        image,
        icc_profile,
        exif,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockHeifCodec, MockRawDecoder};
    use crate::imaging::raster::ColorMode;
    use crate::test_helpers::*;
    use image::metadata::Orientation;
    use image::{Rgba, RgbaImage};

    fn decode_with(
        caps: &Capabilities,
        raw: &MockRawDecoder,
        heif: &MockHeifCodec,
        path: &Path,
    ) -> Result<Raster, ImagingError> {
        Decoder::new(caps, raw, heif, BackgroundColor::WHITE).decode(path)
    }

    fn no_heif() -> MockHeifCodec {
        MockHeifCodec::encoding_with(Vec::new())
    }

    #[test]
    fn jpeg_decodes_to_rgb() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        write_jpeg(&path, 64, 48);

        let raw = MockRawDecoder::failing("unused");
        let raster = decode_with(&Capabilities::all(), &raw, &no_heif(), &path).unwrap();
        assert_eq!(raster.dimensions(), (64, 48));
        assert_eq!(raster.color_mode(), Some(ColorMode::Rgb));
        assert!(raw.calls().is_empty());
    }

    #[test]
    fn jpeg_orientation_is_baked_and_tag_normalised() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rotated.jpg");
        write_jpeg_with_exif(&path, &gradient(40, 20), &tiff_with_orientation(Some(6), false));

        let raw = MockRawDecoder::failing("unused");
        let raster = decode_with(&Capabilities::all(), &raw, &no_heif(), &path).unwrap();
        assert_eq!(raster.dimensions(), (20, 40));
        let exif_block = raster.exif.as_ref().unwrap();
        assert_eq!(
            Orientation::from_exif_chunk(exif_block),
            Some(Orientation::NoTransforms)
        );
    }

    #[test]
    fn palette_png_transparency_flattens_onto_background() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("indexed.png");
        // index 0: opaque red, index 1: fully transparent green
        write_png_indexed(&path, &[255, 0, 0, 0, 255, 0], &[255, 0], &[0, 1], 2, 1);

        let raw = MockRawDecoder::failing("unused");
        let bg = BackgroundColor::new(10, 20, 30);
        let raster = Decoder::new(&Capabilities::all(), &raw, &no_heif(), bg)
            .decode(&path)
            .unwrap();
        assert_eq!(raster.color_mode(), Some(ColorMode::Rgb));
        let rgb = raster.image.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [10, 20, 30]);
    }

    #[test]
    fn cmyk_jpeg_decodes_to_rgb() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("print.jpg");
        write_jpeg_cmyk(&path, 24, 16);

        let raw = MockRawDecoder::failing("unused");
        let raster = decode_with(&Capabilities::all(), &raw, &no_heif(), &path).unwrap();
        assert_eq!(raster.dimensions(), (24, 16));
        assert_eq!(raster.color_mode(), Some(ColorMode::Rgb));
    }

    #[test]
    fn png_alpha_is_composited() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("clear.png");
        write_png_rgba(&path, &RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 0])));

        let raw = MockRawDecoder::failing("unused");
        let raster = Decoder::new(
            &Capabilities::all(),
            &raw,
            &no_heif(),
            BackgroundColor::new(1, 2, 3),
        )
        .decode(&path)
        .unwrap();
        assert_eq!(raster.color_mode(), Some(ColorMode::Rgb));
        assert!(raster.image.to_rgb8().pixels().all(|p| p.0 == [1, 2, 3]));
    }

    #[test]
    fn raw_goes_through_raw_decoder() {
        let raw = MockRawDecoder::returning(DynamicImage::new_rgb8(30, 20));
        let path = Path::new("/photos/DSC0001.ARW");
        let raster = decode_with(&Capabilities::all(), &raw, &no_heif(), path).unwrap();
        assert_eq!(raster.dimensions(), (30, 20));
        assert_eq!(raw.calls(), vec![path.to_path_buf()]);
    }

    #[test]
    fn raw_failure_is_decode_failure_with_path() {
        let raw = MockRawDecoder::failing("bad sensor data");
        let path = Path::new("/photos/corrupt.arw");
        let err = decode_with(&Capabilities::all(), &raw, &no_heif(), path).unwrap_err();
        match err {
            ImagingError::DecodeFailure { path: p, cause } => {
                assert_eq!(p, path);
                assert_eq!(cause, "bad sensor data");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn heif_requires_capability() {
        let raw = MockRawDecoder::failing("unused");
        let heif = MockHeifCodec::new(Ok(Raster::new(DynamicImage::new_rgb8(2, 2))), Vec::new());
        let err = decode_with(
            &Capabilities::without_heif("no libheif"),
            &raw,
            &heif,
            Path::new("x.HEIC"),
        )
        .unwrap_err();
        assert!(matches!(err, ImagingError::CapabilityUnavailable { .. }));
    }

    #[test]
    fn heif_alpha_is_composited_and_tag_cleared() {
        let mut decoded = Raster::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            3,
            2,
            Rgba([0, 0, 0, 0]),
        )));
        decoded.exif = Some(tiff_with_orientation(Some(6), true));
        let heif = MockHeifCodec::new(Ok(decoded), Vec::new());
        let raw = MockRawDecoder::failing("unused");

        let raster = decode_with(&Capabilities::all(), &raw, &heif, Path::new("x.hif")).unwrap();
        // codec already applied the transform: dimensions unchanged
        assert_eq!(raster.dimensions(), (3, 2));
        assert!(raster.image.to_rgb8().pixels().all(|p| p.0 == [255, 255, 255]));
        assert_eq!(
            Orientation::from_exif_chunk(raster.exif.as_ref().unwrap()),
            Some(Orientation::NoTransforms)
        );
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let raw = MockRawDecoder::failing("unused");
        let err = decode_with(&Capabilities::all(), &raw, &no_heif(), Path::new("a.gif"))
            .unwrap_err();
        assert!(matches!(err, ImagingError::UnsupportedFormat(_)));
    }

    #[test]
    fn corrupt_jpeg_is_decode_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        std::fs::write(&path, b"\xFF\xD8\xFF garbage").unwrap();
        let raw = MockRawDecoder::failing("unused");
        let err = decode_with(&Capabilities::all(), &raw, &no_heif(), &path).unwrap_err();
        assert!(matches!(err, ImagingError::DecodeFailure { .. }));
    }
}
