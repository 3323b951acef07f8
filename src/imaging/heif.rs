//! HEIF container codec.
//!
//! With the `heif` feature this wraps system libheif through `libheif-rs`.
//! Without it, [`probe`] reports both directions unavailable and
//! [`default_codec`] returns a codec that refuses every call.
//!
//! Encoding is attempted through an ordered list of named strategies:
//!
//! | Strategy | Compression | Image layout |
//! |---|---|---|
//! | `hevc` | HEVC | interleaved RGB |
//! | `hevc-planar` | HEVC | planar RGB 4:4:4 |
//! | `av1` | AV1 | interleaved RGB |
//!
//! Many libheif builds can decode HEVC but ship without an encoder, so a
//! missing encoder is reported separately from a missing library.

use super::backend::HeifCodec;
use super::capability::Availability;

#[cfg(feature = "heif")]
pub use libheif_impl::{LibheifCodec, probe};

#[cfg(not(feature = "heif"))]
pub use unavailable::{UnavailableHeif, probe};

/// The codec this build uses.
pub fn default_codec() -> Box<dyn HeifCodec> {
    #[cfg(feature = "heif")]
    {
        Box::new(LibheifCodec::new())
    }
    #[cfg(not(feature = "heif"))]
    {
        Box::new(UnavailableHeif::new())
    }
}

/// Split a HEIF `Exif` item into the TIFF payload.
///
/// The item starts with a big-endian offset from the end of the offset
/// field to the TIFF header.
pub fn tiff_from_exif_item(item: &[u8]) -> Option<&[u8]> {
    let offset = u32::from_be_bytes(item.get(0..4)?.try_into().ok()?) as usize;
    let tiff = item.get(4usize.checked_add(offset)?..)?;
    (!tiff.is_empty()).then_some(tiff)
}

#[cfg(not(feature = "heif"))]
mod unavailable {
    use super::*;
    use crate::imaging::backend::{CodecError, HeifEncodeStrategy};
    use crate::imaging::raster::Raster;
    use std::path::Path;

    const REASON: &str = "built without HEIF support (rebuild with --features heif)";

    pub fn probe() -> (Availability, Availability) {
        (
            Availability::Unavailable(REASON.into()),
            Availability::Unavailable(REASON.into()),
        )
    }

    /// Stand-in used when libheif is not compiled in.
    pub struct UnavailableHeif {
        strategies: Vec<Box<dyn HeifEncodeStrategy>>,
    }

    impl UnavailableHeif {
        pub fn new() -> Self {
            Self {
                strategies: Vec::new(),
            }
        }
    }

    impl Default for UnavailableHeif {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HeifCodec for UnavailableHeif {
        fn decode(&self, _path: &Path) -> Result<Raster, CodecError> {
            Err(CodecError(REASON.into()))
        }

        fn encode_strategies(&self) -> &[Box<dyn HeifEncodeStrategy>] {
            &self.strategies
        }
    }
}

#[cfg(feature = "heif")]
mod libheif_impl {
    use super::*;
    use crate::imaging::backend::{CodecError, HeifEncodeStrategy};
    use crate::imaging::params::Quality;
    use crate::imaging::raster::Raster;
    use image::{DynamicImage, ImageBuffer, Rgb, RgbImage, Rgba};
    use libheif_rs::{
        Channel, ColorSpace, CompressionFormat, EncoderQuality, HeifContext, HeifError, Image,
        LibHeif, RgbChroma,
    };
    use std::path::Path;

    impl From<HeifError> for CodecError {
        fn from(e: HeifError) -> Self {
            Self(e.to_string())
        }
    }

    pub fn probe() -> (Availability, Availability) {
        let lib = LibHeif::new();
        let encode = [CompressionFormat::Hevc, CompressionFormat::Av1]
            .into_iter()
            .any(|format| lib.encoder_for_format(format).is_ok());
        let encode = if encode {
            Availability::Available
        } else {
            Availability::Unavailable(
                "libheif is installed but has no HEVC or AV1 encoder (decode only)".into(),
            )
        };
        (Availability::Available, encode)
    }

    pub struct LibheifCodec {
        strategies: Vec<Box<dyn HeifEncodeStrategy>>,
    }

    impl LibheifCodec {
        pub fn new() -> Self {
            Self {
                strategies: vec![
                    Box::new(Interleaved {
                        name: "hevc",
                        format: CompressionFormat::Hevc,
                    }),
                    Box::new(PlanarHevc),
                    Box::new(Interleaved {
                        name: "av1",
                        format: CompressionFormat::Av1,
                    }),
                ],
            }
        }
    }

    impl Default for LibheifCodec {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HeifCodec for LibheifCodec {
        fn decode(&self, path: &Path) -> Result<Raster, CodecError> {
            let lib = LibHeif::new();
            let name = path
                .to_str()
                .ok_or_else(|| CodecError("path is not valid UTF-8".into()))?;
            let ctx = HeifContext::read_from_file(name)?;
            let handle = ctx.primary_image_handle()?;
            let has_alpha = handle.has_alpha_channel();
            let chroma = if has_alpha {
                RgbChroma::Rgba
            } else {
                RgbChroma::Rgb
            };
            // libheif applies irot/imir transforms during decode
            let decoded = lib.decode(&handle, ColorSpace::Rgb(chroma), None)?;
            let planes = decoded.planes();
            let plane = planes
                .interleaved
                .ok_or_else(|| CodecError("decoded image has no interleaved plane".into()))?;

            let channels = if has_alpha { 4 } else { 3 };
            let (width, height) = (plane.width, plane.height);
            let row_len = width as usize * channels;
            let mut pixels = Vec::with_capacity(row_len * height as usize);
            for row in plane.data.chunks(plane.stride).take(height as usize) {
                pixels.extend_from_slice(&row[..row_len]);
            }

            let image = if has_alpha {
                ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, pixels)
                    .map(DynamicImage::ImageRgba8)
            } else {
                ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, pixels)
                    .map(DynamicImage::ImageRgb8)
            }
            .ok_or_else(|| CodecError("decoded plane has the wrong size".into()))?;

            let exif = handle
                .metadata_block_ids(b"Exif")
                .into_iter()
                .find_map(|id| handle.metadata(id).ok())
                .and_then(|item| tiff_from_exif_item(&item).map(<[u8]>::to_vec));
            let icc_profile = handle.color_profile_raw().map(|p| p.data);

            Ok(Raster {
                image,
                icc_profile,
                exif,
            })
        }

        fn encode_strategies(&self) -> &[Box<dyn HeifEncodeStrategy>] {
            &self.strategies
        }
    }

    fn encode_with(
        image: &Image,
        format: CompressionFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, CodecError> {
        let lib = LibHeif::new();
        let mut ctx = HeifContext::new()?;
        let mut encoder = lib.encoder_for_format(format)?;
        encoder.set_quality(EncoderQuality::Lossy(quality.value()))?;
        ctx.encode_image(image, &mut encoder, None)?;
        Ok(ctx.write_to_bytes()?)
    }

    /// Interleaved RGB image, encoder chosen by compression format.
    struct Interleaved {
        name: &'static str,
        format: CompressionFormat,
    }

    impl HeifEncodeStrategy for Interleaved {
        fn name(&self) -> &'static str {
            self.name
        }

        fn encode(&self, rgb: &RgbImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
            let (width, height) = rgb.dimensions();
            let mut image = Image::new(width, height, ColorSpace::Rgb(RgbChroma::Rgb))?;
            image.create_plane(Channel::Interleaved, width, height, 8)?;
            {
                let planes = image.planes_mut();
                let mut plane = planes
                    .interleaved
                    .ok_or_else(|| CodecError("no interleaved plane".into()))?;
                let row_len = width as usize * 3;
                for (dst, src) in plane
                    .data
                    .chunks_mut(plane.stride)
                    .zip(rgb.as_raw().chunks(row_len))
                {
                    dst[..row_len].copy_from_slice(src);
                }
            }
            encode_with(&image, self.format, quality)
        }
    }

    /// Planar 4:4:4 RGB image fed to the HEVC encoder.
    struct PlanarHevc;

    impl HeifEncodeStrategy for PlanarHevc {
        fn name(&self) -> &'static str {
            "hevc-planar"
        }

        fn encode(&self, rgb: &RgbImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
            let (width, height) = rgb.dimensions();
            let mut image = Image::new(width, height, ColorSpace::Rgb(RgbChroma::C444))?;
            for channel in [Channel::R, Channel::G, Channel::B] {
                image.create_plane(channel, width, height, 8)?;
            }
            {
                let planes = image.planes_mut();
                let (Some(r), Some(g), Some(b)) = (planes.r, planes.g, planes.b) else {
                    return Err(CodecError("missing R/G/B plane".into()));
                };
                for (i, mut plane) in [r, g, b].into_iter().enumerate() {
                    let stride = plane.stride;
                    let rows = plane.data.chunks_mut(stride).take(height as usize);
                    for (y, dst) in rows.enumerate() {
                        for x in 0..width {
                            dst[x as usize] = rgb.get_pixel(x, y as u32).0[i];
                        }
                    }
                }
            }
            encode_with(&image, CompressionFormat::Hevc, quality)
        }
    }
}
