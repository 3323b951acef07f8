//! Pure raster operations applied between decode and encode.
//!
//! | Step | Effect |
//! |---|---|
//! | [`bake_orientation`] | rotate/flip pixels per the EXIF tag, then set the tag to 1 |
//! | [`normalize_mode`] | composite alpha over the background, reduce to 8-bit RGB or gray |
//! | [`downscale`] | Lanczos3 resize so the long edge fits `max_edge` |
//!
//! After [`normalize`] a [`Raster`] is upright, opaque, and 8-bit RGB or
//! grayscale.

use super::calculations::{calculate_downscale_dimensions, composite_channel};
use super::raster::Raster;
use crate::config::BackgroundColor;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, Rgb, RgbImage};

/// Whether the decoder already turned the pixels upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationState {
    /// Pixels are as stored; the EXIF tag (if any) still has to be applied.
    FromTag,
    /// The codec applied the container's transforms during decode.
    Applied,
}

/// Bake the EXIF orientation into the pixels and normalise the tag.
///
/// A raster without EXIF, without a valid orientation tag, or with tag 1
/// keeps its pixels, so baking an already-baked raster is a no-op.
pub fn bake_orientation(raster: &mut Raster) {
    if let Some(orientation) = clear_orientation_tag(raster) {
        raster.image.apply_orientation(orientation);
    }
}

/// Rewrite the EXIF orientation tag to 1 without touching pixels.
///
/// Returns the orientation the tag held. A tag outside 1-8 is neither
/// applied nor rewritten.
pub fn clear_orientation_tag(raster: &mut Raster) -> Option<Orientation> {
    raster
        .exif
        .as_mut()
        .and_then(|block| Orientation::remove_from_exif_chunk(block))
}

/// Composite any alpha channel over `background`, producing opaque RGB.
pub fn composite_alpha(image: &DynamicImage, background: BackgroundColor) -> RgbImage {
    let rgba = image.to_rgba8();
    let [br, bg, bb] = background.channels();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        Rgb([
            composite_channel(r, br, a),
            composite_channel(g, bg, a),
            composite_channel(b, bb, a),
        ])
    })
}

/// Reduce any decoded mode to opaque 8-bit RGB or grayscale.
///
/// Grayscale stays grayscale; everything with alpha is composited; all
/// other modes convert straight to RGB.
pub fn normalize_mode(image: DynamicImage, background: BackgroundColor) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => image,
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
        _ if image.color().has_alpha() => {
            DynamicImage::ImageRgb8(composite_alpha(&image, background))
        }
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// Resize so the long edge is at most `max_edge`. No-op when it already fits.
pub fn downscale(mut raster: Raster, max_edge: u32) -> Raster {
    if let Some((width, height)) = calculate_downscale_dimensions(raster.dimensions(), max_edge) {
        tracing::debug!(
            from = ?raster.dimensions(),
            to = ?(width, height),
            "downscaling"
        );
        raster.image = raster.image.resize_exact(width, height, FilterType::Lanczos3);
    }
    raster
}

/// Orientation and mode normalisation, in that order.
pub fn normalize(
    mut raster: Raster,
    orientation: OrientationState,
    background: BackgroundColor,
) -> Raster {
    match orientation {
        OrientationState::FromTag => bake_orientation(&mut raster),
        OrientationState::Applied => {
            clear_orientation_tag(&mut raster);
        }
    }
    raster.image = normalize_mode(raster.image, background);
    raster
}
