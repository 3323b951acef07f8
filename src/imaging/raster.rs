//! The canonical in-memory decoded image.

use image::DynamicImage;

/// Color layout of a [`Raster`] once it has been normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Rgb,
    Grayscale,
}

/// A decoded image plus the metadata that travels with it.
///
/// Owned by exactly one worker. After [`transform::normalize`](super::transform::normalize)
/// the pixels are 8-bit RGB or grayscale, opaque, and upright; `exif` (if
/// any) has its orientation tag rewritten to "normal".
#[derive(Debug, Clone)]
pub struct Raster {
    pub image: DynamicImage,
    /// Embedded ICC profile, passed through untouched.
    pub icc_profile: Option<Vec<u8>>,
    /// Raw TIFF-structured EXIF payload (no `Exif\0\0` prefix).
    pub exif: Option<Vec<u8>>,
}

impl Raster {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            icc_profile: None,
            exif: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// The normalised mode, or `None` while the pixels still carry alpha,
    /// high bit depth, or float samples.
    pub fn color_mode(&self) -> Option<ColorMode> {
        match self.image {
            DynamicImage::ImageRgb8(_) => Some(ColorMode::Rgb),
            DynamicImage::ImageLuma8(_) => Some(ColorMode::Grayscale),
            _ => None,
        }
    }
}
