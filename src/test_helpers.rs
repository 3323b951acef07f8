//! Shared test utilities: synthetic images and EXIF blocks.
//!
//! Everything is generated in-test with the `image` and `jpeg-encoder`
//! crates, so the suite carries no binary fixtures.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_jpeg(&tmp.path().join("a.jpg"), 640, 480);
//! write_jpeg_with_exif(&tmp.path().join("b.jpg"), &gradient(40, 20), &tiff_with_orientation(Some(6), false));
//! ```

use crate::imaging::exif::APP1_EXIF_HEADER;
use image::{Rgb, RgbImage, RgbaImage};
use jpeg_encoder::{ColorType, Encoder};
use std::path::Path;

pub use tempfile::TempDir;

const ORIENTATION_TAG: u16 = 0x0112;

// =========================================================================
// Pixels
// =========================================================================

/// Smooth diagonal gradient. Compresses like a photo, not like a flat fill.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) * 127 / (width + height).max(1)) as u8,
        ])
    })
}

// =========================================================================
// Files
// =========================================================================

/// Write a baseline JPEG through the `image` crate's encoder.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    gradient(width, height).save(path).unwrap();
}

/// Write a JPEG carrying `tiff` as its EXIF APP1 segment.
pub fn write_jpeg_with_exif(path: &Path, img: &RgbImage, tiff: &[u8]) {
    let mut out = Vec::new();
    let mut encoder = Encoder::new(&mut out, 90);
    let mut app1 = APP1_EXIF_HEADER.to_vec();
    app1.extend_from_slice(tiff);
    encoder.add_app_segment(1, &app1).unwrap();
    encoder
        .encode(img.as_raw(), img.width() as u16, img.height() as u16, ColorType::Rgb)
        .unwrap();
    std::fs::write(path, out).unwrap();
}

/// Write an RGBA PNG.
pub fn write_png_rgba(path: &Path, img: &RgbaImage) {
    img.save(path).unwrap();
}

/// Write an 8-bit indexed PNG. `trns` holds one alpha value per palette
/// entry, `indices` one palette index per pixel.
pub fn write_png_indexed(
    path: &Path,
    palette: &[u8],
    trns: &[u8],
    indices: &[u8],
    width: u32,
    height: u32,
) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(palette.to_vec());
    encoder.set_trns(trns.to_vec());
    let mut writer = encoder.write_header().unwrap();
    writer.write_image_data(indices).unwrap();
    writer.finish().unwrap();
}

/// Write a four-channel CMYK JPEG through `jpeg-encoder`.
pub fn write_jpeg_cmyk(path: &Path, width: u16, height: u16) {
    let pixels: Vec<u8> = (0..u32::from(width) * u32::from(height))
        .flat_map(|i| [(i % 256) as u8, 40, 200, 10])
        .collect();
    let mut out = Vec::new();
    Encoder::new(&mut out, 90)
        .encode(&pixels, width, height, ColorType::Cmyk)
        .unwrap();
    std::fs::write(path, out).unwrap();
}

// =========================================================================
// EXIF
// =========================================================================

/// Minimal TIFF with IFD0 holding ImageWidth and, optionally, Orientation.
pub fn tiff_with_orientation(orientation: Option<u16>, big_endian: bool) -> Vec<u8> {
    let u16b = |v: u16| {
        if big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    };
    let u32b = |v: u32| {
        if big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    };

    let mut out = Vec::new();
    out.extend_from_slice(if big_endian { b"MM" } else { b"II" });
    out.extend_from_slice(&u16b(42));
    out.extend_from_slice(&u32b(8));

    let count = if orientation.is_some() { 2 } else { 1 };
    out.extend_from_slice(&u16b(count));
    // ImageWidth, LONG, 1, 640
    out.extend_from_slice(&u16b(0x0100));
    out.extend_from_slice(&u16b(4));
    out.extend_from_slice(&u32b(1));
    out.extend_from_slice(&u32b(640));
    if let Some(o) = orientation {
        // Orientation, SHORT, 1, value padded to four bytes
        out.extend_from_slice(&u16b(ORIENTATION_TAG));
        out.extend_from_slice(&u16b(3));
        out.extend_from_slice(&u32b(1));
        out.extend_from_slice(&u16b(o));
        out.extend_from_slice(&[0, 0]);
    }
    out.extend_from_slice(&u32b(0));
    out
}

/// The EXIF payload of a JPEG file, without the `Exif\0\0` prefix.
pub fn jpeg_exif(path: &Path) -> Option<Vec<u8>> {
    use image::ImageDecoder;
    let mut decoder = image::codecs::jpeg::JpegDecoder::new(std::io::BufReader::new(
        std::fs::File::open(path).unwrap(),
    ))
    .unwrap();
    decoder
        .exif_metadata()
        .unwrap()
        .map(|b| crate::imaging::exif::strip_app1_header(&b).to_vec())
}

/// The ICC profile of a JPEG file.
pub fn jpeg_icc(path: &Path) -> Option<Vec<u8>> {
    use image::ImageDecoder;
    let mut decoder = image::codecs::jpeg::JpegDecoder::new(std::io::BufReader::new(
        std::fs::File::open(path).unwrap(),
    ))
    .unwrap();
    decoder.icc_profile().unwrap()
}
