//! EXIF block plumbing.
//!
//! EXIF payloads are kept as raw TIFF structures (no `Exif\0\0` prefix),
//! the form `image::metadata::Orientation::from_exif_chunk` and
//! `remove_from_exif_chunk` read and rewrite in place, so the rest of the
//! block (maker notes, GPS, thumbnails) survives byte for byte. Building a
//! fresh orientation-only block needs the tag codec and is only available
//! with the `exif` feature.

use super::backend::ImagingError;

/// Prefix of an EXIF APP1 segment in JPEG.
pub const APP1_EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Drop a leading `Exif\0\0` if present.
pub fn strip_app1_header(data: &[u8]) -> &[u8] {
    data.strip_prefix(APP1_EXIF_HEADER).unwrap_or(data)
}

/// A fresh EXIF block holding only `Orientation = 1`.
#[cfg(feature = "exif")]
pub fn orientation_only_block() -> Result<Vec<u8>, ImagingError> {
    use exif::experimental::Writer;
    use exif::{Field, In, Tag, Value};

    let field = Field {
        tag: Tag::Orientation,
        ifd_num: In::PRIMARY,
        value: Value::Short(vec![1]),
    };
    let mut writer = Writer::new();
    writer.push_field(&field);
    let mut buf = std::io::Cursor::new(Vec::new());
    writer
        .write(&mut buf, false)
        .map_err(|e| ImagingError::EncodeFailure(format!("EXIF block: {e}")))?;
    Ok(buf.into_inner())
}

#[cfg(not(feature = "exif"))]
pub fn orientation_only_block() -> Result<Vec<u8>, ImagingError> {
    Err(ImagingError::MetadataCapabilityUnavailable(
        "built without EXIF tag support (rebuild with --features exif)".into(),
    ))
}
