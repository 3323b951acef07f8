//! Pure calculation functions for dimensions and pixel math.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the output size for a long-edge bound.
///
/// Returns `None` when the image already fits (`max(w, h) <= max_edge`), in
/// which case no resampling should happen at all. Otherwise both dimensions
/// are multiplied by the same factor `max_edge / long_edge` and rounded to
/// the nearest integer, never below 1.
///
/// # Examples
/// ```
/// # use batch_shrink::imaging::calculate_downscale_dimensions;
/// // 8000x6000 with a 6000px bound → 6000x4500
/// assert_eq!(calculate_downscale_dimensions((8000, 6000), 6000), Some((6000, 4500)));
///
/// // already small enough
/// assert_eq!(calculate_downscale_dimensions((4000, 3000), 6000), None);
/// ```
pub fn calculate_downscale_dimensions(source: (u32, u32), max_edge: u32) -> Option<(u32, u32)> {
    let (w, h) = source;
    let long_edge = w.max(h);
    if long_edge <= max_edge {
        return None;
    }

    let scale = max_edge as f64 / long_edge as f64;
    let scaled = |dim: u32| ((dim as f64 * scale).round() as u32).max(1);
    Some((scaled(w), scaled(h)))
}

/// Blend one 8-bit channel over a background with integer rounding.
///
/// `alpha == 0` yields `background` exactly, `alpha == 255` yields
/// `foreground` exactly.
#[inline]
pub fn composite_channel(foreground: u8, background: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    ((foreground as u32 * a + background as u32 * (255 - a) + 127) / 255) as u8
}
