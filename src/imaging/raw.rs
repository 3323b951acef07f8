//! RAW development on top of `rawloader`.
//!
//! `rawloader` only unpacks the sensor mosaic. Development to a viewable
//! image is done here with a fixed, deliberately simple pipeline:
//!
//! 1. black/white level normalisation to `0.0..=1.0`
//! 2. bilinear demosaic of the 2×2 colour filter array, for the sensor's
//!    active area only
//! 3. white balance (gray-world when auto, camera coefficients otherwise)
//! 4. optional brightness stretch
//! 5. BT.709 transfer curve and quantisation to the output bit depth
//!
//! Steps 3 to 5 are fused into the final quantisation pass, so a frame is
//! never held as more than the normalised samples plus one RGB `f32`
//! buffer of the active area.
//!
//! There is no camera colour matrix: output is camera RGB, which is close
//! enough for previews and batch archiving.

use super::backend::{CodecError, RawDecoder};
use super::params::RawPolicy;
use image::{DynamicImage, ImageBuffer, Rgb};
use rawloader::{RawImage, RawImageData};
use rayon::prelude::*;
use std::path::Path;

/// [`RawDecoder`] backed by `rawloader`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawloaderDecoder;

impl RawDecoder for RawloaderDecoder {
    fn decode(&self, path: &Path, policy: &RawPolicy) -> Result<DynamicImage, CodecError> {
        let raw = rawloader::decode_file(path).map_err(|e| CodecError(e.to_string()))?;
        tracing::debug!(
            path = %path.display(),
            camera = %format!("{} {}", raw.clean_make, raw.clean_model),
            width = raw.width,
            height = raw.height,
            "decoded RAW mosaic"
        );
        let sensor = Sensor::from_raw(&raw)?;
        develop(&sensor, policy)
    }
}

/// Normalised sensor samples, independent of the RAW container.
#[derive(Debug, Clone)]
pub(crate) struct Sensor {
    pub width: usize,
    pub height: usize,
    /// 1 for a mosaic, 3 for already-interpolated RGB.
    pub cpp: usize,
    /// `width * height * cpp` samples in `0.0..=1.0`.
    pub samples: Vec<f32>,
    /// Colour index (0 = R, 1 = G, 2 = B) at `[row % 2][col % 2]`.
    pub pattern: [[usize; 2]; 2],
    /// Camera white balance as R, G, B multipliers.
    pub camera_wb: [f32; 3],
    /// Active area margins: top, right, bottom, left.
    pub crop: [usize; 4],
}

impl Sensor {
    fn from_raw(raw: &RawImage) -> Result<Self, CodecError> {
        let (width, height, cpp) = (raw.width, raw.height, raw.cpp);
        if width == 0 || height == 0 {
            return Err(CodecError("RAW image has no pixels".into()));
        }
        if cpp != 1 && cpp != 3 {
            return Err(CodecError(format!("unsupported {cpp} components per pixel")));
        }

        // index 3 is rawloader's fourth CFA colour (G2, or E on RGBE sensors)
        let color_at = |row: usize, col: usize| match raw.cfa.color_at(row, col) {
            3 => 1,
            c => c.min(2),
        };
        let pattern = if cpp == 1 {
            let pattern = [[color_at(0, 0), color_at(0, 1)], [color_at(1, 0), color_at(1, 1)]];
            let repeats_every_two =
                (0..6).all(|r| (0..6).all(|c| color_at(r, c) == pattern[r % 2][c % 2]));
            if !repeats_every_two {
                return Err(CodecError("only 2x2 colour filter arrays are supported".into()));
            }
            pattern
        } else {
            [[0, 1], [1, 2]]
        };

        let expected = width * height * cpp;
        let level_index = |i: usize| {
            if cpp == 3 {
                i % 3
            } else {
                let (row, col) = (i / width, i % width);
                raw.cfa.color_at(row, col).min(3)
            }
        };
        let normalise = |i: usize, v: f32| {
            let idx = level_index(i);
            let black = raw.blacklevels[idx] as f32;
            let white = raw.whitelevels[idx] as f32;
            let range = (white - black).max(1.0);
            ((v - black) / range).clamp(0.0, 1.0)
        };

        let samples: Vec<f32> = match &raw.data {
            RawImageData::Integer(data) => {
                if data.len() < expected {
                    return Err(CodecError("truncated sensor data".into()));
                }
                data[..expected]
                    .par_iter()
                    .enumerate()
                    .map(|(i, &v)| normalise(i, v as f32))
                    .collect()
            }
            RawImageData::Float(data) => {
                if data.len() < expected {
                    return Err(CodecError("truncated sensor data".into()));
                }
                data[..expected].iter().map(|v| v.clamp(0.0, 1.0)).collect()
            }
        };

        let wb = raw.wb_coeffs;
        let camera_wb = if wb[..3].iter().all(|c| c.is_finite() && *c > 0.0) {
            [wb[0] / wb[1], 1.0, wb[2] / wb[1]]
        } else {
            [1.0, 1.0, 1.0]
        };

        let [top, right, bottom, left] = raw.crops;
        let crop = if top + bottom < height && left + right < width {
            raw.crops
        } else {
            [0; 4]
        };

        Ok(Self {
            width,
            height,
            cpp,
            samples,
            pattern,
            camera_wb,
            crop,
        })
    }
}

impl Sensor {
    /// Width and height of the active area.
    fn active_size(&self) -> (usize, usize) {
        let [top, right, bottom, left] = self.crop;
        (self.width - left - right, self.height - top - bottom)
    }
}

/// Turn normalised sensor samples into an 8- or 16-bit RGB image.
pub(crate) fn develop(sensor: &Sensor, policy: &RawPolicy) -> Result<DynamicImage, CodecError> {
    let rgb = active_rgb(sensor);

    let wb = if policy.auto_white_balance {
        gray_world(&rgb)
    } else {
        sensor.camera_wb
    };
    let gain = if policy.auto_brightness {
        brightness_gain(&rgb, wb)
    } else {
        1.0
    };
    let scale = wb.map(|m| m * gain);
    let level = |i: usize, v: f32| transfer(v * scale[i % 3], policy.gamma);

    let (out_w, out_h) = sensor.active_size();
    let (w, h) = (out_w as u32, out_h as u32);
    if policy.output_bits > 8 {
        let px: Vec<u16> = rgb
            .par_iter()
            .enumerate()
            .map(|(i, &v)| (level(i, v) * 65535.0).round() as u16)
            .collect();
        ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, px)
            .map(DynamicImage::ImageRgb16)
            .ok_or_else(|| CodecError("developed buffer has the wrong size".into()))
    } else {
        let px: Vec<u8> = rgb
            .par_iter()
            .enumerate()
            .map(|(i, &v)| (level(i, v) * 255.0).round() as u8)
            .collect();
        ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, px)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| CodecError("developed buffer has the wrong size".into()))
    }
}

/// RGB samples of the active area, three per pixel. Mosaic data is
/// demosaiced on the way; interpolation still reads the margins.
fn active_rgb(sensor: &Sensor) -> Vec<f32> {
    let [top, _, _, left] = sensor.crop;
    let (out_w, out_h) = sensor.active_size();
    let mut out = vec![0.0f32; out_w * out_h * 3];

    out.par_chunks_exact_mut(out_w * 3)
        .enumerate()
        .for_each(|(y, line)| {
            let row = top + y;
            if sensor.cpp == 3 {
                let start = (row * sensor.width + left) * 3;
                line.copy_from_slice(&sensor.samples[start..start + out_w * 3]);
            } else {
                demosaic_row(sensor, row, left, line);
            }
        });
    out
}

/// Bilinear demosaic of one output row starting at sensor column `left`:
/// each missing channel is the mean of the same-colour samples in the
/// surrounding 3×3 window.
fn demosaic_row(sensor: &Sensor, row: usize, left: usize, line: &mut [f32]) {
    let (width, height) = (sensor.width, sensor.height);
    let samples = &sensor.samples;
    let pattern = sensor.pattern;

    for (x, px) in line.chunks_exact_mut(3).enumerate() {
        let col = left + x;
        let own = pattern[row % 2][col % 2];
        let mut sums = [0.0f32; 3];
        let mut counts = [0u32; 3];
        for r in row.saturating_sub(1)..=(row + 1).min(height - 1) {
            for c in col.saturating_sub(1)..=(col + 1).min(width - 1) {
                let ch = pattern[r % 2][c % 2];
                sums[ch] += samples[r * width + c];
                counts[ch] += 1;
            }
        }
        for (ch, out) in px.iter_mut().enumerate() {
            *out = if ch == own {
                samples[row * width + col]
            } else if counts[ch] > 0 {
                sums[ch] / counts[ch] as f32
            } else {
                0.0
            };
        }
    }
}

/// Multipliers that bring the red and blue means to the green mean.
fn gray_world(rgb: &[f32]) -> [f32; 3] {
    let (sums, n) = rgb
        .par_chunks_exact(3)
        .map(|px| ([px[0] as f64, px[1] as f64, px[2] as f64], 1usize))
        .reduce(
            || ([0.0; 3], 0),
            |(a, na), (b, nb)| ([a[0] + b[0], a[1] + b[1], a[2] + b[2]], na + nb),
        );
    if n == 0 {
        return [1.0; 3];
    }
    let means = sums.map(|s| s / n as f64);
    let scale = |m: f64| {
        if m > f64::EPSILON {
            (means[1] / m) as f32
        } else {
            1.0
        }
    };
    [scale(means[0]), 1.0, scale(means[2])]
}

/// Gain that puts the 99th-percentile channel value at full scale.
fn brightness_gain(rgb: &[f32], wb: [f32; 3]) -> f32 {
    let mut peaks: Vec<f32> = rgb
        .chunks_exact(3)
        .map(|px| px.iter().zip(wb).map(|(v, m)| v * m).fold(0.0, f32::max))
        .collect();
    if peaks.is_empty() {
        return 1.0;
    }
    let idx = (peaks.len() - 1) * 99 / 100;
    let (_, p99, _) = peaks.select_nth_unstable_by(idx, f32::total_cmp);
    if *p99 > f32::EPSILON { 1.0 / *p99 } else { 1.0 }
}

/// BT.709-style transfer: linear toe of slope `gamma.1` below 0.018, power
/// `1 / gamma.0` above.
pub(crate) fn transfer(v: f32, gamma: (f32, f32)) -> f32 {
    let (power, slope) = gamma;
    let v = v.clamp(0.0, 1.0);
    let out = if v < 0.018 {
        v * slope
    } else {
        1.099 * v.powf(1.0 / power) - 0.099
    };
    out.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RGGB: [[usize; 2]; 2] = [[0, 1], [1, 2]];

    fn flat_mosaic(width: usize, height: usize, r: f32, g: f32, b: f32) -> Sensor {
        let samples = (0..width * height)
            .map(|i| match RGGB[(i / width) % 2][(i % width) % 2] {
                0 => r,
                1 => g,
                _ => b,
            })
            .collect();
        Sensor {
            width,
            height,
            cpp: 1,
            samples,
            pattern: RGGB,
            camera_wb: [1.0; 3],
            crop: [0; 4],
        }
    }

    fn fixed(auto_white_balance: bool) -> RawPolicy {
        RawPolicy {
            auto_white_balance,
            ..RawPolicy::default()
        }
    }

    #[test]
    fn transfer_curve_endpoints() {
        let g = RawPolicy::default().gamma;
        assert_eq!(transfer(0.0, g), 0.0);
        assert!((transfer(1.0, g) - 1.0).abs() < 1e-4);
        // toe is linear with slope 4.5
        assert!((transfer(0.01, g) - 0.045).abs() < 1e-6);
    }

    #[test]
    fn transfer_curve_is_monotonic() {
        let g = RawPolicy::default().gamma;
        let mut prev = 0.0;
        for i in 0..=1000 {
            let v = transfer(i as f32 / 1000.0, g);
            assert!(v >= prev, "not monotonic at {i}");
            prev = v;
        }
    }

    #[test]
    fn flat_gray_mosaic_develops_to_gray() {
        let sensor = flat_mosaic(8, 6, 0.5, 0.5, 0.5);
        let img = develop(&sensor, &fixed(false)).unwrap();
        let rgb = img.to_rgb8();
        assert_eq!(rgb.dimensions(), (8, 6));
        let expected = (transfer(0.5, RawPolicy::default().gamma) * 255.0).round() as u8;
        assert!(rgb.pixels().all(|p| p.0 == [expected; 3]));
    }

    #[test]
    fn gray_world_neutralises_color_cast() {
        // red channel twice as strong as green and blue
        let sensor = flat_mosaic(8, 8, 0.4, 0.2, 0.2);
        let img = develop(&sensor, &fixed(true)).unwrap().to_rgb8();
        for p in img.pixels() {
            let [r, g, b] = p.0;
            assert!(r.abs_diff(g) <= 1 && b.abs_diff(g) <= 1, "{:?}", p.0);
        }
    }

    #[test]
    fn camera_white_balance_used_when_auto_is_off() {
        let mut sensor = flat_mosaic(4, 4, 0.2, 0.2, 0.2);
        sensor.camera_wb = [2.0, 1.0, 1.0];
        let img = develop(&sensor, &fixed(false)).unwrap().to_rgb8();
        let [r, g, _] = img.get_pixel(1, 1).0;
        assert!(r > g);
    }

    #[test]
    fn crop_removes_margins() {
        let mut sensor = flat_mosaic(10, 8, 0.3, 0.3, 0.3);
        sensor.crop = [1, 2, 3, 4];
        let img = develop(&sensor, &RawPolicy::default()).unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
    }

    #[test]
    fn sixteen_bit_output_when_requested() {
        let sensor = flat_mosaic(4, 4, 0.5, 0.5, 0.5);
        let policy = RawPolicy {
            output_bits: 16,
            ..RawPolicy::default()
        };
        let img = develop(&sensor, &policy).unwrap();
        assert!(matches!(img, DynamicImage::ImageRgb16(_)));
    }

    #[test]
    fn demosaic_fills_missing_channels() {
        // pure green scene: R and B sites read 0, G sites read 1
        let sensor = flat_mosaic(6, 6, 0.0, 1.0, 0.0);
        let rgb = active_rgb(&sensor);
        assert_eq!(rgb.len(), 6 * 6 * 3);
        // at an R site the interpolated green is 1.0
        assert_eq!(rgb[..3], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn cropped_demosaic_reads_the_margins() {
        let mut sensor = flat_mosaic(6, 6, 0.0, 1.0, 0.0);
        sensor.crop = [1, 1, 1, 1];
        let rgb = active_rgb(&sensor);
        assert_eq!(rgb.len(), 4 * 4 * 3);
        // output (0, 0) is the B site at sensor (1, 1); its green comes
        // from neighbours in the cropped-away margin
        assert_eq!(rgb[..3], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn three_component_crop_selects_active_pixels() {
        let sensor = Sensor {
            width: 3,
            height: 1,
            cpp: 3,
            samples: vec![0.1, 0.1, 0.1, 0.2, 0.4, 0.6, 0.9, 0.9, 0.9],
            pattern: RGGB,
            camera_wb: [1.0; 3],
            crop: [0, 1, 0, 1],
        };
        assert_eq!(active_rgb(&sensor), vec![0.2, 0.4, 0.6]);
    }

    #[test]
    fn three_component_data_skips_demosaic() {
        let sensor = Sensor {
            width: 2,
            height: 1,
            cpp: 3,
            samples: vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            pattern: RGGB,
            camera_wb: [1.0; 3],
            crop: [0; 4],
        };
        let img = develop(&sensor, &fixed(false)).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 255]);
    }

    #[test]
    fn rawloader_rejects_non_raw_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("corrupt.arw");
        std::fs::write(&path, b"definitely not a sony raw file").unwrap();
        assert!(RawloaderDecoder.decode(&path, &RawPolicy::default()).is_err());
    }
}
