//! Post-processing applied to every try-on composite.
//!
//! Two fixed passes run in order: a 3x3 Gaussian blur that softens the seam
//! around the pasted garment, then contrast-limited adaptive histogram
//! equalization (CLAHE) on the CIE L* channel only. Chrominance (a*, b*) is
//! carried through in floating point so the colour of the garment is not
//! shifted by the exposure correction.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::quality::reflect_101;

const BINS: usize = 256;

/// CLAHE parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaheSettings {
    /// Histogram clip limit, relative to a uniform distribution.
    pub clip_limit: f32,
    /// Number of tiles along each axis.
    pub tile_grid: u32,
}

impl Default for ClaheSettings {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tile_grid: 8,
        }
    }
}

/// Settings for the composite post-process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessSettings {
    pub blur: bool,
    pub clahe: ClaheSettings,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            blur: true,
            clahe: ClaheSettings::default(),
        }
    }
}

/// Run the seam blur followed by luminance equalization.
pub fn post_process(img: &RgbImage, settings: &PostProcessSettings) -> RgbImage {
    let blurred = if settings.blur {
        gaussian_blur_3x3(img)
    } else {
        img.clone()
    };
    equalize_luminance(&blurred, &settings.clahe)
}

/// 3x3 Gaussian blur with kernel `[1 2 1]^T [1 2 1] / 16` and mirrored borders.
pub fn gaussian_blur_3x3(img: &RgbImage) -> RgbImage {
    const K: [u32; 3] = [1, 2, 1];
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    // Horizontal pass keeps 4x-scaled integer sums; vertical pass divides by 16.
    let mut horizontal = vec![[0u32; 3]; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u32; 3];
            for (k, weight) in K.iter().enumerate() {
                let sx = reflect_101(x as isize + k as isize - 1, w as usize) as u32;
                let px = img.get_pixel(sx, y);
                for c in 0..3 {
                    acc[c] += px[c] as u32 * weight;
                }
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    RgbImage::from_fn(w, h, |x, y| {
        let mut acc = [0u32; 3];
        for (k, weight) in K.iter().enumerate() {
            let sy = reflect_101(y as isize + k as isize - 1, h as usize) as u32;
            let row = horizontal[(sy * w + x) as usize];
            for c in 0..3 {
                acc[c] += row[c] * weight;
            }
        }
        Rgb([
            ((acc[0] + 8) >> 4) as u8,
            ((acc[1] + 8) >> 4) as u8,
            ((acc[2] + 8) >> 4) as u8,
        ])
    })
}

/// Apply CLAHE to the L* channel and convert back to RGB.
pub fn equalize_luminance(img: &RgbImage, settings: &ClaheSettings) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    let lab: Vec<[f32; 3]> = img.pixels().map(|p| rgb_to_lab(p.0)).collect();
    let lightness: Vec<u8> = lab
        .iter()
        .map(|l| (l[0] * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    let equalized = clahe(&lightness, w as usize, h as usize, settings);

    RgbImage::from_fn(w, h, |x, y| {
        let idx = (y * w + x) as usize;
        let l = equalized[idx] as f32 * 100.0 / 255.0;
        Rgb(lab_to_rgb([l, lab[idx][1], lab[idx][2]]))
    })
}

/// Contrast-limited adaptive histogram equalization of an 8-bit plane.
pub fn clahe(plane: &[u8], width: usize, height: usize, settings: &ClaheSettings) -> Vec<u8> {
    debug_assert_eq!(plane.len(), width * height);
    if width == 0 || height == 0 {
        return plane.to_vec();
    }

    let grid = settings.tile_grid.max(1) as usize;
    let tile_w = width.div_ceil(grid);
    let tile_h = height.div_ceil(grid);
    let tile_area = (tile_w * tile_h) as u32;
    let clip = if settings.clip_limit > 0.0 {
        ((settings.clip_limit * tile_area as f32 / BINS as f32) as u32).max(1)
    } else {
        u32::MAX
    };

    let mut luts = vec![[0u8; BINS]; grid * grid];
    for ty in 0..grid {
        for tx in 0..grid {
            let mut hist = [0u32; BINS];
            for y in ty * tile_h..(ty + 1) * tile_h {
                let sy = reflect_101(y as isize, height);
                for x in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect_101(x as isize, width);
                    hist[plane[sy * width + sx] as usize] += 1;
                }
            }
            clip_histogram(&mut hist, clip);
            luts[ty * grid + tx] = build_tile_lut(&hist, tile_area);
        }
    }

    let mut out = vec![0u8; plane.len()];
    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;
    for y in 0..height {
        let (ty1, ty2, ya) = tile_neighbours(y as f32 * inv_th - 0.5, grid);
        for x in 0..width {
            let (tx1, tx2, xa) = tile_neighbours(x as f32 * inv_tw - 0.5, grid);
            let v = plane[y * width + x] as usize;
            let top = luts[ty1 * grid + tx1][v] as f32 * (1.0 - xa)
                + luts[ty1 * grid + tx2][v] as f32 * xa;
            let bottom = luts[ty2 * grid + tx1][v] as f32 * (1.0 - xa)
                + luts[ty2 * grid + tx2][v] as f32 * xa;
            out[y * width + x] = (top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

fn tile_neighbours(pos: f32, grid: usize) -> (usize, usize, f32) {
    let first = pos.floor();
    let weight = pos - first;
    let lo = (first as isize).clamp(0, grid as isize - 1) as usize;
    let hi = (first as isize + 1).clamp(0, grid as isize - 1) as usize;
    (lo, hi, weight)
}

/// Clip bins above `limit` and spread the excess evenly over the histogram.
fn clip_histogram(hist: &mut [u32; BINS], limit: u32) {
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    if excess == 0 {
        return;
    }

    let per_bin = excess / BINS as u32;
    let mut residual = excess - per_bin * BINS as u32;
    for bin in hist.iter_mut() {
        *bin += per_bin;
    }
    if residual > 0 {
        let step = (BINS / residual as usize).max(1);
        let mut idx = 0;
        while idx < BINS && residual > 0 {
            hist[idx] += 1;
            residual -= 1;
            idx += step;
        }
    }
}

fn build_tile_lut(hist: &[u32; BINS], total: u32) -> [u8; BINS] {
    let mut lut = [0u8; BINS];
    if total == 0 {
        for (i, item) in lut.iter_mut().enumerate() {
            *item = i as u8;
        }
        return lut;
    }
    let scale = 255.0 / total as f32;
    let mut cumulative = 0u32;
    for (i, count) in hist.iter().enumerate() {
        cumulative += *count;
        lut[i] = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

// sRGB (D65) <-> CIE L*a*b*.

const XN: f32 = 0.950456;
const ZN: f32 = 1.088754;
const LAB_EPS: f32 = 0.008856;

fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> u8 {
    let c = c.clamp(0.0, 1.0);
    let v = if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPS {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if cube > LAB_EPS {
        cube
    } else {
        (f - 16.0 / 116.0) / 7.787
    }
}

/// Convert an sRGB pixel to `[L*, a*, b*]` with L* in `[0, 100]`.
pub fn rgb_to_lab(rgb: [u8; 3]) -> [f32; 3] {
    let r = srgb_to_linear(rgb[0]);
    let g = srgb_to_linear(rgb[1]);
    let b = srgb_to_linear(rgb[2]);

    let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * b) / XN;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * b) / ZN;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let l = if y > LAB_EPS {
        116.0 * fy - 16.0
    } else {
        903.3 * y
    };
    [l, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// Convert `[L*, a*, b*]` back to an sRGB pixel.
pub fn lab_to_rgb(lab: [f32; 3]) -> [u8; 3] {
    let [l, a, b] = lab;
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let x = lab_f_inv(fx) * XN;
    let y = if l > 903.3 * LAB_EPS {
        fy * fy * fy
    } else {
        l / 903.3
    };
    let z = lab_f_inv(fz) * ZN;

    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_991 * y + 0.041_556 * z;
    let bl = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;
    [linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(bl)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_keeps_flat_images_flat() {
        let img = RgbImage::from_pixel(6, 5, Rgb([90, 140, 200]));
        let out = gaussian_blur_3x3(&img);
        assert!(out.pixels().all(|p| p.0 == [90, 140, 200]));
    }

    #[test]
    fn blur_spreads_a_single_bright_pixel() {
        let mut img = RgbImage::new(5, 5);
        img.put_pixel(2, 2, Rgb([160, 160, 160]));
        let out = gaussian_blur_3x3(&img);
        assert_eq!(out.get_pixel(2, 2)[0], 40);
        assert_eq!(out.get_pixel(1, 2)[0], 20);
        assert_eq!(out.get_pixel(1, 1)[0], 10);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn lab_round_trip_is_close() {
        for rgb in [[0, 0, 0], [255, 255, 255], [200, 30, 90], [12, 180, 77]] {
            let back = lab_to_rgb(rgb_to_lab(rgb));
            for c in 0..3 {
                assert!(
                    (back[c] as i32 - rgb[c] as i32).abs() <= 1,
                    "{rgb:?} -> {back:?}"
                );
            }
        }
    }

    #[test]
    fn gray_pixels_have_neutral_chroma() {
        let lab = rgb_to_lab([128, 128, 128]);
        assert!(lab[1].abs() < 0.5 && lab[2].abs() < 0.5);
    }

    #[test]
    fn clip_histogram_preserves_mass() {
        let mut hist = [0u32; BINS];
        hist[10] = 1000;
        hist[20] = 24;
        clip_histogram(&mut hist, 40);
        assert_eq!(hist.iter().sum::<u32>(), 1024);
        assert!(hist[10] <= 40 + 1000 / BINS as u32 + 1);
    }

    #[test]
    fn clahe_stretches_low_contrast_plane() {
        let (w, h) = (32, 32);
        let plane: Vec<u8> = (0..w * h).map(|i| 100 + ((i % w) / 4) as u8).collect();
        let out = clahe(&plane, w, h, &ClaheSettings::default());
        let (in_min, in_max) = (100u8, 107u8);
        let out_min = *out.iter().min().unwrap();
        let out_max = *out.iter().max().unwrap();
        assert!(out_max - out_min > in_max - in_min);
    }

    #[test]
    fn post_process_preserves_dimensions() {
        let img = RgbImage::from_fn(17, 9, |x, y| Rgb([(x * 13) as u8, (y * 20) as u8, 90]));
        let out = post_process(&img, &PostProcessSettings::default());
        assert_eq!(out.dimensions(), img.dimensions());
    }
}
