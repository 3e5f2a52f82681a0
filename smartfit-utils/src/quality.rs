//! Sharpness scoring based on Laplacian variance.
//!
//! The second-derivative response of the luma plane is large around crisp
//! edges and flat in blurred or featureless areas, so its variance is a cheap,
//! deterministic stand-in for perceived sharpness. Try-on composites are scored
//! by dividing the raw variance by [`TRYON_NORMALIZATION`] and clamping at 1.
//! Uploaded photos are bucketed with a wider scale: variance above 500 is
//! `High` (normalised by 1000), above 100 is `Medium` (normalised by 500), and
//! everything else is `Low` (normalised by 100).

use std::path::Path;

use image::RgbImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::image_utils::{load_image, luminance_plane};

/// Normalisation constant for the try-on output score.
pub const TRYON_NORMALIZATION: f64 = 500.0;

const HIGH_VARIANCE: f64 = 500.0;
const MEDIUM_VARIANCE: f64 = 100.0;

/// Coarse quality bucket for uploaded photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Unknown,
    Low,
    Medium,
    High,
}

impl Quality {
    /// Map a Laplacian variance into a bucket.
    pub fn from_variance(v: f64) -> Self {
        if v > HIGH_VARIANCE {
            Quality::High
        } else if v > MEDIUM_VARIANCE {
            Quality::Medium
        } else {
            Quality::Low
        }
    }

    /// Normalisation constant used for the bucket's score.
    fn normalization(self) -> f64 {
        match self {
            Quality::High => 1000.0,
            Quality::Medium => 500.0,
            Quality::Low | Quality::Unknown => 100.0,
        }
    }
}

/// Quality verdict for an uploaded photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadQuality {
    pub quality: Quality,
    pub score: f64,
    /// Raw Laplacian variance; absent when the image could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadQuality {
    /// Bucket a raw variance value.
    pub fn assess(variance: f64) -> Self {
        let quality = Quality::from_variance(variance);
        let score = variance / quality.normalization();
        let score = if quality == Quality::High {
            score.min(1.0)
        } else {
            score
        };
        Self {
            quality,
            score,
            sharpness: Some(variance),
            error: None,
        }
    }

    fn unreadable(error: String) -> Self {
        Self {
            quality: Quality::Unknown,
            score: 0.5,
            sharpness: None,
            error: Some(error),
        }
    }
}

/// Assess an uploaded photo on disk. Unreadable files yield `Quality::Unknown` with score 0.5.
pub fn assess_upload<P: AsRef<Path>>(path: P) -> UploadQuality {
    match load_image(path.as_ref()) {
        Ok(image) => UploadQuality::assess(laplacian_variance(&image)),
        Err(err) => {
            log::warn!("quality assessment failed: {err:#}");
            UploadQuality::unreadable(format!("{err:#}"))
        }
    }
}

/// Variance of the 3x3 Laplacian response over the luma plane.
///
/// Borders are handled by mirroring without repeating the edge pixel
/// (`gfedcb|abcdefgh|gfedcba`), so every pixel contributes a response.
pub fn laplacian_variance(img: &RgbImage) -> f64 {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }

    let luma = luminance_plane(img);
    let (rows, cols) = (h as usize, w as usize);
    let mut lap = Array2::<f64>::zeros((rows, cols));

    for y in 0..rows {
        let up = reflect_101(y as isize - 1, rows);
        let down = reflect_101(y as isize + 1, rows);
        for x in 0..cols {
            let left = reflect_101(x as isize - 1, cols);
            let right = reflect_101(x as isize + 1, cols);
            lap[[y, x]] = luma[[up, x]] + luma[[down, x]] + luma[[y, left]] + luma[[y, right]]
                - 4.0 * luma[[y, x]];
        }
    }

    let count = lap.len() as f64;
    let mean = lap.sum() / count;
    lap.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count
}

/// Normalised sharpness score in `[0, 1]` used for try-on output.
pub fn sharpness_score(img: &RgbImage) -> f64 {
    normalize_variance(laplacian_variance(img), TRYON_NORMALIZATION)
}

/// `variance / normalization`, clamped to `[0, 1]`.
pub fn normalize_variance(variance: f64, normalization: f64) -> f64 {
    if normalization <= 0.0 || !variance.is_finite() {
        return 0.0;
    }
    (variance / normalization).clamp(0.0, 1.0)
}

pub(crate) fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = index;
    while i < 0 || i > last {
        if i < 0 {
            i = -i;
        }
        if i > last {
            i = 2 * last - i;
        }
    }
    i as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn checkerboard(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            let v = if (x + y) % 2 == 0 { 255u8 } else { 0u8 };
            Rgb([v, v, v])
        })
    }

    #[test]
    fn quality_from_variance_thresholds() {
        assert_eq!(Quality::from_variance(50.0), Quality::Low);
        assert_eq!(Quality::from_variance(100.0), Quality::Low);
        assert_eq!(Quality::from_variance(100.1), Quality::Medium);
        assert_eq!(Quality::from_variance(500.0), Quality::Medium);
        assert_eq!(Quality::from_variance(1500.0), Quality::High);
    }

    #[test]
    fn upload_scores_use_bucket_normalization() {
        let low = UploadQuality::assess(50.0);
        assert_eq!(low.quality, Quality::Low);
        assert!((low.score - 0.5).abs() < 1e-12);

        let medium = UploadQuality::assess(250.0);
        assert_eq!(medium.quality, Quality::Medium);
        assert!((medium.score - 0.5).abs() < 1e-12);

        let high = UploadQuality::assess(4000.0);
        assert_eq!(high.quality, Quality::High);
        assert_eq!(high.score, 1.0);
    }

    #[test]
    fn unreadable_upload_is_unknown() {
        let verdict = assess_upload("does/not/exist.jpg");
        assert_eq!(verdict.quality, Quality::Unknown);
        assert_eq!(verdict.score, 0.5);
        assert!(verdict.error.is_some());
    }

    #[test]
    fn flat_image_has_zero_variance() {
        let img = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
        assert_eq!(laplacian_variance(&img), 0.0);
        assert_eq!(sharpness_score(&img), 0.0);
    }

    #[test]
    fn edges_increase_score_and_stay_clamped() {
        let flat = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
        let sharp = checkerboard(32);
        let flat_score = sharpness_score(&flat);
        let sharp_score = sharpness_score(&sharp);
        assert!(sharp_score >= flat_score);
        assert!((0.0..=1.0).contains(&sharp_score));
        assert_eq!(sharp_score, 1.0);
    }

    #[test]
    fn variance_on_empty_image_is_zero() {
        assert_eq!(laplacian_variance(&RgbImage::new(0, 0)), 0.0);
    }

    #[test]
    fn reflect_101_mirrors_without_edge_repeat() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-1, 1), 0);
    }
}
