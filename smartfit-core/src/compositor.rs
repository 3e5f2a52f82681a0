//! Blending a fitted garment buffer onto the user photo.

use image::{Rgb, RgbImage};
use smartfit_utils::{PostProcessSettings, TryOnSettings, luminance, post_process, timing_guard};

use crate::error::TryOnError;
use crate::segmentation::ForegroundMask;

/// Hard-cutover blend followed by seam blur and luminance equalization.
///
/// A garment pixel counts as present when its luma is above zero, so pure
/// black garment pixels are treated as absent.
#[derive(Debug, Clone)]
pub struct Compositor {
    user_weight: f32,
    garment_weight: f32,
    isolate_foreground: bool,
    post_process: PostProcessSettings,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(&TryOnSettings::default())
    }
}

impl Compositor {
    pub fn new(settings: &TryOnSettings) -> Self {
        Self {
            user_weight: settings.user_weight,
            garment_weight: settings.garment_weight,
            isolate_foreground: settings.isolate_foreground,
            post_process: settings.post_process,
        }
    }

    /// Blend and post-process.
    pub fn blend(
        &self,
        user: &RgbImage,
        garment: &RgbImage,
        mask: Option<&ForegroundMask>,
    ) -> Result<RgbImage, TryOnError> {
        let blended = self.blend_raw(user, garment, mask)?;
        let _guard = timing_guard("smartfit_core::compositor::post_process", log::Level::Debug);
        Ok(post_process(&blended, &self.post_process))
    }

    /// Blend without the post-processing pass.
    ///
    /// The mask only takes part when foreground isolation is enabled.
    pub fn blend_raw(
        &self,
        user: &RgbImage,
        garment: &RgbImage,
        mask: Option<&ForegroundMask>,
    ) -> Result<RgbImage, TryOnError> {
        let _guard = timing_guard("smartfit_core::compositor::blend", log::Level::Debug);
        TryOnError::check_dimensions("blend", user.dimensions(), garment.dimensions())?;
        let mask = match mask {
            Some(mask) if self.isolate_foreground => {
                TryOnError::check_dimensions(
                    "foreground mask",
                    user.dimensions(),
                    mask.dimensions(),
                )?;
                Some(mask)
            }
            _ => None,
        };

        let mut out = user.clone();
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let g = garment.get_pixel(x, y);
            if luminance(g) == 0 {
                continue;
            }
            if mask.is_some_and(|m| !m.is_foreground(x, y)) {
                continue;
            }
            *pixel = self.mix(pixel, g);
        }
        Ok(out)
    }

    fn mix(&self, user: &Rgb<u8>, garment: &Rgb<u8>) -> Rgb<u8> {
        let channel = |u: u8, g: u8| {
            (u as f32 * self.user_weight + g as f32 * self.garment_weight)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        Rgb([
            channel(user[0], garment[0]),
            channel(user[1], garment[1]),
            channel(user[2], garment[2]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn user() -> RgbImage {
        RgbImage::from_fn(6, 4, |x, y| Rgb([(x * 40) as u8, (y * 60) as u8, 100]))
    }

    #[test]
    fn zero_garment_pixels_leave_user_untouched() {
        let user = user();
        let garment = RgbImage::new(6, 4);
        let out = Compositor::default().blend_raw(&user, &garment, None).unwrap();
        assert_eq!(out, user);
    }

    #[test]
    fn present_pixels_mix_thirty_seventy() {
        let user = RgbImage::from_pixel(2, 1, Rgb([100, 200, 0]));
        let mut garment = RgbImage::new(2, 1);
        garment.put_pixel(1, 0, Rgb([200, 0, 250]));
        let out = Compositor::default().blend_raw(&user, &garment, None).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([100, 200, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([170, 60, 175]));
    }

    #[test]
    fn near_black_below_luma_threshold_counts_as_absent() {
        let user = RgbImage::from_pixel(1, 1, Rgb([50, 50, 50]));
        let garment = RgbImage::from_pixel(1, 1, Rgb([1, 0, 0]));
        let out = Compositor::default().blend_raw(&user, &garment, None).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([50, 50, 50]));
    }

    #[test]
    fn mismatched_dimensions_fail_fast() {
        let err = Compositor::default()
            .blend(&user(), &RgbImage::new(5, 4), None)
            .unwrap_err();
        assert!(matches!(
            err,
            TryOnError::DimensionMismatch {
                stage: "blend",
                expected: (6, 4),
                actual: (5, 4)
            }
        ));
    }

    #[test]
    fn mask_is_ignored_unless_isolation_enabled() {
        let user = RgbImage::from_pixel(2, 1, Rgb([10, 10, 10]));
        let garment = RgbImage::from_pixel(2, 1, Rgb([110, 110, 110]));
        let probs = Array2::from_shape_vec((1, 2), vec![0.9, 0.1]).unwrap();
        let mask = ForegroundMask::from_probabilities(&probs, 0.5);

        let plain = Compositor::default()
            .blend_raw(&user, &garment, Some(&mask))
            .unwrap();
        assert_eq!(plain.get_pixel(1, 0), &Rgb([80, 80, 80]));

        let isolating = Compositor::new(&TryOnSettings {
            isolate_foreground: true,
            ..TryOnSettings::default()
        });
        let out = isolating.blend_raw(&user, &garment, Some(&mask)).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([80, 80, 80]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([10, 10, 10]));
    }

    #[test]
    fn blend_keeps_dimensions_after_post_process() {
        let out = Compositor::default()
            .blend(&user(), &RgbImage::from_pixel(6, 4, Rgb([90, 20, 20])), None)
            .unwrap();
        assert_eq!(out.dimensions(), (6, 4));
    }
}
