//! Garment placement onto a user-photo-sized canvas.
//!
//! Two placements exist. The landmark fit sizes the garment from the
//! shoulder span and shoulder-to-hip height and hangs it from the shoulders.
//! The proportional fallback ignores the body entirely and depends only on
//! the canvas dimensions, so identical dimensions always give identical
//! geometry.

use image::{GenericImageView, RgbImage, imageops::FilterType};
use log::debug;
use serde::{Deserialize, Serialize};
use smartfit_utils::resize_image;

use crate::landmarks::{PoseKeypoint, PoseLandmarks};

/// Horizontal drape margin applied to the shoulder span.
const SHOULDER_MARGIN: f32 = 1.3;
/// Vertical margin applied to the shoulder-to-hip height.
const TORSO_MARGIN: f32 = 1.2;
/// Landmark-derived sizes below this many pixels are considered unreliable.
const MIN_FIT_PX: u32 = 50;
/// Pixels the garment top sits above the shoulder line.
const SHOULDER_LIFT: u32 = 20;
/// Landmark-derived sizes above this multiple of the canvas are considered unreliable.
const MAX_FIT_SCALE: u32 = 4;

/// Fallback garment size and anchor, as integer percentages of the canvas.
const FALLBACK_WIDTH_PCT: u32 = 40;
const FALLBACK_HEIGHT_PCT: u32 = 50;
const FALLBACK_TOP_PCT: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStrategy {
    Landmarks,
    Fallback,
}

/// Rectangle of the canvas actually covered by the garment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FitRegion {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Output of [`GarmentFitter::fit`]: a canvas-sized buffer that is zero outside `region`.
#[derive(Debug, Clone)]
pub struct FittedGarment {
    pub buffer: RgbImage,
    pub strategy: FitStrategy,
    pub region: FitRegion,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GarmentFitter;

impl GarmentFitter {
    pub fn new() -> Self {
        Self
    }

    /// Place `garment` onto a zeroed canvas the size of `user`.
    pub fn fit(
        &self,
        garment: &RgbImage,
        user: &RgbImage,
        landmarks: Option<&PoseLandmarks>,
    ) -> FittedGarment {
        let (width, height) = user.dimensions();
        if let Some(landmarks) = landmarks {
            match landmark_fit(garment, landmarks, width, height) {
                Some(fitted) => return fitted,
                None => debug!("landmark geometry unusable; using proportional fit"),
            }
        }
        fallback_fit(garment, width, height)
    }
}

/// Fallback region for a `width` x `height` canvas.
pub fn fallback_region(width: u32, height: u32) -> FitRegion {
    let w = width * FALLBACK_WIDTH_PCT / 100;
    let h = height * FALLBACK_HEIGHT_PCT / 100;
    FitRegion {
        x: (width - w) / 2,
        y: height * FALLBACK_TOP_PCT / 100,
        width: w,
        height: h,
    }
}

fn fallback_fit(garment: &RgbImage, width: u32, height: u32) -> FittedGarment {
    let region = fallback_region(width, height);
    let mut buffer = RgbImage::new(width, height);
    if !region.is_empty() && !is_empty(garment) {
        let resized = resize_image(garment, region.width, region.height, FilterType::Triangle);
        paste(&mut buffer, &resized, region);
    }
    FittedGarment {
        buffer,
        strategy: FitStrategy::Fallback,
        region,
    }
}

/// Landmark-driven placement.
///
/// `None` when the derived size falls under the floor or exceeds
/// `MAX_FIT_SCALE` times the canvas, which bounds the resize buffer.
fn landmark_fit(
    garment: &RgbImage,
    landmarks: &PoseLandmarks,
    width: u32,
    height: u32,
) -> Option<FittedGarment> {
    let ls = landmarks.get(PoseKeypoint::LeftShoulder);
    let rs = landmarks.get(PoseKeypoint::RightShoulder);
    let lh = landmarks.get(PoseKeypoint::LeftHip);
    let (w, h) = (width as f32, height as f32);

    let fit_w = ((rs.x - ls.x).abs() * w * SHOULDER_MARGIN) as u32;
    let fit_h = ((lh.y - ls.y).abs() * h * TORSO_MARGIN) as u32;
    if fit_w < MIN_FIT_PX || fit_h < MIN_FIT_PX || is_empty(garment) {
        return None;
    }
    if fit_w > width.saturating_mul(MAX_FIT_SCALE)
        || fit_h > height.saturating_mul(MAX_FIT_SCALE)
    {
        debug!("landmark fit {fit_w}x{fit_h} far exceeds the {width}x{height} canvas");
        return None;
    }

    let center_x = ((ls.x + rs.x) / 2.0 * w).max(0.0) as u32;
    let shoulder_y = (ls.y * h).max(0.0) as u32;
    let y = shoulder_y.saturating_sub(SHOULDER_LIFT);
    let x = center_x.saturating_sub(fit_w / 2);
    let region = FitRegion {
        x: x.min(width),
        y: y.min(height),
        width: fit_w.min(width.saturating_sub(x)),
        height: fit_h.min(height.saturating_sub(y)),
    };
    debug!("landmark fit {fit_w}x{fit_h} placed at {region:?}");

    let mut buffer = RgbImage::new(width, height);
    if !region.is_empty() {
        let resized = resize_image(garment, fit_w, fit_h, FilterType::Triangle);
        paste(&mut buffer, &resized, region);
    }
    Some(FittedGarment {
        buffer,
        strategy: FitStrategy::Landmarks,
        region,
    })
}

/// Copy the top-left `region.width` x `region.height` of `src` into `canvas` at the region origin.
fn paste(canvas: &mut RgbImage, src: &RgbImage, region: FitRegion) {
    let view = src.view(0, 0, region.width, region.height);
    for (dx, dy, pixel) in view.pixels() {
        canvas.put_pixel(region.x + dx, region.y + dy, pixel);
    }
}

fn is_empty(image: &RgbImage) -> bool {
    image.width() == 0 || image.height() == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Landmark;
    use image::Rgb;

    const RED: Rgb<u8> = Rgb([220, 30, 30]);

    fn garment() -> RgbImage {
        RgbImage::from_pixel(64, 80, RED)
    }

    fn torso(ls: (f32, f32), rs: (f32, f32), lh: (f32, f32)) -> PoseLandmarks {
        PoseLandmarks::from_torso(
            Landmark::new(ls.0, ls.1),
            Landmark::new(rs.0, rs.1),
            Landmark::new(lh.0, lh.1),
            Landmark::new(rs.0, lh.1),
        )
    }

    fn covered(buffer: &RgbImage) -> usize {
        buffer.pixels().filter(|p| p.0 != [0, 0, 0]).count()
    }

    #[test]
    fn fallback_geometry_depends_only_on_dimensions() {
        assert_eq!(
            fallback_region(400, 600),
            FitRegion {
                x: 120,
                y: 90,
                width: 160,
                height: 300
            }
        );

        let user = RgbImage::new(400, 600);
        let fitted = GarmentFitter::new().fit(&garment(), &user, None);
        assert_eq!(fitted.strategy, FitStrategy::Fallback);
        assert_eq!(fitted.buffer.dimensions(), (400, 600));
        assert_eq!(covered(&fitted.buffer), 160 * 300);
        assert_eq!(fitted.buffer.get_pixel(120, 90), &RED);
        assert_eq!(fitted.buffer.get_pixel(279, 389), &RED);
        assert_eq!(fitted.buffer.get_pixel(119, 90), &Rgb([0, 0, 0]));
        assert_eq!(fitted.buffer.get_pixel(120, 390), &Rgb([0, 0, 0]));
    }

    #[test]
    fn landmark_fit_hangs_from_shoulders() {
        let user = RgbImage::new(400, 600);
        // Span 0.25 * 400 * 1.3 = 130, torso 0.3 * 600 * 1.2 = 216.
        let pose = torso((0.625, 0.3), (0.375, 0.3), (0.6, 0.6));
        let fitted = GarmentFitter::new().fit(&garment(), &user, Some(&pose));

        assert_eq!(fitted.strategy, FitStrategy::Landmarks);
        assert_eq!(
            fitted.region,
            FitRegion {
                x: 135,
                y: 160,
                width: 130,
                height: 216
            }
        );
        assert_eq!(covered(&fitted.buffer), 130 * 216);
    }

    #[test]
    fn narrow_landmarks_match_fallback_exactly() {
        let user = RgbImage::new(400, 600);
        // Span 0.05 * 400 * 1.3 = 26 px, under the floor.
        let pose = torso((0.525, 0.3), (0.475, 0.3), (0.52, 0.6));
        let fitter = GarmentFitter::new();
        let from_landmarks = fitter.fit(&garment(), &user, Some(&pose));
        let fallback = fitter.fit(&garment(), &user, None);

        assert_eq!(from_landmarks.strategy, FitStrategy::Fallback);
        assert_eq!(from_landmarks.region, fallback.region);
        assert_eq!(from_landmarks.buffer, fallback.buffer);
    }

    #[test]
    fn short_torso_matches_fallback_exactly() {
        let user = RgbImage::new(400, 600);
        // Span 0.4 * 400 * 1.3 = 208, torso 0.05 * 600 * 1.2 = 36 px, under the floor.
        let pose = torso((0.7, 0.3), (0.3, 0.3), (0.7, 0.35));
        let fitter = GarmentFitter::new();
        let from_landmarks = fitter.fit(&garment(), &user, Some(&pose));

        assert_eq!(from_landmarks.strategy, FitStrategy::Fallback);
        assert_eq!(
            from_landmarks.region,
            FitRegion {
                x: 120,
                y: 90,
                width: 160,
                height: 300
            }
        );
        assert_eq!(from_landmarks.buffer, fitter.fit(&garment(), &user, None).buffer);
    }

    #[test]
    fn implausibly_wide_landmarks_use_fallback() {
        let user = RgbImage::new(400, 600);
        // Span 4.5 * 400 * 1.3 = 2340 px, beyond four canvas widths.
        let pose = torso((0.5, 0.3), (5.0, 0.3), (0.5, 0.6));
        let fitted = GarmentFitter::new().fit(&garment(), &user, Some(&pose));

        assert_eq!(fitted.strategy, FitStrategy::Fallback);
        assert_eq!(fitted.region, fallback_region(400, 600));
        assert_eq!(covered(&fitted.buffer), 160 * 300);
    }

    #[test]
    fn overhanging_garment_is_cropped_to_canvas() {
        let user = RgbImage::new(200, 200);
        // Span 0.4 * 200 * 1.3 = 104 centered at x = 180, torso 0.5 * 200 * 1.2 = 120.
        let pose = torso((0.7, 0.6), (1.1, 0.6), (0.7, 1.1));
        let fitted = GarmentFitter::new().fit(&garment(), &user, Some(&pose));

        assert_eq!(fitted.strategy, FitStrategy::Landmarks);
        assert_eq!(
            fitted.region,
            FitRegion {
                x: 128,
                y: 100,
                width: 72,
                height: 100
            }
        );
        assert_eq!(fitted.buffer.dimensions(), (200, 200));
        assert_eq!(covered(&fitted.buffer), 72 * 100);
    }

    #[test]
    fn garment_entirely_off_canvas_leaves_empty_buffer() {
        let user = RgbImage::new(100, 100);
        let pose = torso((1.2, 1.5), (1.8, 1.5), (1.2, 2.5));
        let fitted = GarmentFitter::new().fit(&garment(), &user, Some(&pose));
        assert!(fitted.region.is_empty());
        assert_eq!(covered(&fitted.buffer), 0);
    }

    #[test]
    fn tiny_canvas_yields_zero_buffer() {
        let user = RgbImage::new(2, 1);
        let fitted = GarmentFitter::new().fit(&garment(), &user, None);
        assert!(fitted.region.is_empty());
        assert_eq!(covered(&fitted.buffer), 0);
    }
}
