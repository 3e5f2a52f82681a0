use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage, imageops::FilterType};
use ndarray::{Array2, Array4};

/// Longest side, in pixels, a user photo is allowed to keep before try-on.
pub const DEFAULT_MAX_DIMENSION: u32 = 1920;

/// Decode an image from disk into an owned 8-bit RGB buffer.
///
/// The format is detected from the file contents, so a file whose extension
/// does not match its encoding still loads.
///
/// # Arguments
///
/// * `path` - The path to the image file.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let path_ref = path.as_ref();
    let decoded = image::ImageReader::open(path_ref)
        .and_then(|reader| reader.with_guessed_format())
        .with_context(|| format!("failed to open image {}", path_ref.display()))?
        .decode()
        .with_context(|| format!("failed to decode image {}", path_ref.display()))?;
    Ok(decoded.to_rgb8())
}

/// Check whether a file decodes as an image, returning a short verdict message.
pub fn validate_image<P: AsRef<Path>>(path: P) -> (bool, String) {
    match load_image(path) {
        Ok(_) => (true, "Valid image".to_string()),
        Err(err) => (false, format!("Invalid image: {err:#}")),
    }
}

/// Resize an image to exactly `width` x `height`.
///
/// # Arguments
///
/// * `image` - The image to resize.
/// * `width` - The target width.
/// * `height` - The target height.
/// * `filter` - The sampling filter to use for resizing.
pub fn resize_image(image: &RgbImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    image::imageops::resize(image, width, height, filter)
}

/// Downscale `image` so its longest side is at most `max_dimension`, keeping the aspect ratio.
///
/// Images already within the limit are returned unchanged (as a copy).
pub fn limit_dimensions(image: &RgbImage, max_dimension: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if max_dimension == 0 || (width <= max_dimension && height <= max_dimension) {
        return image.clone();
    }

    let (new_w, new_h) = if width > height {
        let scaled = (height as f64 * (max_dimension as f64 / width as f64)) as u32;
        (max_dimension, scaled.max(1))
    } else {
        let scaled = (width as f64 * (max_dimension as f64 / height as f64)) as u32;
        (scaled.max(1), max_dimension)
    };
    log::debug!("downscaling {width}x{height} photo to {new_w}x{new_h}");
    resize_image(image, new_w, new_h, FilterType::Triangle)
}

/// BT.601 luma of an RGB pixel using 14-bit fixed-point weights.
///
/// Matches the rounding of common `RGB -> GRAY` conversions, so a pixel such
/// as `(1, 0, 0)` maps to zero.
#[inline]
pub fn luminance(pixel: &Rgb<u8>) -> u8 {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    let [r, g, b] = pixel.0;
    ((r as u32 * R + g as u32 * G + b as u32 * B + (1 << 13)) >> 14) as u8
}

/// Single-channel luma plane of an RGB image as `f64`, shaped `(height, width)`.
pub fn luminance_plane(image: &RgbImage) -> Array2<f64> {
    let (width, height) = image.dimensions();
    let mut plane = Array2::<f64>::zeros((height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        plane[(y as usize, x as usize)] = luminance(pixel) as f64;
    }
    plane
}

/// Pixel layout expected by a model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, 3, H, W]`
    #[default]
    Nchw,
    /// `[1, H, W, 3]`
    Nhwc,
}

/// Convert an RGB image into a normalized `f32` batch of one.
///
/// Each channel value is scaled to `[0, 1]`, then `(v - mean[c]) / std[c]` is applied.
pub fn rgb_to_tensor(
    image: &RgbImage,
    layout: TensorLayout,
    mean: [f32; 3],
    std: [f32; 3],
) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut array = match layout {
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
    };
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        for c in 0..3 {
            let std_c = if std[c].abs() > f32::EPSILON { std[c] } else { 1.0 };
            let value = (pixel[c] as f32 / 255.0 - mean[c]) / std_c;
            match layout {
                TensorLayout::Nchw => array[(0, c, yi, xi)] = value,
                TensorLayout::Nhwc => array[(0, yi, xi, c)] = value,
            }
        }
    }
    array
}
