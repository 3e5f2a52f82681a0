//! Person/background segmentation.

use std::{path::Path, sync::Arc};

use anyhow::Result;
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, imageops::FilterType};
use log::{debug, warn};
use ndarray::Array2;
use smartfit_utils::{SegmentationSettings, timing_guard};

use crate::model::{OnnxModel, output_values};

const FOREGROUND: u8 = 255;

/// A pretrained binary segmentation model.
pub trait SegmentationModel: Send + Sync {
    /// Per-pixel foreground probability, shaped `(height, width)` at model resolution.
    fn probabilities(&self, photo: &RgbImage) -> Result<Array2<f32>>;
}

/// ONNX selfie-segmentation model with a single-channel probability output.
#[derive(Debug)]
pub struct OnnxSegmentationModel {
    model: OnnxModel,
}

impl OnnxSegmentationModel {
    pub fn load<P: AsRef<Path>>(path: P, settings: &SegmentationSettings) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load("segmentation", path, settings.input)?,
        })
    }
}

impl SegmentationModel for OnnxSegmentationModel {
    fn probabilities(&self, photo: &RgbImage) -> Result<Array2<f32>> {
        let outputs = self.model.run(photo)?;
        let values = output_values(&outputs[0], "segmentation")?;
        let input = self.model.input();
        let (h, w) = (input.height as usize, input.width as usize);
        anyhow::ensure!(
            values.len() == h * w,
            "segmentation output has {} values, expected {w}x{h}",
            values.len()
        );
        Ok(Array2::from_shape_vec((h, w), values.to_vec())?)
    }
}

/// Binary foreground mask with the same dimensions as its source photo.
#[derive(Debug, Clone, PartialEq)]
pub struct ForegroundMask {
    mask: GrayImage,
}

impl ForegroundMask {
    /// Threshold a probability map that already matches the photo size.
    pub fn from_probabilities(probabilities: &Array2<f32>, threshold: f32) -> Self {
        let (h, w) = probabilities.dim();
        let mask = GrayImage::from_fn(w as u32, h as u32, |x, y| {
            if probabilities[(y as usize, x as usize)] > threshold {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        });
        Self { mask }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.mask.get_pixel(x, y)[0] == FOREGROUND
    }

    /// Fraction of pixels marked foreground.
    pub fn coverage(&self) -> f32 {
        let total = self.mask.len();
        if total == 0 {
            return 0.0;
        }
        let fg = self.mask.iter().filter(|&&v| v == FOREGROUND).count();
        fg as f32 / total as f32
    }

    /// Copy of `photo` with every background pixel set to black.
    pub fn apply(&self, photo: &RgbImage) -> Result<RgbImage> {
        anyhow::ensure!(
            photo.dimensions() == self.dimensions(),
            "mask is {:?} but photo is {:?}",
            self.dimensions(),
            photo.dimensions()
        );
        Ok(RgbImage::from_fn(photo.width(), photo.height(), |x, y| {
            if self.is_foreground(x, y) {
                *photo.get_pixel(x, y)
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }
}

/// Produces a [`ForegroundMask`] for a photo, or nothing when the model fails.
#[derive(Clone)]
pub struct PersonSegmenter {
    model: Option<Arc<dyn SegmentationModel>>,
    threshold: f32,
}

impl PersonSegmenter {
    pub fn new(model: Arc<dyn SegmentationModel>, threshold: f32) -> Self {
        Self {
            model: Some(model),
            threshold,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            model: None,
            threshold: SegmentationSettings::default().threshold,
        }
    }

    /// Segment `photo`. Absence means "no background isolation", never "all" or "nothing".
    pub fn segment(&self, photo: &RgbImage) -> Option<ForegroundMask> {
        let _guard = timing_guard("smartfit_core::segmentation::segment", log::Level::Debug);
        let model = self.model.as_ref()?;
        match model
            .probabilities(photo)
            .and_then(|probs| upsample(&probs, photo.dimensions()))
        {
            Ok(probs) => {
                let mask = ForegroundMask::from_probabilities(&probs, self.threshold);
                debug!("foreground coverage {:.1}%", mask.coverage() * 100.0);
                Some(mask)
            }
            Err(err) => {
                warn!("person segmentation failed: {err:#}");
                None
            }
        }
    }
}

/// Bilinearly resize a probability map to `(width, height)`.
fn upsample(probs: &Array2<f32>, (width, height): (u32, u32)) -> Result<Array2<f32>> {
    let (h, w) = probs.dim();
    anyhow::ensure!(h > 0 && w > 0, "segmentation produced an empty map");
    if (w as u32, h as u32) == (width, height) {
        return Ok(probs.clone());
    }
    let source: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(w as u32, h as u32, probs.iter().copied().collect())
            .ok_or_else(|| anyhow::anyhow!("probability map buffer has the wrong length"))?;
    let resized = image::imageops::resize(&source, width, height, FilterType::Triangle);
    Ok(Array2::from_shape_vec(
        (height as usize, width as usize),
        resized.into_raw(),
    )?)
}
