//! Face localization ahead of attribute inference.
//!
//! Attribute models are trained on tight face crops. Full-body try-on photos
//! shrink the face to a few pixels once squashed to the model input, so the
//! detector first looks for faces and classifies the best one on its own.

use std::{cmp::Ordering, path::Path};

use anyhow::Result;
use image::{RgbImage, imageops};
use log::debug;
use smartfit_utils::FaceDetectionSettings;
use tract_onnx::prelude::{Tensor, tract_ndarray::ArrayView2};

use crate::model::OnnxModel;

/// Columns per YuNet detection row: box, five landmarks, score.
const ROW_LEN: usize = 15;

/// Axis-aligned face box in photo pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with `other`.
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }

    /// The part of the box inside a `width`×`height` photo as `(x, y, w, h)`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0.0).floor();
        let y0 = self.y.max(0.0).floor();
        let x1 = (self.x + self.width).min(width as f32).ceil();
        let y1 = (self.y + self.height).min(height as f32).ceil();
        if !(x1 > x0 && y1 > y0) {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

/// A pretrained face detector.
///
/// An empty list means the model ran and found no face.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, photo: &RgbImage) -> Result<Vec<FaceBox>>;
}

/// YuNet face detector.
///
/// Output 0 holds `N x 15` rows in model-input pixels: `x, y, w, h`, ten
/// landmark coordinates and the face score.
#[derive(Debug)]
pub struct OnnxFaceLocator {
    model: OnnxModel,
    score_threshold: f32,
    nms_threshold: f32,
    top_k: usize,
}

impl OnnxFaceLocator {
    pub fn load<P: AsRef<Path>>(path: P, settings: &FaceDetectionSettings) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load("face_detector", path, settings.input)?,
            score_threshold: settings.score_threshold,
            nms_threshold: settings.nms_threshold,
            top_k: settings.top_k,
        })
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&self, photo: &RgbImage) -> Result<Vec<FaceBox>> {
        let outputs = self.model.run(photo)?;
        let input = self.model.input();
        let scale_x = photo.width() as f32 / input.width as f32;
        let scale_y = photo.height() as f32 / input.height as f32;
        let mut faces = decode_faces(&outputs[0], scale_x, scale_y, self.score_threshold)?;

        faces.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        if self.top_k > 0 {
            faces.truncate(self.top_k);
        }
        if self.nms_threshold > 0.0 && faces.len() > 1 {
            faces = non_max_suppression(faces, self.nms_threshold);
        }
        debug!("face detector kept {} face(s)", faces.len());
        Ok(faces)
    }
}

/// Scale the score-filtered rows of a YuNet output into photo pixels.
fn decode_faces(
    output: &Tensor,
    scale_x: f32,
    scale_y: f32,
    score_threshold: f32,
) -> Result<Vec<FaceBox>> {
    let rows = match output.shape() {
        [rows, ROW_LEN] | [1, rows, ROW_LEN] => *rows,
        other => anyhow::bail!(
            "face detector output must have shape [N, {ROW_LEN}] or [1, N, {ROW_LEN}] (got {other:?})"
        ),
    };
    let slice = output
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("face detector output is not f32: {e}"))?;
    let rows = ArrayView2::from_shape((rows, ROW_LEN), slice)
        .map_err(|_| anyhow::anyhow!("face detector output data is not contiguous"))?;

    Ok(rows
        .rows()
        .into_iter()
        .filter(|row| row[14].is_finite() && row[14] >= score_threshold)
        .map(|row| FaceBox {
            x: row[0] * scale_x,
            y: row[1] * scale_y,
            width: row[2] * scale_x,
            height: row[3] * scale_y,
            score: row[14],
        })
        .filter(|face| face.width > 0.0 && face.height > 0.0)
        .collect())
}

/// Greedy suppression over faces sorted by descending score.
fn non_max_suppression(faces: Vec<FaceBox>, threshold: f32) -> Vec<FaceBox> {
    let mut kept: Vec<FaceBox> = Vec::with_capacity(faces.len());
    for face in faces {
        if kept.iter().all(|k| face.iou(k) <= threshold) {
            kept.push(face);
        }
    }
    kept
}

/// The highest-scoring face, if any.
pub fn best_face(faces: &[FaceBox]) -> Option<&FaceBox> {
    faces
        .iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
}

/// Cut `face` out of `photo`, clamped to the photo bounds.
pub fn crop_face(photo: &RgbImage, face: &FaceBox) -> Option<RgbImage> {
    let (x, y, w, h) = face.clamp_to(photo.width(), photo.height())?;
    Some(imageops::crop_imm(photo, x, y, w, h).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn face(x: f32, y: f32, w: f32, h: f32, score: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            score,
        }
    }

    fn tensor_from_rows(rows: &[[f32; ROW_LEN]]) -> Tensor {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_shape(&[1, rows.len(), ROW_LEN], &flat).unwrap()
    }

    fn row(bbox: [f32; 4], score: f32) -> [f32; ROW_LEN] {
        let mut row = [0.0; ROW_LEN];
        row[..4].copy_from_slice(&bbox);
        row[14] = score;
        row
    }

    #[test]
    fn rows_are_filtered_and_scaled() {
        let tensor = tensor_from_rows(&[
            row([10.0, 20.0, 30.0, 40.0], 0.95),
            row([0.0, 0.0, 50.0, 50.0], 0.4),
            row([5.0, 5.0, 0.0, 10.0], 0.99),
        ]);
        let faces = decode_faces(&tensor, 2.0, 0.5, 0.9).unwrap();
        assert_eq!(faces, vec![face(20.0, 10.0, 60.0, 20.0, 0.95)]);
    }

    #[test]
    fn unexpected_output_shape_is_an_error() {
        let tensor = Tensor::from_shape(&[2, 4], &[0.0f32; 8]).unwrap();
        let err = decode_faces(&tensor, 1.0, 1.0, 0.5).unwrap_err();
        assert!(format!("{err}").contains("[N, 15]"));
    }

    #[test]
    fn overlapping_faces_are_suppressed() {
        let faces = vec![
            face(0.0, 0.0, 10.0, 10.0, 0.9),
            face(1.0, 1.0, 10.0, 10.0, 0.8),
            face(50.0, 50.0, 10.0, 10.0, 0.7),
        ];
        let kept = non_max_suppression(faces, 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].x, 50.0);
    }

    #[test]
    fn best_face_has_highest_score() {
        let faces = [
            face(0.0, 0.0, 4.0, 4.0, 0.91),
            face(8.0, 8.0, 4.0, 4.0, 0.97),
        ];
        assert_eq!(best_face(&faces).map(|f| f.x), Some(8.0));
        assert!(best_face(&[]).is_none());
    }

    #[test]
    fn crop_is_clamped_to_photo() {
        let photo = RgbImage::from_fn(20, 10, |x, y| Rgb([x as u8, y as u8, 0]));
        let crop = crop_face(&photo, &face(15.5, -3.0, 10.0, 6.0, 1.0)).unwrap();
        assert_eq!(crop.dimensions(), (5, 3));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([15, 0, 0]));

        assert!(crop_face(&photo, &face(25.0, 2.0, 4.0, 4.0, 1.0)).is_none());
    }
}
