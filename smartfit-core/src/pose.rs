//! Pose landmark estimation.

use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use log::debug;
use smartfit_utils::{ModelInput, PoseSettings};

use crate::landmarks::{Landmark, PoseKeypoint, PoseLandmarks};
use crate::model::{OnnxModel, output_values};

/// A pretrained body-pose model.
///
/// `Ok(None)` means the model ran but found no person; that is a normal
/// result, not an error.
pub trait PoseEstimator: Send + Sync {
    fn estimate(&self, photo: &RgbImage) -> Result<Option<PoseLandmarks>>;
}

/// ONNX landmark model in the BlazePose layout.
///
/// Output 0 holds `N x stride` rows whose first two values are x and y in
/// model-input pixels. Output 1, when present, is the pose presence score.
#[derive(Debug)]
pub struct OnnxPoseEstimator {
    model: OnnxModel,
    stride: usize,
    presence_threshold: f32,
}

impl OnnxPoseEstimator {
    pub fn load<P: AsRef<Path>>(path: P, settings: &PoseSettings) -> Result<Self> {
        anyhow::ensure!(
            settings.landmark_stride >= 2,
            "pose landmark stride must be at least 2, got {}",
            settings.landmark_stride
        );
        Ok(Self {
            model: OnnxModel::load("pose", path, settings.input)?,
            stride: settings.landmark_stride,
            presence_threshold: settings.presence_threshold,
        })
    }
}

impl PoseEstimator for OnnxPoseEstimator {
    fn estimate(&self, photo: &RgbImage) -> Result<Option<PoseLandmarks>> {
        let outputs = self.model.run(photo)?;
        if let Some(presence) = outputs.get(1) {
            let score = output_values(presence, "pose presence")?
                .first()
                .copied()
                .unwrap_or(0.0);
            if score < self.presence_threshold {
                debug!("pose presence {score:.3} below {:.2}", self.presence_threshold);
                return Ok(None);
            }
        }
        let raw = output_values(&outputs[0], "pose landmark")?;
        decode_landmarks(raw, self.stride, self.model.input()).map(Some)
    }
}

/// Convert raw landmark rows into normalized coordinates.
fn decode_landmarks(raw: &[f32], stride: usize, input: ModelInput) -> Result<PoseLandmarks> {
    let available = raw.len() / stride;
    anyhow::ensure!(
        available >= PoseKeypoint::COUNT,
        "pose output holds {available} landmarks, need {}",
        PoseKeypoint::COUNT
    );
    let (w, h) = (input.width as f32, input.height as f32);
    let points = raw
        .chunks_exact(stride)
        .take(PoseKeypoint::COUNT)
        .map(|row| Landmark::new(row[0] / w, row[1] / h))
        .collect();
    PoseLandmarks::new(points)
}
