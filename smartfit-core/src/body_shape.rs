//! Body-shape classification from shoulder and hip landmarks.

use std::{path::Path, sync::Arc};

use image::RgbImage;
use log::{debug, warn};
use smartfit_utils::{load_image, timing_guard};

use crate::landmarks::{PoseKeypoint, PoseLandmarks};
use crate::pose::PoseEstimator;
use crate::profile::{BodyShapeProfile, BodyType, Outcome, PoseQuality};

/// Fraction of the photo height reported as the height estimate.
const HEIGHT_FACTOR: f32 = 0.15;

#[derive(Clone)]
pub struct BodyShapeClassifier {
    estimator: Option<Arc<dyn PoseEstimator>>,
}

impl BodyShapeClassifier {
    pub fn new(estimator: Arc<dyn PoseEstimator>) -> Self {
        Self {
            estimator: Some(estimator),
        }
    }

    /// Classifier without a pose model; every call yields the fallback profile.
    pub fn unavailable() -> Self {
        Self { estimator: None }
    }

    pub fn detect(&self, photo: &RgbImage) -> BodyShapeProfile {
        self.analyze(photo).into_value()
    }

    pub fn analyze(&self, photo: &RgbImage) -> Outcome<BodyShapeProfile> {
        let _guard = timing_guard("smartfit_core::body_shape::analyze", log::Level::Debug);
        let Some(estimator) = self.estimator.as_ref() else {
            return defaulted("pose model unavailable".to_string());
        };
        match estimator.estimate(photo) {
            Ok(Some(landmarks)) => Outcome::Measured(classify(&landmarks, photo.dimensions())),
            Ok(None) => defaulted("no pose detected".to_string()),
            Err(err) => defaulted(format!("{err:#}")),
        }
    }

    pub fn analyze_path<P: AsRef<Path>>(&self, path: P) -> Outcome<BodyShapeProfile> {
        match load_image(path.as_ref()) {
            Ok(photo) => self.analyze(&photo),
            Err(err) => defaulted(format!("{err:#}")),
        }
    }
}

fn defaulted(reason: String) -> Outcome<BodyShapeProfile> {
    warn!("body shape detection failed: {reason}");
    Outcome::Defaulted {
        value: BodyShapeProfile::fallback(),
        reason,
    }
}

/// Measure shoulder and hip widths in pixels and bucket their ratio.
pub fn classify(landmarks: &PoseLandmarks, (width, height): (u32, u32)) -> BodyShapeProfile {
    let w = width as f32;
    let span = |a: PoseKeypoint, b: PoseKeypoint| {
        (landmarks.get(a).x - landmarks.get(b).x).abs() * w
    };

    let shoulder_width = span(PoseKeypoint::LeftShoulder, PoseKeypoint::RightShoulder);
    let hip_width = span(PoseKeypoint::LeftHip, PoseKeypoint::RightHip);
    let ratio = if hip_width > 0.0 {
        shoulder_width / hip_width
    } else {
        1.0
    };
    let body_type = BodyType::from_ratio(ratio);
    debug!(
        "shoulders {shoulder_width:.1}px, hips {hip_width:.1}px, ratio {ratio:.3} -> {body_type:?}"
    );

    BodyShapeProfile {
        body_type,
        shoulder_width,
        hip_width,
        ratio,
        height_estimate: (height as f32 * HEIGHT_FACTOR) as u32,
        pose_quality: PoseQuality::Good,
        detection_succeeded: true,
    }
}
