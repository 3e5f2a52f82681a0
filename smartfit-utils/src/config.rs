//! Settings shared by the SmartFit detectors and try-on pipeline.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! fields it wants to change. The defaults reproduce the production constants.

use crate::{enhance::PostProcessSettings, image_utils::TensorLayout};

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Locations of the pretrained models.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelPaths {
    pub face_detector: PathBuf,
    pub face_attributes: PathBuf,
    pub pose: PathBuf,
    pub segmentation: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            face_detector: PathBuf::from("models/face_detection_yunet_2023mar_640.onnx"),
            face_attributes: PathBuf::from("models/face_attributes.onnx"),
            pose: PathBuf::from("models/pose_landmarks.onnx"),
            segmentation: PathBuf::from("models/selfie_segmentation.onnx"),
        }
    }
}

/// Input tensor description for one model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    pub layout: TensorLayout,
    /// Per-channel mean subtracted after scaling to `[0, 1]`.
    pub mean: [f32; 3],
    /// Per-channel divisor applied after the mean.
    pub std: [f32; 3],
}

impl ModelInput {
    pub const fn new(width: u32, height: u32, layout: TensorLayout) -> Self {
        Self {
            width,
            height,
            layout,
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }
}

impl Default for ModelInput {
    fn default() -> Self {
        Self::new(224, 224, TensorLayout::Nchw)
    }
}

/// YuNet face detection ahead of attribute inference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FaceDetectionSettings {
    /// YuNet takes raw 0-255 pixel values, hence the `1/255` divisor.
    pub input: ModelInput,
    /// Minimum confidence score for a detection to be considered valid.
    pub score_threshold: f32,
    /// Overlap above which the lower-scoring of two boxes is suppressed.
    pub nms_threshold: f32,
    /// The maximum number of detections kept before suppression.
    pub top_k: usize,
}

impl Default for FaceDetectionSettings {
    fn default() -> Self {
        Self {
            input: ModelInput {
                std: [1.0 / 255.0; 3],
                ..ModelInput::new(640, 640, TensorLayout::Nchw)
            },
            score_threshold: 0.9,
            nms_threshold: 0.3,
            top_k: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AttributeSettings {
    pub input: ModelInput,
    /// Multiplier turning the model's age output into years.
    pub age_scale: f32,
}

impl Default for AttributeSettings {
    fn default() -> Self {
        Self {
            input: ModelInput::new(96, 96, TensorLayout::Nchw),
            age_scale: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoseSettings {
    pub input: ModelInput,
    /// Values per landmark row in the model output (x, y, z, visibility, presence).
    pub landmark_stride: usize,
    /// Minimum pose presence score for landmarks to be reported.
    pub presence_threshold: f32,
}

impl Default for PoseSettings {
    fn default() -> Self {
        Self {
            input: ModelInput::new(256, 256, TensorLayout::Nhwc),
            landmark_stride: 5,
            presence_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentationSettings {
    pub input: ModelInput,
    /// Foreground probability above which a pixel is foreground.
    pub threshold: f32,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            input: ModelInput::new(256, 144, TensorLayout::Nhwc),
            threshold: 0.5,
        }
    }
}

/// Parameters of the fitting/compositing/scoring chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TryOnSettings {
    /// Longest side of the working photo; larger photos are downscaled first.
    pub max_dimension: u32,
    /// Restrict the garment to foreground pixels when a mask is available.
    pub isolate_foreground: bool,
    pub user_weight: f32,
    pub garment_weight: f32,
    pub post_process: PostProcessSettings,
    /// Variance that maps to a quality score of 1.0.
    pub quality_normalization: f64,
}

impl Default for TryOnSettings {
    fn default() -> Self {
        Self {
            max_dimension: crate::image_utils::DEFAULT_MAX_DIMENSION,
            isolate_foreground: false,
            user_weight: 0.3,
            garment_weight: 0.7,
            post_process: PostProcessSettings::default(),
            quality_normalization: crate::quality::TRYON_NORMALIZATION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    pub fn level_filter(&self) -> LevelFilter {
        self.level
            .trim()
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Debug)
    }

    /// Push these settings into the global telemetry switch.
    pub fn apply(&self) {
        crate::telemetry::configure(self.enabled, self.level_filter());
    }
}

/// Root settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartFitSettings {
    pub models: ModelPaths,
    pub face_detection: FaceDetectionSettings,
    pub attributes: AttributeSettings,
    pub pose: PoseSettings,
    pub segmentation: SegmentationSettings,
    pub tryon: TryOnSettings,
    pub telemetry: TelemetrySettings,
}

impl SmartFitSettings {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings: SmartFitSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;
        Ok(settings)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_settings_round_trip() {
        let file = NamedTempFile::new().expect("tempfile");
        let settings = SmartFitSettings::default();
        settings.save_to_path(file.path()).expect("save");

        let loaded = SmartFitSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded.models, settings.models);
        assert_eq!(loaded.face_detection, settings.face_detection);
        assert_eq!(loaded.pose, settings.pose);
        assert_eq!(loaded.tryon, settings.tryon);
        assert_eq!(loaded.telemetry.enabled, settings.telemetry.enabled);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "tryon": { "isolate_foreground": true }, "segmentation": { "threshold": 0.6 } }"#;
        let settings: SmartFitSettings = serde_json::from_str(json).expect("parse");
        assert!(settings.tryon.isolate_foreground);
        assert_eq!(settings.tryon.user_weight, 0.3);
        assert_eq!(settings.tryon.garment_weight, 0.7);
        assert_eq!(settings.tryon.max_dimension, 1920);
        assert_eq!(settings.segmentation.threshold, 0.6);
        assert_eq!(settings.segmentation.input.layout, TensorLayout::Nhwc);
        assert_eq!(settings.pose.presence_threshold, 0.5);
        assert_eq!(settings.face_detection.score_threshold, 0.9);
        assert_eq!(settings.face_detection.input.width, 640);
    }

    #[test]
    fn malformed_settings_report_path() {
        let file = NamedTempFile::new().expect("tempfile");
        fs::write(file.path(), "{ not json").expect("write");
        let err = SmartFitSettings::load_from_path(file.path()).expect_err("should fail");
        assert!(format!("{err}").contains("failed to parse settings JSON"));
    }

    #[test]
    fn telemetry_level_parses_case_insensitively() {
        let settings = TelemetrySettings {
            enabled: true,
            level: " TRACE ".into(),
        };
        assert_eq!(settings.level_filter(), LevelFilter::Trace);

        let fallback = TelemetrySettings {
            enabled: true,
            level: "loud".into(),
        };
        assert_eq!(fallback.level_filter(), LevelFilter::Debug);
    }
}
