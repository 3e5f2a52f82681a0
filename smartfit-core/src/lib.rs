//! Core SmartFit try-on pipeline.
//!
//! This crate wraps the face-detection, face-attribute, pose and segmentation ONNX models
//! (run with `tract-onnx`), derives personalization profiles from them, and
//! fits, composites and scores garment try-on images.

/// Perceived gender and age detection.
pub mod attributes;
/// Shoulder-to-hip body-shape classification.
pub mod body_shape;
/// Garment blending and post-processing.
pub mod compositor;
/// Fatal try-on errors.
pub mod error;
/// Face detection and cropping ahead of attribute inference.
pub mod face;
/// Landmark-driven and proportional garment placement.
pub mod fitter;
/// Pose landmark types.
pub mod landmarks;
/// ONNX model loading and execution.
pub mod model;
/// Try-on pipeline, model set and batch execution.
pub mod pipeline;
/// Pose estimation model seam.
pub mod pose;
/// Personalization profiles and detector outcomes.
pub mod profile;
/// Person segmentation and foreground masks.
pub mod segmentation;

pub use attributes::{
    AttributeDetector, AttributeScores, FaceAttributeModel, OnnxFaceAttributeModel,
};
pub use body_shape::BodyShapeClassifier;
pub use compositor::Compositor;
pub use error::TryOnError;
pub use face::{FaceBox, FaceLocator, OnnxFaceLocator, best_face, crop_face};
pub use fitter::{FitRegion, FitStrategy, FittedGarment, GarmentFitter, fallback_region};
pub use landmarks::{Landmark, PoseKeypoint, PoseLandmarks};
pub use model::OnnxModel;
pub use pipeline::{ModelSet, TryOnJob, TryOnPipeline, TryOnResult};
pub use pose::{OnnxPoseEstimator, PoseEstimator};
pub use profile::{
    AgeGroup, AttributeProfile, BodyShapeProfile, BodyType, Gender, Outcome, PoseQuality,
};
pub use segmentation::{ForegroundMask, OnnxSegmentationModel, PersonSegmenter, SegmentationModel};
pub use smartfit_utils::{laplacian_variance, sharpness_score};

