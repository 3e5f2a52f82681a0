//! The try-on pipeline and the model set it runs on.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use image::RgbImage;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use smartfit_utils::{
    ModelPaths, SmartFitSettings, TryOnSettings, laplacian_variance, limit_dimensions,
    load_image, normalize_variance, save_image, timing_guard,
};

use crate::attributes::{AttributeDetector, FaceAttributeModel, OnnxFaceAttributeModel};
use crate::body_shape::BodyShapeClassifier;
use crate::compositor::Compositor;
use crate::error::TryOnError;
use crate::face::{FaceLocator, OnnxFaceLocator};
use crate::fitter::{FitStrategy, GarmentFitter};
use crate::landmarks::PoseLandmarks;
use crate::pose::{OnnxPoseEstimator, PoseEstimator};
use crate::profile::{AttributeProfile, BodyShapeProfile, Outcome};
use crate::segmentation::{OnnxSegmentationModel, PersonSegmenter, SegmentationModel};

/// Long-lived model instances shared by every detector of a pipeline.
///
/// A slot left empty makes its detector report defaults (or no mask).
#[derive(Clone, Default)]
pub struct ModelSet {
    /// Optional; without it attributes are inferred from the whole photo.
    pub face_locator: Option<Arc<dyn FaceLocator>>,
    pub face_attributes: Option<Arc<dyn FaceAttributeModel>>,
    pub pose: Option<Arc<dyn PoseEstimator>>,
    pub segmentation: Option<Arc<dyn SegmentationModel>>,
}

impl ModelSet {
    /// Load every ONNX model. A model that fails to load is logged and left empty.
    pub fn load(paths: &ModelPaths, settings: &SmartFitSettings) -> Self {
        let _guard = timing_guard("smartfit_core::pipeline::load_models", log::Level::Info);
        let face_locator = OnnxFaceLocator::load(&paths.face_detector, &settings.face_detection)
            .map(|m| Arc::new(m) as Arc<dyn FaceLocator>);
        let face_attributes =
            OnnxFaceAttributeModel::load(&paths.face_attributes, &settings.attributes)
                .map(|m| Arc::new(m) as Arc<dyn FaceAttributeModel>);
        let pose = OnnxPoseEstimator::load(&paths.pose, &settings.pose)
            .map(|m| Arc::new(m) as Arc<dyn PoseEstimator>);
        let segmentation =
            OnnxSegmentationModel::load(&paths.segmentation, &settings.segmentation)
                .map(|m| Arc::new(m) as Arc<dyn SegmentationModel>);

        Self {
            face_locator: keep_loaded("face detector", face_locator),
            face_attributes: keep_loaded("face attribute", face_attributes),
            pose: keep_loaded("pose", pose),
            segmentation: keep_loaded("segmentation", segmentation),
        }
    }
}

fn keep_loaded<T>(what: &str, loaded: anyhow::Result<T>) -> Option<T> {
    match loaded {
        Ok(model) => Some(model),
        Err(err) => {
            warn!("{what} model unavailable: {err:#}");
            None
        }
    }
}

/// One photo/garment/output triple for [`TryOnPipeline::run_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryOnJob {
    pub photo: PathBuf,
    pub garment: PathBuf,
    pub output: PathBuf,
}

/// Terminal artifact of a try-on call.
#[derive(Debug, Clone, Serialize)]
pub struct TryOnResult {
    pub success: bool,
    #[serde(skip)]
    pub output_image: Option<RgbImage>,
    pub output_path: Option<PathBuf>,
    /// Normalized sharpness of the composite in `[0, 1]`; zero on failure.
    pub quality_score: f64,
    pub raw_sharpness: Option<f64>,
    pub error: Option<String>,
    pub fit_strategy: Option<FitStrategy>,
    pub landmarks_detected: bool,
    pub mask_available: bool,
}

impl TryOnResult {
    fn failure(error: &TryOnError) -> Self {
        Self {
            success: false,
            output_image: None,
            output_path: None,
            quality_score: 0.0,
            raw_sharpness: None,
            error: Some(error.report()),
            fit_strategy: None,
            landmarks_detected: false,
            mask_available: false,
        }
    }
}

/// Personalization and try-on entry points over one shared [`ModelSet`].
///
/// The pipeline holds no per-call state, so one instance may serve many
/// threads at once provided callers give each call its own output path.
#[derive(Clone)]
pub struct TryOnPipeline {
    attributes: AttributeDetector,
    body_shape: BodyShapeClassifier,
    segmenter: PersonSegmenter,
    pose: Option<Arc<dyn PoseEstimator>>,
    fitter: GarmentFitter,
    compositor: Compositor,
    settings: TryOnSettings,
}

impl TryOnPipeline {
    pub fn new(models: ModelSet, settings: &SmartFitSettings) -> Self {
        let attributes = match (models.face_attributes, models.face_locator) {
            (Some(model), Some(locator)) => AttributeDetector::new(model).with_locator(locator),
            (Some(model), None) => AttributeDetector::new(model),
            (None, _) => AttributeDetector::unavailable(),
        };
        let body_shape = models
            .pose
            .clone()
            .map_or_else(BodyShapeClassifier::unavailable, BodyShapeClassifier::new);
        let segmenter = match models.segmentation {
            Some(model) => PersonSegmenter::new(model, settings.segmentation.threshold),
            None => PersonSegmenter::unavailable(),
        };
        Self {
            attributes,
            body_shape,
            segmenter,
            pose: models.pose,
            fitter: GarmentFitter::new(),
            compositor: Compositor::new(&settings.tryon),
            settings: settings.tryon.clone(),
        }
    }

    /// Apply the telemetry settings, load the configured models and build a
    /// pipeline around them.
    pub fn from_settings(settings: &SmartFitSettings) -> Self {
        settings.telemetry.apply();
        Self::new(ModelSet::load(&settings.models, settings), settings)
    }

    pub fn detect_attributes<P: AsRef<Path>>(&self, photo: P) -> AttributeProfile {
        self.analyze_attributes(photo).into_value()
    }

    pub fn analyze_attributes<P: AsRef<Path>>(&self, photo: P) -> Outcome<AttributeProfile> {
        self.attributes.analyze_path(photo)
    }

    pub fn detect_body_shape<P: AsRef<Path>>(&self, photo: P) -> BodyShapeProfile {
        self.analyze_body_shape(photo).into_value()
    }

    pub fn analyze_body_shape<P: AsRef<Path>>(&self, photo: P) -> Outcome<BodyShapeProfile> {
        self.body_shape.analyze_path(photo)
    }

    /// Composite `garment` onto `photo` and write the result to `output_path`.
    ///
    /// Missing landmarks or masks never fail the call. Unreadable inputs,
    /// dimension mismatches and write failures do, and leave nothing at
    /// `output_path`.
    pub fn run_tryon<P, G, O>(&self, photo: P, garment: G, output_path: O) -> TryOnResult
    where
        P: AsRef<Path>,
        G: AsRef<Path>,
        O: AsRef<Path>,
    {
        let _guard = timing_guard("smartfit_core::pipeline::run_tryon", log::Level::Info);
        let output_path = output_path.as_ref();
        match self.try_on(photo.as_ref(), garment.as_ref(), output_path) {
            Ok(result) => result,
            Err(err) => {
                warn!("virtual try-on failed: {}", err.report());
                TryOnResult::failure(&err)
            }
        }
    }

    /// Run independent jobs in parallel; results keep the job order.
    pub fn run_batch(&self, jobs: &[TryOnJob]) -> Vec<TryOnResult> {
        let results: Vec<TryOnResult> = jobs
            .par_iter()
            .map(|job| self.run_tryon(&job.photo, &job.garment, &job.output))
            .collect();
        let succeeded = results.iter().filter(|r| r.success).count();
        info!("batch try-on finished: {succeeded}/{} succeeded", jobs.len());
        results
    }

    fn try_on(
        &self,
        photo: &Path,
        garment: &Path,
        output_path: &Path,
    ) -> Result<TryOnResult, TryOnError> {
        let user = load_image(photo).map_err(|e| TryOnError::image_load("photo", photo, e))?;
        let user = limit_dimensions(&user, self.settings.max_dimension);
        let garment_image =
            load_image(garment).map_err(|e| TryOnError::image_load("garment", garment, e))?;

        let mask = self.segmenter.segment(&user);
        let landmarks = self.estimate_pose(&user);

        let fitted = self.fitter.fit(&garment_image, &user, landmarks.as_ref());
        TryOnError::check_dimensions("fit", user.dimensions(), fitted.buffer.dimensions())?;
        let composite = self.compositor.blend(&user, &fitted.buffer, mask.as_ref())?;

        let raw_sharpness = laplacian_variance(&composite);
        let quality_score = normalize_variance(raw_sharpness, self.settings.quality_normalization);
        save_image(&composite, output_path).map_err(|e| TryOnError::write(output_path, e))?;
        debug!(
            "try-on {:?} fit, sharpness {raw_sharpness:.1} -> {quality_score:.3}, saved {}",
            fitted.strategy,
            output_path.display()
        );

        Ok(TryOnResult {
            success: true,
            output_image: Some(composite),
            output_path: Some(output_path.to_path_buf()),
            quality_score,
            raw_sharpness: Some(raw_sharpness),
            error: None,
            fit_strategy: Some(fitted.strategy),
            landmarks_detected: landmarks.is_some(),
            mask_available: mask.is_some(),
        })
    }

    fn estimate_pose(&self, photo: &RgbImage) -> Option<PoseLandmarks> {
        let estimator = self.pose.as_ref()?;
        match estimator.estimate(photo) {
            Ok(landmarks) => landmarks,
            Err(err) => {
                warn!("pose estimation failed: {err:#}");
                None
            }
        }
    }
}
