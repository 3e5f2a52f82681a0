//! Perceived gender and age from a face photo.

use std::{borrow::Cow, path::Path, sync::Arc};

use anyhow::Result;
use image::RgbImage;
use log::{debug, warn};
use smartfit_utils::{AttributeSettings, load_image, timing_guard};

use crate::face::{FaceLocator, best_face, crop_face};
use crate::model::{OnnxModel, output_values};
use crate::profile::{AgeGroup, AttributeProfile, Gender, Outcome};

/// Raw face-attribute model output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeScores {
    /// Non-negative score for the female class (probability or percentage).
    pub female: f32,
    /// Non-negative score for the male class, on the same scale as `female`.
    pub male: f32,
    /// Estimated age in years.
    pub age: f32,
}

/// A pretrained face-attribute model.
pub trait FaceAttributeModel: Send + Sync {
    fn infer(&self, photo: &RgbImage) -> Result<AttributeScores>;
}

/// ONNX face-attribute model emitting `[female_logit, male_logit, age / age_scale]`.
#[derive(Debug)]
pub struct OnnxFaceAttributeModel {
    model: OnnxModel,
    age_scale: f32,
}

impl OnnxFaceAttributeModel {
    pub fn load<P: AsRef<Path>>(path: P, settings: &AttributeSettings) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load("face_attributes", path, settings.input)?,
            age_scale: settings.age_scale,
        })
    }
}

impl FaceAttributeModel for OnnxFaceAttributeModel {
    fn infer(&self, photo: &RgbImage) -> Result<AttributeScores> {
        let outputs = self.model.run(photo)?;
        let values = output_values(&outputs[0], "face attribute")?;
        anyhow::ensure!(
            values.len() >= 3,
            "face attribute output needs 3 values, got {}",
            values.len()
        );
        let [female, male] = softmax2(values[0], values[1]);
        Ok(AttributeScores {
            female,
            male,
            age: values[2] * self.age_scale,
        })
    }
}

fn softmax2(a: f32, b: f32) -> [f32; 2] {
    let max = a.max(b);
    let (ea, eb) = ((a - max).exp(), (b - max).exp());
    let sum = ea + eb;
    [ea / sum, eb / sum]
}

/// Derives an [`AttributeProfile`] from a photo, defaulting on any model failure.
///
/// With a [`FaceLocator`] attached, the highest-scoring face is cropped out
/// before inference. Photos without a detectable face are classified whole.
#[derive(Clone)]
pub struct AttributeDetector {
    model: Option<Arc<dyn FaceAttributeModel>>,
    locator: Option<Arc<dyn FaceLocator>>,
}

impl AttributeDetector {
    pub fn new(model: Arc<dyn FaceAttributeModel>) -> Self {
        Self {
            model: Some(model),
            locator: None,
        }
    }

    /// Detector without a model; every call yields the fallback profile.
    pub fn unavailable() -> Self {
        Self {
            model: None,
            locator: None,
        }
    }

    /// Crop faces found by `locator` before running the attribute model.
    pub fn with_locator(mut self, locator: Arc<dyn FaceLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Analyse `photo`, returning the profile.
    pub fn detect(&self, photo: &RgbImage) -> AttributeProfile {
        self.analyze(photo).into_value()
    }

    /// Analyse `photo`, keeping the distinction between measured and defaulted results.
    pub fn analyze(&self, photo: &RgbImage) -> Outcome<AttributeProfile> {
        let _guard = timing_guard("smartfit_core::attributes::analyze", log::Level::Debug);
        let Some(model) = self.model.as_ref() else {
            return defaulted("face attribute model unavailable".to_string());
        };
        let face = self.face_region(photo);
        match model.infer(&face).and_then(profile_from_scores) {
            Ok(profile) => {
                debug!(
                    "attributes: {:?} ({:.2}), age {} ({:?})",
                    profile.gender, profile.gender_confidence, profile.age, profile.age_group
                );
                Outcome::Measured(profile)
            }
            Err(err) => defaulted(format!("{err:#}")),
        }
    }

    fn face_region<'a>(&self, photo: &'a RgbImage) -> Cow<'a, RgbImage> {
        let Some(locator) = self.locator.as_ref() else {
            return Cow::Borrowed(photo);
        };
        match locator.locate(photo) {
            Ok(faces) => match best_face(&faces).and_then(|face| crop_face(photo, face)) {
                Some(crop) => {
                    debug!(
                        "classifying {}x{} face crop (of {} found)",
                        crop.width(),
                        crop.height(),
                        faces.len()
                    );
                    Cow::Owned(crop)
                }
                None => {
                    debug!("no face found; classifying the whole photo");
                    Cow::Borrowed(photo)
                }
            },
            Err(err) => {
                warn!("face localization failed, classifying the whole photo: {err:#}");
                Cow::Borrowed(photo)
            }
        }
    }

    /// Load `path` and analyse it; unreadable photos also yield the fallback profile.
    pub fn analyze_path<P: AsRef<Path>>(&self, path: P) -> Outcome<AttributeProfile> {
        match load_image(path.as_ref()) {
            Ok(photo) => self.analyze(&photo),
            Err(err) => defaulted(format!("{err:#}")),
        }
    }
}

fn defaulted(reason: String) -> Outcome<AttributeProfile> {
    warn!("gender/age detection failed: {reason}");
    Outcome::Defaulted {
        value: AttributeProfile::fallback(),
        reason,
    }
}

/// Turn raw scores into a measured profile.
fn profile_from_scores(scores: AttributeScores) -> Result<AttributeProfile> {
    let AttributeScores { female, male, age } = scores;
    anyhow::ensure!(
        female.is_finite() && male.is_finite() && female >= 0.0 && male >= 0.0,
        "gender scores must be finite and non-negative (female {female}, male {male})"
    );
    let total = female + male;
    anyhow::ensure!(total > 0.0, "gender scores are both zero");
    anyhow::ensure!(age.is_finite(), "age estimate is not finite");

    let (gender, winning) = if male >= female {
        (Gender::Male, male)
    } else {
        (Gender::Female, female)
    };
    let age = age.max(0.0) as u32;
    Ok(AttributeProfile {
        gender,
        gender_confidence: (winning / total).clamp(0.0, 1.0),
        age,
        age_group: AgeGroup::from_age(age),
        detection_succeeded: true,
    })
}
