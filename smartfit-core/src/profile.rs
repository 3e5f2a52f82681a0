//! Personalization profiles and the tagged detector outcome.
//!
//! Detectors never fail outward. They report either a measured profile or the
//! documented fallback profile together with the reason detection failed, so
//! ranking downstream stays deterministic even when every model is missing.

use serde::{Deserialize, Serialize};

/// Result of a detector call: measured values, or fixed defaults after a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Measured(T),
    Defaulted { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn is_measured(&self) -> bool {
        matches!(self, Outcome::Measured(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Outcome::Measured(value) | Outcome::Defaulted { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Outcome::Measured(value) | Outcome::Defaulted { value, .. } => value,
        }
    }

    /// Failure reason for defaulted outcomes.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Measured(_) => None,
            Outcome::Defaulted { reason, .. } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Kids,
    Teens,
    YoungAdults,
    Adults,
}

impl AgeGroup {
    /// Bracket an age: `<13` kids, `13..=19` teens, `20..=35` young adults, `>=36` adults.
    pub fn from_age(age: u32) -> Self {
        match age {
            0..=12 => AgeGroup::Kids,
            13..=19 => AgeGroup::Teens,
            20..=35 => AgeGroup::YoungAdults,
            _ => AgeGroup::Adults,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeProfile {
    pub gender: Gender,
    /// Probability of the winning gender class, in `[0, 1]`.
    pub gender_confidence: f32,
    pub age: u32,
    pub age_group: AgeGroup,
    pub detection_succeeded: bool,
}

impl AttributeProfile {
    pub const DEFAULT_AGE: u32 = 25;
    pub const DEFAULT_CONFIDENCE: f32 = 0.5;

    /// Profile reported when the face-attribute model could not run.
    pub fn fallback() -> Self {
        Self {
            gender: Gender::Male,
            gender_confidence: Self::DEFAULT_CONFIDENCE,
            age: Self::DEFAULT_AGE,
            age_group: AgeGroup::from_age(Self::DEFAULT_AGE),
            detection_succeeded: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    Slim,
    Athletic,
    Average,
    PlusSize,
}

impl BodyType {
    /// Bucket a shoulder-to-hip ratio. Checks run in order, first match wins.
    pub fn from_ratio(ratio: f32) -> Self {
        if ratio > 1.25 {
            BodyType::Athletic
        } else if ratio < 1.05 {
            BodyType::PlusSize
        } else if ratio < 1.15 {
            BodyType::Average
        } else {
            BodyType::Slim
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseQuality {
    Good,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyShapeProfile {
    pub body_type: BodyType,
    /// Horizontal shoulder distance in pixels.
    pub shoulder_width: f32,
    /// Horizontal hip distance in pixels.
    pub hip_width: f32,
    pub ratio: f32,
    pub height_estimate: u32,
    pub pose_quality: PoseQuality,
    pub detection_succeeded: bool,
}

impl BodyShapeProfile {
    /// Profile reported when no pose could be detected.
    pub fn fallback() -> Self {
        Self {
            body_type: BodyType::Average,
            shoulder_width: 45.0,
            hip_width: 40.0,
            ratio: 1.12,
            height_estimate: 170,
            pose_quality: PoseQuality::Unknown,
            detection_succeeded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_brackets_are_boundary_exact() {
        assert_eq!(AgeGroup::from_age(0), AgeGroup::Kids);
        assert_eq!(AgeGroup::from_age(12), AgeGroup::Kids);
        assert_eq!(AgeGroup::from_age(13), AgeGroup::Teens);
        assert_eq!(AgeGroup::from_age(19), AgeGroup::Teens);
        assert_eq!(AgeGroup::from_age(20), AgeGroup::YoungAdults);
        assert_eq!(AgeGroup::from_age(35), AgeGroup::YoungAdults);
        assert_eq!(AgeGroup::from_age(36), AgeGroup::Adults);
        assert_eq!(AgeGroup::from_age(90), AgeGroup::Adults);
    }

    #[test]
    fn body_type_thresholds_apply_in_order() {
        assert_eq!(BodyType::from_ratio(1.30), BodyType::Athletic);
        assert_eq!(BodyType::from_ratio(1.00), BodyType::PlusSize);
        assert_eq!(BodyType::from_ratio(1.10), BodyType::Average);
        assert_eq!(BodyType::from_ratio(1.20), BodyType::Slim);
        assert_eq!(BodyType::from_ratio(1.25), BodyType::Slim);
        assert_eq!(BodyType::from_ratio(1.05), BodyType::Average);
        assert_eq!(BodyType::from_ratio(1.15), BodyType::Slim);
    }

    #[test]
    fn fallback_profiles_use_documented_constants() {
        let attrs = AttributeProfile::fallback();
        assert_eq!(attrs.gender, Gender::Male);
        assert_eq!(attrs.gender_confidence, 0.5);
        assert_eq!(attrs.age, 25);
        assert_eq!(attrs.age_group, AgeGroup::YoungAdults);
        assert!(!attrs.detection_succeeded);

        let body = BodyShapeProfile::fallback();
        assert_eq!(body.body_type, BodyType::Average);
        assert_eq!(body.shoulder_width, 45.0);
        assert_eq!(body.hip_width, 40.0);
        assert_eq!(body.ratio, 1.12);
        assert_eq!(body.pose_quality, PoseQuality::Unknown);
        assert!(!body.detection_succeeded);
    }

    #[test]
    fn outcome_exposes_value_and_reason() {
        let measured = Outcome::Measured(3);
        assert!(measured.is_measured());
        assert_eq!(measured.reason(), None);

        let defaulted = Outcome::Defaulted {
            value: 7,
            reason: "model missing".into(),
        };
        assert!(!defaulted.is_measured());
        assert_eq!(*defaulted.value(), 7);
        assert_eq!(defaulted.reason(), Some("model missing"));
        assert_eq!(defaulted.into_value(), 7);
    }

    #[test]
    fn profiles_serialize_snake_case() {
        let json = serde_json::to_value(AttributeProfile::fallback()).unwrap();
        assert_eq!(json["age_group"], "young_adults");
        let body = serde_json::to_value(BodyShapeProfile {
            body_type: BodyType::PlusSize,
            ..BodyShapeProfile::fallback()
        })
        .unwrap();
        assert_eq!(body["body_type"], "plus_size");
    }
}
