//! Body pose landmarks in normalized image coordinates.

use serde::{Deserialize, Serialize};

/// A 2D point with `x` and `y` expressed as fractions of the image width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Pixel position for an image of `width` x `height`.
    pub fn to_pixels(self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// Named keypoints of the 33-point body topology, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum PoseKeypoint {
    Nose = 0,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl PoseKeypoint {
    pub const COUNT: usize = 33;

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Ordered landmark set produced by one pose detection call.
///
/// The points are fixed at construction; there is no mutable access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseLandmarks {
    points: Vec<Landmark>,
}

impl PoseLandmarks {
    /// Build a landmark set; at least [`PoseKeypoint::COUNT`] points are required.
    pub fn new(points: Vec<Landmark>) -> anyhow::Result<Self> {
        anyhow::ensure!(
            points.len() >= PoseKeypoint::COUNT,
            "pose landmark set needs {} points, got {}",
            PoseKeypoint::COUNT,
            points.len()
        );
        anyhow::ensure!(
            points.iter().all(|p| p.x.is_finite() && p.y.is_finite()),
            "pose landmarks must be finite"
        );
        Ok(Self { points })
    }

    /// Landmark set with only the torso keypoints placed; everything else sits at the origin.
    pub fn from_torso(
        left_shoulder: Landmark,
        right_shoulder: Landmark,
        left_hip: Landmark,
        right_hip: Landmark,
    ) -> Self {
        let mut points = vec![Landmark::new(0.0, 0.0); PoseKeypoint::COUNT];
        points[PoseKeypoint::LeftShoulder.index()] = left_shoulder;
        points[PoseKeypoint::RightShoulder.index()] = right_shoulder;
        points[PoseKeypoint::LeftHip.index()] = left_hip;
        points[PoseKeypoint::RightHip.index()] = right_hip;
        Self { points }
    }

    pub fn get(&self, keypoint: PoseKeypoint) -> Landmark {
        self.points[keypoint.index()]
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
