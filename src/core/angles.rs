//! Head orientation angles from three pose keypoints.
//!
//! Angles are derived from the nose and both ears. Depth is optional on
//! every keypoint; a keypoint without depth is treated as lying at zero
//! depth, so image-space input degrades to a coarser estimate instead of
//! failing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single keypoint position. `z` is absent for image-space landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// A keypoint with no depth information.
    pub fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    fn depth(&self) -> f64 {
        self.z.unwrap_or(0.0)
    }
}

/// Pitch, yaw and roll in degrees. `None` marks a missing angle and is
/// never coerced to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadAngles {
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
    pub roll: Option<f64>,
}

impl HeadAngles {
    /// All three angles missing.
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn is_missing(&self) -> bool {
        self.pitch.is_none() && self.yaw.is_none() && self.roll.is_none()
    }
}

/// Which angle feeds the variance series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleChannel {
    #[default]
    Pitch,
    Yaw,
    Roll,
}

impl AngleChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AngleChannel::Pitch => "pitch",
            AngleChannel::Yaw => "yaw",
            AngleChannel::Roll => "roll",
        }
    }
}

impl fmt::Display for AngleChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AngleChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pitch" => Ok(AngleChannel::Pitch),
            "yaw" => Ok(AngleChannel::Yaw),
            "roll" => Ok(AngleChannel::Roll),
            other => Err(format!("unknown angle channel '{other}' (expected pitch, yaw or roll)")),
        }
    }
}

/// Compute head angles from nose and ear keypoints.
///
/// If any keypoint is absent all three angles are missing.
///
/// - pitch: rotation about X, from vertical and depth offset of the nose
///   relative to the ear midpoint
/// - yaw: rotation about Y, from horizontal and depth offset
/// - roll: tilt of the ear-to-ear line in the image plane, in (-90, 90]
pub fn compute_angles(
    nose: Option<&Keypoint>,
    left_ear: Option<&Keypoint>,
    right_ear: Option<&Keypoint>,
) -> HeadAngles {
    let (nose, left_ear, right_ear) = match (nose, left_ear, right_ear) {
        (Some(n), Some(l), Some(r)) => (n, l, r),
        _ => return HeadAngles::missing(),
    };

    let dx = nose.x - (left_ear.x + right_ear.x) / 2.0;
    let dy = nose.y - (left_ear.y + right_ear.y) / 2.0;
    let dz = nose.depth() - (left_ear.depth() + right_ear.depth()) / 2.0;

    // -0.0 would send a centred planar nose to 180 instead of 0
    let forward = if dz == 0.0 { 0.0 } else { -dz };

    let pitch = dy.atan2(forward).to_degrees();
    let yaw = dx.atan2(forward).to_degrees();

    let ear_dx = right_ear.x - left_ear.x;
    let ear_dy = right_ear.y - left_ear.y;
    // Sign follows the right-to-left ear vector: with the subject's left
    // ear at the larger image x, a lower right ear is positive roll.
    let roll = line_tilt(ear_dy.atan2(-ear_dx).to_degrees());

    HeadAngles {
        pitch: finite(normalize_degrees(pitch)),
        yaw: finite(normalize_degrees(yaw)),
        roll: finite(roll),
    }
}

/// Map an angle into (-180, 180].
pub fn normalize_degrees(deg: f64) -> f64 {
    let mut a = deg % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a <= -180.0 {
        a += 360.0;
    }
    a
}

// A line has no direction, so a heading and its opposite describe the same
// tilt. Detectors disagree on which image side the left ear lands on.
fn line_tilt(deg: f64) -> f64 {
    let a = normalize_degrees(deg);
    if a > 90.0 {
        a - 180.0
    } else if a <= -90.0 {
        a + 180.0
    } else {
        a
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}
