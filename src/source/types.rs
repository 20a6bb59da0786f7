//! Detection frames as delivered by the pose estimator.
//!
//! A frame carries up to two landmark sets for the first detected pose:
//! world-space (metric, with depth) and image-space (normalised, depth
//! unreliable). Only the nose and ears are used here.

use crate::core::angles::Keypoint;
use serde::{Deserialize, Serialize};

/// Pose landmark index of the nose.
pub const NOSE_INDEX: usize = 0;
/// Pose landmark index of the left ear.
pub const LEFT_EAR_INDEX: usize = 7;
/// Pose landmark index of the right ear.
pub const RIGHT_EAR_INDEX: usize = 8;

/// One frame of pose-estimator output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    /// Capture time in milliseconds on the producer's monotonic clock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    /// World-space landmarks; individual entries may be null
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_landmarks: Option<Vec<Option<Keypoint>>>,
    /// Image-space landmarks; individual entries may be null
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<Option<Keypoint>>>,
}

/// Nose and ear keypoints picked from a frame. Any of them may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadKeypoints {
    pub nose: Option<Keypoint>,
    pub left_ear: Option<Keypoint>,
    pub right_ear: Option<Keypoint>,
}

impl DetectionFrame {
    /// Whether the estimator found a pose in this frame at all.
    pub fn has_pose(&self) -> bool {
        non_empty(&self.world_landmarks).is_some() || non_empty(&self.landmarks).is_some()
    }

    /// Pick the head keypoints, preferring world landmarks.
    ///
    /// Image landmarks have their depth dropped. Returns `None` when the
    /// frame holds no pose.
    pub fn head_keypoints(&self) -> Option<HeadKeypoints> {
        if let Some(world) = non_empty(&self.world_landmarks) {
            return Some(pick(world, |k| k));
        }
        non_empty(&self.landmarks).map(|image| pick(image, |k| Keypoint::planar(k.x, k.y)))
    }
}

fn non_empty(set: &Option<Vec<Option<Keypoint>>>) -> Option<&[Option<Keypoint>]> {
    set.as_deref().filter(|s| !s.is_empty())
}

fn pick<F>(landmarks: &[Option<Keypoint>], map: F) -> HeadKeypoints
where
    F: Fn(Keypoint) -> Keypoint,
{
    let at = |i: usize| landmarks.get(i).copied().flatten().map(&map);
    HeadKeypoints {
        nose: at(NOSE_INDEX),
        left_ear: at(LEFT_EAR_INDEX),
        right_ear: at(RIGHT_EAR_INDEX),
    }
}
